//! 해석 컨텍스트 -- 원시 항목 하나의 파싱 동안만 존재하는 상태
//!
//! [`ResolutionContext`]는 원시 데이터, 엔진 변형이 준비한 데이터, 입력 어댑터,
//! 진행 중인 레코드, 현재 필드, 부모 컨텍스트(스택 파싱), 메타데이터를 가집니다.
//! 컨텍스트는 파싱 호출 하나가 독점하며 스레드 간에 공유되지 않습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use actistream_core::types::Value;

use crate::activity::ActivityRecord;
use crate::resolver::regex::RegexCaptures;

/// 여러 파싱 호출이 공유하는 순차 리더
pub type SharedReader = Arc<Mutex<Box<dyn BufRead + Send>>>;

/// 원시 입력 항목
#[derive(Clone)]
pub enum RawData {
    /// 텍스트
    Text(String),
    /// 바이너리
    Bytes(Bytes),
    /// 이름-값 맵
    Map(BTreeMap<String, Value>),
    /// JSON 문서
    Json(serde_json::Value),
    /// 순차 리더 (활동 구분자 단위로 읽음)
    Reader(SharedReader),
}

impl RawData {
    /// 리더를 감쌉니다.
    pub fn reader(reader: impl BufRead + Send + 'static) -> Self {
        Self::Reader(Arc::new(Mutex::new(Box::new(reader))))
    }

    /// 해석된 값을 스택 파서 입력으로 만듭니다.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Str(s) => Self::Text(s.clone()),
            Value::Bytes(b) => Self::Bytes(Bytes::from(b.clone())),
            Value::Map(m) => Self::Map(m.clone()),
            Value::List(_) => Self::Json(value.to_json()),
            other => Self::Text(other.to_string()),
        }
    }

    /// 종류 이름 (로그용)
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Map(_) => "map",
            Self::Json(_) => "json",
            Self::Reader(_) => "reader",
        }
    }

    /// `$DATA$` 플레이스홀더 값
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Text(s) => Some(Value::Str(s.clone())),
            Self::Bytes(b) => Some(Value::Bytes(b.to_vec())),
            Self::Map(m) => Some(Value::Map(m.clone())),
            Self::Json(j) => Value::from_json(j),
            Self::Reader(_) => None,
        }
    }

    /// 원시 데이터의 문자열 표현 (메시지 대체용)
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Json(j) => Some(j.to_string()),
            Self::Map(_) => self.to_value().map(|v| v.to_string()),
            Self::Reader(_) => None,
        }
    }
}

impl fmt::Debug for RawData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Self::Json(j) => f.debug_tuple("Json").field(j).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<&str> for RawData {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for RawData {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Bytes> for RawData {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for RawData {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<serde_json::Value> for RawData {
    fn from(j: serde_json::Value) -> Self {
        Self::Json(j)
    }
}

impl From<BTreeMap<String, Value>> for RawData {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Self::Map(m)
    }
}

/// 엔진 변형이 준비한 데이터
#[derive(Debug, Clone)]
pub enum PreparedData {
    /// 텍스트
    Text(String),
    /// JSON 문서
    Json(serde_json::Value),
    /// 이름-값 맵
    Map(BTreeMap<String, Value>),
    /// 정규식 매칭 결과
    Captures(RegexCaptures),
}

/// 입력 어댑터 (원시 항목을 만든 스트림)
pub trait ActivitySource: Send + Sync {
    /// 어댑터 이름
    fn name(&self) -> &str;

    /// 어댑터 속성 (StreamProp 로케이터)
    fn property(&self, name: &str) -> Option<Value>;

    /// 그룹 활동 id. 있으면 파싱된 레코드의 부모 id로 사용됩니다.
    fn grouping_activity_id(&self) -> Option<String> {
        None
    }
}

/// 고정 속성을 가진 입력 어댑터
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    properties: BTreeMap<String, Value>,
    grouping_id: Option<String>,
}

impl StaticSource {
    /// 어댑터를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 속성을 추가합니다.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// 그룹 활동 id를 지정합니다.
    pub fn with_grouping_id(mut self, id: impl Into<String>) -> Self {
        self.grouping_id = Some(id.into());
        self
    }
}

impl ActivitySource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    fn grouping_activity_id(&self) -> Option<String> {
        self.grouping_id.clone()
    }
}

/// 해석 컨텍스트
pub struct ResolutionContext<'a> {
    source: &'a dyn ActivitySource,
    raw: RawData,
    data: PreparedData,
    parser_name: String,
    pub(crate) record: ActivityRecord,
    pub(crate) field: Option<String>,
    parent: Option<&'a ResolutionContext<'a>>,
    metadata: BTreeMap<String, Value>,
    valid: bool,
}

impl<'a> ResolutionContext<'a> {
    /// 최상위 컨텍스트를 생성합니다.
    pub fn new(
        source: &'a dyn ActivitySource,
        parser_name: impl Into<String>,
        raw: RawData,
        data: PreparedData,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            source,
            raw,
            data,
            parser_name: parser_name.into(),
            record: ActivityRecord::new(),
            field: None,
            parent: None,
            metadata,
            valid: true,
        }
    }

    /// 스택 파싱용 자식 컨텍스트를 생성합니다. 어댑터와 메타데이터를 이어받습니다.
    pub fn child<'b>(
        &'b self,
        parser_name: impl Into<String>,
        raw: RawData,
        data: PreparedData,
    ) -> ResolutionContext<'b> {
        ResolutionContext {
            source: self.source,
            raw,
            data,
            parser_name: parser_name.into(),
            record: ActivityRecord::new(),
            field: None,
            parent: Some(self),
            metadata: self.metadata.clone(),
            valid: true,
        }
    }

    /// 입력 어댑터
    pub fn source(&self) -> &dyn ActivitySource {
        self.source
    }

    /// 원시 데이터
    pub fn raw(&self) -> &RawData {
        &self.raw
    }

    /// 준비된 데이터
    pub fn data(&self) -> &PreparedData {
        &self.data
    }

    /// 파싱 중인 파서 이름
    pub fn parser_name(&self) -> &str {
        &self.parser_name
    }

    /// 진행 중인 레코드
    pub fn record(&self) -> &ActivityRecord {
        &self.record
    }

    /// 현재 해석 중인 필드 이름
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// 부모 컨텍스트
    pub fn parent(&self) -> Option<&ResolutionContext<'a>> {
        self.parent
    }

    /// `depth`단계 위의 조상 컨텍스트 (0 = 자기 자신)
    pub fn ancestor(&self, depth: usize) -> Option<&ResolutionContext<'a>> {
        let mut ctx = self;
        for _ in 0..depth {
            ctx = ctx.parent?;
        }
        Some(ctx)
    }

    /// 메타데이터
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// 유효한 컨텍스트인지
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    pub(crate) fn into_record(self) -> ActivityRecord {
        self.record
    }
}

impl fmt::Debug for ResolutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("source", &self.source.name())
            .field("parser", &self.parser_name)
            .field("raw", &self.raw)
            .field("field", &self.field)
            .field("has_parent", &self.parent.is_some())
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> (RawData, PreparedData) {
        (RawData::from(s), PreparedData::Text(s.to_owned()))
    }

    #[test]
    fn raw_data_values() {
        assert_eq!(RawData::from("x").to_value(), Some(Value::str("x")));
        assert_eq!(
            RawData::from(vec![1u8, 2]).to_value(),
            Some(Value::Bytes(vec![1, 2]))
        );
        assert_eq!(
            RawData::from(serde_json::json!({"a": 1})).to_text().as_deref(),
            Some(r#"{"a":1}"#)
        );
        assert!(RawData::reader(std::io::Cursor::new("a\nb")).to_value().is_none());
    }

    #[test]
    fn raw_data_from_values() {
        assert!(matches!(RawData::from_value(&Value::str("x")), RawData::Text(s) if s == "x"));
        assert!(matches!(RawData::from_value(&Value::Int(3)), RawData::Text(s) if s == "3"));
        assert!(matches!(
            RawData::from_value(&Value::List(vec![Value::Int(1)])),
            RawData::Json(_)
        ));
        assert!(matches!(
            RawData::from_value(&Value::Map(BTreeMap::new())),
            RawData::Map(_)
        ));
    }

    #[test]
    fn static_source_properties() {
        let source = StaticSource::new("files")
            .with_property("host", "db-1")
            .with_grouping_id("batch-7");
        assert_eq!(source.name(), "files");
        assert_eq!(source.property("host"), Some(Value::str("db-1")));
        assert_eq!(source.property("missing"), None);
        assert_eq!(source.grouping_activity_id().as_deref(), Some("batch-7"));
    }

    #[test]
    fn child_context_links_parent() {
        let source = StaticSource::new("s");
        let (raw, data) = text("outer");
        let mut meta = BTreeMap::new();
        meta.insert("topic".to_owned(), Value::str("orders"));
        let mut parent = ResolutionContext::new(&source, "outer", raw, data, meta);
        parent.record.event_name = Some("parent-event".to_owned());

        let (raw, data) = text("inner");
        let child = parent.child("inner", raw, data);
        assert_eq!(child.parser_name(), "inner");
        assert_eq!(
            child.parent().and_then(|p| p.record().event_name.clone()),
            Some("parent-event".to_owned())
        );
        assert_eq!(child.metadata().get("topic"), Some(&Value::str("orders")));
        assert_eq!(child.ancestor(1).map(|c| c.parser_name()), Some("outer"));
        assert!(child.ancestor(2).is_none());
    }
}
