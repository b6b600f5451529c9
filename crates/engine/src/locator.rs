//! 로케이터 -- 원시 데이터 안의 값 하나를 가리키는 규칙
//!
//! 로케이터는 종류([`LocatorKind`])와 위치 문자열, 값 데이터 타입([`DataType`]),
//! 형식/단위/값 맵, 필수 여부, 빈 값 처리, 부착된 변환과 필터로 구성됩니다.
//! 종류는 생성 시 고정되며 이후 변경할 수 없습니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use actistream_core::types::Value;

use crate::error::EngineError;
use crate::template;
use crate::timestamp::{TimeUnit, TimestampFormatter};
use crate::transform::{TransformPhase, ValueFilter, ValueTransform};

/// 값 맵의 catch-all 키
pub const VALUE_MAP_CATCH_ALL: &str = "*";

/// 전체 원시 데이터 플레이스홀더
pub const DATA_PLACEHOLDER: &str = "$DATA$";

/// 전체 메타데이터 플레이스홀더
pub const METADATA_PLACEHOLDER: &str = "$METADATA$";

/// 로케이터 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorKind {
    /// 이름/경로 (엔진 변형이 해석)
    #[default]
    Label,
    /// 숫자 인덱스 (1부터)
    Index,
    /// 정규식 캡처 그룹 번호
    RegexGroupNum,
    /// 정규식 매치 번호 (1부터)
    RegexMatchNum,
    /// 정규식 이름 있는 그룹
    RegexGroupName,
    /// 입력 어댑터(스트림) 속성
    StreamProp,
    /// 파서 속성
    ParserProp,
    /// 프로세스 속성
    SystemProp,
    /// 환경변수
    EnvVariable,
    /// 활동 간 캐시 엔트리
    Cache,
    /// 같은 레코드 또는 부모 레코드(`^.`)의 필드 값
    Activity,
    /// 리터럴 표현식 (`${Name}` 플레이스홀더 치환)
    Expression,
    /// 전체 원시 데이터
    Data,
    /// 전체 메타데이터 또는 메타데이터 하위 경로
    Metadata,
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 로케이터 값 데이터 타입
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 문자열 (기본값)
    #[default]
    String,
    /// 숫자 (`format`: int | long | double | float)
    Number,
    /// 바이너리 (`format`: base64 | hexBinary | string)
    Binary,
    /// 날짜/시간 (`format`: strftime 패턴)
    DateTime,
    /// epoch 숫자 타임스탬프 (`units`)
    Timestamp,
    /// 숫자로 해석 가능하면 숫자, 아니면 문자열
    Generic,
    /// 변환하지 않음
    AsInput,
}

/// 로케이터
#[derive(Debug, Clone)]
pub struct Locator {
    kind: LocatorKind,
    locator: String,
    data_type: DataType,
    format: Option<String>,
    units: Option<TimeUnit>,
    value_map: HashMap<String, String>,
    required: Option<bool>,
    empty_as_null: bool,
    transforms: Vec<Arc<dyn ValueTransform>>,
    filters: Vec<Arc<dyn ValueFilter>>,
    formatter: TimestampFormatter,
}

impl Locator {
    /// 로케이터를 생성합니다.
    pub fn new(kind: LocatorKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            data_type: DataType::default(),
            format: None,
            units: None,
            value_map: HashMap::new(),
            required: None,
            empty_as_null: true,
            transforms: Vec::new(),
            filters: Vec::new(),
            formatter: TimestampFormatter::default(),
        }
    }

    /// 이름/경로 로케이터
    pub fn label(locator: impl Into<String>) -> Self {
        Self::new(LocatorKind::Label, locator)
    }

    /// 다른 필드를 참조하는 로케이터
    pub fn activity(field: impl Into<String>) -> Self {
        Self::new(LocatorKind::Activity, field)
    }

    /// 리터럴 표현식 로케이터
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::new(LocatorKind::Expression, expr)
    }

    /// 데이터 타입을 지정합니다.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// 형식(패턴)을 지정합니다.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self.rebuild_formatter();
        self
    }

    /// 시간 단위를 지정합니다.
    pub fn with_units(mut self, units: TimeUnit) -> Self {
        self.units = Some(units);
        self.rebuild_formatter();
        self
    }

    /// 값 맵 항목을 추가합니다. 키 `*`는 catch-all입니다.
    pub fn with_mapping(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.value_map.insert(source.into(), target.into());
        self
    }

    /// 필수 여부를 명시합니다. 명시하지 않으면 파서/필드 기본값을 따릅니다.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// 빈 값을 null로 취급할지 지정합니다 (기본값 `true`).
    pub fn with_empty_as_null(mut self, empty_as_null: bool) -> Self {
        self.empty_as_null = empty_as_null;
        self
    }

    /// 값 변환을 부착합니다.
    pub fn with_transform(mut self, transform: Arc<dyn ValueTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// 값 필터를 부착합니다.
    pub fn with_filter(mut self, filter: Arc<dyn ValueFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    fn rebuild_formatter(&mut self) {
        self.formatter = TimestampFormatter::new(self.format.clone(), self.units);
    }

    /// 로케이터 종류
    pub fn kind(&self) -> LocatorKind {
        self.kind
    }

    /// 위치 문자열
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// 데이터 타입
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// 형식(패턴)
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// 시간 단위
    pub fn units(&self) -> Option<TimeUnit> {
        self.units
    }

    /// 타임스탬프 변환기
    pub fn formatter(&self) -> &TimestampFormatter {
        &self.formatter
    }

    /// 빈 값을 null로 취급하는지
    pub fn empty_as_null(&self) -> bool {
        self.empty_as_null
    }

    /// 필수 여부. 명시되지 않았으면 `default`를 따릅니다.
    pub fn is_required(&self, default: bool) -> bool {
        self.required.unwrap_or(default)
    }

    /// 지정된 단계의 변환들
    pub fn transforms(&self, phase: TransformPhase) -> impl Iterator<Item = &Arc<dyn ValueTransform>> {
        self.transforms.iter().filter(move |t| t.phase() == phase)
    }

    /// 부착된 필터들
    pub fn filters(&self) -> &[Arc<dyn ValueFilter>] {
        &self.filters
    }

    /// 위치 문자열의 `${id}` 플레이스홀더를 치환한 복제본을 만듭니다.
    pub(crate) fn with_filled_locator(&self, lookup: impl FnMut(&str) -> Option<String>) -> Self {
        let mut loc = self.clone();
        loc.locator = template::fill(&self.locator, lookup).0;
        loc
    }

    /// 이 로케이터가 참조하는 다른 필드 이름
    ///
    /// Activity 로케이터의 대상, Expression의 `${Name}` 플레이스홀더,
    /// 부착된 변환/필터가 선언한 참조를 모읍니다.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut refs = match self.kind {
            LocatorKind::Activity => vec![self.locator.clone()],
            LocatorKind::Expression => template::vars(&self.locator),
            _ => Vec::new(),
        };
        for t in &self.transforms {
            refs.extend(t.referenced_fields());
        }
        for f in &self.filters {
            refs.extend(f.referenced_fields());
        }
        refs
    }

    /// 원시 값을 값 맵으로 변환합니다.
    fn map_value(&self, value: Value) -> Value {
        if self.value_map.is_empty() {
            return value;
        }
        let key = value.to_string();
        match self
            .value_map
            .get(&key)
            .or_else(|| self.value_map.get(VALUE_MAP_CATCH_ALL))
        {
            Some(mapped) => Value::Str(mapped.clone()),
            None => value,
        }
    }

    /// 값을 이 로케이터의 데이터 타입으로 변환합니다.
    ///
    /// 값 맵이 먼저 적용되고, 목록과 맵 값은 원소별로 변환됩니다.
    pub fn format_value(&self, value: Value) -> Result<Value, EngineError> {
        match value {
            Value::List(items) => items
                .into_iter()
                .map(|v| self.format_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| self.format_value(v).map(|v| (k, v)))
                .collect::<Result<_, _>>()
                .map(Value::Map),
            value => {
                let value = self.map_value(value);
                self.coerce(value)
            }
        }
    }

    fn coerce(&self, value: Value) -> Result<Value, EngineError> {
        match self.data_type {
            DataType::AsInput => Ok(value),
            DataType::String => Ok(self.to_string_value(value)),
            DataType::Number => self.to_number(value),
            DataType::Binary => self.to_binary(value),
            DataType::DateTime | DataType::Timestamp => self
                .formatter
                .parse(&value)
                .map(Value::Timestamp)
                .map_err(|reason| self.format_error(reason)),
            DataType::Generic => Ok(match value {
                Value::Str(s) => {
                    let trimmed = s.trim();
                    if let Ok(i) = trimmed.parse::<i64>() {
                        Value::Int(i)
                    } else if let Ok(f) = trimmed.parse::<f64>() {
                        Value::Float(f)
                    } else {
                        Value::Str(s)
                    }
                }
                other => other,
            }),
        }
    }

    fn to_string_value(&self, value: Value) -> Value {
        match value {
            Value::Str(_) => value,
            Value::Bytes(b) => Value::Str(match self.format.as_deref() {
                Some("base64") => base64::engine::general_purpose::STANDARD.encode(&b),
                Some("hexBinary") | Some("hex") => hex::encode(&b),
                _ => String::from_utf8_lossy(&b).into_owned(),
            }),
            Value::Timestamp(ts) => Value::Str(self.formatter.format(&ts)),
            other => Value::Str(other.to_string()),
        }
    }

    fn to_number(&self, value: Value) -> Result<Value, EngineError> {
        let wants_int = match self.format.as_deref().map(str::to_lowercase).as_deref() {
            Some("int" | "integer" | "long" | "short" | "byte") => Some(true),
            Some("double" | "float" | "decimal") => Some(false),
            _ => None,
        };
        let number = match &value {
            Value::Int(_) | Value::Float(_) => value.clone(),
            Value::Bool(b) => Value::Int(i64::from(*b)),
            Value::Timestamp(ts) => Value::Int(ts.as_micros()),
            Value::Str(s) => {
                let trimmed = s.trim();
                match trimmed.parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => trimmed.parse::<f64>().map(Value::Float).map_err(|_| {
                        self.format_error(format!("'{trimmed}' is not a number"))
                    })?,
                }
            }
            other => return Err(self.format_error(format!("'{other}' is not a number"))),
        };
        match (wants_int, number) {
            (Some(true), Value::Float(f)) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            (Some(true), Value::Float(f)) => {
                Err(self.format_error(format!("'{f}' is not an integer")))
            }
            (Some(false), Value::Int(i)) => Ok(Value::Float(i as f64)),
            (_, number) => Ok(number),
        }
    }

    fn to_binary(&self, value: Value) -> Result<Value, EngineError> {
        let text = match value {
            Value::Bytes(_) => return Ok(value),
            Value::Str(s) => s,
            other => other.to_string(),
        };
        match self.format.as_deref() {
            Some("base64") => base64::engine::general_purpose::STANDARD
                .decode(text.trim())
                .map(Value::Bytes)
                .map_err(|e| self.format_error(format!("invalid base64: {e}"))),
            Some("hexBinary") | Some("hex") => hex::decode(text.trim())
                .map(Value::Bytes)
                .map_err(|e| self.format_error(format!("invalid hex: {e}"))),
            _ => Ok(Value::Bytes(text.into_bytes())),
        }
    }

    fn format_error(&self, reason: String) -> EngineError {
        EngineError::Format {
            locator: self.locator.clone(),
            reason,
        }
    }

    /// `$DATA$` 플레이스홀더인지 확인합니다.
    pub(crate) fn is_data_placeholder(&self) -> bool {
        self.kind == LocatorKind::Data || self.locator == DATA_PLACEHOLDER
    }

    /// 메타데이터 플레이스홀더라면 하위 경로를 반환합니다 (전체면 빈 문자열).
    pub(crate) fn metadata_path<'a>(&'a self, delim: &str) -> Option<&'a str> {
        if self.kind == LocatorKind::Metadata {
            return Some(&self.locator);
        }
        let rest = self.locator.strip_prefix(METADATA_PLACEHOLDER)?;
        if rest.is_empty() {
            Some("")
        } else {
            rest.strip_prefix(delim)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::FnTransform;

    #[test]
    fn string_type_stringifies() {
        let loc = Locator::label("x");
        assert_eq!(loc.format_value(Value::Int(7)).unwrap(), Value::str("7"));
        assert_eq!(
            loc.format_value(Value::Bytes(b"hi".to_vec())).unwrap(),
            Value::str("hi")
        );
    }

    #[test]
    fn number_type_with_format() {
        let loc = Locator::label("n").with_data_type(DataType::Number);
        assert_eq!(loc.format_value(Value::str(" 42 ")).unwrap(), Value::Int(42));
        assert_eq!(loc.format_value(Value::str("4.5")).unwrap(), Value::Float(4.5));

        let dbl = Locator::label("n")
            .with_data_type(DataType::Number)
            .with_format("double");
        assert_eq!(dbl.format_value(Value::Int(3)).unwrap(), Value::Float(3.0));

        let int = Locator::label("n")
            .with_data_type(DataType::Number)
            .with_format("int");
        assert!(int.format_value(Value::str("2.5")).is_err());
    }

    #[test]
    fn number_type_rejects_text() {
        let loc = Locator::label("n").with_data_type(DataType::Number);
        let err = loc.format_value(Value::str("abc")).unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn value_map_exact_and_catch_all() {
        let loc = Locator::label("lvl")
            .with_mapping("E", "ERROR")
            .with_mapping("W", "WARNING");
        assert_eq!(loc.format_value(Value::str("E")).unwrap(), Value::str("ERROR"));
        assert_eq!(loc.format_value(Value::str("e")).unwrap(), Value::str("e"));

        let loc = loc.with_mapping(VALUE_MAP_CATCH_ALL, "INFO");
        assert_eq!(loc.format_value(Value::str("X")).unwrap(), Value::str("INFO"));
    }

    #[test]
    fn value_map_before_coercion() {
        let loc = Locator::label("code")
            .with_data_type(DataType::Number)
            .with_mapping("OK", "0");
        assert_eq!(loc.format_value(Value::str("OK")).unwrap(), Value::Int(0));
    }

    #[test]
    fn binary_formats() {
        let b64 = Locator::label("b")
            .with_data_type(DataType::Binary)
            .with_format("base64");
        assert_eq!(
            b64.format_value(Value::str("aGk=")).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );

        let hex = Locator::label("b")
            .with_data_type(DataType::Binary)
            .with_format("hexBinary");
        assert_eq!(
            hex.format_value(Value::str("6869")).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
        assert!(hex.format_value(Value::str("zz")).is_err());

        let enc = Locator::label("b").with_format("base64");
        assert_eq!(
            enc.format_value(Value::Bytes(b"hi".to_vec())).unwrap(),
            Value::str("aGk=")
        );
    }

    #[test]
    fn datetime_with_pattern_and_units() {
        let loc = Locator::label("ts")
            .with_data_type(DataType::DateTime)
            .with_format("%d/%m/%Y %H:%M:%S");
        let v = loc.format_value(Value::str("01/01/1970 00:01:00")).unwrap();
        assert_eq!(v, Value::Timestamp(actistream_core::UsecTimestamp::from_micros(60_000_000)));

        let loc = Locator::label("ts")
            .with_data_type(DataType::Timestamp)
            .with_units(TimeUnit::Seconds);
        let v = loc.format_value(Value::Int(2)).unwrap();
        assert_eq!(v, Value::Timestamp(actistream_core::UsecTimestamp::from_micros(2_000_000)));
    }

    #[test]
    fn list_values_format_per_element() {
        let loc = Locator::label("n").with_data_type(DataType::Number);
        assert_eq!(
            loc.format_value(Value::List(vec![Value::str("1"), Value::str("2")]))
                .unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn generic_type_guesses_numbers() {
        let loc = Locator::label("g").with_data_type(DataType::Generic);
        assert_eq!(loc.format_value(Value::str("12")).unwrap(), Value::Int(12));
        assert_eq!(loc.format_value(Value::str("ab")).unwrap(), Value::str("ab"));
    }

    #[test]
    fn referenced_fields_by_kind() {
        assert_eq!(Locator::activity("Body").referenced_fields(), vec!["Body"]);
        assert_eq!(
            Locator::expression("${A}-${B}").referenced_fields(),
            vec!["A", "B"]
        );
        assert!(Locator::label("${A}").referenced_fields().is_empty());

        let loc = Locator::label("x").with_transform(Arc::new(
            FnTransform::new("t", |v, _| Ok(v)).references(["Other"]),
        ));
        assert_eq!(loc.referenced_fields(), vec!["Other"]);
    }

    #[test]
    fn required_follows_default_unless_explicit() {
        assert!(!Locator::label("a").is_required(false));
        assert!(Locator::label("a").is_required(true));
        assert!(!Locator::label("a").with_required(false).is_required(true));
    }

    #[test]
    fn metadata_placeholder_paths() {
        assert_eq!(Locator::label("$METADATA$").metadata_path("."), Some(""));
        assert_eq!(
            Locator::label("$METADATA$.topic").metadata_path("."),
            Some("topic")
        );
        assert_eq!(Locator::label("topic").metadata_path("."), None);
        assert!(Locator::label("$DATA$").is_data_placeholder());
    }

    #[test]
    fn kind_deserializes_from_name() {
        let kind: LocatorKind = serde_yaml::from_str("RegexGroupName").unwrap();
        assert_eq!(kind, LocatorKind::RegexGroupName);
    }
}
