//! 로케이터 해석기 -- 엔진 변형별 다형성 지점
//!
//! [`LocatorResolver`]는 원시 데이터를 엔진별 형태로 준비하고, 공통 로케이터
//! 종류(속성, 캐시, 활동 참조 등)로 처리되지 않은 로케이터를 해석합니다.
//! 파서 하나는 해석기 하나를 소유하며, 해석기는 여러 워커가 동시에 사용합니다.
//!
//! # 지원 변형
//! - JSON 문서 경로 ([`JsonResolver`])
//! - 정규식 그룹/매치 ([`RegexResolver`])
//! - 이름-값 맵 경로 ([`MapResolver`])
//!
//! # 사용 예시
//! ```ignore
//! use actistream_engine::parser::ActivityParser;
//! use actistream_engine::resolver::JsonResolver;
//!
//! let parser = ActivityParser::builder("orders", Box::new(JsonResolver::new())).build()?;
//! ```

pub mod json;
pub mod map;
pub mod regex;

pub use self::json::JsonResolver;
pub use self::map::MapResolver;
pub use self::regex::{RegexCaptures, RegexResolver};

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use actistream_core::types::Value;

use crate::config::ParserProperties;
use crate::context::{PreparedData, RawData, ResolutionContext};
use crate::error::EngineError;
use crate::field::Field;
use crate::locator::{Locator, LocatorKind};

/// 해석 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    /// 해석된 값
    pub value: Option<Value>,
    /// 이미 타입이 정해져 형식 변환이 필요 없는지
    pub formatted: bool,
}

impl Resolved {
    /// 형식 변환이 필요한 값
    pub fn raw(value: Option<Value>) -> Self {
        Self {
            value,
            formatted: false,
        }
    }

    /// 형식 변환을 건너뛸 값
    pub fn formatted(value: Option<Value>) -> Self {
        Self {
            value,
            formatted: true,
        }
    }
}

/// 로케이터 해석기
pub trait LocatorResolver: Send + Sync + fmt::Debug {
    /// 엔진 변형 이름
    fn name(&self) -> &str;

    /// 이 변형이 해석할 수 없는 로케이터 종류 (필드 등록 시 거부됨)
    fn unsupported_kinds(&self) -> &[LocatorKind] {
        &[]
    }

    /// 원시 데이터를 엔진별 형태로 준비합니다.
    ///
    /// `None`을 반환하면 이 항목에는 파싱할 내용이 없습니다.
    fn prepare(
        &self,
        raw: &RawData,
        props: &ParserProperties,
    ) -> Result<Option<PreparedData>, EngineError>;

    /// 필드 등록 시 변형별 제약을 검사합니다.
    fn validate_field(&self, _field: &Field) -> Result<(), EngineError> {
        Ok(())
    }

    /// 어떤 필드도 메시지를 채우지 않았을 때 쓸 기본 메시지
    fn default_message(&self, _ctx: &ResolutionContext<'_>) -> Option<String> {
        None
    }

    /// 로케이터 하나를 준비된 데이터에서 해석합니다.
    fn resolve(
        &self,
        locator: &Locator,
        ctx: &ResolutionContext<'_>,
        props: &ParserProperties,
    ) -> Result<Resolved, EngineError>;
}

/// 경로 분할 메모이제이션
///
/// 로케이터 문자열별 분할 결과를 공유 맵에 보관합니다.
/// 해석기 하나는 파서 하나에 속하므로 구분자는 고정된 것으로 봅니다.
#[derive(Debug, Default)]
pub struct PathMemo {
    paths: RwLock<HashMap<String, Arc<[String]>>>,
}

impl PathMemo {
    /// 메모를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 경로를 구분자로 나눈 세그먼트를 반환합니다.
    pub fn split(&self, path: &str, delim: &str) -> Arc<[String]> {
        if let Some(segments) = self.paths.read().get(path) {
            return Arc::clone(segments);
        }
        let segments: Arc<[String]> = path
            .split(delim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        self.paths
            .write()
            .entry(path.to_owned())
            .or_insert_with(|| Arc::clone(&segments));
        segments
    }

    /// 메모된 경로 수
    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    /// 비어 있는지
    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }
}

/// 값 트리에서 경로를 따라 값을 찾습니다.
///
/// 맵은 키로, 목록은 숫자 세그먼트로 접근하고, 목록에서 `*`는 목록 전체를 돌려줍니다.
pub(crate) fn value_at_path(root: &Value, path: &[String]) -> Option<Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Map(map) => map.get(segment)?,
            Value::List(_) if segment == "*" => return Some(current.clone()),
            Value::List(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// 이름-값 맵에서 경로를 따라 값을 찾습니다. 빈 경로는 맵 전체입니다.
pub(crate) fn map_value_at_path(map: &BTreeMap<String, Value>, path: &[String]) -> Option<Value> {
    match path.split_first() {
        None => Some(Value::Map(map.clone())),
        Some((first, rest)) => value_at_path(map.get(first)?, rest),
    }
}

/// 텍스트로 다룰 수 있는 원시 데이터를 꺼냅니다.
pub(crate) fn raw_text(raw: &RawData) -> Option<Cow<'_, str>> {
    match raw {
        RawData::Text(s) => Some(Cow::Borrowed(s)),
        RawData::Bytes(b) => Some(String::from_utf8_lossy(b)),
        _ => None,
    }
}

/// 지원하지 않는 원시 데이터 에러
pub(crate) fn unsupported(resolver: &str, raw: &RawData) -> EngineError {
    EngineError::UnsupportedData(format!(
        "{resolver} resolver cannot parse {} data",
        raw.kind_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        path.split('.').map(str::to_owned).collect()
    }

    fn sample_tree() -> Value {
        let mut inner = BTreeMap::new();
        inner.insert(
            "items".to_owned(),
            Value::List(vec![Value::str("a"), Value::str("b")]),
        );
        inner.insert("host".to_owned(), Value::str("web-01"));
        let mut root = BTreeMap::new();
        root.insert("req".to_owned(), Value::Map(inner));
        Value::Map(root)
    }

    #[test]
    fn path_walks_maps_and_lists() {
        let tree = sample_tree();
        assert_eq!(value_at_path(&tree, &segs("req.host")), Some(Value::str("web-01")));
        assert_eq!(value_at_path(&tree, &segs("req.items.1")), Some(Value::str("b")));
        assert_eq!(
            value_at_path(&tree, &segs("req.items.*")),
            Some(Value::List(vec![Value::str("a"), Value::str("b")]))
        );
        assert_eq!(value_at_path(&tree, &segs("req.items.9")), None);
        assert_eq!(value_at_path(&tree, &segs("req.host.deeper")), None);
    }

    #[test]
    fn map_path_starts_at_key() {
        let Value::Map(map) = sample_tree() else {
            unreachable!()
        };
        assert_eq!(
            map_value_at_path(&map, &segs("req.items.0")),
            Some(Value::str("a"))
        );
        assert_eq!(map_value_at_path(&map, &[]), Some(Value::Map(map.clone())));
        assert_eq!(map_value_at_path(&map, &segs("nope")), None);
    }

    #[test]
    fn memo_reuses_splits() {
        let memo = PathMemo::new();
        let a = memo.split("a.b.c", ".");
        let b = memo.split("a.b.c", ".");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&*a, ["a", "b", "c"]);
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn raw_text_for_text_and_bytes() {
        assert_eq!(raw_text(&RawData::from("x")).as_deref(), Some("x"));
        assert_eq!(raw_text(&RawData::from(b"y".to_vec())).as_deref(), Some("y"));
        assert!(raw_text(&RawData::Map(BTreeMap::new())).is_none());
    }
}
