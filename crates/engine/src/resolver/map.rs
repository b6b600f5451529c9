//! 이름-값 맵 해석기
//!
//! 구조화된 키/값 입력을 복합 구분자로 나눈 경로로 탐색합니다.
//! JSON 객체 입력은 맵으로 변환해 같은 방식으로 다룹니다.

use std::collections::BTreeMap;

use actistream_core::types::Value;

use crate::config::ParserProperties;
use crate::context::{PreparedData, RawData, ResolutionContext};
use crate::error::EngineError;
use crate::locator::{Locator, LocatorKind};

use super::{LocatorResolver, PathMemo, Resolved, map_value_at_path, unsupported};

const UNSUPPORTED: [LocatorKind; 3] = [
    LocatorKind::RegexGroupNum,
    LocatorKind::RegexMatchNum,
    LocatorKind::RegexGroupName,
];

/// 이름-값 맵 해석기
#[derive(Debug, Default)]
pub struct MapResolver {
    memo: PathMemo,
}

impl MapResolver {
    /// 해석기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocatorResolver for MapResolver {
    fn name(&self) -> &str {
        "map"
    }

    fn unsupported_kinds(&self) -> &[LocatorKind] {
        &UNSUPPORTED
    }

    fn prepare(
        &self,
        raw: &RawData,
        _props: &ParserProperties,
    ) -> Result<Option<PreparedData>, EngineError> {
        let map = match raw {
            RawData::Map(map) => map.clone(),
            RawData::Json(doc) => match Value::from_json(doc) {
                Some(Value::Map(map)) => map,
                _ => return Err(unsupported(self.name(), raw)),
            },
            _ => return Err(unsupported(self.name(), raw)),
        };
        Ok((!map.is_empty()).then_some(PreparedData::Map(map)))
    }

    fn resolve(
        &self,
        locator: &Locator,
        ctx: &ResolutionContext<'_>,
        props: &ParserProperties,
    ) -> Result<Resolved, EngineError> {
        let PreparedData::Map(map) = ctx.data() else {
            return Ok(Resolved::raw(None));
        };
        let value = match locator.kind() {
            // 1부터 시작하는 키 순서 위치
            LocatorKind::Index => locator
                .locator()
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| map.values().nth(i).cloned()),
            _ => lookup(map, locator.locator(), &props.composite_delim, &self.memo),
        };
        Ok(Resolved::raw(value))
    }
}

fn lookup(
    map: &BTreeMap<String, Value>,
    path: &str,
    delim: &str,
    memo: &PathMemo,
) -> Option<Value> {
    // 구분자를 포함한 키가 그대로 있으면 우선합니다.
    if let Some(value) = map.get(path) {
        return Some(value.clone());
    }
    map_value_at_path(map, &memo.split(path, delim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticSource;

    fn sample_map() -> BTreeMap<String, Value> {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_owned(), Value::str("api.local"));
        let mut map = BTreeMap::new();
        map.insert("method".to_owned(), Value::str("GET"));
        map.insert("headers".to_owned(), Value::Map(headers));
        map.insert("a.b".to_owned(), Value::Int(1));
        map
    }

    fn resolve_with(locator: Locator, props: &ParserProperties) -> Option<Value> {
        let resolver = MapResolver::new();
        let raw = RawData::Map(sample_map());
        let data = resolver.prepare(&raw, props).unwrap().unwrap();
        let source = StaticSource::new("test");
        let ctx = ResolutionContext::new(&source, "map", raw, data, BTreeMap::new());
        resolver.resolve(&locator, &ctx, props).unwrap().value
    }

    #[test]
    fn resolves_paths() {
        let props = ParserProperties::default();
        assert_eq!(
            resolve_with(Locator::label("method"), &props),
            Some(Value::str("GET"))
        );
        assert_eq!(
            resolve_with(Locator::label("headers.host"), &props),
            Some(Value::str("api.local"))
        );
        assert_eq!(resolve_with(Locator::label("a.b"), &props), Some(Value::Int(1)));
        assert_eq!(resolve_with(Locator::label("headers.agent"), &props), None);
    }

    #[test]
    fn custom_composite_delimiter() {
        let props = ParserProperties {
            composite_delim: "/".to_owned(),
            ..ParserProperties::default()
        };
        assert_eq!(
            resolve_with(Locator::label("headers/host"), &props),
            Some(Value::str("api.local"))
        );
    }

    #[test]
    fn index_is_key_position() {
        let props = ParserProperties::default();
        // 키 순서: a.b, headers, method
        assert_eq!(
            resolve_with(Locator::new(LocatorKind::Index, "3"), &props),
            Some(Value::str("GET"))
        );
        assert_eq!(resolve_with(Locator::new(LocatorKind::Index, "0"), &props), None);
    }

    #[test]
    fn json_objects_are_accepted() {
        let resolver = MapResolver::new();
        let props = ParserProperties::default();
        let raw = RawData::Json(serde_json::json!({"k": "v"}));
        assert!(matches!(
            resolver.prepare(&raw, &props).unwrap(),
            Some(PreparedData::Map(_))
        ));
        let raw = RawData::from("text");
        assert!(matches!(
            resolver.prepare(&raw, &props),
            Err(EngineError::UnsupportedData(_))
        ));
    }
}
