//! JSON 문서 해석기
//!
//! 로케이터 위치 문자열을 복합 구분자(기본 `.`)로 나눈 경로로 JSON 문서를 탐색합니다.
//! 숫자 세그먼트는 배열 인덱스(0부터), 배열 위치의 `*`는 배열 전체를 뜻합니다.
//! 선택적인 `$.` 접두어는 무시합니다.
//!
//! # 사용 예시
//! ```ignore
//! // {"request": {"headers": [{"name": "host"}]}}
//! Locator::label("request.headers.0.name") // -> "host"
//! ```

use tracing::trace;

use actistream_core::types::Value;

use crate::config::ParserProperties;
use crate::context::{PreparedData, RawData, ResolutionContext};
use crate::error::EngineError;
use crate::locator::{Locator, LocatorKind};

use super::{LocatorResolver, PathMemo, Resolved, raw_text, unsupported};

/// JSON 경로 루트 접두어
const JSON_PATH_ROOT: &str = "$";

const UNSUPPORTED: [LocatorKind; 4] = [
    LocatorKind::Index,
    LocatorKind::RegexGroupNum,
    LocatorKind::RegexMatchNum,
    LocatorKind::RegexGroupName,
];

/// JSON 문서 해석기
#[derive(Debug, Default)]
pub struct JsonResolver {
    memo: PathMemo,
}

impl JsonResolver {
    /// 해석기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup<'v>(
        doc: &'v serde_json::Value,
        path: &[String],
    ) -> Option<&'v serde_json::Value> {
        let mut current = doc;
        for segment in path {
            current = match current {
                serde_json::Value::Object(obj) => obj.get(segment)?,
                serde_json::Value::Array(_) if segment == "*" => return Some(current),
                serde_json::Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl LocatorResolver for JsonResolver {
    fn name(&self) -> &str {
        "json"
    }

    fn unsupported_kinds(&self) -> &[LocatorKind] {
        &UNSUPPORTED
    }

    fn prepare(
        &self,
        raw: &RawData,
        _props: &ParserProperties,
    ) -> Result<Option<PreparedData>, EngineError> {
        match raw {
            RawData::Json(doc) => Ok(Some(PreparedData::Json(doc.clone()))),
            RawData::Map(map) => Ok(Some(PreparedData::Json(Value::Map(map.clone()).to_json()))),
            RawData::Text(_) | RawData::Bytes(_) => {
                let text = raw_text(raw).unwrap_or_default();
                if text.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(PreparedData::Json(serde_json::from_str(&text)?)))
            }
            RawData::Reader(_) => Err(unsupported(self.name(), raw)),
        }
    }

    fn resolve(
        &self,
        locator: &Locator,
        ctx: &ResolutionContext<'_>,
        props: &ParserProperties,
    ) -> Result<Resolved, EngineError> {
        let PreparedData::Json(doc) = ctx.data() else {
            return Ok(Resolved::raw(None));
        };
        let path = locator.locator();
        let path = path
            .strip_prefix(JSON_PATH_ROOT)
            .map(|p| p.strip_prefix(props.composite_delim.as_str()).unwrap_or(p))
            .unwrap_or(path);
        let segments = self.memo.split(path, &props.composite_delim);
        let value = Self::lookup(doc, &segments).and_then(Value::from_json);
        trace!(path, found = value.is_some(), "json path resolved");
        Ok(Resolved::raw(value))
    }
}
