//! 활동 간 값 캐시
//!
//! [`ActivityCache`]는 파싱이 끝난 레코드의 값을 저장해, 이후 항목의
//! `Cache` 로케이터가 읽을 수 있게 합니다. 여러 파서와 워커가 공유하며
//! 내부적으로 잠금을 가집니다.
//!
//! # 엔트리
//! 각 [`CacheEntry`]는 키 템플릿과 값 템플릿을 가집니다. 템플릿의 `${Name}`은
//! 레코드의 필드 값으로 치환됩니다. 값 템플릿이 플레이스홀더 하나뿐이면
//! 필드 값을 타입 그대로 저장합니다.
//!
//! # 용량 정책
//! 엔트리 수가 `max_entries`를 넘으면 가장 오래 전에 추가된 키부터 제거합니다.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use actistream_core::metrics as m;
use actistream_core::types::Value;

use crate::activity::ActivityRecord;
use crate::template;

/// 캐시 엔트리 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 엔트리 id (Cache 로케이터의 위치 문자열)
    pub id: String,
    /// 키 템플릿
    pub key: String,
    /// 값 템플릿
    pub value: String,
    /// 이 엔트리를 사용하는 파서 (없으면 모든 파서)
    #[serde(default)]
    pub parser: Option<String>,
}

impl CacheEntry {
    /// 엔트리를 생성합니다.
    pub fn new(id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            value: value.into(),
            parser: None,
        }
    }

    /// 특정 파서로 한정합니다.
    pub fn for_parser(mut self, parser: impl Into<String>) -> Self {
        self.parser = Some(parser.into());
        self
    }

    fn applies_to(&self, parser: &str) -> bool {
        self.parser.as_deref().is_none_or(|p| p == parser)
    }

    fn key_for(&self, record: &ActivityRecord) -> Option<String> {
        let (key, resolved) = template::fill(&self.key, |name| {
            record.field_value(name).map(|v| v.to_string())
        });
        resolved.then_some(key)
    }

    fn value_for(&self, record: &ActivityRecord) -> Option<Value> {
        if let Some(name) = template::sole_var(&self.value) {
            return record.field_value(name);
        }
        let (value, resolved) = template::fill(&self.value, |name| {
            record.field_value(name).map(|v| v.to_string())
        });
        resolved.then_some(Value::Str(value))
    }
}

#[derive(Debug, Default)]
struct CacheStore {
    values: HashMap<String, Value>,
    order: VecDeque<String>,
}

/// 활동 간 값 캐시
#[derive(Debug)]
pub struct ActivityCache {
    entries: Vec<CacheEntry>,
    max_entries: usize,
    store: RwLock<CacheStore>,
}

impl ActivityCache {
    /// 최대 엔트리 수를 지정해 캐시를 생성합니다.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
            store: RwLock::new(CacheStore::default()),
        }
    }

    /// 엔트리 정의를 추가합니다.
    pub fn with_entry(mut self, entry: CacheEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// 엔트리 정의들
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// 최대 엔트리 수
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// 저장된 키 수
    pub fn len(&self) -> usize {
        self.store.read().values.len()
    }

    /// 비어 있는지
    pub fn is_empty(&self) -> bool {
        self.store.read().values.is_empty()
    }

    /// 키로 값을 직접 조회합니다.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.read().values.get(key).cloned()
    }

    /// 키에 값을 직접 저장합니다. 용량을 넘으면 가장 오래된 키를 제거합니다.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut store = self.store.write();
        if store.values.insert(key.clone(), value).is_none() {
            store.order.push_back(key);
        }
        while store.order.len() > self.max_entries {
            if let Some(oldest) = store.order.pop_front() {
                store.values.remove(&oldest);
                metrics::counter!(m::CACHE_EVICTIONS_TOTAL).increment(1);
                debug!(key = %oldest, capacity = self.max_entries, "cache full, evicted oldest entry");
            }
        }
        metrics::gauge!(m::CACHE_ENTRIES).set(store.values.len() as f64);
    }

    /// 모든 값을 제거합니다.
    pub fn clear(&self) {
        let mut store = self.store.write();
        store.values.clear();
        store.order.clear();
        metrics::gauge!(m::CACHE_ENTRIES).set(0.0);
    }

    /// 완성된 레코드의 값을 캐시에 저장합니다.
    ///
    /// `parser`에 적용되는 엔트리마다 키와 값을 레코드에서 만들고,
    /// 키나 값을 만들 수 없는 엔트리는 건너뜁니다. 저장한 엔트리 수를 반환합니다.
    pub fn cache_values(&self, record: &ActivityRecord, parser: &str) -> usize {
        let mut written = 0;
        for entry in self.entries.iter().filter(|e| e.applies_to(parser)) {
            let (Some(key), Some(value)) = (entry.key_for(record), entry.value_for(record)) else {
                trace!(entry = %entry.id, parser, "cache entry not resolvable from record");
                continue;
            };
            trace!(entry = %entry.id, key = %key, "caching value");
            self.put(key, value);
            written += 1;
        }
        if written > 0 {
            metrics::counter!(m::CACHE_WRITES_TOTAL, m::LABEL_PARSER => parser.to_owned())
                .increment(written as u64);
        }
        written
    }

    /// `Cache` 로케이터 값을 조회합니다.
    ///
    /// 엔트리 `id`의 키 템플릿을 진행 중인 레코드로 채워 저장된 값을 찾습니다.
    pub fn get_value(&self, record: &ActivityRecord, id: &str, parser: &str) -> Option<Value> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id && e.applies_to(parser))?;
        let key = entry.key_for(record)?;
        let value = self.get(&key);
        if value.is_some() {
            metrics::counter!(m::CACHE_HITS_TOTAL, m::LABEL_PARSER => parser.to_owned())
                .increment(1);
        }
        value
    }
}

impl Default for ActivityCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}
