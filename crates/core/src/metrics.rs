//! 메트릭 상수 및 설명 등록
//!
//! 파싱 엔진이 기록하는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더(exporter) 설치는 호스트 애플리케이션의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `actistream_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(actistream_core::metrics::ENGINE_ITEMS_PARSED_TOTAL,
//!     actistream_core::metrics::LABEL_PARSER => "access-log").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 파서 이름 레이블 키
pub const LABEL_PARSER: &str = "parser";

/// 필드 이름 레이블 키
pub const LABEL_FIELD: &str = "field";

/// 변환 단계 레이블 키 (raw, formatted)
pub const LABEL_PHASE: &str = "phase";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 레코드로 변환된 항목 수 (counter, label: parser)
pub const ENGINE_ITEMS_PARSED_TOTAL: &str = "actistream_engine_items_parsed_total";

/// Engine: 필수 값 누락으로 드롭된 항목 수 (counter, labels: parser, field)
pub const ENGINE_ITEMS_DROPPED_TOTAL: &str = "actistream_engine_items_dropped_total";

/// Engine: 레코드 필터로 제외된 항목 수 (counter, label: parser)
pub const ENGINE_ITEMS_FILTERED_TOTAL: &str = "actistream_engine_items_filtered_total";

/// Engine: 파싱 실패 수 (counter, labels: parser, field)
pub const ENGINE_PARSE_FAILURES_TOTAL: &str = "actistream_engine_parse_failures_total";

/// Engine: 값 변환 실패 수 (counter, labels: parser, phase)
pub const ENGINE_TRANSFORM_FAILURES_TOTAL: &str = "actistream_engine_transform_failures_total";

/// Engine: 값/레코드 필터 평가 실패 수 (counter, label: parser)
pub const ENGINE_FILTER_FAILURES_TOTAL: &str = "actistream_engine_filter_failures_total";

/// Engine: 파싱 지연 시간 (histogram, 초, label: parser)
pub const ENGINE_PARSE_DURATION_SECONDS: &str = "actistream_engine_parse_duration_seconds";

// ─── Cache 메트릭 ───────────────────────────────────────────────────

/// Cache: 캐시 기록 수 (counter)
pub const CACHE_WRITES_TOTAL: &str = "actistream_cache_writes_total";

/// Cache: 캐시 조회 적중 수 (counter)
pub const CACHE_HITS_TOTAL: &str = "actistream_cache_hits_total";

/// Cache: 용량 초과로 제거된 엔트리 수 (counter)
pub const CACHE_EVICTIONS_TOTAL: &str = "actistream_cache_evictions_total";

/// Cache: 현재 엔트리 수 (gauge)
pub const CACHE_ENTRIES: &str = "actistream_cache_entries";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 파싱 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 1s 범위
pub const PARSE_DURATION_BUCKETS: [f64; 9] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1, 1.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Engine
    describe_counter!(
        ENGINE_ITEMS_PARSED_TOTAL,
        "Total number of raw items turned into activity records"
    );
    describe_counter!(
        ENGINE_ITEMS_DROPPED_TOTAL,
        "Total number of raw items dropped because a required value was missing"
    );
    describe_counter!(
        ENGINE_ITEMS_FILTERED_TOTAL,
        "Total number of activity records excluded by the record filter"
    );
    describe_counter!(
        ENGINE_PARSE_FAILURES_TOTAL,
        "Total number of field resolution or format failures"
    );
    describe_counter!(
        ENGINE_TRANSFORM_FAILURES_TOTAL,
        "Total number of value transformation failures (value kept)"
    );
    describe_counter!(
        ENGINE_FILTER_FAILURES_TOTAL,
        "Total number of filter evaluation failures (decision unchanged)"
    );
    describe_histogram!(
        ENGINE_PARSE_DURATION_SECONDS,
        "Time to parse a single raw item in seconds"
    );

    // Cache
    describe_counter!(CACHE_WRITES_TOTAL, "Total number of cross-activity cache writes");
    describe_counter!(CACHE_HITS_TOTAL, "Total number of cross-activity cache hits");
    describe_counter!(
        CACHE_EVICTIONS_TOTAL,
        "Total number of cache entries evicted due to capacity"
    );
    describe_gauge!(CACHE_ENTRIES, "Current number of cross-activity cache entries");
}
