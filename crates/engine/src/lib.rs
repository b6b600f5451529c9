#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`parser`]: 파싱 오케스트레이터 ([`ActivityParser`]) -- 필드 해석, 동적 확장, 스택 파싱
//! - [`resolver`]: 엔진 변형 훅과 JSON / 정규식 / 맵 구현
//! - [`locator`], [`field`]: 로케이터와 필드 모델, 값 형식 변환
//! - [`graph`]: 필드 의존성 그래프와 위상 정렬
//! - [`context`]: 원시 데이터, 입력 어댑터, 해석 컨텍스트
//! - [`activity`]: 활동 레코드와 필드 적용 규칙
//! - [`cache`]: 활동 간 값 캐시
//! - [`transform`], [`preparser`]: 값 변환/필터, 레코드 필터, 전처리기
//! - [`definition`], [`loader`]: 선언적 파서 정의와 디렉토리 로더, 레지스트리
//! - [`config`]: 파서 속성
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! RawData -> PreParsers -> LocatorResolver::prepare -> fields (dependency order)
//!                                                         |
//!              locator lookup -> transforms -> format -> filters -> ActivityRecord
//!                                                         |
//!                        dynamic fan-out / stacked parsers (merge | relate)
//!                                                         |
//!                       record filters -> tracking id -> ActivityCache
//! ```

pub mod activity;
pub mod cache;
pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod field;
pub mod graph;
pub mod loader;
pub mod locator;
pub mod parser;
pub mod preparser;
pub mod resolver;
pub mod template;
pub mod timestamp;
pub mod transform;

// --- 주요 타입 re-export ---

// 파서
pub use parser::{ActivityParser, ActivityParserBuilder};

// 레코드
pub use activity::{ActivityRecord, ChildRecord};

// 필드와 로케이터
pub use field::{Aggregation, Field, StackedParserRef};
pub use locator::{DataType, Locator, LocatorKind};
pub use timestamp::TimeUnit;

// 해석기
pub use resolver::{JsonResolver, LocatorResolver, MapResolver, RegexResolver, Resolved};

// 컨텍스트
pub use context::{ActivitySource, RawData, ResolutionContext, StaticSource};

// 캐시
pub use cache::{ActivityCache, CacheEntry};

// 변환과 필터
pub use preparser::PreParser;
pub use transform::{
    ActivityFilter, Bindings, ConditionFilter, FnActivityFilter, FnFilter, FnTransform,
    RecordFilter, TransformPhase, ValueFilter, ValueTransform,
};

// 정의와 로더
pub use definition::ParserDefinition;
pub use loader::{DefinitionLoader, ParserRegistry};

// 설정
pub use config::{ActivityDelim, ParserProperties};

// 에러
pub use error::EngineError;
