//! 엔진 에러 타입
//!
//! [`EngineError`]는 파서 구성(필드 등록, 의존성 그래프)과 항목별 파싱에서
//! 발생하는 모든 에러를 표현합니다. `From<EngineError> for ActistreamError`
//! 변환이 구현되어 있어 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use actistream_core::error::{ActistreamError, ConfigError, ParseError};

/// 파싱 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 같은 이름의 필드가 이미 등록됨
    #[error("duplicate field: {field}")]
    DuplicateField {
        /// 중복된 필드 이름
        field: String,
    },

    /// 해석할 수 없는 필드 참조
    #[error("unknown field reference: field '{field}' references '{reference}'")]
    UnknownReference {
        /// 참조를 가진 필드
        field: String,
        /// 찾을 수 없는 참조 이름
        reference: String,
    },

    /// 필드 의존성 순환
    #[error("cyclic field dependency involving '{field}'")]
    CyclicDependency {
        /// 순환 위에 있는 필드
        field: String,
    },

    /// 엔진 변형이 지원하지 않는 로케이터 종류
    #[error("unsupported locator kind '{kind}' in field '{field}'")]
    UnsupportedLocator {
        /// 필드 이름
        field: String,
        /// 로케이터 종류
        kind: String,
    },

    /// 서로 충돌하는 로케이터 매핑
    #[error("conflicting locator mapping in field '{field}': {reason}")]
    ConflictingMapping {
        /// 필드 이름
        field: String,
        /// 충돌 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 항목
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 파서 정의 파일 에러
    #[error("definition error: {path}: {reason}")]
    Definition {
        /// 정의 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 필수 로케이터 값 누락 (항목 드롭)
    #[error("required value missing for field '{field}' (locator '{locator}')")]
    MissingValue {
        /// 필드 이름
        field: String,
        /// 로케이터
        locator: String,
    },

    /// 값 형식 변환 실패
    #[error("format error: locator '{locator}': {reason}")]
    Format {
        /// 로케이터
        locator: String,
        /// 실패 사유
        reason: String,
    },

    /// 필드 파싱 실패
    #[error("failed to parse field '{field}': {reason}")]
    ParseFailed {
        /// 필드 이름
        field: String,
        /// 실패 사유
        reason: String,
    },

    /// 값 변환(transform) 실패
    #[error("transform '{name}' failed: {reason}")]
    Transform {
        /// 변환 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 필터 평가 실패
    #[error("filter '{name}' failed: {reason}")]
    Filter {
        /// 필터 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 엔진 변형이 처리할 수 없는 원시 데이터
    #[error("unsupported activity data: {0}")]
    UnsupportedData(String),

    /// 전처리기 실패
    #[error("pre-parser '{name}' failed: {reason}")]
    PreParse {
        /// 전처리기 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON 파싱 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// 파서 구성 단계의 에러인지 확인합니다.
    ///
    /// 구성 에러는 파서 시작을 실패시키며 재시도하지 않습니다.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateField { .. }
                | Self::UnknownReference { .. }
                | Self::CyclicDependency { .. }
                | Self::UnsupportedLocator { .. }
                | Self::ConflictingMapping { .. }
                | Self::Config { .. }
                | Self::Definition { .. }
        )
    }

    /// 필드 이름을 붙여 파싱 실패로 감쌉니다.
    ///
    /// 필수 값 누락과 구성 에러, 이미 필드가 붙은 실패는 그대로 둡니다.
    pub(crate) fn for_field(self, field: &str) -> Self {
        match self {
            Self::MissingValue { .. } | Self::ParseFailed { .. } => self,
            err if err.is_configuration() => err,
            err => Self::ParseFailed {
                field: field.to_owned(),
                reason: err.to_string(),
            },
        }
    }
}

impl From<EngineError> for ActistreamError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::MissingValue { field, locator } => {
                ActistreamError::Parse(ParseError::MissingValue { field, locator })
            }
            EngineError::Io(e) => ActistreamError::Io(e),
            err if err.is_configuration() => ActistreamError::Config(ConfigError::InvalidValue {
                field: "engine".to_owned(),
                reason: err.to_string(),
            }),
            EngineError::ParseFailed { field, reason } => {
                ActistreamError::Parse(ParseError::Failed { field, reason })
            }
            EngineError::UnsupportedData(what) => {
                ActistreamError::Parse(ParseError::UnsupportedData(what))
            }
            err => ActistreamError::Parse(ParseError::Failed {
                field: String::new(),
                reason: err.to_string(),
            }),
        }
    }
}
