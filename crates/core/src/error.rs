//! 에러 타입 -- 도메인별 에러 정의

/// actistream 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ActistreamError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 필드 값 해석 실패
    #[error("failed to parse field '{field}': {reason}")]
    Failed {
        /// 실패한 필드 이름
        field: String,
        /// 실패 사유
        reason: String,
    },

    /// 필수 로케이터 값 누락
    #[error("required value missing for field '{field}' (locator '{locator}')")]
    MissingValue {
        /// 필드 이름
        field: String,
        /// 값을 해석하지 못한 로케이터
        locator: String,
    },

    /// 지원하지 않는 원시 데이터 형태
    #[error("unsupported raw data: {0}")]
    UnsupportedData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: ActistreamError = ConfigError::FileNotFound {
            path: "/etc/actistream.toml".to_owned(),
        }
        .into();
        assert!(matches!(err, ActistreamError::Config(_)));
        assert!(err.to_string().contains("/etc/actistream.toml"));
    }

    #[test]
    fn missing_value_display_names_field_and_locator() {
        let err = ParseError::MissingValue {
            field: "Severity".to_owned(),
            locator: "level".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Severity"));
        assert!(msg.contains("level"));
    }

    #[test]
    fn io_error_converts_to_top_level() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: ActistreamError = io.into();
        assert!(err.to_string().starts_with("io error"));
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::InvalidValue {
            field: "engine.activity_delim".to_owned(),
            reason: "must be one of: EOL, EOF".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value for 'engine.activity_delim': must be one of: EOL, EOF"
        );
    }
}
