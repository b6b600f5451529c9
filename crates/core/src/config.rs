//! 설정 관리 -- actistream.toml 파싱 및 런타임 설정
//!
//! [`ActistreamConfig`]는 로깅과 파싱 엔진 기본값을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`ACTISTREAM_ENGINE_REQUIRE_ALL=true` 형식)
//! 2. 설정 파일 (`actistream.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), actistream_core::error::ActistreamError> {
//! use actistream_core::config::ActistreamConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ActistreamConfig::load("actistream.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ActistreamConfig::parse("[engine]\nrequire_all = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ActistreamError, ConfigError};

/// actistream 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActistreamConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파싱 엔진 기본 설정
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ActistreamConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ActistreamError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ActistreamError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ActistreamError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ActistreamError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ActistreamError> {
        toml::from_str(toml_str).map_err(|e| {
            ActistreamError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `ACTISTREAM_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(
            &mut self.general.log_level,
            "ACTISTREAM_GENERAL_LOG_LEVEL",
        );
        override_string(
            &mut self.general.log_format,
            "ACTISTREAM_GENERAL_LOG_FORMAT",
        );

        // Engine
        override_bool(&mut self.engine.require_all, "ACTISTREAM_ENGINE_REQUIRE_ALL");
        override_bool(
            &mut self.engine.auto_arrange_fields,
            "ACTISTREAM_ENGINE_AUTO_ARRANGE_FIELDS",
        );
        override_string(
            &mut self.engine.activity_delim,
            "ACTISTREAM_ENGINE_ACTIVITY_DELIM",
        );
        override_string(
            &mut self.engine.composite_delim,
            "ACTISTREAM_ENGINE_COMPOSITE_DELIM",
        );
        override_bool(
            &mut self.engine.use_activity_data_as_message,
            "ACTISTREAM_ENGINE_USE_ACTIVITY_DATA_AS_MESSAGE",
        );
        override_usize(
            &mut self.engine.cache_max_entries,
            "ACTISTREAM_ENGINE_CACHE_MAX_ENTRIES",
        );
        override_string(
            &mut self.engine.definitions_dir,
            "ACTISTREAM_ENGINE_DEFINITIONS_DIR",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ActistreamError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        let valid_delims = ["EOL", "EOF"];
        if !valid_delims
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&self.engine.activity_delim))
        {
            return Err(ConfigError::InvalidValue {
                field: "engine.activity_delim".to_owned(),
                reason: format!("must be one of: {}", valid_delims.join(", ")),
            }
            .into());
        }

        if self.engine.composite_delim.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "engine.composite_delim".to_owned(),
                reason: "delimiter must not be empty".to_owned(),
            }
            .into());
        }

        if self.engine.cache_max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.cache_max_entries".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 파싱 엔진 기본 설정
///
/// 파서 정의에 속성이 지정되지 않았을 때 사용되는 기본값입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 필드 기본 필수 여부를 로케이터 필수로 간주할지
    pub require_all: bool,
    /// 참조 의존성에 따라 필드 순서를 자동 정렬할지
    pub auto_arrange_fields: bool,
    /// 리더 입력의 활동 구분 방식 (EOL, EOF)
    pub activity_delim: String,
    /// 복합 경로 구분자
    pub composite_delim: String,
    /// Message 미설정 시 원시 데이터를 메시지로 사용할지
    pub use_activity_data_as_message: bool,
    /// 활동 간 캐시 최대 엔트리 수
    pub cache_max_entries: usize,
    /// 파서 정의 디렉토리
    pub definitions_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            require_all: false,
            auto_arrange_fields: true,
            activity_delim: "EOL".to_owned(),
            composite_delim: ".".to_owned(),
            use_activity_data_as_message: false,
            cache_max_entries: 10_000,
            definitions_dir: "/etc/actistream/parsers".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}
