//! 파서 속성
//!
//! [`ParserProperties`]는 파서 하나의 동작을 조정하는 속성 집합입니다.
//! core의 [`EngineConfig`](actistream_core::config::EngineConfig)에서 기본값을 가져오고,
//! 파서 정의의 이름/값 쌍으로 덮어씁니다. 이름은 대소문자를 구분하지 않으며,
//! 알려지지 않은 이름은 사용자 정의 속성으로 보관되어 변환/필터에 노출됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use actistream_core::config::ActistreamConfig;
//! use actistream_engine::config::ParserProperties;
//!
//! let core_config = ActistreamConfig::default();
//! let mut props = ParserProperties::from_core(&core_config.engine);
//! props.set("RequireDefault", "true")?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use actistream_core::config::EngineConfig;

use crate::error::EngineError;

/// 필수 여부 기본값 속성
pub const PROP_REQUIRE_DEFAULT: &str = "RequireDefault";
/// 활동 구분자 속성
pub const PROP_ACTIVITY_DELIM: &str = "ActivityDelim";
/// 필드 자동 정렬 속성
pub const PROP_AUTO_ARRANGE_FIELDS: &str = "AutoArrangeFields";
/// 복합 경로 구분자 속성
pub const PROP_COMPOSITE_DELIM: &str = "CompositeDelim";
/// 원시 데이터를 메시지로 사용하는 속성
pub const PROP_USE_ACTIVITY_DATA_AS_MESSAGE: &str = "UseActivityDataAsMessageForUnset";
/// 파서 이름 속성
pub const PROP_PARSER_NAME: &str = "ParserName";

/// 리더 입력에서 활동 하나를 나누는 단위
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActivityDelim {
    /// 비어 있지 않은 다음 줄 (기본값)
    #[default]
    Eol,
    /// 남은 전체 내용
    Eof,
}

impl FromStr for ActivityDelim {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EOL" => Ok(Self::Eol),
            "EOF" => Ok(Self::Eof),
            other => Err(format!("'{other}' must be one of: EOL, EOF")),
        }
    }
}

impl TryFrom<String> for ActivityDelim {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ActivityDelim> for String {
    fn from(d: ActivityDelim) -> Self {
        d.to_string()
    }
}

impl fmt::Display for ActivityDelim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eol => f.write_str("EOL"),
            Self::Eof => f.write_str("EOF"),
        }
    }
}

/// 파서 속성
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserProperties {
    /// 로케이터 필수 여부 기본값
    pub require_default: bool,
    /// 활동 구분자
    pub activity_delim: ActivityDelim,
    /// 필드 의존성 순서로 자동 정렬할지
    pub auto_arrange_fields: bool,
    /// 복합 경로 구분자
    pub composite_delim: String,
    /// 메시지가 없으면 원시 데이터를 메시지로 사용할지
    pub use_activity_data_as_message: bool,
    /// 파서 이름 재정의
    pub parser_name: Option<String>,
    /// 사용자 정의 속성
    pub custom: BTreeMap<String, String>,
}

impl Default for ParserProperties {
    fn default() -> Self {
        Self {
            require_default: false,
            activity_delim: ActivityDelim::Eol,
            auto_arrange_fields: true,
            composite_delim: ".".to_owned(),
            use_activity_data_as_message: false,
            parser_name: None,
            custom: BTreeMap::new(),
        }
    }
}

impl ParserProperties {
    /// core 엔진 설정에서 기본 속성을 생성합니다.
    ///
    /// 구분자 값은 core 설정 검증을 통과한 것으로 보고, 알 수 없으면 기본값을 씁니다.
    pub fn from_core(core: &EngineConfig) -> Self {
        Self {
            require_default: core.require_all,
            activity_delim: core.activity_delim.parse().unwrap_or_default(),
            auto_arrange_fields: core.auto_arrange_fields,
            composite_delim: core.composite_delim.clone(),
            use_activity_data_as_message: core.use_activity_data_as_message,
            ..Self::default()
        }
    }

    /// 이름/값 쌍으로 속성을 설정합니다 (이름은 대소문자 무시).
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if name.eq_ignore_ascii_case(PROP_REQUIRE_DEFAULT) {
            self.require_default = parse_bool(PROP_REQUIRE_DEFAULT, value)?;
        } else if name.eq_ignore_ascii_case(PROP_ACTIVITY_DELIM) {
            self.activity_delim = value.parse().map_err(|reason| EngineError::Config {
                field: PROP_ACTIVITY_DELIM.to_owned(),
                reason,
            })?;
        } else if name.eq_ignore_ascii_case(PROP_AUTO_ARRANGE_FIELDS) {
            self.auto_arrange_fields = parse_bool(PROP_AUTO_ARRANGE_FIELDS, value)?;
        } else if name.eq_ignore_ascii_case(PROP_COMPOSITE_DELIM) {
            if value.is_empty() {
                return Err(EngineError::Config {
                    field: PROP_COMPOSITE_DELIM.to_owned(),
                    reason: "must not be empty".to_owned(),
                });
            }
            self.composite_delim = value.to_owned();
        } else if name.eq_ignore_ascii_case(PROP_USE_ACTIVITY_DATA_AS_MESSAGE) {
            self.use_activity_data_as_message =
                parse_bool(PROP_USE_ACTIVITY_DATA_AS_MESSAGE, value)?;
        } else if name.eq_ignore_ascii_case(PROP_PARSER_NAME) {
            self.parser_name = Some(value.to_owned());
        } else {
            self.custom.insert(name.to_owned(), value.to_owned());
        }
        Ok(())
    }

    /// 여러 속성을 순서대로 설정합니다.
    pub fn set_all<'a>(
        &mut self,
        props: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<(), EngineError> {
        for (name, value) in props {
            self.set(name, value)?;
        }
        Ok(())
    }

    /// 이름으로 속성 값을 조회합니다 (ParserProp 로케이터).
    pub fn get(&self, name: &str) -> Option<String> {
        if name.eq_ignore_ascii_case(PROP_REQUIRE_DEFAULT) {
            Some(self.require_default.to_string())
        } else if name.eq_ignore_ascii_case(PROP_ACTIVITY_DELIM) {
            Some(self.activity_delim.to_string())
        } else if name.eq_ignore_ascii_case(PROP_AUTO_ARRANGE_FIELDS) {
            Some(self.auto_arrange_fields.to_string())
        } else if name.eq_ignore_ascii_case(PROP_COMPOSITE_DELIM) {
            Some(self.composite_delim.clone())
        } else if name.eq_ignore_ascii_case(PROP_USE_ACTIVITY_DATA_AS_MESSAGE) {
            Some(self.use_activity_data_as_message.to_string())
        } else if name.eq_ignore_ascii_case(PROP_PARSER_NAME) {
            self.parser_name.clone()
        } else {
            self.custom.get(name).cloned()
        }
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, EngineError> {
    value
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| EngineError::Config {
            field: field.to_owned(),
            reason: format!("'{value}' is not a boolean"),
        })
}
