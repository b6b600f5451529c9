//! 전처리기 -- 해석 전에 원시 데이터를 변환하는 체인
//!
//! 파서는 전처리기 목록을 하나의 잠금 아래에서 순서대로 실행합니다.
//! 전처리기는 상태를 가질 수 있습니다 (`&mut self`).
//! 마지막이 아닌 전처리기의 실패는 경고 후 건너뛰고, 마지막 전처리기의
//! 실패는 호출자에게 전달됩니다.

use std::fmt;

use base64::Engine as _;

use crate::context::RawData;
use crate::error::EngineError;

/// 원시 데이터 전처리기
pub trait PreParser: Send + fmt::Debug {
    /// 전처리기 이름 (로그용)
    fn name(&self) -> &str;

    /// 이 데이터에 적용할 수 있는지
    fn is_applicable(&self, _raw: &RawData) -> bool {
        true
    }

    /// 데이터를 변환합니다.
    fn pre_parse(&mut self, raw: RawData) -> Result<RawData, EngineError>;
}

/// 바이너리를 UTF-8 텍스트로 디코딩
#[derive(Debug, Clone, Default)]
pub struct Utf8Decode {
    lossy: bool,
}

impl Utf8Decode {
    /// 잘못된 바이트를 에러로 처리하는 디코더
    pub fn strict() -> Self {
        Self { lossy: false }
    }

    /// 잘못된 바이트를 대체 문자로 바꾸는 디코더
    pub fn lossy() -> Self {
        Self { lossy: true }
    }
}

impl PreParser for Utf8Decode {
    fn name(&self) -> &str {
        "utf8"
    }

    fn is_applicable(&self, raw: &RawData) -> bool {
        matches!(raw, RawData::Bytes(_))
    }

    fn pre_parse(&mut self, raw: RawData) -> Result<RawData, EngineError> {
        let RawData::Bytes(bytes) = raw else {
            return Ok(raw);
        };
        if self.lossy {
            return Ok(RawData::Text(String::from_utf8_lossy(&bytes).into_owned()));
        }
        String::from_utf8(bytes.to_vec())
            .map(RawData::Text)
            .map_err(|e| EngineError::PreParse {
                name: self.name().to_owned(),
                reason: e.to_string(),
            })
    }
}

/// base64 텍스트를 바이너리로 디코딩
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Decode;

impl PreParser for Base64Decode {
    fn name(&self) -> &str {
        "base64"
    }

    fn is_applicable(&self, raw: &RawData) -> bool {
        matches!(raw, RawData::Text(_))
    }

    fn pre_parse(&mut self, raw: RawData) -> Result<RawData, EngineError> {
        let RawData::Text(text) = raw else {
            return Ok(raw);
        };
        base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map(RawData::from)
            .map_err(|e| EngineError::PreParse {
                name: self.name().to_owned(),
                reason: e.to_string(),
            })
    }
}

/// JSON 텍스트를 JSON 문서로 디코딩
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecode;

impl PreParser for JsonDecode {
    fn name(&self) -> &str {
        "json"
    }

    fn is_applicable(&self, raw: &RawData) -> bool {
        matches!(raw, RawData::Text(_) | RawData::Bytes(_))
    }

    fn pre_parse(&mut self, raw: RawData) -> Result<RawData, EngineError> {
        let parsed = match &raw {
            RawData::Text(text) => serde_json::from_str(text),
            RawData::Bytes(bytes) => serde_json::from_slice(bytes),
            _ => return Ok(raw),
        };
        parsed.map(RawData::Json).map_err(|e| EngineError::PreParse {
            name: self.name().to_owned(),
            reason: e.to_string(),
        })
    }
}

type PreParseFn = dyn FnMut(RawData) -> Result<RawData, String> + Send;

/// 클로저 기반 전처리기
pub struct FnPreParser {
    name: String,
    func: Box<PreParseFn>,
}

impl FnPreParser {
    /// 전처리기를 생성합니다.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(RawData) -> Result<RawData, String> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnPreParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPreParser")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PreParser for FnPreParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_parse(&mut self, raw: RawData) -> Result<RawData, EngineError> {
        (self.func)(raw).map_err(|reason| EngineError::PreParse {
            name: self.name.clone(),
            reason,
        })
    }
}
