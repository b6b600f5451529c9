//! 도메인 타입 -- 엔진 전역에서 사용되는 공통 타입
//!
//! 파싱 엔진과 상위 스트림이 공유하는 값 모델과 열거형을 정의합니다.
//! - [`Value`]: 로케이터가 해석한 원시/정형 값
//! - [`UsecTimestamp`]: 마이크로초 정밀도 타임스탬프
//! - [`OpLevel`], [`OpType`], [`CompCode`]: 활동 레코드의 열거형 속성
//! - [`FieldKind`]: 잘 알려진(well-known) 출력 필드 이름

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// 마이크로초 정밀도 타임스탬프
///
/// Unix epoch 기준 마이크로초를 저장합니다. 음수는 epoch 이전 시각입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsecTimestamp {
    usecs: i64,
}

impl UsecTimestamp {
    /// epoch 기준 마이크로초로 타임스탬프를 생성합니다.
    pub fn from_micros(usecs: i64) -> Self {
        Self { usecs }
    }

    /// 밀리초와 추가 마이크로초(0..1000)로 타임스탬프를 생성합니다.
    pub fn from_millis(millis: i64, extra_usecs: i64) -> Self {
        Self {
            usecs: millis.saturating_mul(1000).saturating_add(extra_usecs),
        }
    }

    /// 현재 시각
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// chrono `DateTime`에서 변환합니다.
    pub fn from_datetime<Tz: chrono::TimeZone>(dt: DateTime<Tz>) -> Self {
        Self {
            usecs: dt.timestamp_micros(),
        }
    }

    /// epoch 기준 마이크로초
    pub fn as_micros(&self) -> i64 {
        self.usecs
    }

    /// epoch 기준 밀리초 (마이크로초 이하 버림)
    pub fn as_millis(&self) -> i64 {
        self.usecs.div_euclid(1000)
    }

    /// UTC `DateTime`으로 변환합니다. 표현 범위를 벗어나면 `None`.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.usecs.div_euclid(1_000_000);
        let nanos = u32::try_from(self.usecs.rem_euclid(1_000_000) * 1000).ok()?;
        DateTime::from_timestamp(secs, nanos)
    }

    /// 마이크로초를 더한 새 타임스탬프를 반환합니다.
    pub fn plus_micros(&self, usecs: i64) -> Self {
        Self {
            usecs: self.usecs.saturating_add(usecs),
        }
    }

    /// 마이크로초를 뺀 새 타임스탬프를 반환합니다.
    pub fn minus_micros(&self, usecs: i64) -> Self {
        Self {
            usecs: self.usecs.saturating_sub(usecs),
        }
    }

    /// strftime 패턴으로 포맷합니다. 범위를 벗어난 값은 마이크로초 숫자로 출력합니다.
    pub fn format(&self, pattern: &str) -> String {
        match self.to_datetime() {
            Some(dt) => dt.format(pattern).to_string(),
            None => self.usecs.to_string(),
        }
    }
}

impl fmt::Display for UsecTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
            None => write!(f, "{}", self.usecs),
        }
    }
}

impl Serialize for UsecTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.usecs)
    }
}

/// 엔진 값 모델
///
/// 로케이터가 원시 데이터에서 해석한 값을 표현합니다.
/// 값 없음(null)은 `Option<Value>`의 `None`으로 표현합니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// 불리언
    Bool(bool),
    /// 정수
    Int(i64),
    /// 부동소수점
    Float(f64),
    /// 문자열
    Str(String),
    /// 바이너리
    Bytes(Vec<u8>),
    /// 타임스탬프
    Timestamp(UsecTimestamp),
    /// 순서 있는 값 목록
    List(Vec<Value>),
    /// 이름-값 맵
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// 문자열 값을 생성합니다.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// 문자열 참조를 반환합니다 (문자열 값인 경우만).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 정수로 변환합니다. 숫자 문자열도 허용합니다.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// 실수로 변환합니다. 숫자 문자열도 허용합니다.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 숫자 값인지 확인합니다.
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// 여러 원소로 펼칠 수 있는 값(목록/맵)인지 확인합니다.
    pub fn is_iterable(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    /// 내용이 비어 있는지 확인합니다.
    ///
    /// 공백만 있는 문자열, 빈 바이너리, 빈 목록/맵, 모든 원소가 빈 목록을 빈 값으로 봅니다.
    pub fn is_empty_content(&self) -> bool {
        match self {
            Self::Str(s) => s.trim().is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::List(items) => items.iter().all(Value::is_empty_content),
            Self::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// 목록/맵 값을 원소 목록으로 펼칩니다. 맵은 값만 순서대로 반환합니다.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::List(items) => items,
            Self::Map(map) => map.into_values().collect(),
            other => vec![other],
        }
    }

    /// JSON 값을 엔진 값으로 변환합니다. JSON `null`은 `None`입니다.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            serde_json::Value::Array(arr) => Some(Self::List(
                arr.iter().filter_map(Value::from_json).collect(),
            )),
            serde_json::Value::Object(obj) => Some(Self::Map(
                obj.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// 엔진 값을 JSON으로 변환합니다.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// 해석된 값 배열을 단순화합니다.
///
/// 원소가 하나인 배열은 스칼라로, 빈 배열이나 모든 원소가 없는 배열은 `None`으로 접습니다.
pub fn simplify_values(values: Vec<Option<Value>>) -> Option<Value> {
    if values.iter().all(Option::is_none) {
        return None;
    }
    if values.len() == 1 {
        return values.into_iter().next().flatten();
    }
    Some(Value::List(
        values
            .into_iter()
            .map(|v| v.unwrap_or(Value::Str(String::new())))
            .collect(),
    ))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Timestamp(ts) => write!(f, "{ts}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<UsecTimestamp> for Value {
    fn from(ts: UsecTimestamp) -> Self {
        Self::Timestamp(ts)
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Trace < Debug < ... < Halt`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Failure,
    Fatal,
    Halt,
}

impl OpLevel {
    const ALL: [OpLevel; 10] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Failure,
        Self::Fatal,
        Self::Halt,
    ];

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "information" => Some(Self::Info),
            "notice" => Some(Self::Notice),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "err" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            "failure" => Some(Self::Failure),
            "fatal" => Some(Self::Fatal),
            "halt" => Some(Self::Halt),
            _ => None,
        }
    }

    /// 순번(0 = Trace)으로 심각도를 찾습니다.
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for OpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Failure => "FAILURE",
            Self::Fatal => "FATAL",
            Self::Halt => "HALT",
        };
        f.write_str(name)
    }
}

/// 활동(operation) 유형
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpType {
    #[default]
    Other,
    Start,
    Stop,
    Open,
    Close,
    Send,
    Receive,
    Inquire,
    Set,
    Browse,
    Add,
    Update,
    Remove,
    Clear,
    Datagram,
    Call,
    Noop,
    Activity,
    Event,
    Snapshot,
}

impl OpType {
    const ALL: [OpType; 20] = [
        Self::Other,
        Self::Start,
        Self::Stop,
        Self::Open,
        Self::Close,
        Self::Send,
        Self::Receive,
        Self::Inquire,
        Self::Set,
        Self::Browse,
        Self::Add,
        Self::Update,
        Self::Remove,
        Self::Clear,
        Self::Datagram,
        Self::Call,
        Self::Noop,
        Self::Activity,
        Self::Event,
        Self::Snapshot,
    ];

    /// 문자열에서 유형을 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.to_string() == upper)
            .or(match upper.as_str() {
                "REQUEST" | "PUT" => Some(Self::Send),
                "RESPONSE" | "GET" => Some(Self::Receive),
                "DELETE" => Some(Self::Remove),
                _ => None,
            })
    }

    /// 순번(0 = Other)으로 유형을 찾습니다.
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}").to_uppercase();
        f.write_str(&name)
    }
}

/// 완료 코드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompCode {
    #[default]
    Success,
    Warning,
    Error,
}

impl CompCode {
    /// 문자열에서 완료 코드를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "success" | "ok" => Some(Self::Success),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "err" | "failure" => Some(Self::Error),
            _ => None,
        }
    }

    /// 순번(0 = Success)으로 완료 코드를 찾습니다.
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Success),
            1 => Some(Self::Warning),
            2 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for CompCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 잘 알려진 출력 필드
///
/// 이 목록에 없는 필드 이름은 활동 레코드의 속성 맵(property bag)에 저장됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    ApplName,
    ServerName,
    ServerIp,
    EventName,
    EventType,
    ResourceName,
    Location,
    UserName,
    StartTime,
    EndTime,
    ElapsedTime,
    CompCode,
    ReasonCode,
    Exception,
    Severity,
    TrackingId,
    ParentId,
    Correlator,
    Tag,
    Message,
    MsgCharSet,
    MsgEncoding,
    MsgLength,
    MsgMimeType,
    ProcessId,
    ThreadId,
    Category,
}

impl FieldKind {
    /// 모든 잘 알려진 필드
    pub const ALL: [FieldKind; 27] = [
        Self::ApplName,
        Self::ServerName,
        Self::ServerIp,
        Self::EventName,
        Self::EventType,
        Self::ResourceName,
        Self::Location,
        Self::UserName,
        Self::StartTime,
        Self::EndTime,
        Self::ElapsedTime,
        Self::CompCode,
        Self::ReasonCode,
        Self::Exception,
        Self::Severity,
        Self::TrackingId,
        Self::ParentId,
        Self::Correlator,
        Self::Tag,
        Self::Message,
        Self::MsgCharSet,
        Self::MsgEncoding,
        Self::MsgLength,
        Self::MsgMimeType,
        Self::ProcessId,
        Self::ThreadId,
        Self::Category,
    ];

    /// 자동 할당 가능한 필드 (참조되어도 의존성 간선을 만들지 않음)
    pub const AUTO_ASSIGNABLE: [FieldKind; 6] = [
        Self::TrackingId,
        Self::StartTime,
        Self::EndTime,
        Self::ElapsedTime,
        Self::ServerName,
        Self::ServerIp,
    ];

    /// 정식 이름으로 필드를 찾습니다.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// 정식 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApplName => "ApplName",
            Self::ServerName => "ServerName",
            Self::ServerIp => "ServerIp",
            Self::EventName => "EventName",
            Self::EventType => "EventType",
            Self::ResourceName => "ResourceName",
            Self::Location => "Location",
            Self::UserName => "UserName",
            Self::StartTime => "StartTime",
            Self::EndTime => "EndTime",
            Self::ElapsedTime => "ElapsedTime",
            Self::CompCode => "CompCode",
            Self::ReasonCode => "ReasonCode",
            Self::Exception => "Exception",
            Self::Severity => "Severity",
            Self::TrackingId => "TrackingId",
            Self::ParentId => "ParentId",
            Self::Correlator => "Correlator",
            Self::Tag => "Tag",
            Self::Message => "Message",
            Self::MsgCharSet => "MsgCharSet",
            Self::MsgEncoding => "MsgEncoding",
            Self::MsgLength => "MsgLength",
            Self::MsgMimeType => "MsgMimeType",
            Self::ProcessId => "ProcessId",
            Self::ThreadId => "ThreadId",
            Self::Category => "Category",
        }
    }

    /// 열거형 의미를 가지는 필드인지 확인합니다.
    pub fn is_enumeration(&self) -> bool {
        matches!(self, Self::Severity | Self::EventType | Self::CompCode)
    }

    /// 값이 누적되는 컬렉션 필드인지 확인합니다.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Correlator | Self::Tag)
    }

    /// 자동 할당 가능한 필드인지 확인합니다.
    pub fn is_auto_assignable(&self) -> bool {
        Self::AUTO_ASSIGNABLE.contains(self)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
