//! 타임스탬프 해석 -- 시간 단위와 패턴 기반 변환
//!
//! 숫자 값은 로케이터 단위(units)로, 단위가 없으면 자릿수로 초/밀리초/마이크로초/나노초를
//! 추정합니다. 문자열 값은 strftime 패턴, RFC 3339, 숫자 문자열 순으로 시도합니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use actistream_core::types::{UsecTimestamp, Value};

/// 시간 단위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// 1 단위가 몇 마이크로초인지 (나노초는 1/1000)
    fn micros_factor(self) -> f64 {
        match self {
            Self::Nanoseconds => 0.001,
            Self::Microseconds => 1.0,
            Self::Milliseconds => 1_000.0,
            Self::Seconds => 1_000_000.0,
            Self::Minutes => 60_000_000.0,
            Self::Hours => 3_600_000_000.0,
            Self::Days => 86_400_000_000.0,
        }
    }

    /// 이 단위의 값을 마이크로초로 변환합니다.
    pub fn to_micros(self, value: f64) -> i64 {
        (value * self.micros_factor()).round() as i64
    }

    /// 정수 값을 부동소수점을 거치지 않고 마이크로초로 변환합니다.
    pub fn int_to_micros(self, value: i64) -> i64 {
        match self {
            Self::Nanoseconds => value / 1_000,
            Self::Microseconds => value,
            Self::Milliseconds => value.saturating_mul(1_000),
            Self::Seconds => value.saturating_mul(1_000_000),
            Self::Minutes => value.saturating_mul(60_000_000),
            Self::Hours => value.saturating_mul(3_600_000_000),
            Self::Days => value.saturating_mul(86_400_000_000),
        }
    }

    /// 정수 epoch 값의 자릿수로 단위를 추정합니다.
    pub fn guess_epoch(value: i64) -> Self {
        let digits = value.unsigned_abs().checked_ilog10().map_or(1, |d| d + 1);
        match digits {
            0..=10 => Self::Seconds,
            11..=13 => Self::Milliseconds,
            14..=16 => Self::Microseconds,
            _ => Self::Nanoseconds,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nanoseconds" | "nanos" | "ns" => Ok(Self::Nanoseconds),
            "microseconds" | "micros" | "us" => Ok(Self::Microseconds),
            "milliseconds" | "millis" | "ms" => Ok(Self::Milliseconds),
            "seconds" | "secs" | "s" => Ok(Self::Seconds),
            "minutes" | "mins" | "m" => Ok(Self::Minutes),
            "hours" | "h" => Ok(Self::Hours),
            "days" | "d" => Ok(Self::Days),
            other => Err(format!("unknown time unit '{other}'")),
        }
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeUnit> for String {
    fn from(unit: TimeUnit) -> Self {
        unit.to_string()
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nanoseconds => "Nanoseconds",
            Self::Microseconds => "Microseconds",
            Self::Milliseconds => "Milliseconds",
            Self::Seconds => "Seconds",
            Self::Minutes => "Minutes",
            Self::Hours => "Hours",
            Self::Days => "Days",
        };
        f.write_str(name)
    }
}

/// 타임스탬프 변환기
///
/// 로케이터의 `format`(strftime 패턴)과 `units`로 구성됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampFormatter {
    pattern: Option<String>,
    units: Option<TimeUnit>,
}

impl TimestampFormatter {
    /// 패턴과 단위로 변환기를 생성합니다.
    pub fn new(pattern: Option<String>, units: Option<TimeUnit>) -> Self {
        Self { pattern, units }
    }

    /// strftime 패턴
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// 값을 타임스탬프로 해석합니다.
    pub fn parse(&self, value: &Value) -> Result<UsecTimestamp, String> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Int(i) => Ok(self.from_int(*i)),
            Value::Float(f) => Ok(self.from_float(*f)),
            Value::Str(s) => self.parse_str(s),
            Value::Bytes(b) => self.parse_str(&String::from_utf8_lossy(b)),
            other => Err(format!("cannot convert '{other}' to timestamp")),
        }
    }

    /// 타임스탬프를 문자열로 포맷합니다. 패턴이 없으면 RFC 3339(마이크로초)입니다.
    pub fn format(&self, ts: &UsecTimestamp) -> String {
        match &self.pattern {
            Some(pattern) => ts.format(pattern),
            None => ts.to_string(),
        }
    }

    fn from_int(&self, value: i64) -> UsecTimestamp {
        let units = self.units.unwrap_or_else(|| TimeUnit::guess_epoch(value));
        UsecTimestamp::from_micros(units.int_to_micros(value))
    }

    fn from_float(&self, value: f64) -> UsecTimestamp {
        let units = self
            .units
            .unwrap_or_else(|| TimeUnit::guess_epoch(value.trunc() as i64));
        UsecTimestamp::from_micros(units.to_micros(value))
    }

    fn parse_str(&self, s: &str) -> Result<UsecTimestamp, String> {
        let s = s.trim();
        if let Some(pattern) = &self.pattern {
            if let Ok(dt) = DateTime::parse_from_str(s, pattern) {
                return Ok(UsecTimestamp::from_datetime(dt));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(s, pattern) {
                return Ok(UsecTimestamp::from_datetime(ndt.and_utc()));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, pattern) {
                if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
                    return Ok(UsecTimestamp::from_datetime(ndt.and_utc()));
                }
            }
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(UsecTimestamp::from_datetime(dt));
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(self.from_int(i));
        }
        if let Ok(f) = s.parse::<f64>() {
            return Ok(self.from_float(f));
        }

        Err(match &self.pattern {
            Some(pattern) => format!("'{s}' does not match timestamp pattern '{pattern}'"),
            None => format!("invalid timestamp format: '{s}'"),
        })
    }
}
