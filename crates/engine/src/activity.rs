//! 활동 레코드 -- 파싱 결과의 정규 출력 엔티티
//!
//! [`ActivityRecord`]는 잘 알려진 속성(타입 있는 슬롯)과 열린 속성 맵,
//! 필터링 플래그, 자식 레코드를 가집니다.
//!
//! # 값 적용 규칙
//! - 문자열 슬롯: 새 값이 비어 있으면 기존 값을 유지합니다 (`substitute`).
//! - 숫자 슬롯: 값이 있으면 교체합니다.
//! - Correlator/Tag: 항상 누적합니다.
//! - 병합([`ActivityRecord::merge`]): 비어 있거나 기본값인 슬롯만 채웁니다.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use actistream_core::types::{CompCode, FieldKind, OpLevel, OpType, UsecTimestamp, Value};

use crate::error::EngineError;
use crate::field::Field;
use crate::locator::Locator;
use crate::timestamp::{TimeUnit, TimestampFormatter};

/// 소스 FQN 구분자
const FQN_DELIM: &str = "#";

/// 자식 레코드
#[derive(Debug, Clone, Serialize)]
pub struct ChildRecord {
    /// 자식 레코드
    pub record: ActivityRecord,
    /// 부모와 같은 수준으로 전달할지
    pub flatten: bool,
}

/// 활동 레코드
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub server_name: Option<String>,
    pub server_ip: Option<String>,
    pub appl_name: Option<String>,
    pub user_name: Option<String>,
    pub resource_name: Option<String>,
    pub event_name: Option<String>,
    pub event_type: Option<OpType>,
    pub start_time: Option<UsecTimestamp>,
    pub end_time: Option<UsecTimestamp>,
    /// 경과 시간 (마이크로초, -1 = 미설정)
    pub elapsed_time: i64,
    pub comp_code: Option<CompCode>,
    /// 사유 코드 (0 = 미설정)
    pub reason_code: i64,
    pub exception: Option<String>,
    pub severity: Option<OpLevel>,
    pub location: Option<String>,
    pub tracking_id: Option<String>,
    pub parent_id: Option<String>,
    pub correlators: Vec<String>,
    pub tags: Vec<String>,
    pub message: Option<String>,
    pub msg_charset: Option<String>,
    pub msg_encoding: Option<String>,
    pub msg_mime_type: Option<String>,
    pub msg_length: Option<i64>,
    pub process_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub category: Option<String>,
    /// 잘 알려지지 않은 이름의 필드 값
    pub properties: BTreeMap<String, Value>,
    filtered: bool,
    complete: bool,
    ordinal: usize,
    children: BTreeMap<String, Vec<ChildRecord>>,
}

impl Default for ActivityRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityRecord {
    /// 빈 레코드를 생성합니다.
    pub fn new() -> Self {
        Self {
            server_name: None,
            server_ip: None,
            appl_name: None,
            user_name: None,
            resource_name: None,
            event_name: None,
            event_type: None,
            start_time: None,
            end_time: None,
            elapsed_time: -1,
            comp_code: None,
            reason_code: 0,
            exception: None,
            severity: None,
            location: None,
            tracking_id: None,
            parent_id: None,
            correlators: Vec::new(),
            tags: Vec::new(),
            message: None,
            msg_charset: None,
            msg_encoding: None,
            msg_mime_type: None,
            msg_length: None,
            process_id: None,
            thread_id: None,
            category: None,
            properties: BTreeMap::new(),
            filtered: false,
            complete: false,
            ordinal: 0,
            children: BTreeMap::new(),
        }
    }

    /// 필터로 제외되었는지
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub(crate) fn set_filtered(&mut self, filtered: bool) {
        self.filtered = filtered;
    }

    /// 파싱이 끝났는지
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn set_complete(&mut self) {
        self.complete = true;
    }

    /// 같은 파서가 만든 형제들 사이에서의 위치 (1부터, 0 = 최상위)
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub(crate) fn set_ordinal(&mut self, ordinal: usize) {
        self.ordinal = ordinal;
    }

    /// 해석된 필드 값을 레코드에 적용합니다.
    ///
    /// - 원소가 하나인 목록은 스칼라로 접습니다.
    /// - 로케이터가 없으면 값을 그대로 사용합니다 (목록은 문자열화).
    /// - 목록 값은 원소별로 정규화한 뒤 구분자로 이어 붙입니다. 컬렉션 필드는 목록을 유지합니다.
    /// - 값이 없으면 아무것도 하지 않습니다.
    pub fn apply_field(&mut self, field: &Field, value: Option<Value>) -> Result<(), EngineError> {
        let value = match value {
            Some(Value::List(mut items)) if items.len() == 1 => items.pop(),
            other => other,
        };
        let Some(value) = value else {
            trace!(field = field.name(), "no value to apply");
            return Ok(());
        };

        let locators = field.locators();
        let value = match (locators.first(), value) {
            (None, Value::List(items)) => Value::Str(Value::List(items).to_string()),
            (None, value) => value,
            (Some(first), Value::List(items)) => {
                if field.is_enumeration() {
                    return Err(field_error(
                        field,
                        "enumeration field resolved to multiple values".to_owned(),
                    ));
                }
                if locators.len() > 1 && locators.len() != items.len() {
                    return Err(field_error(
                        field,
                        format!(
                            "{} locators produced {} values",
                            locators.len(),
                            items.len()
                        ),
                    ));
                }
                let normalized = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let loc = locators.get(i).unwrap_or(first);
                        normalize(field, loc, v).map(|v| (loc, v))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if field.is_collection() {
                    Value::List(normalized.into_iter().map(|(_, v)| v).collect())
                } else {
                    let parts: Vec<String> = normalized
                        .into_iter()
                        .map(|(loc, v)| match v {
                            Value::Timestamp(ts) if loc.format().is_some() => {
                                loc.formatter().format(&ts)
                            }
                            v => v.to_string(),
                        })
                        .collect();
                    Value::Str(parts.join(field.separator()))
                }
            }
            (Some(_), value) if locators.len() > 1 => value,
            (Some(first), value) => normalize(field, first, value)?,
        };

        self.set_field(field.name(), locators.first().map(Locator::formatter), value)
            .map_err(|e| e.for_field(field.name()))
    }

    /// 이름으로 값을 설정합니다 (로케이터 형식 정보 없이).
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        self.set_field(name, None, value)
    }

    fn set_field(
        &mut self,
        name: &str,
        formatter: Option<&TimestampFormatter>,
        value: Value,
    ) -> Result<(), EngineError> {
        let Some(kind) = FieldKind::from_name(name) else {
            self.properties.insert(name.to_owned(), value);
            return Ok(());
        };

        match kind {
            FieldKind::ApplName => substitute(&mut self.appl_name, &value),
            FieldKind::ServerName => substitute(&mut self.server_name, &value),
            FieldKind::ServerIp => substitute(&mut self.server_ip, &value),
            FieldKind::EventName => substitute(&mut self.event_name, &value),
            FieldKind::ResourceName => substitute(&mut self.resource_name, &value),
            FieldKind::Location => substitute(&mut self.location, &value),
            FieldKind::UserName => substitute(&mut self.user_name, &value),
            FieldKind::Exception => substitute(&mut self.exception, &value),
            FieldKind::TrackingId => substitute(&mut self.tracking_id, &value),
            FieldKind::ParentId => substitute(&mut self.parent_id, &value),
            FieldKind::MsgCharSet => substitute(&mut self.msg_charset, &value),
            FieldKind::MsgEncoding => substitute(&mut self.msg_encoding, &value),
            FieldKind::MsgMimeType => substitute(&mut self.msg_mime_type, &value),
            FieldKind::Category => substitute(&mut self.category, &value),
            FieldKind::Message => {
                let text = match &value {
                    Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
                    other => other.to_string(),
                };
                if !text.is_empty() {
                    if self.msg_length.is_none() {
                        self.msg_length = Some(text.len() as i64);
                    }
                    self.message = Some(text);
                }
            }
            FieldKind::EventType => {
                self.event_type = Some(
                    enum_value(&value, OpType::from_ordinal, OpType::from_str_loose)
                        .ok_or_else(|| unrecognized(name, &value))?,
                );
            }
            FieldKind::Severity => {
                self.severity = Some(
                    enum_value(&value, OpLevel::from_ordinal, OpLevel::from_str_loose)
                        .ok_or_else(|| unrecognized(name, &value))?,
                );
            }
            FieldKind::CompCode => {
                self.comp_code = Some(
                    enum_value(&value, CompCode::from_ordinal, CompCode::from_str_loose)
                        .ok_or_else(|| unrecognized(name, &value))?,
                );
            }
            FieldKind::StartTime => self.start_time = Some(to_timestamp(name, formatter, &value)?),
            FieldKind::EndTime => self.end_time = Some(to_timestamp(name, formatter, &value)?),
            FieldKind::ElapsedTime => self.elapsed_time = to_number(name, &value)?,
            FieldKind::ReasonCode => self.reason_code = to_number(name, &value)?,
            FieldKind::MsgLength => self.msg_length = Some(to_number(name, &value)?),
            FieldKind::ProcessId => self.process_id = Some(to_number(name, &value)?),
            FieldKind::ThreadId => self.thread_id = Some(to_number(name, &value)?),
            FieldKind::Correlator => add_items(&mut self.correlators, value),
            FieldKind::Tag => add_items(&mut self.tags, value),
        }
        Ok(())
    }

    /// 이름으로 현재 필드 값을 조회합니다.
    ///
    /// 미설정/기본값 슬롯은 `None`입니다. 잘 알려지지 않은 이름은 속성 맵에서 찾습니다.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        let Some(kind) = FieldKind::from_name(name) else {
            return self.properties.get(name).cloned();
        };
        let text = |s: &Option<String>| s.clone().map(Value::Str);
        let items = |v: &Vec<String>| {
            (!v.is_empty()).then(|| Value::List(v.iter().cloned().map(Value::Str).collect()))
        };
        match kind {
            FieldKind::ApplName => text(&self.appl_name),
            FieldKind::ServerName => text(&self.server_name),
            FieldKind::ServerIp => text(&self.server_ip),
            FieldKind::EventName => text(&self.event_name),
            FieldKind::ResourceName => text(&self.resource_name),
            FieldKind::Location => text(&self.location),
            FieldKind::UserName => text(&self.user_name),
            FieldKind::Exception => text(&self.exception),
            FieldKind::TrackingId => text(&self.tracking_id),
            FieldKind::ParentId => text(&self.parent_id),
            FieldKind::MsgCharSet => text(&self.msg_charset),
            FieldKind::MsgEncoding => text(&self.msg_encoding),
            FieldKind::MsgMimeType => text(&self.msg_mime_type),
            FieldKind::Category => text(&self.category),
            FieldKind::Message => text(&self.message),
            FieldKind::EventType => self.event_type.map(|t| Value::Str(t.to_string())),
            FieldKind::Severity => self.severity.map(|s| Value::Str(s.to_string())),
            FieldKind::CompCode => self.comp_code.map(|c| Value::Str(c.to_string())),
            FieldKind::StartTime => self.start_time.map(Value::Timestamp),
            FieldKind::EndTime => self.end_time.map(Value::Timestamp),
            FieldKind::ElapsedTime => (self.elapsed_time >= 0).then_some(Value::Int(self.elapsed_time)),
            FieldKind::ReasonCode => (self.reason_code != 0).then_some(Value::Int(self.reason_code)),
            FieldKind::MsgLength => self.msg_length.map(Value::Int),
            FieldKind::ProcessId => self.process_id.map(Value::Int),
            FieldKind::ThreadId => self.thread_id.map(Value::Int),
            FieldKind::Correlator => items(&self.correlators),
            FieldKind::Tag => items(&self.tags),
        }
    }

    /// 다른 레코드를 병합합니다.
    ///
    /// 비어 있거나 기본값인 슬롯만 `other`의 값으로 채웁니다 (first-non-empty-wins).
    /// Correlator/Tag는 중복을 포함해 누적되고, 속성은 `other`의 값이 같은 키를 덮어씁니다.
    /// 자식 레코드는 이어 붙이고, 필터링 플래그는 OR로 결합합니다.
    pub fn merge(&mut self, other: ActivityRecord) {
        fill_text(&mut self.server_name, other.server_name);
        fill_text(&mut self.server_ip, other.server_ip);
        fill_text(&mut self.appl_name, other.appl_name);
        fill_text(&mut self.user_name, other.user_name);
        fill_text(&mut self.resource_name, other.resource_name);
        fill_text(&mut self.event_name, other.event_name);
        fill_text(&mut self.exception, other.exception);
        fill_text(&mut self.location, other.location);
        fill_text(&mut self.tracking_id, other.tracking_id);
        fill_text(&mut self.parent_id, other.parent_id);
        fill_text(&mut self.message, other.message);
        fill_text(&mut self.msg_charset, other.msg_charset);
        fill_text(&mut self.msg_encoding, other.msg_encoding);
        fill_text(&mut self.msg_mime_type, other.msg_mime_type);
        fill_text(&mut self.category, other.category);
        fill(&mut self.event_type, other.event_type);
        fill(&mut self.start_time, other.start_time);
        fill(&mut self.end_time, other.end_time);
        fill(&mut self.comp_code, other.comp_code);
        fill(&mut self.severity, other.severity);
        fill(&mut self.msg_length, other.msg_length);
        fill(&mut self.process_id, other.process_id);
        fill(&mut self.thread_id, other.thread_id);
        if self.elapsed_time < 0 {
            self.elapsed_time = other.elapsed_time;
        }
        if self.reason_code == 0 {
            self.reason_code = other.reason_code;
        }

        self.correlators.extend(other.correlators);
        self.tags.extend(other.tags);
        self.properties.extend(other.properties);
        for (parser, kids) in other.children {
            self.children.entry(parser).or_default().extend(kids);
        }
        self.filtered |= other.filtered;
    }

    /// 시작/종료/경과 시간을 서로에게서 유도합니다.
    ///
    /// - 경과 시간이 없으면: 시작과 종료가 모두 있으면 그 차이, 아니면 0
    /// - 종료 시간이 없으면: 시작 + 경과, 시작도 없으면 현재 시각
    /// - 시작 시간이 없으면: 종료 - 경과
    pub fn determine_times(&mut self) {
        if self.elapsed_time < 0 {
            self.elapsed_time = match (self.start_time, self.end_time) {
                (Some(start), Some(end)) => end.as_micros() - start.as_micros(),
                _ => 0,
            };
        }
        if self.end_time.is_none() {
            self.end_time = Some(match self.start_time {
                Some(start) => start.plus_micros(self.elapsed_time),
                None => UsecTimestamp::now(),
            });
        }
        if self.start_time.is_none() {
            self.start_time = self.end_time.map(|end| end.minus_micros(self.elapsed_time));
        }
    }

    /// 추적 id가 없으면 새로 할당하고 반환합니다.
    pub fn determine_tracking_id(&mut self) -> &str {
        self.tracking_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
    }

    /// 자식 레코드를 추가합니다.
    pub fn add_child(&mut self, parser: &str, record: ActivityRecord, flatten: bool) {
        self.children
            .entry(parser.to_owned())
            .or_default()
            .push(ChildRecord { record, flatten });
    }

    /// 특정 파서가 만든 자식 수
    pub fn child_count(&self, parser: &str) -> usize {
        self.children.get(parser).map_or(0, Vec::len)
    }

    /// 특정 파서가 만든 자식들
    pub fn children(&self, parser: &str) -> &[ChildRecord] {
        self.children.get(parser).map_or(&[], Vec::as_slice)
    }

    /// 전체 자식 수
    pub fn total_children(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    /// 소스 FQN (`APPL=..#SERVER=..#NETADDR=..`, 값이 있는 부분만)
    pub fn source_fqn(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("APPL", &self.appl_name),
            ("SERVER", &self.server_name),
            ("NETADDR", &self.server_ip),
        ]
        .into_iter()
        .filter_map(|(key, val)| val.as_ref().map(|v| format!("{key}={v}")))
        .collect();
        (!parts.is_empty()).then(|| parts.join(FQN_DELIM))
    }

    /// 전달 단위로 분해합니다.
    ///
    /// 부모 레코드가 먼저 오고, `flatten`으로 연결된 자식(과 그 후손)이 형제로 이어집니다.
    /// 펼쳐진 자식은 추적 id를 할당받고 부모 id가 부모의 추적 id로 설정됩니다.
    /// 중첩 자식은 부모 레코드 안에 남습니다.
    pub fn into_delivery_units(mut self) -> Vec<ActivityRecord> {
        let mut flattened = Vec::new();
        for kids in self.children.values_mut() {
            let (flat, nested): (Vec<_>, Vec<_>) = kids.drain(..).partition(|c| c.flatten);
            *kids = nested;
            flattened.extend(flat.into_iter().map(|c| c.record));
        }
        self.children.retain(|_, kids| !kids.is_empty());

        let parent_tid = self.tracking_id.clone();
        let mut units = vec![self];
        for mut child in flattened {
            if child.parent_id.is_none() {
                child.parent_id = parent_tid.clone();
            }
            child.determine_tracking_id();
            units.extend(child.into_delivery_units());
        }
        units
    }
}

/// 레코드 수준 값 정규화
///
/// 열거형 필드의 숫자 문자열은 정수로, 그 외 문자열은 다듬어 대문자로 바꿉니다.
/// 경과 시간은 로케이터 단위(기본 마이크로초)에서 마이크로초로 변환하고,
/// 리소스 이름은 문자열로 만듭니다.
fn normalize(field: &Field, locator: &Locator, value: Value) -> Result<Value, EngineError> {
    let value = match value {
        Value::Str(s) if field.is_enumeration() => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                trimmed
                    .parse::<i64>()
                    .map(Value::Int)
                    .unwrap_or_else(|_| Value::Str(trimmed.to_owned()))
            } else {
                Value::Str(trimmed.to_uppercase())
            }
        }
        other => other,
    };

    Ok(match field.kind() {
        Some(FieldKind::ElapsedTime) => match value.as_f64() {
            Some(n) => Value::Int(locator.units().unwrap_or(TimeUnit::Microseconds).to_micros(n)),
            None => return Err(field_error(field, format!("'{value}' is not a duration"))),
        },
        Some(FieldKind::ResourceName) => Value::Str(value.to_string()),
        _ => value,
    })
}

fn field_error(field: &Field, reason: String) -> EngineError {
    EngineError::ParseFailed {
        field: field.name().to_owned(),
        reason,
    }
}

fn unrecognized(name: &str, value: &Value) -> EngineError {
    EngineError::ParseFailed {
        field: name.to_owned(),
        reason: format!("unrecognized value '{value}'"),
    }
}

fn substitute(slot: &mut Option<String>, value: &Value) {
    let text = value.to_string();
    if !text.trim().is_empty() {
        *slot = Some(text);
    }
}

fn fill_text(slot: &mut Option<String>, other: Option<String>) {
    if slot.as_deref().is_none_or(|s| s.trim().is_empty()) {
        if let Some(other) = other.filter(|o| !o.trim().is_empty()) {
            *slot = Some(other);
        }
    }
}

fn fill<T>(slot: &mut Option<T>, other: Option<T>) {
    if slot.is_none() {
        *slot = other;
    }
}

fn enum_value<T>(
    value: &Value,
    by_ordinal: fn(i64) -> Option<T>,
    by_name: fn(&str) -> Option<T>,
) -> Option<T> {
    match value {
        Value::Int(i) => by_ordinal(*i),
        Value::Float(f) if f.fract() == 0.0 => by_ordinal(*f as i64),
        Value::Str(s) => by_name(s).or_else(|| s.trim().parse().ok().and_then(by_ordinal)),
        _ => None,
    }
}

fn to_timestamp(
    name: &str,
    formatter: Option<&TimestampFormatter>,
    value: &Value,
) -> Result<UsecTimestamp, EngineError> {
    let default = TimestampFormatter::default();
    formatter
        .unwrap_or(&default)
        .parse(value)
        .map_err(|reason| EngineError::ParseFailed {
            field: name.to_owned(),
            reason,
        })
}

fn to_number(name: &str, value: &Value) -> Result<i64, EngineError> {
    value.as_i64().ok_or_else(|| EngineError::ParseFailed {
        field: name.to_owned(),
        reason: format!("'{value}' is not an integer"),
    })
}

fn add_items(target: &mut Vec<String>, value: Value) {
    match value {
        Value::List(items) => {
            for item in items {
                add_items(target, item);
            }
        }
        Value::Str(s) => target.extend(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
        ),
        other => target.push(other.to_string()),
    }
}
