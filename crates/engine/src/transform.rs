//! 값 변환과 필터
//!
//! 로케이터에 부착되는 값 변환([`ValueTransform`])과 값 필터([`ValueFilter`]),
//! 레코드 전체에 대한 필터([`ActivityFilter`])를 정의합니다.
//!
//! 스크립트 언어 런타임에 의존하지 않도록, 변환/필터는 주입되는 기능(trait 객체)으로
//! 다룹니다. 임의의 클로저([`FnTransform`], [`FnFilter`])와 선언적 정의에서 사용하는
//! 내장 구현([`StringTransform`], [`ConditionFilter`], [`RecordFilter`])을 제공합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use actistream_core::types::Value;

use crate::activity::ActivityRecord;
use crate::error::EngineError;
use crate::template;

/// 변환 적용 단계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformPhase {
    /// 형식 변환 전 (원시 값)
    Raw,
    /// 형식 변환 후 (기본값)
    #[default]
    Formatted,
}

impl fmt::Display for TransformPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Formatted => f.write_str("formatted"),
        }
    }
}

/// 변환/필터 평가 시 사용할 수 있는 바인딩
///
/// 진행 중인 레코드의 다른 필드 값과 파서의 사용자 정의 속성을 읽을 수 있습니다.
pub struct Bindings<'a> {
    record: &'a ActivityRecord,
    field: Option<&'a str>,
    properties: &'a BTreeMap<String, String>,
}

impl<'a> Bindings<'a> {
    /// 바인딩을 생성합니다.
    pub fn new(
        record: &'a ActivityRecord,
        field: Option<&'a str>,
        properties: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            record,
            field,
            properties,
        }
    }

    /// 진행 중인 레코드의 필드 값
    pub fn field_value(&self, name: &str) -> Option<Value> {
        self.record.field_value(name)
    }

    /// 현재 해석 중인 필드 이름
    pub fn current_field(&self) -> Option<&str> {
        self.field
    }

    /// 파서의 사용자 정의 속성
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// 로케이터 값 변환
pub trait ValueTransform: Send + Sync + fmt::Debug {
    /// 변환 이름 (로그용)
    fn name(&self) -> &str;

    /// 적용 단계
    fn phase(&self) -> TransformPhase {
        TransformPhase::Formatted
    }

    /// 값을 변환합니다.
    fn transform(
        &self,
        value: Option<Value>,
        bindings: &Bindings<'_>,
    ) -> Result<Option<Value>, EngineError>;

    /// 변환이 읽는 다른 필드 이름 (의존성 그래프에 반영됨)
    fn referenced_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 로케이터 값 필터
pub trait ValueFilter: Send + Sync + fmt::Debug {
    /// 필터 이름 (로그용)
    fn name(&self) -> &str;

    /// 값을 제외해야 하면 `true`를 반환합니다.
    fn is_filtered(&self, value: Option<&Value>, bindings: &Bindings<'_>)
    -> Result<bool, EngineError>;

    /// 필터가 읽는 다른 필드 이름
    fn referenced_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 레코드 필터
///
/// 파서의 필터 잠금 아래에서 평가되므로 상태를 가질 수 있습니다 (`&mut self`).
pub trait ActivityFilter: Send + fmt::Debug {
    /// 필터 이름 (로그용)
    fn name(&self) -> &str;

    /// 레코드를 제외해야 하면 `true`를 반환합니다.
    fn is_filtered(&mut self, record: &ActivityRecord) -> Result<bool, EngineError>;
}

type TransformFn =
    dyn Fn(Option<Value>, &Bindings<'_>) -> Result<Option<Value>, String> + Send + Sync;

/// 클로저 기반 값 변환
#[derive(Clone)]
pub struct FnTransform {
    name: String,
    phase: TransformPhase,
    references: Vec<String>,
    func: Arc<TransformFn>,
}

impl FnTransform {
    /// 형식 변환 후 단계의 클로저 변환을 생성합니다.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Option<Value>, &Bindings<'_>) -> Result<Option<Value>, String>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            phase: TransformPhase::Formatted,
            references: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// 적용 단계를 지정합니다.
    pub fn phase(mut self, phase: TransformPhase) -> Self {
        self.phase = phase;
        self
    }

    /// 클로저가 읽는 필드 이름을 선언합니다.
    pub fn references(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.references = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl ValueTransform for FnTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> TransformPhase {
        self.phase
    }

    fn transform(
        &self,
        value: Option<Value>,
        bindings: &Bindings<'_>,
    ) -> Result<Option<Value>, EngineError> {
        (self.func)(value, bindings).map_err(|reason| EngineError::Transform {
            name: self.name.clone(),
            reason,
        })
    }

    fn referenced_fields(&self) -> Vec<String> {
        self.references.clone()
    }
}

/// 내장 문자열 변환 연산
#[derive(Debug, Clone)]
pub enum StringOp {
    /// 앞뒤 공백 제거
    Trim,
    /// 대문자
    Uppercase,
    /// 소문자
    Lowercase,
    /// 정규식 치환
    Replace { pattern: Regex, replacement: String },
}

/// 내장 문자열 변환
///
/// 문자열 값(목록이면 각 문자열 원소)에만 적용되고 다른 값은 그대로 통과합니다.
#[derive(Debug, Clone)]
pub struct StringTransform {
    name: String,
    phase: TransformPhase,
    op: StringOp,
}

impl StringTransform {
    /// 변환을 생성합니다.
    pub fn new(op: StringOp, phase: TransformPhase) -> Self {
        let name = match &op {
            StringOp::Trim => "trim".to_owned(),
            StringOp::Uppercase => "uppercase".to_owned(),
            StringOp::Lowercase => "lowercase".to_owned(),
            StringOp::Replace { pattern, .. } => format!("replace({})", pattern.as_str()),
        };
        Self { name, phase, op }
    }

    /// 정규식 치환 변환을 생성합니다.
    pub fn replace(
        pattern: &str,
        replacement: impl Into<String>,
        phase: TransformPhase,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(
            StringOp::Replace {
                pattern: Regex::new(pattern)?,
                replacement: replacement.into(),
            },
            phase,
        ))
    }

    fn apply(&self, value: Value) -> Value {
        match value {
            Value::Str(s) => Value::Str(match &self.op {
                StringOp::Trim => s.trim().to_owned(),
                StringOp::Uppercase => s.to_uppercase(),
                StringOp::Lowercase => s.to_lowercase(),
                StringOp::Replace {
                    pattern,
                    replacement,
                } => pattern.replace_all(&s, replacement.as_str()).into_owned(),
            }),
            Value::List(items) => Value::List(items.into_iter().map(|v| self.apply(v)).collect()),
            other => other,
        }
    }
}

impl ValueTransform for StringTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> TransformPhase {
        self.phase
    }

    fn transform(
        &self,
        value: Option<Value>,
        _bindings: &Bindings<'_>,
    ) -> Result<Option<Value>, EngineError> {
        Ok(value.map(|v| self.apply(v)))
    }
}

/// 다른 필드 값을 `${Name}` 템플릿으로 조합하는 변환
///
/// 참조한 필드가 아직 없으면 원래 값을 유지합니다.
#[derive(Debug, Clone)]
pub struct TemplateTransform {
    name: String,
    template: String,
}

impl TemplateTransform {
    /// 템플릿 변환을 생성합니다. `${$value}`는 현재 값으로 치환됩니다.
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            name: format!("template({template})"),
            template,
        }
    }
}

impl ValueTransform for TemplateTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(
        &self,
        value: Option<Value>,
        bindings: &Bindings<'_>,
    ) -> Result<Option<Value>, EngineError> {
        let current = value.as_ref().map(ToString::to_string);
        let (filled, resolved) = template::fill(&self.template, |name| {
            if name == "$value" {
                current.clone()
            } else {
                bindings.field_value(name).map(|v| v.to_string())
            }
        });
        if resolved {
            Ok(Some(Value::Str(filled)))
        } else {
            Ok(value)
        }
    }

    fn referenced_fields(&self) -> Vec<String> {
        template::vars(&self.template)
            .into_iter()
            .filter(|v| v != "$value")
            .collect()
    }
}

type FilterFn = dyn Fn(Option<&Value>, &Bindings<'_>) -> Result<bool, String> + Send + Sync;

/// 클로저 기반 값 필터
#[derive(Clone)]
pub struct FnFilter {
    name: String,
    references: Vec<String>,
    func: Arc<FilterFn>,
}

impl FnFilter {
    /// 클로저 필터를 생성합니다. 클로저가 `true`를 반환하면 값이 제외됩니다.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Option<&Value>, &Bindings<'_>) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            references: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// 클로저가 읽는 필드 이름을 선언합니다.
    pub fn references(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.references = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for FnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter")
            .field("name", &self.name)
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl ValueFilter for FnFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_filtered(
        &self,
        value: Option<&Value>,
        bindings: &Bindings<'_>,
    ) -> Result<bool, EngineError> {
        (self.func)(value, bindings).map_err(|reason| EngineError::Filter {
            name: self.name.clone(),
            reason,
        })
    }

    fn referenced_fields(&self) -> Vec<String> {
        self.references.clone()
    }
}

/// 조건 수정자 -- 매칭 방식을 결정합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionModifier {
    /// 정확히 일치
    #[default]
    Exact,
    /// 부분 문자열 포함
    Contains,
    /// 접두사 일치
    StartsWith,
    /// 접미사 일치
    EndsWith,
    /// 정규식 매칭
    Regex,
}

/// 필터 처리 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterHandling {
    /// 조건에 맞는 값만 통과 (기본값)
    #[default]
    Include,
    /// 조건에 맞는 값을 제외
    Exclude,
}

/// 컴파일된 단일 매칭 조건
#[derive(Debug, Clone)]
struct Condition {
    modifier: ConditionModifier,
    value: String,
    regex: Option<Regex>,
}

impl Condition {
    fn compile(modifier: ConditionModifier, value: String) -> Result<Self, EngineError> {
        let regex = match modifier {
            ConditionModifier::Regex => Some(Regex::new(&value)?),
            _ => None,
        };
        Ok(Self {
            modifier,
            value,
            regex,
        })
    }

    fn matches(&self, text: &str) -> bool {
        match self.modifier {
            ConditionModifier::Exact => text == self.value,
            ConditionModifier::Contains => text.contains(&self.value),
            ConditionModifier::StartsWith => text.starts_with(&self.value),
            ConditionModifier::EndsWith => text.ends_with(&self.value),
            ConditionModifier::Regex => self.regex.as_ref().is_some_and(|r| r.is_match(text)),
        }
    }
}

/// 조건 기반 값 필터
///
/// 정규식 조건은 생성 시 한 번만 컴파일합니다. 값이 없으면 조건 불일치로 봅니다.
#[derive(Debug, Clone)]
pub struct ConditionFilter {
    name: String,
    handling: FilterHandling,
    condition: Condition,
}

impl ConditionFilter {
    /// 필터를 생성합니다. 정규식이 잘못되면 에러를 반환합니다.
    pub fn new(
        handling: FilterHandling,
        modifier: ConditionModifier,
        value: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let value = value.into();
        let name = format!("{handling:?}:{modifier:?}:{value}").to_lowercase();
        Ok(Self {
            name,
            handling,
            condition: Condition::compile(modifier, value)?,
        })
    }
}

impl ValueFilter for ConditionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_filtered(
        &self,
        value: Option<&Value>,
        _bindings: &Bindings<'_>,
    ) -> Result<bool, EngineError> {
        let matched = value.is_some_and(|v| self.condition.matches(&v.to_string()));
        Ok(match self.handling {
            FilterHandling::Include => !matched,
            FilterHandling::Exclude => matched,
        })
    }
}

/// 필드 매칭 조건 (레코드 필터용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCondition {
    /// 대상 필드명 (잘 알려진 필드 또는 속성 이름)
    pub field: String,
    /// 매칭 수정자
    #[serde(default)]
    pub modifier: ConditionModifier,
    /// 매칭할 값
    pub value: String,
}

/// 조건 기반 레코드 필터
///
/// 모든 조건이 AND로 결합됩니다. 조건이 비어 있으면 모든 레코드에 매칭됩니다.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    name: String,
    handling: FilterHandling,
    conditions: Vec<(String, Condition)>,
}

impl RecordFilter {
    /// 레코드 필터를 생성합니다.
    pub fn new(
        name: impl Into<String>,
        handling: FilterHandling,
        conditions: Vec<FieldCondition>,
    ) -> Result<Self, EngineError> {
        let conditions = conditions
            .into_iter()
            .map(|c| Ok((c.field, Condition::compile(c.modifier, c.value)?)))
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(Self {
            name: name.into(),
            handling,
            conditions,
        })
    }

    fn matches(&self, record: &ActivityRecord) -> bool {
        self.conditions.iter().all(|(field, condition)| {
            record
                .field_value(field)
                .is_some_and(|v| condition.matches(&v.to_string()))
        })
    }
}

impl ActivityFilter for RecordFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_filtered(&mut self, record: &ActivityRecord) -> Result<bool, EngineError> {
        let matched = self.matches(record);
        Ok(match self.handling {
            FilterHandling::Include => !matched,
            FilterHandling::Exclude => matched,
        })
    }
}

type ActivityFilterFn = dyn FnMut(&ActivityRecord) -> Result<bool, String> + Send;

/// 클로저 기반 레코드 필터 (상태를 가질 수 있음)
pub struct FnActivityFilter {
    name: String,
    func: Box<ActivityFilterFn>,
}

impl FnActivityFilter {
    /// 클로저가 `true`를 반환하면 레코드가 제외됩니다.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&ActivityRecord) -> Result<bool, String> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnActivityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnActivityFilter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ActivityFilter for FnActivityFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_filtered(&mut self, record: &ActivityRecord) -> Result<bool, EngineError> {
        (self.func)(record).map_err(|reason| EngineError::Filter {
            name: self.name.clone(),
            reason,
        })
    }
}
