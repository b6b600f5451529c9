//! 필드 -- 하나 이상의 로케이터에 묶인 출력 슬롯
//!
//! 필드는 정식 이름, 로케이터 목록, 다중 값 구분자, 열거형/동적/분할 플래그,
//! 스택 파서 참조를 가집니다. 이름이나 동적 로케이터에 `${id}` 템플릿이 있으면
//! 동적 필드로 취급되어 원소마다 임시 필드가 만들어집니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use actistream_core::types::{FieldKind, Value};

use crate::locator::Locator;
use crate::parser::ActivityParser;
use crate::template;

/// 동적 필드 이름 템플릿에서 원소 인덱스(목록) 또는 키(맵)를 가리키는 플레이스홀더 id
pub const INDEX_PLACEHOLDER: &str = "$index";

/// 스택 파서 결과 집계 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// 현재 레코드에 병합 (기본값)
    #[default]
    Merge,
    /// 자식 레코드로 연결
    Relate,
}

/// 스택 파서 참조
#[derive(Debug, Clone)]
pub struct StackedParserRef {
    parser: Arc<ActivityParser>,
    aggregation: Aggregation,
    flatten: bool,
}

impl StackedParserRef {
    /// 스택 파서 참조를 생성합니다.
    pub fn new(parser: Arc<ActivityParser>, aggregation: Aggregation, flatten: bool) -> Self {
        Self {
            parser,
            aggregation,
            flatten,
        }
    }

    /// 참조된 파서
    pub fn parser(&self) -> &Arc<ActivityParser> {
        &self.parser
    }

    /// 집계 방식
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// 자식 레코드를 부모와 같은 수준으로 펼칠지
    pub fn flatten(&self) -> bool {
        self.flatten
    }
}

/// 출력 필드
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    locators: Vec<Locator>,
    separator: String,
    enumeration: bool,
    collection: bool,
    split: bool,
    dynamic_locators: BTreeMap<String, Locator>,
    stacked: Vec<StackedParserRef>,
    required_default: Option<bool>,
}

impl Field {
    /// 필드를 생성합니다.
    ///
    /// 잘 알려진 열거형 필드(Severity, EventType, CompCode)는 열거형 플래그가,
    /// Correlator/Tag는 컬렉션 플래그가 자동으로 설정됩니다.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = FieldKind::from_name(&name);
        Self {
            enumeration: kind.is_some_and(|k| k.is_enumeration()),
            collection: kind.is_some_and(|k| k.is_collection()),
            name,
            locators: Vec::new(),
            separator: String::new(),
            split: false,
            dynamic_locators: BTreeMap::new(),
            stacked: Vec::new(),
            required_default: None,
        }
    }

    /// 로케이터를 추가합니다.
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locators.push(locator);
        self
    }

    /// 다중 값 구분자를 지정합니다.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// 열거형 의미 여부를 지정합니다.
    pub fn with_enumeration(mut self, enumeration: bool) -> Self {
        self.enumeration = enumeration;
        self
    }

    /// 컬렉션 타입 여부를 지정합니다 (같은 이름의 필드 중복 허용).
    pub fn with_collection(mut self, collection: bool) -> Self {
        self.collection = collection;
        self
    }

    /// 반복 가능한 값을 원소별 형제 필드로 분할할지 지정합니다.
    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    /// 동적 로케이터를 추가합니다. 이름 템플릿의 `${id}`가 이 로케이터 값으로 치환됩니다.
    pub fn with_dynamic_locator(mut self, id: impl Into<String>, locator: Locator) -> Self {
        self.dynamic_locators.insert(id.into(), locator);
        self
    }

    /// 스택 파서를 추가합니다.
    pub fn with_stacked_parser(mut self, stacked: StackedParserRef) -> Self {
        self.stacked.push(stacked);
        self
    }

    /// 로케이터 필수 여부 기본값을 지정합니다 (파서의 RequireDefault보다 우선).
    pub fn with_required_default(mut self, required: bool) -> Self {
        self.required_default = Some(required);
        self
    }

    /// 필드 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 잘 알려진 필드 종류
    pub fn kind(&self) -> Option<FieldKind> {
        FieldKind::from_name(&self.name)
    }

    /// 로케이터 목록
    pub fn locators(&self) -> &[Locator] {
        &self.locators
    }

    /// 다중 값 구분자
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// 열거형 필드인지
    pub fn is_enumeration(&self) -> bool {
        self.enumeration
    }

    /// 컬렉션 필드인지
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// 분할(fan-out) 필드인지
    pub fn is_split(&self) -> bool {
        self.split
    }

    /// 동적 필드인지 (이름 템플릿 또는 동적 로케이터 보유)
    pub fn is_dynamic(&self) -> bool {
        !self.dynamic_locators.is_empty() || self.name.contains("${")
    }

    /// 동적 로케이터
    pub fn dynamic_locators(&self) -> &BTreeMap<String, Locator> {
        &self.dynamic_locators
    }

    /// 스택 파서 참조
    pub fn stacked_parsers(&self) -> &[StackedParserRef] {
        &self.stacked
    }

    /// 로케이터 필수 여부 기본값 (필드 수준)
    pub fn required_default(&self) -> Option<bool> {
        self.required_default
    }

    /// 이 필드가 참조하는 다른 필드 이름 (중복 제거, 선언 순서 유지)
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        let all = self
            .locators
            .iter()
            .chain(self.dynamic_locators.values())
            .flat_map(Locator::referenced_fields);
        for r in all {
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
        refs
    }

    /// 동적 확장 원소 하나에 대한 임시 필드를 만듭니다.
    ///
    /// 이름과 로케이터 위치 문자열의 `${id}`는 동적 로케이터 값(목록이면 `index`번째 원소)으로,
    /// `${$index}`는 원소 키로 치환됩니다.
    pub(crate) fn temp_field(
        &self,
        dynamic_values: &BTreeMap<String, Value>,
        index: usize,
        key: &str,
    ) -> Self {
        let lookup = |id: &str| -> Option<String> {
            if id == INDEX_PLACEHOLDER {
                return Some(key.to_owned());
            }
            dynamic_values.get(id).map(|v| match v {
                Value::List(items) => items.get(index).map(ToString::to_string).unwrap_or_default(),
                other => other.to_string(),
            })
        };
        let name = template::fill(&self.name, lookup).0;
        let kind = FieldKind::from_name(&name);
        Self {
            enumeration: self.enumeration || kind.is_some_and(|k| k.is_enumeration()),
            collection: self.collection || kind.is_some_and(|k| k.is_collection()),
            name,
            locators: self
                .locators
                .iter()
                .map(|l| l.with_filled_locator(lookup))
                .collect(),
            separator: self.separator.clone(),
            split: false,
            dynamic_locators: BTreeMap::new(),
            stacked: Vec::new(),
            required_default: self.required_default,
        }
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorKind;

    #[test]
    fn well_known_flags_are_inferred() {
        assert!(Field::new("Severity").is_enumeration());
        assert!(Field::new("Tag").is_collection());
        assert!(!Field::new("custom").is_enumeration());
        assert_eq!(Field::new("Severity").kind(), Some(FieldKind::Severity));
    }

    #[test]
    fn dynamic_detection() {
        assert!(Field::new("attr_${name}").is_dynamic());
        assert!(
            Field::new("x")
                .with_dynamic_locator("n", Locator::label("n"))
                .is_dynamic()
        );
        assert!(!Field::new("x").is_dynamic());
    }

    #[test]
    fn referenced_fields_are_deduplicated() {
        let field = Field::new("Message")
            .with_locator(Locator::activity("Body"))
            .with_locator(Locator::expression("${Body}-${Host}"));
        assert_eq!(field.referenced_fields(), vec!["Body", "Host"]);
    }

    #[test]
    fn temp_field_fills_name_and_locators() {
        let field = Field::new("${name}_${$index}")
            .with_locator(Locator::new(LocatorKind::Label, "items.${$index}"))
            .with_dynamic_locator("name", Locator::label("names"));
        let mut values = BTreeMap::new();
        values.insert(
            "name".to_owned(),
            Value::List(vec![Value::str("a"), Value::str("b")]),
        );
        let temp = field.temp_field(&values, 1, "1");
        assert_eq!(temp.name(), "b_1");
        assert_eq!(temp.locators()[0].locator(), "items.1");
        assert!(!temp.is_dynamic());
    }

    #[test]
    fn temp_field_scalar_dynamic_value() {
        let field = Field::new("prop_${k}").with_dynamic_locator("k", Locator::label("k"));
        let mut values = BTreeMap::new();
        values.insert("k".to_owned(), Value::str("host"));
        assert_eq!(field.temp_field(&values, 3, "3").name(), "prop_host");
    }

    #[test]
    fn aggregation_deserializes() {
        let a: Aggregation = serde_yaml::from_str("relate").unwrap();
        assert_eq!(a, Aggregation::Relate);
    }
}
