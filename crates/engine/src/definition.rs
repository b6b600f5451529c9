//! 선언적 파서 정의
//!
//! YAML 또는 TOML로 작성된 [`ParserDefinition`]을 [`ActivityParser`]로 구성합니다.
//! 정의는 엔진 변형, 속성, 필드와 로케이터, 변환/필터, 스택 파서 참조(이름),
//! 레코드 필터, 캐시 엔트리를 기술합니다.
//!
//! # YAML 예시
//! ```yaml
//! name: access-log
//! resolver:
//!   kind: regex
//!   pattern: '(?P<level>\w+) (?P<msg>.*)'
//! properties:
//!   RequireDefault: "false"
//! fields:
//!   - name: Severity
//!     locators:
//!       - kind: RegexGroupName
//!         locator: level
//!         value_map: { E: ERROR, W: WARNING }
//!   - name: Message
//!     locators:
//!       - kind: RegexGroupName
//!         locator: msg
//!         transforms:
//!           - op: trim
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{ActivityCache, CacheEntry};
use crate::config::ParserProperties;
use crate::error::EngineError;
use crate::field::{Aggregation, Field, StackedParserRef};
use crate::locator::{DataType, Locator, LocatorKind};
use crate::parser::ActivityParser;
use crate::preparser::{Base64Decode, JsonDecode, PreParser, Utf8Decode};
use crate::resolver::{JsonResolver, LocatorResolver, MapResolver, RegexResolver};
use crate::timestamp::TimeUnit;
use crate::transform::{
    ConditionFilter, ConditionModifier, FieldCondition, FilterHandling, RecordFilter,
    StringOp, StringTransform, TemplateTransform, TransformPhase, ValueTransform,
};

/// 엔진 변형 선택
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolverDef {
    /// JSON 문서
    Json,
    /// 이름-값 맵
    Map,
    /// 정규식
    Regex {
        /// 입력 전체에 일치해야 하는 패턴
        pattern: String,
    },
}

impl ResolverDef {
    fn build(&self) -> Result<Box<dyn LocatorResolver>, EngineError> {
        let resolver: Box<dyn LocatorResolver> = match self {
            Self::Json => Box::new(JsonResolver::new()),
            Self::Map => Box::new(MapResolver::new()),
            Self::Regex { pattern } => Box::new(RegexResolver::new(pattern)?),
        };
        Ok(resolver)
    }
}

/// 내장 전처리기
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreParserDef {
    /// UTF-8 디코딩 (잘못된 바이트는 에러)
    Utf8,
    /// UTF-8 디코딩 (잘못된 바이트는 대체 문자)
    Utf8Lossy,
    /// base64 디코딩
    Base64,
    /// JSON 디코딩
    Json,
}

impl PreParserDef {
    fn build(self) -> Box<dyn PreParser> {
        match self {
            Self::Utf8 => Box::new(Utf8Decode::strict()),
            Self::Utf8Lossy => Box::new(Utf8Decode::lossy()),
            Self::Base64 => Box::new(Base64Decode),
            Self::Json => Box::new(JsonDecode),
        }
    }
}

/// 내장 변환 연산
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TransformOp {
    Trim,
    Uppercase,
    Lowercase,
    /// 정규식 치환
    Replace { pattern: String, replacement: String },
    /// `${Name}` 템플릿 조합 (`${$value}`는 현재 값)
    Template { template: String },
}

/// 변환 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformDef {
    #[serde(flatten)]
    pub op: TransformOp,
    /// 적용 단계 (템플릿 변환은 항상 형식 변환 후)
    #[serde(default)]
    pub phase: TransformPhase,
}

impl TransformDef {
    fn build(&self) -> Result<Arc<dyn ValueTransform>, EngineError> {
        let string_op = |op| Arc::new(StringTransform::new(op, self.phase));
        let transform: Arc<dyn ValueTransform> = match &self.op {
            TransformOp::Trim => string_op(StringOp::Trim),
            TransformOp::Uppercase => string_op(StringOp::Uppercase),
            TransformOp::Lowercase => string_op(StringOp::Lowercase),
            TransformOp::Replace {
                pattern,
                replacement,
            } => Arc::new(StringTransform::replace(
                pattern,
                replacement.as_str(),
                self.phase,
            )?),
            TransformOp::Template { template } => Arc::new(TemplateTransform::new(template)),
        };
        Ok(transform)
    }
}

/// 값 필터 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDef {
    #[serde(default)]
    pub handling: FilterHandling,
    #[serde(default)]
    pub modifier: ConditionModifier,
    pub value: String,
}

/// 로케이터 정의
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorDef {
    #[serde(default)]
    pub kind: LocatorKind,
    #[serde(default)]
    pub locator: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub units: Option<TimeUnit>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub empty_as_null: Option<bool>,
    /// 원시 값 → 변환 값 (`*`는 catch-all)
    #[serde(default)]
    pub value_map: BTreeMap<String, String>,
    #[serde(default)]
    pub transforms: Vec<TransformDef>,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
}

impl LocatorDef {
    fn build(&self) -> Result<Locator, EngineError> {
        let mut locator =
            Locator::new(self.kind, self.locator.as_str()).with_data_type(self.data_type);
        if let Some(format) = &self.format {
            locator = locator.with_format(format.as_str());
        }
        if let Some(units) = self.units {
            locator = locator.with_units(units);
        }
        if let Some(required) = self.required {
            locator = locator.with_required(required);
        }
        if let Some(empty_as_null) = self.empty_as_null {
            locator = locator.with_empty_as_null(empty_as_null);
        }
        for (source, target) in &self.value_map {
            locator = locator.with_mapping(source.as_str(), target.as_str());
        }
        for transform in &self.transforms {
            locator = locator.with_transform(transform.build()?);
        }
        for filter in &self.filters {
            locator = locator.with_filter(Arc::new(ConditionFilter::new(
                filter.handling,
                filter.modifier.clone(),
                filter.value.as_str(),
            )?));
        }
        Ok(locator)
    }
}

/// 스택 파서 참조 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackedDef {
    /// 참조할 파서 이름
    pub parser: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub flatten: bool,
}

/// 필드 정의
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub locators: Vec<LocatorDef>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub enumeration: Option<bool>,
    #[serde(default)]
    pub collection: Option<bool>,
    #[serde(default)]
    pub split: bool,
    /// 이 필드 로케이터들의 필수 여부 기본값
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub dynamic_locators: BTreeMap<String, LocatorDef>,
    #[serde(default)]
    pub stacked: Vec<StackedDef>,
}

/// 레코드 필터 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFilterDef {
    pub name: String,
    #[serde(default)]
    pub handling: FilterHandling,
    #[serde(default)]
    pub conditions: Vec<FieldCondition>,
}

/// 파서 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserDefinition {
    /// 파서 이름 (레지스트리 키, 스택 참조 대상)
    pub name: String,
    pub resolver: ResolverDef,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub pre_parsers: Vec<PreParserDef>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// 레코드 필터
    #[serde(default)]
    pub filters: Vec<RecordFilterDef>,
    /// 활동 간 캐시 엔트리
    #[serde(default)]
    pub cache: Vec<CacheEntry>,
    /// 정의를 읽어 온 위치 (에러 메시지용)
    #[serde(skip)]
    pub source: Option<String>,
}

impl ParserDefinition {
    /// YAML 문자열에서 정의를 읽습니다.
    pub fn from_yaml(content: &str, source: &str) -> Result<Self, EngineError> {
        let mut def: Self = serde_yaml::from_str(content).map_err(|e| EngineError::Definition {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;
        def.source = Some(source.to_owned());
        def.validate()?;
        Ok(def)
    }

    /// TOML 문자열에서 정의를 읽습니다.
    pub fn from_toml(content: &str, source: &str) -> Result<Self, EngineError> {
        let mut def: Self = toml::from_str(content).map_err(|e| EngineError::Definition {
            path: source.to_owned(),
            reason: format!("TOML parse error: {e}"),
        })?;
        def.source = Some(source.to_owned());
        def.validate()?;
        Ok(def)
    }

    /// 구조적 유효성을 검사합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(self.error("parser name must not be empty"));
        }
        if let Some(field) = self.fields.iter().find(|f| f.name.trim().is_empty()) {
            return Err(self.error(format!(
                "field name must not be empty (locators: {})",
                field.locators.len()
            )));
        }
        Ok(())
    }

    /// 이 정의가 참조하는 스택 파서 이름들
    pub fn stacked_refs(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flat_map(|f| f.stacked.iter().map(|s| s.parser.as_str()))
    }

    /// 파서를 구성합니다.
    ///
    /// 스택 참조는 `built`에 이미 구성된 파서에서 찾습니다.
    pub fn build(
        &self,
        built: &HashMap<String, Arc<ActivityParser>>,
        defaults: &ParserProperties,
        cache: Option<Arc<ActivityCache>>,
    ) -> Result<ActivityParser, EngineError> {
        let mut builder = ActivityParser::builder(self.name.as_str(), self.resolver.build()?)
            .properties(defaults.clone());
        for (name, value) in &self.properties {
            builder = builder.property(name.as_str(), value.as_str());
        }
        for pre_parser in &self.pre_parsers {
            builder = builder.pre_parser(pre_parser.build());
        }
        for field in &self.fields {
            builder = builder.field(self.build_field(field, built)?);
        }
        for filter in &self.filters {
            builder = builder.filter(Box::new(RecordFilter::new(
                filter.name.as_str(),
                filter.handling,
                filter.conditions.clone(),
            )?));
        }
        if let Some(cache) = cache {
            builder = builder.cache(cache);
        }
        builder.build().map_err(|e| self.wrap(e))
    }

    fn build_field(
        &self,
        def: &FieldDef,
        built: &HashMap<String, Arc<ActivityParser>>,
    ) -> Result<Field, EngineError> {
        let mut field = Field::new(def.name.as_str()).with_split(def.split);
        if let Some(separator) = &def.separator {
            field = field.with_separator(separator.as_str());
        }
        if let Some(enumeration) = def.enumeration {
            field = field.with_enumeration(enumeration);
        }
        if let Some(collection) = def.collection {
            field = field.with_collection(collection);
        }
        if let Some(required) = def.required {
            field = field.with_required_default(required);
        }
        for locator in &def.locators {
            field = field.with_locator(locator.build().map_err(|e| self.wrap(e))?);
        }
        for (id, locator) in &def.dynamic_locators {
            field = field.with_dynamic_locator(
                id.as_str(),
                locator.build().map_err(|e| self.wrap(e))?,
            );
        }
        for stacked in &def.stacked {
            let parser = built.get(&stacked.parser).ok_or_else(|| {
                self.error(format!(
                    "field '{}' references undefined stacked parser '{}'",
                    def.name, stacked.parser
                ))
            })?;
            field = field.with_stacked_parser(StackedParserRef::new(
                Arc::clone(parser),
                stacked.aggregation,
                stacked.flatten,
            ));
        }
        Ok(field)
    }

    fn origin(&self) -> String {
        self.source.clone().unwrap_or_else(|| self.name.clone())
    }

    fn error(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Definition {
            path: self.origin(),
            reason: reason.into(),
        }
    }

    /// 구성 에러는 그대로 두고, 정규식 등 하위 에러는 정의 위치를 붙입니다.
    fn wrap(&self, err: EngineError) -> EngineError {
        if err.is_configuration() {
            err
        } else {
            self.error(err.to_string())
        }
    }
}
