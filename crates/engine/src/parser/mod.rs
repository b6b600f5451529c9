//! 활동 파서 -- 원시 데이터 한 건을 활동 레코드로 만드는 오케스트레이터
//!
//! [`ActivityParser`]는 필드 목록과 엔진 변형([`LocatorResolver`])을 가지고
//! 다음 순서로 한 항목을 처리합니다.
//!
//! 1. 입력이 리더라면 활동 구분자(EOL/EOF)에 따라 다음 항목을 읽음
//! 2. 전처리기 체인 적용
//! 3. 엔진 변형이 데이터를 준비 (`None`이면 파싱할 내용 없음)
//! 4. 필드별로 로케이터를 해석하고 레코드에 적용 (동적 확장, 스택 파서 포함)
//! 5. 레코드 완성, 레코드 필터, 추적 ID 결정, 캐시 기록
//!
//! 구성 후 파서는 불변이며 `Arc`로 공유되어 여러 태스크에서 동시에 호출됩니다.
//! 상태를 가진 전처리기와 레코드 필터만 각자의 잠금 아래에서 실행됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use actistream_engine::{ActivityParser, Field, JsonResolver, Locator, StaticSource};
//!
//! let parser = ActivityParser::builder("events", Box::new(JsonResolver::new()))
//!     .field(Field::new("EventName").with_locator(Locator::label("event")))
//!     .build()?;
//!
//! let source = StaticSource::new("stdin");
//! let record = parser.parse(&source, r#"{"event":"login"}"#)?;
//! ```

mod dynamic;
mod organize;
mod resolve;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Read};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use actistream_core::metrics as m;
use actistream_core::types::Value;

use crate::activity::ActivityRecord;
use crate::cache::ActivityCache;
use crate::config::{ActivityDelim, ParserProperties};
use crate::context::{ActivitySource, RawData, ResolutionContext};
use crate::error::EngineError;
use crate::field::{Aggregation, Field};
use crate::preparser::PreParser;
use crate::resolver::LocatorResolver;
use crate::transform::ActivityFilter;

/// 활동 파서
pub struct ActivityParser {
    name: String,
    properties: ParserProperties,
    fields: Vec<Field>,
    resolver: Box<dyn LocatorResolver>,
    cache: Option<Arc<ActivityCache>>,
    pre_parsers: Mutex<Vec<Box<dyn PreParser>>>,
    filters: Mutex<Vec<Box<dyn ActivityFilter>>>,
    /// 공유 리더에서 다음 항목을 읽는 구간
    next_lock: Mutex<()>,
}

/// 활동 파서 빌더
pub struct ActivityParserBuilder {
    name: String,
    resolver: Box<dyn LocatorResolver>,
    properties: ParserProperties,
    pending_properties: Vec<(String, String)>,
    fields: Vec<Field>,
    cache: Option<Arc<ActivityCache>>,
    pre_parsers: Vec<Box<dyn PreParser>>,
    filters: Vec<Box<dyn ActivityFilter>>,
}

impl ActivityParserBuilder {
    fn new(name: String, resolver: Box<dyn LocatorResolver>) -> Self {
        Self {
            name,
            resolver,
            properties: ParserProperties::default(),
            pending_properties: Vec::new(),
            fields: Vec::new(),
            cache: None,
            pre_parsers: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// 기본 속성을 지정합니다.
    pub fn properties(mut self, properties: ParserProperties) -> Self {
        self.properties = properties;
        self
    }

    /// 이름/값 속성 하나를 지정합니다. 값 검증은 `build()`에서 합니다.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pending_properties.push((name.into(), value.into()));
        self
    }

    /// 필드를 추가합니다. 선언 순서가 유지됩니다.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// 활동 간 캐시를 연결합니다.
    pub fn cache(mut self, cache: Arc<ActivityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 전처리기를 추가합니다.
    pub fn pre_parser(mut self, pre_parser: Box<dyn PreParser>) -> Self {
        self.pre_parsers.push(pre_parser);
        self
    }

    /// 레코드 필터를 추가합니다.
    pub fn filter(mut self, filter: Box<dyn ActivityFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// 파서를 구성합니다.
    ///
    /// # 에러
    /// - `EngineError::Config`: 잘못된 속성 값
    /// - `EngineError::UnsupportedLocator`, `DuplicateField`, `ConflictingMapping`: 필드 등록 실패
    /// - `EngineError::UnknownReference`, `CyclicDependency`: 필드 참조 검증 실패
    pub fn build(self) -> Result<ActivityParser, EngineError> {
        let mut properties = self.properties;
        for (name, value) in &self.pending_properties {
            properties.set(name, value)?;
        }
        let name = properties.parser_name.clone().unwrap_or(self.name);

        let mut parser = ActivityParser {
            name,
            properties,
            fields: Vec::with_capacity(self.fields.len()),
            resolver: self.resolver,
            cache: self.cache,
            pre_parsers: Mutex::new(self.pre_parsers),
            filters: Mutex::new(self.filters),
            next_lock: Mutex::new(()),
        };
        for field in self.fields {
            parser.add_field(field)?;
        }
        parser.organize_fields()?;

        debug!(
            parser = %parser.name,
            resolver = parser.resolver.name(),
            fields = parser.fields.len(),
            "activity parser configured"
        );
        Ok(parser)
    }
}

impl ActivityParser {
    /// 빌더를 반환합니다.
    pub fn builder(
        name: impl Into<String>,
        resolver: Box<dyn LocatorResolver>,
    ) -> ActivityParserBuilder {
        ActivityParserBuilder::new(name.into(), resolver)
    }

    /// 파서 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 파서 속성
    pub fn properties(&self) -> &ParserProperties {
        &self.properties
    }

    /// 해석 순서대로 정렬된 필드 목록
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// 엔진 변형 이름
    pub fn resolver_name(&self) -> &str {
        self.resolver.name()
    }

    /// 이름으로 속성 값을 조회합니다.
    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.get(name)
    }

    fn add_field(&mut self, field: Field) -> Result<(), EngineError> {
        let unsupported = self.resolver.unsupported_kinds();
        let kinds = field
            .locators()
            .iter()
            .chain(field.dynamic_locators().values())
            .map(|l| l.kind());
        for kind in kinds {
            if unsupported.contains(&kind) {
                return Err(EngineError::UnsupportedLocator {
                    field: field.name().to_owned(),
                    kind: kind.to_string(),
                });
            }
        }

        if !field.is_collection() && self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(EngineError::DuplicateField {
                field: field.name().to_owned(),
            });
        }

        if field.is_enumeration() && field.locators().len() > 1 {
            return Err(EngineError::ConflictingMapping {
                field: field.name().to_owned(),
                reason: "enumeration field must have a single locator".to_owned(),
            });
        }

        self.resolver.validate_field(&field)?;
        self.fields.push(field);
        Ok(())
    }

    /// 원시 데이터 한 건을 파싱합니다.
    ///
    /// 파싱할 내용이 없거나, 필수 값이 없어 항목이 드롭되면 `Ok(None)`을 반환합니다.
    /// 레코드 필터에 걸린 레코드는 `is_filtered()`가 `true`인 채로 반환됩니다.
    pub fn parse(
        &self,
        source: &dyn ActivitySource,
        data: impl Into<RawData>,
    ) -> Result<Option<ActivityRecord>, EngineError> {
        self.parse_with_metadata(source, data, BTreeMap::new())
    }

    /// 메타데이터와 함께 원시 데이터 한 건을 파싱합니다.
    pub fn parse_with_metadata(
        &self,
        source: &dyn ActivitySource,
        data: impl Into<RawData>,
        metadata: BTreeMap<String, Value>,
    ) -> Result<Option<ActivityRecord>, EngineError> {
        let started = Instant::now();

        let Some(raw) = self.read_next(data.into())? else {
            info!(parser = %self.name, "nothing to parse");
            return Ok(None);
        };

        let raw = match self.pre_parse(raw.clone()) {
            Ok(pre_parsed) => pre_parsed,
            Err(e) => {
                error!(parser = %self.name, error = %e, "pre-parsing failed, using original data");
                raw
            }
        };

        let Some(prepared) = self.resolver.prepare(&raw, &self.properties)? else {
            info!(parser = %self.name, data = raw.kind_name(), "nothing to parse");
            return Ok(None);
        };

        let mut ctx = ResolutionContext::new(source, self.name.as_str(), raw, prepared, metadata);
        if !self.parse_fields(&mut ctx)? {
            return Ok(None);
        }

        self.fill_default_message(&mut ctx, self.properties.use_activity_data_as_message)?;

        let mut record = ctx.into_record();
        self.post_parse(&mut record, true);
        if record.parent_id.is_none() {
            record.parent_id = source.grouping_activity_id();
        }

        metrics::histogram!(m::ENGINE_PARSE_DURATION_SECONDS, m::LABEL_PARSER => self.name.clone())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(m::ENGINE_ITEMS_PARSED_TOTAL, m::LABEL_PARSER => self.name.clone())
            .increment(1);
        Ok(Some(record))
    }

    /// 부모 필드 값을 이 파서로 파싱합니다 (스택 파싱).
    ///
    /// 이 변형이 받을 수 없는 데이터라면 `Ok(None)`을 반환해 다음 스택 파서에 넘깁니다.
    pub(crate) fn parse_stacked(
        &self,
        value: &Value,
        parent: &ResolutionContext<'_>,
    ) -> Result<Option<ActivityRecord>, EngineError> {
        let raw = RawData::from_value(value);
        let raw = match self.pre_parse(raw.clone()) {
            Ok(pre_parsed) => pre_parsed,
            Err(e) => {
                warn!(parser = %self.name, error = %e, "stacked pre-parsing failed, using original data");
                raw
            }
        };

        let prepared = match self.resolver.prepare(&raw, &self.properties) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => return Ok(None),
            Err(EngineError::UnsupportedData(kind)) => {
                debug!(parser = %self.name, data = %kind, "stacked parser skipped unsupported data");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut ctx = parent.child(self.name.as_str(), raw, prepared);
        ctx.record
            .set_ordinal(parent.record().child_count(&self.name) + 1);
        if !self.parse_fields(&mut ctx)? {
            return Ok(None);
        }
        self.fill_default_message(&mut ctx, false)?;

        let mut record = ctx.into_record();
        self.post_parse(&mut record, false);
        Ok(Some(record))
    }

    /// 메시지가 비어 있으면 해석기 기본 메시지로, 그것도 없으면 (`raw_text`일 때) 원시 텍스트로 채웁니다.
    fn fill_default_message(
        &self,
        ctx: &mut ResolutionContext<'_>,
        raw_text: bool,
    ) -> Result<(), EngineError> {
        if ctx.record.message.is_some() {
            return Ok(());
        }
        let text = match self.resolver.default_message(ctx) {
            Some(text) => Some(text),
            None if raw_text => ctx.raw().to_text(),
            None => None,
        };
        if let Some(text) = text {
            ctx.record.set_value("Message", Value::Str(text))?;
        }
        Ok(())
    }

    /// 필드를 순서대로 해석해 레코드에 적용합니다.
    ///
    /// 필수 값이 없으면 `Ok(false)`를 반환합니다. 최상위에서는 항목 전체가,
    /// 스택 파싱에서는 그 하위 레코드만 버려집니다.
    fn parse_fields(&self, ctx: &mut ResolutionContext<'_>) -> Result<bool, EngineError> {
        for field in &self.fields {
            ctx.field = Some(field.name().to_owned());
            let result = self
                .resolve_field(field, ctx)
                .and_then(|value| self.apply_field_value(field, value, ctx))
                .map_err(|e| e.for_field(field.name()));

            match result {
                Ok(()) => {}
                Err(EngineError::MissingValue { field, locator }) => {
                    if ctx.parent().is_some() {
                        warn!(
                            parser = %self.name,
                            field = %field,
                            locator = %locator,
                            "required value missing, skipping stacked record"
                        );
                    } else {
                        warn!(
                            parser = %self.name,
                            field = %field,
                            locator = %locator,
                            "required value missing, dropping item"
                        );
                        metrics::counter!(m::ENGINE_ITEMS_DROPPED_TOTAL,
                            m::LABEL_PARSER => self.name.clone(),
                            m::LABEL_FIELD => field)
                        .increment(1);
                    }
                    ctx.invalidate();
                    return Ok(false);
                }
                Err(e) => {
                    if ctx.parent().is_none() {
                        metrics::counter!(m::ENGINE_PARSE_FAILURES_TOTAL,
                            m::LABEL_PARSER => self.name.clone(),
                            m::LABEL_FIELD => field.name().to_owned())
                        .increment(1);
                    }
                    ctx.invalidate();
                    return Err(e);
                }
            }
        }
        ctx.field = None;
        Ok(true)
    }

    /// 해석된 값을 레코드에 적용합니다.
    ///
    /// 동적 필드나 나눠야 할 목록 값은 원소별로 확장합니다. 스택 파서가 있으면
    /// 값을 넘겨 결과를 병합하거나 자식으로 붙이고, 어느 스택 파서도 받지 않으면
    /// 필드에 직접 적용합니다.
    fn apply_field_value(
        &self,
        field: &Field,
        value: Option<Value>,
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<(), EngineError> {
        let Some(value) = value else {
            return Ok(());
        };

        if field.is_dynamic() || (field.is_split() && value.is_iterable()) {
            return self.apply_dynamic_value(field, value, ctx);
        }

        let mut applied = false;
        for stacked in field.stacked_parsers() {
            let parser = stacked.parser();
            let Some(mut sub) = parser.parse_stacked(&value, ctx)? else {
                continue;
            };
            match stacked.aggregation() {
                Aggregation::Merge => ctx.record.merge(sub),
                Aggregation::Relate => {
                    sub.determine_times();
                    ctx.record.add_child(parser.name(), sub, stacked.flatten());
                }
            }
            applied = true;
        }

        if !applied {
            ctx.record.apply_field(field, Some(value))?;
        }
        Ok(())
    }

    /// 리더 입력이면 다음 항목을 읽습니다. 입력이 끝났으면 `None`.
    fn read_next(&self, raw: RawData) -> Result<Option<RawData>, EngineError> {
        let RawData::Reader(reader) = raw else {
            return Ok(Some(raw));
        };

        let _guard = self.next_lock.lock();
        let mut reader = reader.lock();
        match self.properties.activity_delim {
            ActivityDelim::Eol => loop {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    return Ok(None);
                }
                let line = line.trim_end_matches(['\r', '\n']);
                if !line.trim().is_empty() {
                    return Ok(Some(RawData::Text(line.to_owned())));
                }
            },
            ActivityDelim::Eof => {
                let mut all = String::new();
                reader.read_to_string(&mut all)?;
                Ok((!all.trim().is_empty()).then_some(RawData::Text(all)))
            }
        }
    }

    /// 전처리기 체인을 실행합니다.
    fn pre_parse(&self, raw: RawData) -> Result<RawData, EngineError> {
        let mut pre_parsers = self.pre_parsers.lock();
        let last = pre_parsers.len().saturating_sub(1);
        let mut data = raw;
        for (i, pre_parser) in pre_parsers.iter_mut().enumerate() {
            if !pre_parser.is_applicable(&data) {
                continue;
            }
            match pre_parser.pre_parse(data.clone()) {
                Ok(next) => data = next,
                Err(e) if i < last => {
                    warn!(
                        parser = %self.name,
                        pre_parser = pre_parser.name(),
                        error = %e,
                        "pre-parser failed, continuing with unchanged data"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(data)
    }

    /// 완성된 레코드에 시간 계산, 레코드 필터, 추적 ID, 캐시 기록을 적용합니다.
    fn post_parse(&self, record: &mut ActivityRecord, top_level: bool) {
        record.set_complete();
        if top_level {
            record.determine_times();
        }

        let filtered = self.is_record_filtered(record);
        record.set_filtered(filtered);
        if filtered {
            debug!(parser = %self.name, "activity filtered out");
            metrics::counter!(m::ENGINE_ITEMS_FILTERED_TOTAL, m::LABEL_PARSER => self.name.clone())
                .increment(1);
            return;
        }

        if top_level {
            record.determine_tracking_id();
            if let Some(cache) = &self.cache {
                cache.cache_values(record, &self.name);
            }
        }
    }

    fn is_record_filtered(&self, record: &ActivityRecord) -> bool {
        let mut filters = self.filters.lock();
        for filter in filters.iter_mut() {
            match filter.is_filtered(record) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(parser = %self.name, filter = filter.name(), error = %e, "activity filter failed");
                    metrics::counter!(m::ENGINE_FILTER_FAILURES_TOTAL, m::LABEL_PARSER => self.name.clone())
                        .increment(1);
                }
            }
        }
        false
    }
}

impl fmt::Debug for ActivityParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityParser")
            .field("name", &self.name)
            .field("resolver", &self.resolver.name())
            .field(
                "fields",
                &self.fields.iter().map(Field::name).collect::<Vec<_>>(),
            )
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
