//! 로케이터/필드 값 해석

use actistream_core::metrics as m;
use actistream_core::types::{Value, simplify_values};
use tracing::{trace, warn};

use crate::context::ResolutionContext;
use crate::error::EngineError;
use crate::field::Field;
use crate::locator::{Locator, LocatorKind};
use crate::resolver::{Resolved, map_value_at_path};
use crate::template::{self, PARENT_REF_PREFIX};
use crate::transform::{Bindings, TransformPhase};

use super::ActivityParser;

impl ActivityParser {
    /// 필드의 모든 로케이터를 해석해 하나의 값으로 모읍니다.
    ///
    /// 필수 로케이터가 값을 내지 못하면 `MissingValue`를 반환합니다.
    pub(super) fn resolve_field(
        &self,
        field: &Field,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Value>, EngineError> {
        let require = field
            .required_default()
            .unwrap_or(self.properties.require_default);

        let mut values = Vec::with_capacity(field.locators().len());
        for locator in field.locators() {
            let value = self.resolve_locator(locator, ctx)?;
            if value.is_none() && locator.is_required(require) {
                return Err(EngineError::MissingValue {
                    field: field.name().to_owned(),
                    locator: locator.locator().to_owned(),
                });
            }
            values.push(value);
        }
        Ok(simplify_values(values))
    }

    /// 로케이터 하나를 해석합니다.
    ///
    /// 원시 값 조회, 빈 값 처리, 원시 단계 변환, 형식 변환, 형식 후 변환, 값 필터 순서입니다.
    pub(super) fn resolve_locator(
        &self,
        locator: &Locator,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Option<Value>, EngineError> {
        let resolved = self.lookup(locator, ctx)?;
        trace!(
            parser = %self.name,
            field = ctx.field().unwrap_or_default(),
            locator = locator.locator(),
            value = ?resolved.value,
            "locator resolved"
        );

        let mut value = resolved.value;
        if locator.empty_as_null() && value.as_ref().is_some_and(Value::is_empty_content) {
            value = None;
        }

        let bindings = Bindings::new(ctx.record(), ctx.field(), &self.properties.custom);
        value = self.run_transforms(locator, TransformPhase::Raw, value, &bindings);
        if !resolved.formatted {
            value = value.map(|v| locator.format_value(v)).transpose()?;
        }
        value = self.run_transforms(locator, TransformPhase::Formatted, value, &bindings);

        if self.is_value_filtered(locator, value.as_ref(), &bindings) {
            trace!(parser = %self.name, locator = locator.locator(), "value filtered out");
            return Ok(None);
        }
        Ok(value)
    }

    /// 로케이터 종류에 따라 원시 값을 찾습니다.
    fn lookup(
        &self,
        locator: &Locator,
        ctx: &ResolutionContext<'_>,
    ) -> Result<Resolved, EngineError> {
        if locator.is_data_placeholder() {
            return Ok(Resolved::raw(ctx.raw().to_value()));
        }
        let delim = self.properties.composite_delim.as_str();
        if let Some(path) = locator.metadata_path(delim) {
            let segments: Vec<String> = path
                .split(delim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            return Ok(Resolved::raw(map_value_at_path(ctx.metadata(), &segments)));
        }

        let name = locator.locator();
        if name.is_empty() {
            return Ok(Resolved::raw(None));
        }
        let value = match locator.kind() {
            LocatorKind::StreamProp => ctx.source().property(name),
            LocatorKind::ParserProp => self.properties.get(name).map(Value::Str),
            LocatorKind::SystemProp => system_property(name).map(Value::Str),
            LocatorKind::EnvVariable => std::env::var(name).ok().map(Value::Str),
            LocatorKind::Cache => self
                .cache
                .as_ref()
                .and_then(|cache| cache.get_value(ctx.record(), name, &self.name)),
            LocatorKind::Activity => activity_value(name, ctx),
            LocatorKind::Expression => Some(expression_value(name, ctx)),
            _ => return self.resolver.resolve(locator, ctx, &self.properties),
        };
        Ok(Resolved::raw(value))
    }

    fn run_transforms(
        &self,
        locator: &Locator,
        phase: TransformPhase,
        mut value: Option<Value>,
        bindings: &Bindings<'_>,
    ) -> Option<Value> {
        for transform in locator.transforms(phase) {
            match transform.transform(value.clone(), bindings) {
                Ok(next) => value = next,
                Err(e) => {
                    warn!(
                        parser = %self.name,
                        transform = transform.name(),
                        %phase,
                        error = %e,
                        "value transform failed, keeping value"
                    );
                    metrics::counter!(m::ENGINE_TRANSFORM_FAILURES_TOTAL,
                        m::LABEL_PARSER => self.name.clone(),
                        m::LABEL_PHASE => phase.to_string())
                    .increment(1);
                }
            }
        }
        value
    }

    pub(super) fn is_value_filtered(
        &self,
        locator: &Locator,
        value: Option<&Value>,
        bindings: &Bindings<'_>,
    ) -> bool {
        for filter in locator.filters() {
            match filter.is_filtered(value, bindings) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(parser = %self.name, filter = filter.name(), error = %e, "value filter failed");
                    metrics::counter!(m::ENGINE_FILTER_FAILURES_TOTAL, m::LABEL_PARSER => self.name.clone())
                        .increment(1);
                }
            }
        }
        false
    }
}

/// 같은 레코드 또는 `^.` 개수만큼 위 조상 레코드의 필드 값
fn activity_value(name: &str, ctx: &ResolutionContext<'_>) -> Option<Value> {
    let mut depth = 0;
    let mut name = name;
    while let Some(rest) = name.strip_prefix(PARENT_REF_PREFIX) {
        depth += 1;
        name = rest;
    }
    ctx.ancestor(depth)?.record().field_value(name)
}

/// 플레이스홀더 하나로만 된 표현식은 참조 값의 타입을 유지합니다.
fn expression_value(expr: &str, ctx: &ResolutionContext<'_>) -> Value {
    if let Some(value) = template::sole_var(expr).and_then(|name| activity_value(name, ctx)) {
        return value;
    }
    let (text, _) = template::fill(expr, |name| {
        activity_value(name, ctx).map(|v| v.to_string())
    });
    Value::Str(text)
}

/// 프로세스 속성
///
/// 잘 알려진 이름은 실행 환경에서 구하고, 나머지는 같은 이름의 환경변수로 찾습니다.
fn system_property(name: &str) -> Option<String> {
    match name {
        "os.name" => Some(std::env::consts::OS.to_owned()),
        "os.arch" => Some(std::env::consts::ARCH.to_owned()),
        "file.separator" => Some(std::path::MAIN_SEPARATOR.to_string()),
        "line.separator" => Some("\n".to_owned()),
        "user.dir" => std::env::current_dir()
            .ok()
            .map(|p| p.display().to_string()),
        "user.name" => std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok(),
        "tmp.dir" => Some(std::env::temp_dir().display().to_string()),
        "process.id" => Some(std::process::id().to_string()),
        other => std::env::var(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::context::{RawData, StaticSource};
    use crate::resolver::JsonResolver;
    use crate::transform::{FnFilter, FnTransform};

    fn parser(fields: Vec<Field>) -> ActivityParser {
        fields
            .into_iter()
            .fold(
                ActivityParser::builder("json", Box::new(JsonResolver::new()))
                    .property("Owner", "ops"),
                super::super::ActivityParserBuilder::field,
            )
            .build()
            .unwrap()
    }

    fn parse(parser: &ActivityParser, input: &str) -> crate::activity::ActivityRecord {
        let source = StaticSource::new("test");
        parser.parse(&source, input).unwrap().unwrap()
    }

    #[test]
    fn data_placeholder_yields_raw_input() {
        let p = parser(vec![
            Field::new("Message").with_locator(Locator::new(LocatorKind::Label, "$DATA$")),
        ]);
        let record = parse(&p, r#"{"a":1}"#);
        assert_eq!(record.message.as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn parser_property_locator() {
        let p = parser(vec![
            Field::new("UserName").with_locator(Locator::new(LocatorKind::ParserProp, "Owner")),
        ]);
        assert_eq!(parse(&p, "{}").user_name.as_deref(), Some("ops"));
    }

    #[test]
    fn system_property_locator() {
        let p = parser(vec![
            Field::new("Location").with_locator(Locator::new(LocatorKind::SystemProp, "os.name")),
        ]);
        assert_eq!(parse(&p, "{}").location.as_deref(), Some(std::env::consts::OS));
    }

    #[test]
    fn empty_as_null_drops_blank_values() {
        let p = parser(vec![
            Field::new("Note").with_locator(Locator::label("note")),
            Field::new("Detail").with_locator(Locator::label("detail").with_empty_as_null(false)),
        ]);
        let record = parse(&p, r#"{"note":"  ","detail":""}"#);
        assert!(!record.properties.contains_key("Note"));
        assert_eq!(record.properties.get("Detail"), Some(&Value::str("")));
    }

    #[test]
    fn failing_transform_keeps_value() {
        let p = parser(vec![
            Field::new("EventName").with_locator(Locator::label("name").with_transform(
                std::sync::Arc::new(FnTransform::new("broken", |_, _| Err("nope".to_owned()))),
            )),
        ]);
        assert_eq!(parse(&p, r#"{"name":"kept"}"#).event_name.as_deref(), Some("kept"));
    }

    #[test]
    fn raw_transform_runs_before_formatting() {
        let upper = FnTransform::new("upper", |v: Option<Value>, _: &Bindings<'_>| {
            Ok(v.map(|v| Value::Str(v.to_string().to_uppercase())))
        })
        .phase(TransformPhase::Raw);
        let p = parser(vec![
            Field::new("Severity")
                .with_locator(Locator::label("lvl").with_transform(std::sync::Arc::new(upper))),
        ]);
        let record = parse(&p, r#"{"lvl":"warning"}"#);
        assert_eq!(record.severity, Some(actistream_core::types::OpLevel::Warning));
    }

    #[test]
    fn filtered_value_is_absent() {
        let filter = FnFilter::new("drop-debug", |v: Option<&Value>, _: &Bindings<'_>| {
            Ok(v.is_some_and(|v| v.to_string() == "debug"))
        });
        let p = parser(vec![
            Field::new("Tag")
                .with_locator(Locator::label("tag").with_filter(std::sync::Arc::new(filter))),
        ]);
        assert!(parse(&p, r#"{"tag":"debug"}"#).tags.is_empty());
        assert_eq!(parse(&p, r#"{"tag":"web"}"#).tags, vec!["web".to_owned()]);
    }

    #[test]
    fn sole_variable_expression_keeps_type() {
        let p = parser(vec![
            Field::new("ElapsedTime").with_locator(Locator::label("took")),
            Field::new("Duration").with_locator(Locator::expression("${ElapsedTime}")),
            Field::new("Message").with_locator(Locator::expression("took ${ElapsedTime}us")),
        ]);
        let record = parse(&p, r#"{"took":250}"#);
        assert_eq!(record.elapsed_time, 250);
        assert_eq!(record.message.as_deref(), Some("took 250us"));
        assert!(record.properties.contains_key("Duration"));
    }

    #[test]
    fn metadata_root_placeholder() {
        let p = parser(vec![
            Field::new("Origin").with_locator(Locator::label("$METADATA$.origin")),
        ]);
        let source = StaticSource::new("test");
        let mut metadata = BTreeMap::new();
        metadata.insert("origin".to_owned(), Value::str("kafka"));
        let record = p
            .parse_with_metadata(&source, RawData::from("{}"), metadata)
            .unwrap()
            .unwrap();
        assert_eq!(record.properties.get("Origin"), Some(&Value::str("kafka")));
    }
}
