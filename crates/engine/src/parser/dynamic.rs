//! 동적 필드 확장
//!
//! 동적 필드(이름이나 로케이터에 `${id}`가 들어간 필드)와 나눠 적용할 목록 값은
//! 원소마다 임시 필드를 만들어 레코드에 적용합니다. 이름이 겹치는 임시 필드는
//! 증가하는 숫자 접미어를 붙여 구분합니다.

use std::collections::{BTreeMap, HashSet};

use actistream_core::types::Value;
use tracing::trace;

use crate::context::ResolutionContext;
use crate::error::EngineError;
use crate::field::Field;
use crate::transform::Bindings;

use super::ActivityParser;

impl ActivityParser {
    pub(super) fn apply_dynamic_value(
        &self,
        field: &Field,
        value: Value,
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<(), EngineError> {
        let mut dynamic_values = BTreeMap::new();
        for (id, locator) in field.dynamic_locators() {
            if let Some(v) = self.resolve_locator(locator, ctx)? {
                dynamic_values.insert(id.clone(), v);
            }
        }

        let elements: Vec<(String, Value)> = match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Value::Map(map) => map.into_iter().collect(),
            other => vec![("0".to_owned(), other)],
        };

        let mut names = HashSet::with_capacity(elements.len());
        let mut suffix = 0usize;
        for (index, (key, element)) in elements.into_iter().enumerate() {
            let mut temp = field.temp_field(&dynamic_values, index, &key);
            if names.contains(temp.name()) {
                suffix += 1;
                let renamed = format!("{}{suffix}", temp.name());
                temp.rename(renamed);
            }
            names.insert(temp.name().to_owned());

            let filtered = {
                let bindings =
                    Bindings::new(ctx.record(), Some(temp.name()), &self.properties.custom);
                temp.locators()
                    .first()
                    .is_some_and(|l| self.is_value_filtered(l, Some(&element), &bindings))
            };
            if filtered {
                trace!(parser = %self.name, field = temp.name(), "dynamic element filtered out");
                continue;
            }
            ctx.record
                .apply_field(&temp, Some(element))
                .map_err(|e| e.for_field(temp.name()))?;
        }
        Ok(())
    }
}
