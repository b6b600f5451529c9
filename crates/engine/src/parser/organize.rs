//! 필드 참조 검증과 의존성 순서 정렬

use std::collections::HashSet;

use actistream_core::types::FieldKind;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::field::{Aggregation, Field};
use crate::graph::DependencyGraph;
use crate::template;

use super::ActivityParser;

impl ActivityParser {
    /// 필드 참조를 검증하고, 설정에 따라 의존성 순서로 필드를 재배열합니다.
    ///
    /// 참조 대상은 이 파서의 필드이거나 스택 파서(하위 포함)의 필드여야 합니다.
    /// 동적 필드가 있으면 이름을 미리 알 수 없으므로 알 수 없는 참조를 허용합니다.
    /// 순환은 자동 정렬 여부와 관계없이 구성 에러입니다.
    pub(super) fn organize_fields(&mut self) -> Result<(), EngineError> {
        let mut all_fields: Vec<&Field> = Vec::new();
        collect_fields(&self.fields, &mut all_fields);
        let known: HashSet<&str> = all_fields.iter().map(|f| f.name()).collect();
        let has_dynamic = all_fields.iter().any(|f| f.is_dynamic());

        let mut graph = DependencyGraph::new(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            for reference in field.referenced_fields() {
                if template::is_parent_ref(&reference)
                    || template::is_context_placeholder(&reference)
                    || FieldKind::from_name(&reference).is_some_and(|k| k.is_auto_assignable())
                {
                    continue;
                }

                let mut found = false;
                for (j, dependency) in self.fields.iter().enumerate() {
                    if dependency.name() == reference {
                        graph.add_edge(j, i);
                        found = true;
                    }
                }
                if !found && !known.contains(reference.as_str()) && !has_dynamic {
                    return Err(EngineError::UnknownReference {
                        field: field.name().to_owned(),
                        reference,
                    });
                }
            }
        }

        let order = graph
            .topological_order()
            .map_err(|node| EngineError::CyclicDependency {
                field: self.fields[node].name().to_owned(),
            })?;

        self.warn_merge_conflicts();

        if self.properties.auto_arrange_fields && graph.edge_count() > 0 {
            let mut slots: Vec<Option<Field>> =
                std::mem::take(&mut self.fields).into_iter().map(Some).collect();
            self.fields = order.iter().filter_map(|&i| slots[i].take()).collect();
            debug!(
                parser = %self.name,
                order = ?self.fields.iter().map(Field::name).collect::<Vec<_>>(),
                "fields arranged by dependency"
            );
        }
        Ok(())
    }

    /// 병합 스택 파서가 이 파서의 단일 값 필드와 같은 이름의 필드를 가지면 경고합니다.
    ///
    /// 병합 결과는 비어 있는 슬롯만 채우므로 한쪽 값이 무시될 수 있습니다.
    fn warn_merge_conflicts(&self) {
        for field in &self.fields {
            for stacked in field.stacked_parsers() {
                if stacked.aggregation() != Aggregation::Merge {
                    continue;
                }
                for sub in stacked.parser().fields() {
                    let clash = self
                        .fields
                        .iter()
                        .any(|own| own.name() == sub.name() && !own.is_collection());
                    if clash {
                        warn!(
                            parser = %self.name,
                            stacked = stacked.parser().name(),
                            field = sub.name(),
                            "merged stacked parser defines a field already set by this parser"
                        );
                    }
                }
            }
        }
    }
}

/// 필드와 스택 파서의 필드를 재귀적으로 모읍니다.
fn collect_fields<'a>(fields: &'a [Field], out: &mut Vec<&'a Field>) {
    for field in fields {
        out.push(field);
        for stacked in field.stacked_parsers() {
            collect_fields(stacked.parser().fields(), out);
        }
    }
}
