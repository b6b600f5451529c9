//! 정규식 해석기
//!
//! 입력 전체가 패턴에 일치해야 활동이 만들어집니다. 로케이터는 캡처 그룹을
//! 번호(`RegexGroupNum`)나 이름(`RegexGroupName`)으로, 또는 입력 안에서 찾은
//! 연속 매치를 번호(`RegexMatchNum`, 1부터)로 가리킵니다. `Label` 로케이터는
//! 숫자면 그룹 번호, 아니면 그룹 이름으로 해석합니다.
//!
//! 연속 매치는 필드 등록 시 `RegexMatchNum` 로케이터가 있었던 경우에만 수집합니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use ::regex::Regex;
use tracing::debug;

use actistream_core::types::Value;

use crate::config::ParserProperties;
use crate::context::{PreparedData, RawData, ResolutionContext};
use crate::error::EngineError;
use crate::field::Field;
use crate::locator::{Locator, LocatorKind};

use super::{LocatorResolver, Resolved, raw_text, unsupported};

const UNSUPPORTED: [LocatorKind; 1] = [LocatorKind::Index];

/// 정규식 매칭 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegexCaptures {
    /// 번호별 캡처 그룹 (0 = 전체 매치)
    pub groups: Vec<Option<String>>,
    /// 이름 있는 캡처 그룹
    pub named: BTreeMap<String, String>,
    /// 입력 안의 연속 매치 (0번은 빈 자리)
    pub matches: Vec<String>,
}

/// 정규식 해석기
#[derive(Debug)]
pub struct RegexResolver {
    pattern: Regex,
    anchored: Regex,
    /// 등록된 필드 중 매치 번호 로케이터가 있는지
    match_numbers: AtomicBool,
}

impl RegexResolver {
    /// 패턴으로 해석기를 생성합니다.
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        if pattern.is_empty() {
            return Err(EngineError::Config {
                field: "pattern".to_owned(),
                reason: "regex pattern must not be empty".to_owned(),
            });
        }
        Ok(Self {
            pattern: Regex::new(pattern)?,
            anchored: Regex::new(&format!("^(?:{pattern})$"))?,
            match_numbers: AtomicBool::new(false),
        })
    }

    /// 원래 패턴
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// 연속 매치를 수집하는지 (매치 번호 로케이터를 가진 필드가 등록되었는지)
    pub fn collects_matches(&self) -> bool {
        self.match_numbers.load(Ordering::Relaxed)
    }

    fn captures(&self, text: &str) -> Option<RegexCaptures> {
        let caps = self.anchored.captures(text)?;
        let groups = caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_owned()))
            .collect();
        let named = self
            .anchored
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_owned(), m.as_str().to_owned())))
            .collect();
        let matches = if self.collects_matches() {
            std::iter::once(String::new())
                .chain(
                    self.pattern
                        .find_iter(text)
                        .map(|m| m.as_str().trim().to_owned()),
                )
                .collect()
        } else {
            Vec::new()
        };
        Some(RegexCaptures {
            groups,
            named,
            matches,
        })
    }
}

fn parse_position(locator: &Locator) -> Result<usize, EngineError> {
    locator
        .locator()
        .trim()
        .parse()
        .map_err(|_| EngineError::Format {
            locator: locator.locator().to_owned(),
            reason: "expected a non-negative position".to_owned(),
        })
}

impl LocatorResolver for RegexResolver {
    fn name(&self) -> &str {
        "regex"
    }

    fn unsupported_kinds(&self) -> &[LocatorKind] {
        &UNSUPPORTED
    }

    fn prepare(
        &self,
        raw: &RawData,
        _props: &ParserProperties,
    ) -> Result<Option<PreparedData>, EngineError> {
        let text = raw_text(raw).ok_or_else(|| unsupported(self.name(), raw))?;
        if text.is_empty() {
            return Ok(None);
        }
        match self.captures(&text) {
            Some(captures) => Ok(Some(PreparedData::Captures(captures))),
            None => {
                debug!(pattern = self.pattern(), "input does not match pattern");
                Ok(None)
            }
        }
    }

    /// 매치 번호 로케이터와 그룹 로케이터를 한 필드에 섞으면 충돌입니다.
    ///
    /// 매치 번호 로케이터(동적 로케이터 포함)가 있으면 이후 항목부터 연속 매치를 수집합니다.
    fn validate_field(&self, field: &Field) -> Result<(), EngineError> {
        let is_group = |k: LocatorKind| {
            matches!(
                k,
                LocatorKind::Label | LocatorKind::RegexGroupNum | LocatorKind::RegexGroupName
            )
        };
        let kinds: Vec<LocatorKind> = field.locators().iter().map(Locator::kind).collect();
        if kinds.contains(&LocatorKind::RegexMatchNum) && kinds.iter().any(|k| is_group(*k)) {
            return Err(EngineError::ConflictingMapping {
                field: field.name().to_owned(),
                reason: "match-number and group locators cannot be mixed".to_owned(),
            });
        }
        let uses_matches = field
            .locators()
            .iter()
            .chain(field.dynamic_locators().values())
            .any(|l| l.kind() == LocatorKind::RegexMatchNum);
        if uses_matches {
            self.match_numbers.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// 전체 매치 텍스트
    fn default_message(&self, ctx: &ResolutionContext<'_>) -> Option<String> {
        match ctx.data() {
            PreparedData::Captures(caps) => caps.groups.first().cloned().flatten(),
            _ => None,
        }
    }

    fn resolve(
        &self,
        locator: &Locator,
        ctx: &ResolutionContext<'_>,
        _props: &ParserProperties,
    ) -> Result<Resolved, EngineError> {
        let PreparedData::Captures(caps) = ctx.data() else {
            return Ok(Resolved::raw(None));
        };
        let text = match locator.kind() {
            LocatorKind::RegexGroupNum => caps.groups.get(parse_position(locator)?).cloned().flatten(),
            LocatorKind::RegexMatchNum => caps.matches.get(parse_position(locator)?).cloned(),
            LocatorKind::RegexGroupName => caps.named.get(locator.locator()).cloned(),
            LocatorKind::Label => match locator.locator().trim().parse::<usize>() {
                Ok(n) => caps.groups.get(n).cloned().flatten(),
                Err(_) => caps.named.get(locator.locator()).cloned(),
            },
            _ => None,
        };
        Ok(Resolved::raw(text.map(Value::Str)))
    }
}
