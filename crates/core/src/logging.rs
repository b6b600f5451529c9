//! 로깅 초기화
//!
//! `log_level`은 actistream 크레이트(엔진, 파서, 설정)에만 적용되고, 나머지 의존
//! 크레이트는 `warn`으로 고정됩니다. `RUST_LOG`가 설정되어 있으면 그 지시문을 그대로 씁니다.
//!
//! 파싱된 레코드를 stdout으로 내보내는 도구와 섞이지 않도록 로그는 stderr로 씁니다.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::GeneralConfig;

/// `log_level`이 적용되는 타깃
const ENGINE_TARGETS: [&str; 2] = ["actistream_core", "actistream_engine"];

/// 의존 크레이트 로그 레벨
const DEPENDENCY_LEVEL: &str = "warn";

/// 설정에서 `EnvFilter` 지시문을 만듭니다.
///
/// `extra_targets`는 호출하는 바이너리 자신의 타깃처럼 같은 레벨을 받을 타깃입니다.
pub fn filter_directives(config: &GeneralConfig, extra_targets: &[&str]) -> String {
    let level = config.log_level.trim().to_ascii_lowercase();
    ENGINE_TARGETS
        .iter()
        .chain(extra_targets)
        .fold(DEPENDENCY_LEVEL.to_owned(), |mut directives, target| {
            directives.push_str(&format!(",{target}={level}"));
            directives
        })
}

/// 전역 tracing subscriber를 초기화합니다.
///
/// 프로세스당 한 번만 호출해야 합니다. 두 번째 호출은 에러를 반환합니다.
///
/// # Formats
///
/// * `"json"` - JSON lines (운영 환경 기본값)
/// * `"pretty"` - 사람이 읽기 쉬운 출력 (개발용)
pub fn init_tracing(config: &GeneralConfig, extra_targets: &[&str]) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config, extra_targets))
            .with_context(|| format!("invalid log level '{}'", config.log_level))?,
    };
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("failed to initialize JSON tracing subscriber")?,
        "pretty" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("failed to initialize pretty tracing subscriber")?,
        other => anyhow::bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    }

    tracing::debug!(
        level = %config.log_level,
        format = %config.log_format,
        "tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn general(level: &str, format: &str) -> GeneralConfig {
        GeneralConfig {
            log_level: level.to_owned(),
            log_format: format.to_owned(),
        }
    }

    #[test]
    fn level_applies_to_engine_targets_only() {
        assert_eq!(
            filter_directives(&general("debug", "json"), &[]),
            "warn,actistream_core=debug,actistream_engine=debug"
        );
    }

    #[test]
    fn extra_targets_share_the_level() {
        let directives = filter_directives(&general(" TRACE ", "json"), &["parse_lines"]);
        assert!(directives.starts_with("warn,"));
        assert!(directives.ends_with(",parse_lines=trace"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = init_tracing(&general("info", "xml"), &[]).unwrap_err();
        assert!(err.to_string().contains("unknown log format"));
    }
}
