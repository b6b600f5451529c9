//! 설정의 정의 디렉토리로 레지스트리를 만들고, stdin 입력을 파서 하나로 파싱해
//! 전달 단위를 JSON 줄로 stdout에 출력합니다. 로그는 stderr로 나갑니다.
//!
//! ```text
//! cargo run -p actistream-engine --example parse_lines -- actistream.toml orders < input.log
//! ```

use std::io::{BufRead, Read, Write};

use anyhow::{Context, Result};

use actistream_core::config::ActistreamConfig;
use actistream_core::logging::init_tracing;
use actistream_engine::{ActivityDelim, ParserRegistry, StaticSource};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "actistream.toml".to_owned());
    let parser_name = args
        .next()
        .context("usage: parse_lines <config> <parser>")?;

    let config = ActistreamConfig::load(&config_path).await?;
    config.validate()?;
    init_tracing(&config.general, &["parse_lines"])?;

    let registry = ParserRegistry::load(&config.engine).await?;
    let parser = registry.get(&parser_name).with_context(|| {
        format!(
            "unknown parser '{parser_name}', available: {}",
            registry.names().collect::<Vec<_>>().join(", ")
        )
    })?;
    tracing::info!(config = %config_path, parser = %parser_name, "parsing stdin");

    let mut input = std::io::stdin().lock();
    let items: Vec<String> = match parser.properties().activity_delim {
        ActivityDelim::Eof => {
            let mut all = String::new();
            input.read_to_string(&mut all)?;
            vec![all]
        }
        ActivityDelim::Eol => input.lines().collect::<Result<_, _>>()?,
    };

    let source = StaticSource::new("stdin");
    let mut out = std::io::stdout().lock();
    let (mut parsed, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for item in items.into_iter().filter(|item| !item.trim().is_empty()) {
        match parser.parse(&source, item) {
            Ok(Some(record)) if record.is_filtered() => skipped += 1,
            Ok(Some(record)) => {
                parsed += 1;
                for unit in record.into_delivery_units() {
                    serde_json::to_writer(&mut out, &unit)?;
                    writeln!(out)?;
                }
            }
            Ok(None) => skipped += 1,
            Err(e) => {
                failed += 1;
                tracing::error!(parser = %parser_name, error = %e, "failed to parse item");
            }
        }
    }

    tracing::info!(parsed, skipped, failed, "input processed");
    Ok(())
}
