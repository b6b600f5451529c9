//! 활동 파서 벤치마크
//!
//! JSON / 정규식 변형의 항목당 파싱 비용과 동적 확장, 스택 파싱 비용을 측정합니다.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use actistream_engine::{
    ActivityParser, Aggregation, Field, JsonResolver, Locator, LocatorKind, RegexResolver,
    StackedParserRef, StaticSource, TimeUnit,
};

/// JSON 짧은 이벤트
const JSON_SHORT: &str = r#"{"event":"login","level":"INFO","ts":1700000000000,"user":"alice"}"#;

/// JSON 긴 이벤트 (동적 필드 포함)
const JSON_METRICS: &str = r#"{"event":"sample","level":"WARNING","ts":1700000000000,"names":["cpu","mem","disk","net","cpu","mem"],"values":[12,48,71,3,15,50]}"#;

/// JSON 중첩 이벤트 (스택 파서)
const JSON_NESTED: &str = r#"{"event":"write","payload":{"op":"insert","table":"orders","took_us":125}}"#;

/// 정규식 로그 라인
const LOG_LINE: &str = "2024-01-15 12:00:00 ERROR auth-service Failed password for root from 192.168.1.100";

fn json_parser() -> ActivityParser {
    ActivityParser::builder("events", Box::new(JsonResolver::new()))
        .field(Field::new("EventName").with_locator(Locator::label("event")))
        .field(Field::new("Severity").with_locator(Locator::label("level")))
        .field(
            Field::new("StartTime")
                .with_locator(Locator::label("ts").with_units(TimeUnit::Milliseconds)),
        )
        .field(Field::new("UserName").with_locator(Locator::label("user")))
        .field(Field::new("Message").with_locator(Locator::expression("${UserName} ${EventName}")))
        .build()
        .unwrap()
}

fn metrics_parser() -> ActivityParser {
    ActivityParser::builder("metrics", Box::new(JsonResolver::new()))
        .field(Field::new("EventName").with_locator(Locator::label("event")))
        .field(
            Field::new("${Metric}")
                .with_locator(Locator::label("values.*"))
                .with_dynamic_locator("Metric", Locator::label("names.*")),
        )
        .build()
        .unwrap()
}

fn nested_parser() -> ActivityParser {
    let payload = Arc::new(
        ActivityParser::builder("payload", Box::new(JsonResolver::new()))
            .field(Field::new("ResourceName").with_locator(Locator::label("table")))
            .field(Field::new("ElapsedTime").with_locator(Locator::label("took_us")))
            .build()
            .unwrap(),
    );
    ActivityParser::builder("envelope", Box::new(JsonResolver::new()))
        .field(Field::new("EventName").with_locator(Locator::label("event")))
        .field(
            Field::new("Payload")
                .with_locator(Locator::label("payload"))
                .with_stacked_parser(StackedParserRef::new(payload, Aggregation::Relate, true)),
        )
        .build()
        .unwrap()
}

fn regex_parser() -> ActivityParser {
    let pattern = r"(?P<date>\S+ \S+) (?P<level>\w+) (?P<app>\S+) (?P<msg>.*)";
    ActivityParser::builder("syslog", Box::new(RegexResolver::new(pattern).unwrap()))
        .field(
            Field::new("StartTime").with_locator(
                Locator::new(LocatorKind::RegexGroupName, "date")
                    .with_data_type(actistream_engine::DataType::DateTime)
                    .with_format("%Y-%m-%d %H:%M:%S"),
            ),
        )
        .field(Field::new("Severity").with_locator(Locator::new(LocatorKind::RegexGroupName, "level")))
        .field(Field::new("ApplName").with_locator(Locator::new(LocatorKind::RegexGroupName, "app")))
        .field(Field::new("Message").with_locator(Locator::new(LocatorKind::RegexGroupName, "msg")))
        .build()
        .unwrap()
}

fn bench_json_parser(c: &mut Criterion) {
    let parser = json_parser();
    let source = StaticSource::new("bench");

    let mut group = c.benchmark_group("json_parser");

    group.throughput(Throughput::Elements(1));
    group.bench_function("short", |b| {
        b.iter(|| parser.parse(&source, black_box(JSON_SHORT)).unwrap())
    });

    // 1000건 반복 처리량
    group.throughput(Throughput::Elements(1000));
    group.bench_function("throughput_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                parser.parse(&source, black_box(JSON_SHORT)).unwrap();
            }
        })
    });

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let metrics = metrics_parser();
    let nested = nested_parser();
    let source = StaticSource::new("bench");

    let mut group = c.benchmark_group("fan_out");
    group.throughput(Throughput::Elements(1));

    group.bench_function("dynamic_fields", |b| {
        b.iter(|| metrics.parse(&source, black_box(JSON_METRICS)).unwrap())
    });

    group.bench_function("stacked_relate", |b| {
        b.iter(|| {
            let record = nested.parse(&source, black_box(JSON_NESTED)).unwrap();
            record.map(|r| r.into_delivery_units())
        })
    });

    group.finish();
}

fn bench_resolver_comparison(c: &mut Criterion) {
    let json = json_parser();
    let regex = regex_parser();
    let source = StaticSource::new("bench");

    let mut group = c.benchmark_group("resolver_comparison");
    group.throughput(Throughput::Elements(1000));

    group.bench_with_input(BenchmarkId::new("resolver", "json"), &JSON_SHORT, |b, &input| {
        b.iter(|| {
            for _ in 0..1000 {
                json.parse(&source, black_box(input)).unwrap();
            }
        })
    });

    group.bench_with_input(BenchmarkId::new("resolver", "regex"), &LOG_LINE, |b, &input| {
        b.iter(|| {
            for _ in 0..1000 {
                regex.parse(&source, black_box(input)).unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_json_parser,
    bench_fan_out,
    bench_resolver_comparison
);
criterion_main!(benches);
