//! 값 모델 벤치마크
//!
//! JSON 변환, 다중 값 단순화, 열거형 해석 성능을 측정합니다.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use actistream_core::types::{simplify_values, OpLevel, UsecTimestamp, Value};

/// 중첩 객체를 포함한 JSON 문서
const JSON_DOC: &str = r#"{"event":"write","level":"WARNING","ts":1700000000000,"tags":["db","orders"],"payload":{"op":"insert","table":"orders","rows":42,"took_ms":12.5}}"#;

fn bench_json_conversion(c: &mut Criterion) {
    let doc: serde_json::Value = serde_json::from_str(JSON_DOC).unwrap();
    let value = Value::from_json(&doc).unwrap();

    let mut group = c.benchmark_group("json_conversion");
    group.throughput(Throughput::Elements(1));

    group.bench_function("from_json", |b| {
        b.iter(|| Value::from_json(black_box(&doc)))
    });

    group.bench_function("to_json", |b| b.iter(|| black_box(&value).to_json()));

    group.finish();
}

fn bench_value_handling(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_handling");
    group.throughput(Throughput::Elements(1));

    group.bench_function("simplify_values", |b| {
        b.iter(|| {
            simplify_values(black_box(vec![
                Some(Value::str("a")),
                None,
                Some(Value::Int(7)),
            ]))
        })
    });

    group.bench_function("op_level_from_str", |b| {
        b.iter(|| OpLevel::from_str_loose(black_box("warning")))
    });

    let ts = UsecTimestamp::from_millis(1_700_000_000_000, 123);
    group.bench_function("timestamp_format", |b| {
        b.iter(|| black_box(ts).format("%Y-%m-%d %H:%M:%S%.6f"))
    });

    group.finish();
}

criterion_group!(benches, bench_json_conversion, bench_value_handling);
criterion_main!(benches);
