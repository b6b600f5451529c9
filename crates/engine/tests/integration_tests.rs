//! 통합 테스트 -- 원시 데이터부터 활동 레코드까지 전체 흐름 검증
//!
//! 필드 의존성 정렬, 동적 확장, 스택 파싱, 활동 간 캐시, 정의 로딩을
//! 공개 API만으로 검증합니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use actistream_core::config::EngineConfig;
use actistream_core::types::{OpLevel, Value};
use actistream_engine::{
    ActivityCache, ActivityParser, Aggregation, CacheEntry, EngineError, Field, JsonResolver,
    Locator, LocatorKind, MapResolver, ParserDefinition, ParserRegistry, StackedParserRef,
    StaticSource, TimeUnit,
};

fn json_parser(name: &str, fields: Vec<Field>) -> ActivityParser {
    fields
        .into_iter()
        .fold(
            ActivityParser::builder(name, Box::new(JsonResolver::new())),
            |builder, field| builder.field(field),
        )
        .build()
        .expect("failed to build parser")
}

/// JSON 입력의 심각도와 밀리초 타임스탬프 해석
#[test]
fn test_json_severity_and_start_time() {
    let parser = json_parser(
        "events",
        vec![
            Field::new("Severity").with_locator(Locator::label("level")),
            Field::new("StartTime")
                .with_locator(Locator::label("ts").with_units(TimeUnit::Milliseconds)),
        ],
    );
    let source = StaticSource::new("stdin");

    let record = parser
        .parse(&source, r#"{"level":"ERROR","ts":1700000000000}"#)
        .expect("failed to parse")
        .expect("record dropped");

    assert_eq!(record.severity, Some(OpLevel::Error));
    assert_eq!(
        record.start_time.map(|t| t.as_micros()),
        Some(1_700_000_000_000_000)
    );
    assert!(record.tracking_id.is_some());
}

/// 의존하는 필드가 먼저 해석되도록 재배열
#[test]
fn test_dependent_field_resolved_after_dependency() {
    let parser = json_parser(
        "events",
        vec![
            Field::new("Message").with_locator(Locator::expression("${Body} [${Level}]")),
            Field::new("Body").with_locator(Locator::label("body")),
            Field::new("Level").with_locator(Locator::label("level")),
        ],
    );
    let names: Vec<&str> = parser.fields().iter().map(Field::name).collect();
    assert_eq!(names.last(), Some(&"Message"));

    let source = StaticSource::new("stdin");
    let record = parser
        .parse(&source, r#"{"body":"disk full","level":"warn"}"#)
        .expect("failed to parse")
        .expect("record dropped");
    assert_eq!(record.message.as_deref(), Some("disk full [warn]"));
}

/// 필수 값이 없으면 항목이 드롭되고, 다음 항목은 정상 처리
#[test]
fn test_missing_required_value_drops_only_that_item() {
    let parser = json_parser(
        "events",
        vec![
            Field::new("EventName").with_locator(Locator::label("event").with_required(true)),
            Field::new("Message").with_locator(Locator::label("msg")),
        ],
    );
    let source = StaticSource::new("stdin");

    assert!(parser.parse(&source, r#"{"msg":"no event"}"#).unwrap().is_none());

    let record = parser
        .parse(&source, r#"{"event":"login","msg":"ok"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(record.event_name.as_deref(), Some("login"));
}

/// 동적 필드 확장과 이름 충돌 접미사
#[test]
fn test_dynamic_fan_out_with_name_collision() {
    let parser = json_parser(
        "metrics",
        vec![
            Field::new("EventName").with_locator(Locator::label("event")),
            Field::new("${Metric}")
                .with_locator(Locator::label("values.*"))
                .with_dynamic_locator("Metric", Locator::label("names.*")),
        ],
    );
    let source = StaticSource::new("stdin");

    let record = parser
        .parse(
            &source,
            r#"{"event":"sample","names":["cpu","mem","cpu"],"values":[10,20,30]}"#,
        )
        .unwrap()
        .unwrap();

    assert_eq!(record.event_name.as_deref(), Some("sample"));
    assert_eq!(record.properties.get("cpu"), Some(&Value::str("10")));
    assert_eq!(record.properties.get("mem"), Some(&Value::str("20")));
    assert_eq!(record.properties.get("cpu1"), Some(&Value::str("30")));
}

/// 순환 참조와 알 수 없는 참조는 구성 에러
#[test]
fn test_invalid_field_graphs_fail_initialization() {
    let cyclic = ActivityParser::builder("cyclic", Box::new(JsonResolver::new()))
        .field(Field::new("A").with_locator(Locator::expression("${B}")))
        .field(Field::new("B").with_locator(Locator::expression("${A}")))
        .build();
    assert!(matches!(cyclic, Err(EngineError::CyclicDependency { .. })));

    let unknown = ActivityParser::builder("unknown", Box::new(JsonResolver::new()))
        .field(Field::new("Message").with_locator(Locator::activity("Nowhere")))
        .build();
    assert!(matches!(
        unknown,
        Err(EngineError::UnknownReference { ref field, ref reference })
            if field == "Message" && reference == "Nowhere"
    ));
}

/// 병합 스택 파서: 비어 있는 슬롯만 채움
#[test]
fn test_stacked_merge_fills_empty_slots() {
    let inner = Arc::new(json_parser(
        "payload",
        vec![
            Field::new("EventName").with_locator(Locator::label("op")),
            Field::new("ResourceName").with_locator(Locator::label("table")),
        ],
    ));
    let parser = json_parser(
        "envelope",
        vec![
            Field::new("EventName").with_locator(Locator::label("event")),
            Field::new("Payload")
                .with_locator(Locator::label("payload"))
                .with_stacked_parser(StackedParserRef::new(inner, Aggregation::Merge, false)),
        ],
    );
    let source = StaticSource::new("stdin");

    let record = parser
        .parse(
            &source,
            r#"{"event":"write","payload":{"op":"insert","table":"orders"}}"#,
        )
        .unwrap()
        .unwrap();

    assert_eq!(record.event_name.as_deref(), Some("write"));
    assert_eq!(record.resource_name.as_deref(), Some("orders"));
    assert_eq!(record.total_children(), 0);
}

/// 연결 스택 파서: 자식 레코드, 순번, 전달 단위 분해
#[test]
fn test_stacked_relate_children_and_delivery_units() {
    let item = Arc::new(json_parser(
        "line-item",
        vec![
            Field::new("EventName").with_locator(Locator::label("sku")),
            Field::new("ElapsedTime").with_locator(Locator::label("took_us")),
        ],
    ));
    let parser = json_parser(
        "order",
        vec![
            Field::new("EventName").with_locator(Locator::label("order")),
            Field::new("First")
                .with_locator(Locator::label("first"))
                .with_stacked_parser(StackedParserRef::new(
                    Arc::clone(&item),
                    Aggregation::Relate,
                    true,
                )),
            Field::new("Second")
                .with_locator(Locator::label("second"))
                .with_stacked_parser(StackedParserRef::new(item, Aggregation::Relate, true)),
        ],
    );
    let source = StaticSource::new("stdin");

    let record = parser
        .parse(
            &source,
            r#"{"order":"A-1","first":{"sku":"apple","took_us":5},"second":{"sku":"pear","took_us":7}}"#,
        )
        .unwrap()
        .unwrap();

    let children = record.children("line-item");
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].record.ordinal(), 1);
    assert_eq!(children[1].record.ordinal(), 2);
    assert_eq!(children[1].record.event_name.as_deref(), Some("pear"));
    assert_eq!(record.event_name.as_deref(), Some("A-1"));

    let parent_tid = record.tracking_id.clone();
    let units = record.into_delivery_units();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0].total_children(), 0);
    for child in &units[1..] {
        assert_eq!(child.parent_id, parent_tid);
        assert!(child.tracking_id.is_some());
    }
}

/// 연결 자식에 필수 값이 없으면 그 자식만 건너뛰고 부모는 유지
#[test]
fn test_missing_required_value_in_child_keeps_parent() {
    let item = Arc::new(json_parser(
        "line-item",
        vec![Field::new("EventName").with_locator(Locator::label("sku").with_required(true))],
    ));
    let parser = json_parser(
        "order",
        vec![
            Field::new("EventName").with_locator(Locator::label("order")),
            Field::new("First")
                .with_locator(Locator::label("first"))
                .with_stacked_parser(StackedParserRef::new(item, Aggregation::Relate, true)),
        ],
    );
    let source = StaticSource::new("stdin");

    let record = parser
        .parse(&source, r#"{"order":"A-1","first":{"other":1}}"#)
        .expect("child without required value must not fail the parent")
        .expect("parent record should be kept");

    assert_eq!(record.event_name.as_deref(), Some("A-1"));
    assert_eq!(record.total_children(), 0);
    assert!(record.children("line-item").is_empty());

    let record = parser
        .parse(&source, r#"{"order":"A-2","first":{"sku":"apple"}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(record.children("line-item").len(), 1);
}

/// 중첩 자식은 부모 레코드 안에 남음
#[test]
fn test_nested_children_stay_inside_parent() {
    let item = Arc::new(json_parser(
        "detail",
        vec![Field::new("EventName").with_locator(Locator::label("name"))],
    ));
    let parser = json_parser(
        "outer",
        vec![
            Field::new("Detail")
                .with_locator(Locator::label("detail"))
                .with_stacked_parser(StackedParserRef::new(item, Aggregation::Relate, false)),
        ],
    );
    let source = StaticSource::new("stdin");

    let record = parser
        .parse(&source, r#"{"detail":{"name":"inner"}}"#)
        .unwrap()
        .unwrap();
    let units = record.into_delivery_units();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].children("detail").len(), 1);
}

/// 활동 간 캐시: 앞 항목의 값을 다음 항목이 읽음
#[test]
fn test_cache_carries_values_across_items() {
    let cache = Arc::new(
        ActivityCache::new(100).with_entry(CacheEntry::new("LastEvent", "${corr}", "${EventName}")),
    );
    let parser = ActivityParser::builder("session", Box::new(JsonResolver::new()))
        .cache(Arc::clone(&cache))
        .field(Field::new("corr").with_locator(Locator::label("corr")))
        .field(Field::new("EventName").with_locator(Locator::label("event")))
        .field(Field::new("Previous").with_locator(Locator::new(LocatorKind::Cache, "LastEvent")))
        .build()
        .unwrap();
    let source = StaticSource::new("stdin");

    let first = parser
        .parse(&source, r#"{"corr":"c-1","event":"open"}"#)
        .unwrap()
        .unwrap();
    assert!(!first.properties.contains_key("Previous"));
    assert_eq!(cache.len(), 1);

    let second = parser
        .parse(&source, r#"{"corr":"c-1","event":"close"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(second.properties.get("Previous"), Some(&Value::str("open")));
    assert_eq!(cache.get("c-1"), Some(Value::str("close")));
}

/// 맵 입력과 메타데이터
#[test]
fn test_map_input_with_metadata() {
    let parser = ActivityParser::builder("map", Box::new(MapResolver::new()))
        .field(Field::new("UserName").with_locator(Locator::label("user")))
        .field(Field::new("Location").with_locator(Locator::new(LocatorKind::Metadata, "origin.host")))
        .build()
        .unwrap();
    let source = StaticSource::new("stdin");

    let mut data = BTreeMap::new();
    data.insert("user".to_owned(), Value::str("alice"));
    let mut origin = BTreeMap::new();
    origin.insert("host".to_owned(), Value::str("web-01"));
    let mut metadata = BTreeMap::new();
    metadata.insert("origin".to_owned(), Value::Map(origin));

    let record = parser
        .parse_with_metadata(&source, data, metadata)
        .unwrap()
        .unwrap();
    assert_eq!(record.user_name.as_deref(), Some("alice"));
    assert_eq!(record.location.as_deref(), Some("web-01"));
}

/// 여러 태스크에서 같은 파서를 동시에 사용
#[tokio::test]
async fn test_concurrent_parsing() {
    let parser = Arc::new(json_parser(
        "events",
        vec![
            Field::new("EventName").with_locator(Locator::label("event")),
            Field::new("ProcessId").with_locator(Locator::label("pid")),
        ],
    ));

    let mut handles = Vec::new();
    for task in 0..8 {
        let parser = Arc::clone(&parser);
        handles.push(tokio::spawn(async move {
            let source = StaticSource::new(format!("worker-{task}"));
            let mut parsed = 0;
            for i in 0..50 {
                let input = format!(r#"{{"event":"e{task}-{i}","pid":{i}}}"#);
                let record = parser.parse(&source, input).unwrap().unwrap();
                assert_eq!(record.event_name, Some(format!("e{task}-{i}")));
                assert_eq!(record.process_id, Some(i));
                parsed += 1;
            }
            parsed
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.expect("task panicked");
    }
    assert_eq!(total, 400);
}

/// 디렉토리의 YAML/TOML 정의로 레지스트리 구성
#[tokio::test]
async fn test_registry_loads_definitions_from_directory() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    // 참조하는 쪽이 먼저 정렬되어도 스택 파서가 먼저 구성되어야 한다
    std::fs::write(
        dir.path().join("a-envelope.yml"),
        r#"
name: envelope
resolver: { kind: json }
fields:
  - name: EventName
    locators: [{ locator: event }]
  - name: Payload
    locators: [{ locator: payload }]
    stacked: [{ parser: payload, aggregation: merge }]
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b-payload.toml"),
        r#"
name = "payload"

[resolver]
kind = "json"

[[fields]]
name = "ResourceName"
locators = [{ locator = "table" }]
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.yml"), "name: [unclosed").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let config = EngineConfig {
        definitions_dir: dir.path().to_string_lossy().into_owned(),
        ..EngineConfig::default()
    };
    let registry = ParserRegistry::load(&config).await.expect("failed to load registry");

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["envelope", "payload"]);
    assert!(registry.cache().is_none());

    let parser = registry.get("envelope").expect("envelope parser missing");
    let source = StaticSource::new("stdin");
    let record = parser
        .parse(&source, r#"{"event":"write","payload":{"table":"orders"}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(record.event_name.as_deref(), Some("write"));
    assert_eq!(record.resource_name.as_deref(), Some("orders"));
}

/// 정의의 캐시 엔트리는 공유 캐시로 연결
#[test]
fn test_registry_shares_cache_between_parsers() {
    let yaml = r#"
name: login
resolver: { kind: json }
fields:
  - name: UserName
    locators: [{ locator: user }]
  - name: Location
    locators: [{ locator: ip }]
cache:
  - id: LastIp
    key: "${UserName}"
    value: "${Location}"
"#;
    let lookup = r#"
name: audit
resolver: { kind: json }
fields:
  - name: UserName
    locators: [{ locator: user }]
  - name: Location
    locators: [{ kind: Cache, locator: LastIp }]
"#;
    let definitions = vec![
        ParserDefinition::from_yaml(yaml, "login.yml").unwrap(),
        ParserDefinition::from_yaml(lookup, "audit.yml").unwrap(),
    ];
    let registry = ParserRegistry::build(definitions, &EngineConfig::default()).unwrap();
    let source = StaticSource::new("stdin");

    registry
        .get("login")
        .unwrap()
        .parse(&source, r#"{"user":"bob","ip":"10.0.0.7"}"#)
        .unwrap()
        .unwrap();
    let record = registry
        .get("audit")
        .unwrap()
        .parse(&source, r#"{"user":"bob"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(record.location.as_deref(), Some("10.0.0.7"));
}
