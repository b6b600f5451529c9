//! 파서 정의 로더와 레지스트리
//!
//! [`DefinitionLoader`]는 정의 디렉토리의 `.yml`/`.yaml`/`.toml` 파일을 스캔합니다.
//! 개별 파일 로딩 실패와 중복 이름은 경고 로그를 남기고 건너뜁니다.
//!
//! [`ParserRegistry`]는 정의 집합을 `Arc<ActivityParser>`로 구성합니다.
//! 스택 참조를 먼저 구성해야 하므로 참조 관계를 의존성 그래프로 정렬한 뒤
//! 순서대로 구성하며, 정의되지 않은 파서 참조와 순환 참조는 구성 에러입니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use actistream_core::config::EngineConfig;

use crate::cache::ActivityCache;
use crate::config::ParserProperties;
use crate::definition::ParserDefinition;
use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::parser::ActivityParser;

/// 정의 파일 최대 크기
const MAX_DEFINITION_FILE_SIZE: u64 = 4 * 1024 * 1024; // 4MB

/// 디렉토리당 최대 정의 수
const MAX_DEFINITIONS_COUNT: usize = 1_000;

/// 정의 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinitionFormat {
    Yaml,
    Toml,
}

impl DefinitionFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// 파서 정의 파일 로더
pub struct DefinitionLoader;

impl DefinitionLoader {
    /// 디렉토리에서 모든 정의 파일을 로드합니다.
    ///
    /// 결과는 파일 경로 순으로 정렬됩니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 정의 수가 `MAX_DEFINITIONS_COUNT`를 초과하는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<ParserDefinition>, EngineError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| EngineError::Definition {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| EngineError::Definition {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();
            if DefinitionFormat::from_path(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Vec::new();
        let mut seen_names = HashSet::new();
        for path in paths {
            match Self::load_file(&path).await {
                Ok(definition) => {
                    if !seen_names.insert(definition.name.clone()) {
                        tracing::warn!(
                            parser = %definition.name,
                            path = %path.display(),
                            "duplicate parser name, skipping"
                        );
                        continue;
                    }
                    definitions.push(definition);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load parser definition, skipping"
                    );
                }
            }

            if definitions.len() > MAX_DEFINITIONS_COUNT {
                return Err(EngineError::Definition {
                    path: dir.display().to_string(),
                    reason: format!("too many definitions: max {MAX_DEFINITIONS_COUNT}"),
                });
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = definitions.len(),
            "loaded parser definitions"
        );
        Ok(definitions)
    }

    /// 단일 정의 파일을 로드합니다. 형식은 확장자로 결정합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<ParserDefinition, EngineError> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let format = DefinitionFormat::from_path(path).ok_or_else(|| EngineError::Definition {
            path: source.clone(),
            reason: "unsupported definition file extension".to_owned(),
        })?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EngineError::Definition {
                path: source.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;
        if metadata.len() > MAX_DEFINITION_FILE_SIZE {
            return Err(EngineError::Definition {
                path: source,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_DEFINITION_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Definition {
                path: source.clone(),
                reason: format!("failed to read file: {e}"),
            })?;

        match format {
            DefinitionFormat::Yaml => ParserDefinition::from_yaml(&content, &source),
            DefinitionFormat::Toml => ParserDefinition::from_toml(&content, &source),
        }
    }
}

/// 구성된 파서 레지스트리
#[derive(Debug, Default)]
pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<ActivityParser>>,
    cache: Option<Arc<ActivityCache>>,
}

impl ParserRegistry {
    /// 정의 집합으로 파서들을 구성합니다.
    ///
    /// 캐시 엔트리를 가진 정의가 하나라도 있으면 공유 캐시를 만들어 모든 파서에 연결합니다.
    ///
    /// # Errors
    /// - `EngineError::Definition`: 이름 중복, 정의되지 않은 스택 파서, 스택 참조 순환
    /// - 그 밖의 구성 에러: 각 파서의 필드 등록/검증 실패
    pub fn build(
        definitions: Vec<ParserDefinition>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            if index.insert(def.name.as_str(), i).is_some() {
                return Err(EngineError::Definition {
                    path: def.source.clone().unwrap_or_else(|| def.name.clone()),
                    reason: format!("duplicate parser name '{}'", def.name),
                });
            }
        }

        let mut graph = DependencyGraph::new(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            for reference in def.stacked_refs() {
                let Some(&j) = index.get(reference) else {
                    return Err(EngineError::Definition {
                        path: def.source.clone().unwrap_or_else(|| def.name.clone()),
                        reason: format!("undefined stacked parser '{reference}'"),
                    });
                };
                graph.add_edge(j, i);
            }
        }
        let order = graph
            .topological_order()
            .map_err(|node| EngineError::Definition {
                path: definitions[node].name.clone(),
                reason: "cyclic stacked parser references".to_owned(),
            })?;

        let cache = definitions
            .iter()
            .flat_map(|d| d.cache.iter().cloned())
            .fold(None::<ActivityCache>, |cache, entry| {
                Some(
                    cache
                        .unwrap_or_else(|| ActivityCache::new(config.cache_max_entries))
                        .with_entry(entry),
                )
            })
            .map(Arc::new);

        let defaults = ParserProperties::from_core(config);
        let mut built: HashMap<String, Arc<ActivityParser>> = HashMap::new();
        for i in order {
            let def = &definitions[i];
            let parser = def.build(&built, &defaults, cache.clone())?;
            built.insert(def.name.clone(), Arc::new(parser));
        }

        tracing::info!(
            parsers = built.len(),
            cached = cache.is_some(),
            "parser registry built"
        );
        Ok(Self {
            parsers: built.into_iter().collect(),
            cache,
        })
    }

    /// 설정의 정의 디렉토리에서 정의를 읽어 레지스트리를 구성합니다.
    pub async fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        let definitions = DefinitionLoader::load_directory(&config.definitions_dir).await?;
        Self::build(definitions, config)
    }

    /// 이름으로 파서를 찾습니다.
    ///
    /// 파서 정의의 `ParserName` 속성이 이름을 바꿨더라도 정의 이름으로 찾습니다.
    pub fn get(&self, name: &str) -> Option<&Arc<ActivityParser>> {
        self.parsers.get(name)
    }

    /// 정의 이름 목록 (정렬됨)
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parsers.keys().map(String::as_str)
    }

    /// 등록된 파서 수
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// 등록된 파서가 없는지
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// 공유 캐시
    pub fn cache(&self) -> Option<&Arc<ActivityCache>> {
        self.cache.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{FieldDef, LocatorDef, ResolverDef, StackedDef};

    fn definition(name: &str, stacked: &[&str]) -> ParserDefinition {
        ParserDefinition {
            name: name.to_owned(),
            resolver: ResolverDef::Json,
            properties: BTreeMap::new(),
            pre_parsers: Vec::new(),
            fields: vec![FieldDef {
                name: format!("{name}_field"),
                locators: vec![LocatorDef {
                    locator: "x".to_owned(),
                    ..LocatorDef::default()
                }],
                stacked: stacked
                    .iter()
                    .map(|s| StackedDef {
                        parser: (*s).to_owned(),
                        aggregation: Default::default(),
                        flatten: false,
                    })
                    .collect(),
                ..FieldDef::default()
            }],
            filters: Vec::new(),
            cache: Vec::new(),
            source: None,
        }
    }

    #[test]
    fn stacked_parsers_are_built_first() {
        let registry = ParserRegistry::build(
            vec![definition("outer", &["inner"]), definition("inner", &[])],
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["inner", "outer"]);
        let outer = registry.get("outer").unwrap();
        let stacked = outer.fields()[0].stacked_parsers();
        assert_eq!(stacked[0].parser().name(), "inner");
        assert!(registry.cache().is_none());
    }

    #[test]
    fn undefined_reference_is_error() {
        let err = ParserRegistry::build(
            vec![definition("outer", &["ghost"])],
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn cyclic_references_are_error() {
        let err = ParserRegistry::build(
            vec![definition("a", &["b"]), definition("b", &["a"])],
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Definition { .. }));
    }

    #[test]
    fn duplicate_names_are_error() {
        let err = ParserRegistry::build(
            vec![definition("a", &[]), definition("a", &[])],
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn cache_entries_create_shared_cache() {
        let mut def = definition("a", &[]);
        def.cache
            .push(crate::cache::CacheEntry::new("last", "${a_field}", "${a_field}"));
        let config = EngineConfig {
            cache_max_entries: 5,
            ..EngineConfig::default()
        };
        let registry = ParserRegistry::build(vec![def], &config).unwrap();
        let cache = registry.cache().unwrap();
        assert_eq!(cache.max_entries(), 5);
        assert_eq!(cache.entries().len(), 1);
    }

    #[tokio::test]
    async fn load_nonexistent_directory_returns_error() {
        let result = DefinitionLoader::load_directory("/nonexistent/actistream/parsers").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let result = DefinitionLoader::load_file("/tmp/parser.json").await;
        assert!(matches!(result, Err(EngineError::Definition { .. })));
    }
}
