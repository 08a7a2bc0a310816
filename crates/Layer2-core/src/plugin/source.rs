//! Plugin Sources - 플러그인 등록 진입점
//!
//! 플러그인은 세 가지 경로로 레지스트리에 들어옵니다:
//! - 빌트인: `PluginFactory`를 직접 추가
//! - 모듈: `PluginModule::plugins()`가 반환하는 팩토리 묶음
//! - 디렉토리: 매니페스트(`*.json`, `*.toml`)가 `PluginCatalog`의 팩토리를 참조

use super::traits::Plugin;
use mem0_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

// ============================================================================
// PluginFactory
// ============================================================================

type CreateFn = dyn Fn(Map<String, Value>) -> Result<Arc<dyn Plugin>> + Send + Sync;

/// 설정을 받아 플러그인 인스턴스를 만드는 팩토리
///
/// 레지스트리는 팩토리와 설정을 보관하므로 `reload_plugin`에서 같은
/// 설정으로 다시 생성할 수 있습니다.
#[derive(Clone)]
pub struct PluginFactory {
    name: String,
    create: Arc<CreateFn>,
}

impl PluginFactory {
    pub fn new<F>(name: impl Into<String>, create: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            create: Arc::new(create),
        }
    }

    /// 팩토리 이름 (일반적으로 생성될 플러그인 이름과 같음)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 인스턴스 생성
    pub fn create(&self, config: Map<String, Value>) -> Result<Arc<dyn Plugin>> {
        (self.create)(config)
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory").field("name", &self.name).finish()
    }
}

// ============================================================================
// PluginModule
// ============================================================================

/// 여러 플러그인을 묶어 내보내는 모듈
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;

    fn plugins(&self) -> Vec<PluginFactory>;
}

// ============================================================================
// PluginCatalog
// ============================================================================

/// 이름으로 찾을 수 있는 정적 링크 플러그인 목록
///
/// 플러그인 디렉토리의 매니페스트는 이 카탈로그의 이름을 참조합니다.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 팩토리 등록 (같은 이름이면 교체)
    pub fn register(&mut self, factory: PluginFactory) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn with_factory(mut self, factory: PluginFactory) -> Self {
        self.register(factory);
        self
    }

    /// 모듈의 팩토리를 모두 등록
    pub fn register_module(&mut self, module: &dyn PluginModule) {
        for factory in module.plugins() {
            self.register(factory);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 등록된 이름 (정렬됨)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

// ============================================================================
// PluginManifest - 디렉토리 매니페스트
// ============================================================================

/// 플러그인 디렉토리의 매니페스트 파일 구조
///
/// ```json
/// { "plugin": "logging_middleware", "enabled": true, "config": { "log_level": "debug" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// 카탈로그 이름
    pub plugin: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    /// 파일 확장자에 따라 파싱
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(content)?),
            Some("toml") => Ok(toml::from_str(content)?),
            _ => Err(Error::InvalidInput(format!(
                "Unsupported manifest format: {}",
                path.display()
            ))),
        }
    }

    /// 매니페스트 파일 읽기
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::parse(path, &content)
    }
}

/// 디렉토리에서 발견된 매니페스트
#[derive(Debug, Clone)]
pub struct DiscoveredManifest {
    pub path: PathBuf,
    pub manifest: PluginManifest,
}

fn is_manifest_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('_'));
    let supported = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("toml")
    );
    !hidden && supported
}

/// 디렉토리의 매니페스트 스캔 (파일 이름순)
///
/// 읽을 수 없거나 파싱에 실패한 파일은 경고 후 건너뜁니다.
/// 디렉토리 자체를 읽을 수 없으면 에러를 반환합니다.
pub async fn scan_manifests(dir: &Path) -> Result<Vec<DiscoveredManifest>> {
    let mut paths = Vec::new();

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_manifest_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        match PluginManifest::load(&path).await {
            Ok(manifest) => {
                debug!(path = %path.display(), plugin = %manifest.plugin, "Found plugin manifest");
                manifests.push(DiscoveredManifest { path, manifest });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load plugin manifest");
            }
        }
    }

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metadata::PluginMetadata;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Named(String);

    #[async_trait]
    impl Plugin for Named {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new(self.0.clone(), "1.0.0")
        }
    }

    fn factory(name: &'static str) -> PluginFactory {
        PluginFactory::new(name, move |_| Ok(Arc::new(Named(name.to_string())) as Arc<dyn Plugin>))
    }

    struct Bundle;

    impl PluginModule for Bundle {
        fn name(&self) -> &str {
            "bundle"
        }

        fn plugins(&self) -> Vec<PluginFactory> {
            vec![factory("a"), factory("b")]
        }
    }

    #[test]
    fn test_catalog() {
        let mut catalog = PluginCatalog::new().with_factory(factory("z"));
        catalog.register_module(&Bundle);

        assert_eq!(catalog.names(), vec!["a", "b", "z"]);
        let plugin = catalog.get("a").unwrap().create(Map::new()).unwrap();
        assert_eq!(plugin.metadata().name, "a");
    }

    #[test]
    fn test_manifest_parse() {
        let json = PluginManifest::parse(
            Path::new("x.json"),
            r#"{"plugin": "logging_middleware", "config": {"log_level": "debug"}}"#,
        )
        .unwrap();
        assert!(json.enabled);
        assert_eq!(json.config["log_level"], "debug");

        let toml = PluginManifest::parse(
            Path::new("x.toml"),
            "plugin = \"graph\"\nenabled = false\n[config]\nurl = \"bolt://localhost\"\n",
        )
        .unwrap();
        assert!(!toml.enabled);
        assert_eq!(toml.config["url"], "bolt://localhost");

        assert!(PluginManifest::parse(Path::new("x.yaml"), "").is_err());
    }

    #[tokio::test]
    async fn test_scan_manifests() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        fs::write(dir.join("b.json"), r#"{"plugin": "b"}"#).await.unwrap();
        fs::write(dir.join("a.toml"), "plugin = \"a\"\n").await.unwrap();
        fs::write(dir.join("_private.json"), r#"{"plugin": "hidden"}"#).await.unwrap();
        fs::write(dir.join("broken.json"), "{not json").await.unwrap();
        fs::write(dir.join("README.md"), "# plugins").await.unwrap();

        let found = scan_manifests(dir).await.unwrap();
        let names: Vec<_> = found.iter().map(|m| m.manifest.plugin.as_str()).collect();

        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_scan_missing_directory() {
        let temp = TempDir::new().unwrap();
        assert!(scan_manifests(&temp.path().join("nope")).await.is_err());
    }
}
