//! Plugin Registry - 플러그인 수명주기 관리
//!
//! 소스 등록 → 발견/생성 → 의존성 순서 초기화 → 시작 → 정지(역순) → 언로드(역순)

use super::metadata::{PluginInfo, PluginKind, PluginState};
use super::source::{scan_manifests, PluginCatalog, PluginFactory, PluginModule};
use super::traits::Plugin;
use crate::backend::GraphBackend;
use crate::operation::OperationHandler;
use mem0_foundation::{Error, EventBus, PluginsConfig, Result};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

// ============================================================================
// 내부 상태
// ============================================================================

/// 등록된 플러그인 한 개
struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    factory: PluginFactory,
    config: Map<String, Value>,
    state: PluginState,
}

#[derive(Default)]
struct RegistryState {
    plugins: HashMap<String, PluginEntry>,

    /// 역할별 플러그인 이름 (등록 순서)
    by_kind: HashMap<PluginKind, Vec<String>>,

    /// 초기화에 성공한 순서
    load_order: Vec<String>,
}

impl RegistryState {
    fn insert(&mut self, name: String, entry: PluginEntry) {
        for kind in entry.plugin.kinds() {
            self.by_kind.entry(kind).or_default().push(name.clone());
        }
        self.plugins.insert(name, entry);
    }

    /// 역할별 목록에서의 위치 (재로드 시 같은 자리로 복원)
    fn kind_positions(&self, name: &str) -> Vec<(PluginKind, usize)> {
        self.by_kind
            .iter()
            .filter_map(|(kind, names)| names.iter().position(|n| n == name).map(|pos| (*kind, pos)))
            .collect()
    }

    fn insert_at(&mut self, name: String, entry: PluginEntry, positions: &[(PluginKind, usize)]) {
        for kind in entry.plugin.kinds() {
            let names = self.by_kind.entry(kind).or_default();
            match positions.iter().find(|(k, _)| *k == kind) {
                Some(&(_, pos)) => names.insert(pos.min(names.len()), name.clone()),
                None => names.push(name.clone()),
            }
        }
        self.plugins.insert(name, entry);
    }

    fn remove(&mut self, name: &str) -> Option<PluginEntry> {
        let entry = self.plugins.remove(name)?;
        for names in self.by_kind.values_mut() {
            names.retain(|n| n != name);
        }
        self.load_order.retain(|n| n != name);
        Some(entry)
    }

    fn plugins_of(&self, kind: PluginKind) -> Vec<Arc<dyn Plugin>> {
        self.by_kind
            .get(&kind)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.plugins.get(name))
                    .map(|entry| Arc::clone(&entry.plugin))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_state(&mut self, name: &str, state: PluginState) {
        if let Some(entry) = self.plugins.get_mut(name) {
            entry.state = state;
        }
    }
}

/// `discover_and_load` 전에 쌓이는 소스
#[derive(Default)]
struct Sources {
    builtins: Vec<(PluginFactory, Option<Map<String, Value>>)>,
    paths: Vec<PathBuf>,
    modules: Vec<Arc<dyn PluginModule>>,
}

/// 생성 대기 중인 플러그인
struct Candidate {
    factory: PluginFactory,
    config: Map<String, Value>,
    origin: String,
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// 플러그인 레지스트리
///
/// 상태 맵은 훅을 호출하는 동안 잠그지 않습니다. 필요한 `Arc`를 복제해 둔 뒤
/// 락을 풀고 훅을 `await`합니다. 일괄 수명주기 작업은 내부 비동기 락으로
/// 직렬화됩니다.
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    sources: parking_lot::Mutex<Sources>,
    lifecycle: Mutex<()>,
    catalog: parking_lot::RwLock<PluginCatalog>,
    plugin_configs: HashMap<String, Map<String, Value>>,
    disabled: HashSet<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            sources: parking_lot::Mutex::new(Sources::default()),
            lifecycle: Mutex::new(()),
            catalog: parking_lot::RwLock::new(PluginCatalog::new()),
            plugin_configs: HashMap::new(),
            disabled: HashSet::new(),
            event_bus: None,
        }
    }

    /// 매니페스트가 참조할 카탈로그
    pub fn with_catalog(self, catalog: PluginCatalog) -> Self {
        *self.catalog.write() = catalog;
        self
    }

    /// 카탈로그에 팩토리 추가
    pub fn register_catalog_factory(&self, factory: PluginFactory) {
        debug!(plugin = factory.name(), "Registered catalog plugin");
        self.catalog.write().register(factory);
    }

    /// 수명주기 이벤트를 발행할 버스
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// 플러그인별 설정과 비활성화 목록 적용
    pub fn with_plugins_config(mut self, config: &PluginsConfig) -> Self {
        self.plugin_configs = config.config.clone();
        self.disabled = config.disabled.iter().cloned().collect();
        self
    }

    // ========================================================================
    // 소스 등록 (로드는 discover_and_load에서)
    // ========================================================================

    /// 빌트인 플러그인 추가 (설정은 플러그인별 설정에서 찾음)
    pub fn add_builtin_plugin(&self, factory: PluginFactory) {
        debug!(plugin = factory.name(), "Added builtin plugin");
        self.sources.lock().builtins.push((factory, None));
    }

    /// 명시적 설정으로 빌트인 플러그인 추가
    pub fn add_builtin_plugin_with_config(&self, factory: PluginFactory, config: Map<String, Value>) {
        debug!(plugin = factory.name(), "Added builtin plugin with config");
        self.sources.lock().builtins.push((factory, Some(config)));
    }

    /// 매니페스트 디렉토리 추가
    pub fn add_plugin_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "Added plugin path");
        self.sources.lock().paths.push(path);
    }

    /// 플러그인 모듈 추가
    pub fn add_plugin_module(&self, module: Arc<dyn PluginModule>) {
        debug!(module = module.name(), "Added plugin module");
        self.sources.lock().modules.push(module);
    }

    fn configured(&self, name: &str) -> Map<String, Value> {
        self.plugin_configs.get(name).cloned().unwrap_or_default()
    }

    fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    // ========================================================================
    // 발견 및 로드
    // ========================================================================

    /// 등록된 소스에서 플러그인을 생성하고 의존성 순서로 초기화
    ///
    /// 소스는 소비되므로 다시 호출하면 그 사이에 추가된 소스만 처리합니다.
    /// 개별 플러그인의 생성/초기화 실패는 해당 플러그인만 제외합니다.
    pub async fn discover_and_load(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let candidates = self.collect_candidates().await;
        let registered = self.register_candidates(candidates).await;

        let order = {
            let state = self.state.read().await;
            let graph: Vec<(String, Vec<String>)> = registered
                .iter()
                .filter_map(|name| state.plugins.get(name).map(|e| (name, e)))
                .map(|(name, entry)| {
                    let deps = entry
                        .plugin
                        .metadata()
                        .dependencies
                        .into_iter()
                        .filter(|dep| {
                            let known = state.plugins.contains_key(dep);
                            if !known {
                                warn!(plugin = %name, dependency = %dep, "Ignoring unregistered plugin dependency");
                            }
                            known
                        })
                        .collect();
                    (name.clone(), deps)
                })
                .collect();
            topological_order(&graph)
        };

        let mut loaded = 0;
        for name in order {
            if self.initialize(&name).await {
                loaded += 1;
            }
        }

        info!(loaded, "Plugin discovery complete");
        Ok(())
    }

    async fn collect_candidates(&self) -> Vec<Candidate> {
        let Sources {
            builtins,
            paths,
            modules,
        } = std::mem::take(&mut *self.sources.lock());

        let mut candidates = Vec::new();

        for (factory, config) in builtins {
            let config = config.unwrap_or_else(|| self.configured(factory.name()));
            candidates.push(Candidate {
                factory,
                config,
                origin: "builtin".to_string(),
            });
        }

        for path in paths {
            let manifests = match scan_manifests(&path).await {
                Ok(manifests) => manifests,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to scan plugin directory");
                    continue;
                }
            };

            for discovered in manifests {
                let manifest = discovered.manifest;
                if !manifest.enabled {
                    debug!(plugin = %manifest.plugin, "Plugin manifest disabled");
                    continue;
                }
                let factory = self.catalog.read().get(&manifest.plugin).cloned();
                let Some(factory) = factory else {
                    warn!(
                        plugin = %manifest.plugin,
                        path = %discovered.path.display(),
                        "Manifest references unknown plugin"
                    );
                    continue;
                };

                let mut config = self.configured(factory.name());
                config.extend(manifest.config);
                candidates.push(Candidate {
                    factory,
                    config,
                    origin: discovered.path.display().to_string(),
                });
            }
        }

        for module in modules {
            for factory in module.plugins() {
                let config = self.configured(factory.name());
                candidates.push(Candidate {
                    factory,
                    config,
                    origin: format!("module:{}", module.name()),
                });
            }
        }

        candidates
    }

    /// 후보를 생성/등록하고 새로 등록된 이름을 등록 순서로 반환
    async fn register_candidates(&self, candidates: Vec<Candidate>) -> Vec<String> {
        let mut registered = Vec::new();

        for candidate in candidates {
            if self.is_disabled(candidate.factory.name()) {
                info!(plugin = candidate.factory.name(), "Plugin disabled by configuration");
                continue;
            }

            let plugin = match candidate.factory.create(candidate.config.clone()) {
                Ok(plugin) => plugin,
                Err(e) => {
                    error!(
                        plugin = candidate.factory.name(),
                        origin = %candidate.origin,
                        error = %e,
                        "Failed to create plugin"
                    );
                    self.notify("plugin.failed", json!({
                        "plugin": candidate.factory.name(),
                        "stage": "create",
                        "error": e.to_string(),
                    }))
                    .await;
                    continue;
                }
            };

            let name = plugin.metadata().name;
            if self.is_disabled(&name) {
                info!(plugin = %name, "Plugin disabled by configuration");
                continue;
            }

            let mut state = self.state.write().await;
            if state.plugins.contains_key(&name) {
                warn!(plugin = %name, origin = %candidate.origin, "{}", Error::DuplicatePlugin(name.clone()));
                continue;
            }

            debug!(plugin = %name, origin = %candidate.origin, kinds = ?plugin.kinds(), "Registered plugin");
            state.insert(
                name.clone(),
                PluginEntry {
                    plugin,
                    factory: candidate.factory,
                    config: candidate.config,
                    state: PluginState::Created,
                },
            );
            registered.push(name);
        }

        registered
    }

    /// 플러그인 초기화 (`Created → Initialized`, `validate_config → setup`)
    ///
    /// 이미 초기화된 플러그인은 건드리지 않고 `false`를 반환합니다.
    pub async fn initialize_plugin(&self, name: &str) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;
        self.init_instance(name).await.map(|(_, ran)| ran)
    }

    async fn init_instance(&self, name: &str) -> Result<(Arc<dyn Plugin>, bool)> {
        let (plugin, current) = {
            let state = self.state.read().await;
            let entry = state
                .plugins
                .get(name)
                .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;
            (Arc::clone(&entry.plugin), entry.state)
        };

        if current != PluginState::Created {
            debug!(plugin = %name, state = %current, "Plugin already initialized");
            return Ok((plugin, false));
        }

        setup_plugin(&plugin).await?;
        self.state.write().await.set_state(name, PluginState::Initialized);
        Ok((plugin, true))
    }

    /// `initialize → on_load` (실패 시 등록 해제)
    async fn initialize(&self, name: &str) -> bool {
        let loaded = match self.init_instance(name).await {
            Ok((plugin, _)) => match plugin.on_load().await {
                Ok(()) => Ok(plugin),
                Err(e) => {
                    release(name, &plugin).await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        match loaded {
            Ok(plugin) => {
                let mut state = self.state.write().await;
                state.load_order.push(name.to_string());
                drop(state);

                let metadata = plugin.metadata();
                info!(plugin = %name, version = %metadata.version, "Plugin loaded");
                self.notify("plugin.loaded", json!({"plugin": name, "version": metadata.version}))
                    .await;
                true
            }
            Err(e) => {
                error!(plugin = %name, error = %e, "Failed to initialize plugin");
                self.state.write().await.remove(name);
                self.notify("plugin.failed", json!({
                    "plugin": name,
                    "stage": "load",
                    "error": e.to_string(),
                }))
                .await;
                false
            }
        }
    }

    // ========================================================================
    // 시작 / 정지 / 언로드
    // ========================================================================

    /// 로드 순서대로 `on_start`
    pub async fn start_all(&self) {
        let _guard = self.lifecycle.lock().await;

        for (name, plugin) in self.snapshot(|s| s == PluginState::Initialized, false).await {
            match plugin.on_start().await {
                Ok(()) => {
                    self.state.write().await.set_state(&name, PluginState::Started);
                    debug!(plugin = %name, "Plugin started");
                    self.notify("plugin.started", json!({"plugin": name})).await;
                }
                Err(e) => error!(plugin = %name, error = %e, "Failed to start plugin"),
            }
        }
    }

    /// 로드 역순으로 `on_stop`
    pub async fn stop_all(&self) {
        let _guard = self.lifecycle.lock().await;

        for (name, plugin) in self.snapshot(|s| s == PluginState::Started, true).await {
            match plugin.on_stop().await {
                Ok(()) => {
                    self.state.write().await.set_state(&name, PluginState::Stopped);
                    debug!(plugin = %name, "Plugin stopped");
                    self.notify("plugin.stopped", json!({"plugin": name})).await;
                }
                Err(e) => error!(plugin = %name, error = %e, "Failed to stop plugin"),
            }
        }
    }

    /// 로드 역순으로 `on_unload + teardown` 후 모든 상태 초기화
    pub async fn unload_all(&self) {
        let _guard = self.lifecycle.lock().await;

        for (name, plugin) in self.snapshot(|_| true, true).await {
            if let Err(e) = unload_plugin(&plugin).await {
                error!(plugin = %name, error = %e, "Failed to unload plugin");
            }
            self.state.write().await.set_state(&name, PluginState::Unloaded);
            self.notify("plugin.unloaded", json!({"plugin": name})).await;
        }

        let mut state = self.state.write().await;
        let count = state.plugins.len();
        *state = RegistryState::default();
        info!(count, "All plugins unloaded");
    }

    /// 플러그인 하나를 언로드 후 같은 설정으로 재생성하여 로드/시작
    ///
    /// 어느 단계든 실패하면 플러그인은 등록 해제된 상태로 남고 `false`를 반환합니다.
    pub async fn reload_plugin(&self, name: &str) -> bool {
        let _guard = self.lifecycle.lock().await;

        let (entry, position, kind_positions) = {
            let mut state = self.state.write().await;
            let position = state.load_order.iter().position(|n| n == name);
            let kind_positions = state.kind_positions(name);
            match state.remove(name) {
                Some(entry) => (entry, position, kind_positions),
                None => {
                    warn!(plugin = %name, "{}", Error::PluginNotFound(name.to_string()));
                    return false;
                }
            }
        };

        match self.rebuild(name, &entry).await {
            Ok(plugin) => {
                let mut state = self.state.write().await;
                state.insert_at(
                    name.to_string(),
                    PluginEntry {
                        plugin,
                        factory: entry.factory,
                        config: entry.config,
                        state: PluginState::Started,
                    },
                    &kind_positions,
                );
                let position = position.unwrap_or(state.load_order.len()).min(state.load_order.len());
                state.load_order.insert(position, name.to_string());
                drop(state);

                info!(plugin = %name, "Plugin reloaded");
                self.notify("plugin.reloaded", json!({"plugin": name})).await;
                true
            }
            Err(e) => {
                error!(plugin = %name, error = %e, "Failed to reload plugin");
                self.notify("plugin.failed", json!({
                    "plugin": name,
                    "stage": "reload",
                    "error": e.to_string(),
                }))
                .await;
                false
            }
        }
    }

    async fn rebuild(&self, name: &str, entry: &PluginEntry) -> Result<Arc<dyn Plugin>> {
        unload_plugin(&entry.plugin).await?;

        let plugin = entry.factory.create(entry.config.clone())?;
        let rebuilt_name = plugin.metadata().name;
        if rebuilt_name != name {
            return Err(Error::Plugin(format!(
                "Reloaded plugin '{}' changed its name to '{}'",
                name, rebuilt_name
            )));
        }

        load_plugin(name, &plugin).await?;
        if let Err(e) = plugin.on_start().await {
            if let Err(cleanup) = unload_plugin(&plugin).await {
                warn!(plugin = %name, error = %cleanup, "Failed to unload plugin after start failure");
            }
            return Err(e);
        }
        Ok(plugin)
    }

    /// 상태 조건에 맞는 플러그인을 로드 순서(또는 역순)로 복제
    async fn snapshot(
        &self,
        accept: impl Fn(PluginState) -> bool,
        reverse: bool,
    ) -> Vec<(String, Arc<dyn Plugin>)> {
        let state = self.state.read().await;
        let mut selected: Vec<_> = state
            .load_order
            .iter()
            .filter_map(|name| state.plugins.get(name).map(|entry| (name, entry)))
            .filter(|(_, entry)| accept(entry.state))
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.plugin)))
            .collect();
        if reverse {
            selected.reverse();
        }
        selected
    }

    async fn notify(&self, topic: &str, data: Value) {
        if let (Some(bus), Value::Object(data)) = (&self.event_bus, data) {
            bus.emit(topic, data).await;
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let state = self.state.read().await;
        state.plugins.get(name).map(|entry| Arc::clone(&entry.plugin))
    }

    /// 역할별 플러그인 (등록 순서)
    pub async fn get_plugins_by_type(&self, kind: PluginKind) -> Vec<Arc<dyn Plugin>> {
        self.state.read().await.plugins_of(kind)
    }

    /// 도구에 대한 플러그인 오퍼레이션 (같은 이름은 나중 플러그인이 우선)
    pub async fn get_operation_handlers(
        &self,
        tool_name: &str,
    ) -> HashMap<String, Arc<dyn OperationHandler>> {
        let mut handlers = HashMap::new();

        for plugin in self.get_plugins_by_type(PluginKind::Operation).await {
            if let Some(provider) = plugin.as_operation_provider() {
                if provider.tool_name() == tool_name {
                    handlers.extend(provider.operations());
                }
            }
        }

        handlers
    }

    /// 우선순위 오름차순 미들웨어 (동률은 등록 순서)
    pub async fn get_middleware_chain(&self) -> Vec<Arc<dyn Plugin>> {
        let mut chain = self.get_plugins_by_type(PluginKind::Middleware).await;
        chain.sort_by_key(|plugin| plugin.as_middleware().map_or(i32::MAX, |m| m.priority()));
        chain
    }

    /// `(backend_type, backend_name)`에 맞는 첫 백엔드 플러그인
    pub async fn get_backend(&self, backend_type: &str, backend_name: &str) -> Option<Arc<dyn Plugin>> {
        self.get_plugins_by_type(PluginKind::Backend)
            .await
            .into_iter()
            .find(|plugin| {
                plugin.as_backend_provider().map_or(false, |provider| {
                    provider.backend_type() == backend_type && provider.backend_name() == backend_name
                })
            })
    }

    /// 백엔드 플러그인으로 클라이언트 생성
    pub async fn create_backend_client(
        &self,
        backend_type: &str,
        backend_name: &str,
        overrides: Map<String, Value>,
    ) -> Result<Arc<dyn GraphBackend>> {
        let plugin = self
            .get_backend(backend_type, backend_name)
            .await
            .ok_or_else(|| Error::NotFound(format!("backend {}/{}", backend_type, backend_name)))?;

        match plugin.as_backend_provider() {
            Some(provider) => provider.create_client(overrides),
            None => Err(Error::Internal(format!(
                "Plugin '{}' no longer provides a backend",
                plugin.metadata().name
            ))),
        }
    }

    pub async fn plugin_state(&self, name: &str) -> Option<PluginState> {
        let state = self.state.read().await;
        state.plugins.get(name).map(|entry| entry.state)
    }

    pub async fn load_order(&self) -> Vec<String> {
        self.state.read().await.load_order.clone()
    }

    /// 로드된 플러그인 요약 (로드 순서)
    pub async fn plugin_info(&self) -> Vec<PluginInfo> {
        let state = self.state.read().await;
        state
            .load_order
            .iter()
            .filter_map(|name| state.plugins.get(name))
            .map(|entry| {
                let metadata = entry.plugin.metadata();
                PluginInfo {
                    name: metadata.name,
                    version: metadata.version,
                    description: metadata.description,
                    author: metadata.author,
                    kinds: entry.plugin.kinds(),
                    capabilities: metadata.capabilities,
                    dependencies: metadata.dependencies,
                    state: entry.state,
                }
            })
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.plugins.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.plugins.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn setup_plugin(plugin: &Arc<dyn Plugin>) -> Result<()> {
    plugin.validate_config()?;
    plugin.setup().await
}

/// `setup` 이후 단계가 실패하면 `teardown`까지 호출
async fn load_plugin(name: &str, plugin: &Arc<dyn Plugin>) -> Result<()> {
    setup_plugin(plugin).await?;
    if let Err(e) = plugin.on_load().await {
        release(name, plugin).await;
        return Err(e);
    }
    Ok(())
}

async fn release(name: &str, plugin: &Arc<dyn Plugin>) {
    if let Err(e) = plugin.teardown().await {
        warn!(plugin = %name, error = %e, "Failed to tear down plugin");
    }
}

async fn unload_plugin(plugin: &Arc<dyn Plugin>) -> Result<()> {
    let unloaded = plugin.on_unload().await;
    let torn_down = plugin.teardown().await;
    unloaded.and(torn_down)
}

// ============================================================================
// 의존성 정렬
// ============================================================================

/// 깊이 우선 위상 정렬
///
/// 의존성을 먼저 방문한 뒤 자신을 추가합니다. 입력 순서가 동률일 때의 순서가
/// 됩니다. 순환은 되돌아가는 간선에서 끊고 경고를 남깁니다.
fn topological_order(graph: &[(String, Vec<String>)]) -> Vec<String> {
    fn visit<'a>(
        name: &'a str,
        edges: &HashMap<&'a str, &'a [String]>,
        visiting: &mut HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(name) {
            return;
        }
        if !visiting.insert(name) {
            warn!(plugin = %name, "Circular plugin dependency, breaking cycle");
            return;
        }

        if let Some(&deps) = edges.get(name) {
            for dep in deps {
                if edges.contains_key(dep.as_str()) {
                    visit(dep, edges, visiting, visited, order);
                }
            }
        }

        visiting.remove(name);
        visited.insert(name);
        order.push(name.to_string());
    }

    let edges: HashMap<&str, &[String]> = graph
        .iter()
        .map(|(name, deps)| (name.as_str(), deps.as_slice()))
        .collect();

    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(graph.len());

    for (name, _) in graph {
        visit(name, &edges, &mut visiting, &mut visited, &mut order);
    }

    order
}
