//! Server - 서버 호스트
//!
//! 설정, DI 컨테이너, 이벤트 버스, 플러그인 레지스트리, 디스패처를 묶고
//! 수명주기(initialize → start → stop → shutdown)를 관리합니다.

use crate::backend::MemoryClient;
use crate::dispatcher::{Dispatcher, ToolDescriptor};
use crate::operation::Params;
use crate::plugin::{
    ExtensionContext, PluginFactory, PluginKind, PluginModule, PluginRegistry,
};
use crate::plugins::{builtin_catalog, builtin_plugins};
use mem0_foundation::{
    ConfigStore, Container, EventBus, EventHandler, Result, ServerConfig, SubscribeOptions,
    SubscriptionId, DEFAULT_CONFIG_FILE, ENV_PREFIX,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 설정 로드
///
/// 우선순위 (나중이 이김): 기본 설정 파일 → 지정한 파일 → `MEM0_*` 환경 변수
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let mut store = ConfigStore::new();

    if let Some(defaults) = ConfigStore::load_optional(DEFAULT_CONFIG_FILE)? {
        store.merge(defaults);
    }
    if let Some(path) = path {
        store.merge(ConfigStore::load_file(path)?);
    }
    store.merge(ConfigStore::from_env(ENV_PREFIX));

    ServerConfig::from_provider(&store)
}

/// Mem0 서버
pub struct Mem0Server {
    config: ServerConfig,
    container: Container,
    event_bus: Arc<EventBus>,
    registry: Arc<PluginRegistry>,
    dispatcher: Arc<Dispatcher>,

    /// `plugins.modules`로 선택할 수 있는 모듈
    modules: HashMap<String, Arc<dyn PluginModule>>,

    /// 빌트인 다음에 추가할 플러그인
    extra_plugins: Vec<PluginFactory>,

    initialized: AtomicBool,
}

impl Mem0Server {
    pub fn new(config: ServerConfig) -> Self {
        let event_bus = Arc::new(EventBus::with_config(config.event_bus.clone()));
        let registry = Arc::new(
            PluginRegistry::new()
                .with_catalog(builtin_catalog())
                .with_event_bus(Arc::clone(&event_bus))
                .with_plugins_config(&config.plugins),
        );
        let container = Container::new();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&event_bus),
            container.clone(),
        ));

        Self {
            config,
            container,
            event_bus,
            registry,
            dispatcher,
            modules: HashMap::new(),
            extra_plugins: Vec::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// 메모리 저장소 클라이언트 등록 (컨테이너 싱글톤)
    pub fn with_memory_client(self, client: Arc<dyn MemoryClient>) -> Self {
        self.container.register_instance::<dyn MemoryClient>(client);
        self
    }

    /// 빌트인 다음에 로드할 플러그인 추가
    pub fn with_plugin(mut self, factory: PluginFactory) -> Self {
        self.extra_plugins.push(factory);
        self
    }

    /// `plugins.modules`에서 이름으로 선택할 수 있는 모듈 등록
    pub fn with_module(mut self, module: Arc<dyn PluginModule>) -> Self {
        self.modules.insert(module.name().to_string(), module);
        self
    }

    /// 플러그인 디렉토리 매니페스트가 참조할 수 있는 팩토리 등록
    pub fn with_catalog_entry(self, factory: PluginFactory) -> Self {
        self.registry.register_catalog_factory(factory);
        self
    }

    // ========================================================================
    // 수명주기
    // ========================================================================

    /// 서버 초기화 (플러그인 발견/로드, 확장 실행, 이벤트 버스 시작)
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!(name = %self.config.name, "Server already initialized");
            return Ok(());
        }

        info!(name = %self.config.name, "Initializing server");

        self.register_core_services();
        self.add_plugin_sources();
        self.registry.discover_and_load().await?;
        self.run_extensions().await;

        self.event_bus.start().await;

        let plugins = self.registry.plugin_info().await;
        let count = plugins.len();
        if let Value::Object(data) = json!({"name": self.config.name, "plugins": plugins}) {
            self.event_bus.emit("server.initialized", data).await;
        }

        info!(name = %self.config.name, plugins = count, "Server initialized");
        Ok(())
    }

    fn register_core_services(&self) {
        self.container
            .register_instance::<ServerConfig>(Arc::new(self.config.clone()));
        self.container
            .register_instance::<EventBus>(Arc::clone(&self.event_bus));
        self.container
            .register_instance::<PluginRegistry>(Arc::clone(&self.registry));
        self.container
            .register_instance::<Dispatcher>(Arc::clone(&self.dispatcher));
    }

    fn add_plugin_sources(&self) {
        for factory in builtin_plugins() {
            self.registry.add_builtin_plugin(factory);
        }
        for factory in &self.extra_plugins {
            self.registry.add_builtin_plugin(factory.clone());
        }
        for path in &self.config.plugins.paths {
            self.registry.add_plugin_path(path.clone());
        }
        for name in &self.config.plugins.modules {
            match self.modules.get(name) {
                Some(module) => self.registry.add_plugin_module(Arc::clone(module)),
                None => warn!(module = %name, "Unknown plugin module"),
            }
        }
    }

    async fn run_extensions(&self) {
        let ctx = ExtensionContext {
            event_bus: Arc::clone(&self.event_bus),
            container: self.container.clone(),
            config: self.config.clone(),
        };

        for plugin in self.registry.get_plugins_by_type(PluginKind::Extension).await {
            let Some(extension) = plugin.as_extension() else {
                continue;
            };
            if let Err(e) = extension.extend(&ctx).await {
                error!(plugin = %plugin.metadata().name, error = %e, "Extension failed");
            }
        }
    }

    /// 모든 플러그인 시작
    pub async fn start(&self) {
        info!(name = %self.config.name, "Starting server");
        self.registry.start_all().await;
        self.emit_lifecycle("server.started").await;
    }

    /// 플러그인 정지 (역순) 및 이벤트 버스 정지
    pub async fn stop(&self) {
        info!(name = %self.config.name, "Stopping server");
        self.emit_lifecycle("server.stopping").await;
        self.registry.stop_all().await;
        self.event_bus.stop().await;
    }

    /// 정지 후 모든 플러그인 언로드
    pub async fn shutdown(&self) {
        self.stop().await;
        self.registry.unload_all().await;
        info!(name = %self.config.name, "Server shut down");
    }

    async fn emit_lifecycle(&self, topic: &str) {
        if let Value::Object(data) = json!({"name": self.config.name}) {
            self.event_bus.emit(topic, data).await;
        }
    }

    // ========================================================================
    // 요청 처리
    // ========================================================================

    /// 도구 호출 처리 (요청 스코프는 호출이 끝나면 비워짐)
    pub async fn handle_tool_call(&self, tool_name: &str, params: Params) -> Value {
        let _scope = self.container.request_scope();
        self.dispatcher.call(tool_name, params).await
    }

    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.dispatcher.list_tools().await
    }

    /// 이벤트 핸들러 등록
    pub async fn register_event_handler(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        self.event_bus
            .subscribe(topic, handler, SubscribeOptions::new())
            .await
    }

    /// 컨테이너에서 서비스 조회
    pub async fn get_service<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve::<T>().await
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::logging_middleware::PLUGIN_NAME as LOGGING;
    use mem0_foundation::{HistoryQuery, PluginsConfig, Scope};
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_initialize_loads_builtins() {
        let server = Mem0Server::new(ServerConfig::default());
        server.initialize().await.unwrap();

        assert!(server.registry().contains(LOGGING).await);
        assert!(server.event_bus().is_running());

        let history = server
            .event_bus()
            .get_history(&HistoryQuery::new().topic("server.initialized"))
            .await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].data["name"], "mem0-mcp");
        assert_eq!(history[0].data["plugins"][0]["name"], LOGGING);

        let registry = server.get_service::<PluginRegistry>().await.unwrap();
        assert!(Arc::ptr_eq(&registry, server.registry()));

        server.initialize().await.unwrap();
        assert_eq!(server.registry().len().await, 1);

        server.shutdown().await;
        assert!(server.registry().is_empty().await);
        assert!(!server.event_bus().is_running());
    }

    #[tokio::test]
    async fn test_disabled_builtin() {
        let config = ServerConfig {
            plugins: PluginsConfig {
                disabled: vec![LOGGING.to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let server = Mem0Server::new(config);
        server.initialize().await.unwrap();

        assert!(server.registry().is_empty().await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_handle_tool_call_clears_request_scope() {
        let server = Mem0Server::new(ServerConfig::default());
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        server
            .container()
            .register_factory::<AtomicUsize, _>(Scope::Request, None, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(AtomicUsize::new(0)))
            });

        let first = server.container().resolve::<AtomicUsize>().await.unwrap();
        let again = server.container().resolve::<AtomicUsize>().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let result = server.handle_tool_call("mem0_memory", Params::new()).await;
        assert_eq!(result["error"], "unknown_operation");

        server.container().resolve::<AtomicUsize>().await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
