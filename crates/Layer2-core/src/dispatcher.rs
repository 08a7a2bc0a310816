//! Dispatcher - 도구/오퍼레이션 요청 라우팅
//!
//! ```text
//! execute(tool, operation, params)
//!   │
//!   ├─ 핸들러 조회 (plugin ops ← tool plugins ← builtins)
//!   │     └─ 없음 → unknown_operation (미들웨어/이벤트 없음)
//!   ├─ m1.process_request → m2.process_request      (priority 오름차순)
//!   ├─ handler.call (요청 미들웨어가 `_from_cache`를 두면 건너뜀)
//!   ├─ m2.process_response → m1.process_response    (정확히 역순)
//!   └─ emit "tool.<tool>.<operation>"
//! ```

use crate::backend::MemoryClient;
use crate::operation::{
    error_payload, OperationContext, OperationHandler, OperationMetadata, ParameterDefinition,
    ParameterType, Params,
};
use crate::plugin::{Plugin, PluginKind, PluginRegistry};
use async_trait::async_trait;
use mem0_foundation::{Container, Error, EventBus, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 툴 플러그인이 노출되는 오퍼레이션 이름
pub const TOOL_EXECUTE_OPERATION: &str = "execute";

/// 요청 미들웨어가 `true`로 두면 핸들러 호출을 건너뜀
pub const FROM_CACHE_KEY: &str = "_from_cache";

/// 핸들러 대신 응답 체인으로 넘길 결과
pub const CACHED_RESULT_KEY: &str = "_cached_result";

type HandlerMap = HashMap<String, Arc<dyn OperationHandler>>;

// ============================================================================
// ToolDescriptor
// ============================================================================

/// 도구 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// 서버에 내장된 오퍼레이션 (플러그인 오퍼레이션이 추가될 수 있음)
    Builtin,
    /// OperationProvider 플러그인만 제공
    Plugin,
    /// ToolProvider 플러그인
    ToolPlugin,
}

/// 외부에 노출할 도구 설명
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 오퍼레이션 메타데이터 (이름순)
    pub operations: Vec<OperationMetadata>,

    pub source: ToolSource,
}

// ============================================================================
// ToolPluginOperation - ToolProvider를 오퍼레이션으로 감쌈
// ============================================================================

struct ToolPluginOperation {
    plugin: Arc<dyn Plugin>,
}

#[async_trait]
impl OperationHandler for ToolPluginOperation {
    fn metadata(&self) -> OperationMetadata {
        let definition = self
            .plugin
            .as_tool_provider()
            .map(|tool| tool.tool_definition())
            .unwrap_or(Value::Null);
        let description = definition
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut metadata = OperationMetadata::new(TOOL_EXECUTE_OPERATION, description);
        metadata.version = self.plugin.metadata().version;

        let required: Vec<&str> = definition
            .pointer("/inputSchema/required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if let Some(properties) = definition
            .pointer("/inputSchema/properties")
            .and_then(Value::as_object)
        {
            for (name, schema) in properties {
                let description = schema
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let parameter = if required.contains(&name.as_str()) {
                    ParameterDefinition::required(name.as_str(), ParameterType::Any, description)
                } else {
                    ParameterDefinition::optional(name.as_str(), ParameterType::Any, description)
                };
                metadata = metadata.with_parameter(parameter);
            }
        }

        metadata
    }

    async fn execute(&self, _ctx: &OperationContext, params: Params) -> Result<Value> {
        let tool = self.plugin.as_tool_provider().ok_or_else(|| {
            Error::Internal(format!(
                "Plugin '{}' does not provide a tool",
                self.plugin.metadata().name
            ))
        })?;
        tool.execute(params).await
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// 요청 디스패처
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    event_bus: Arc<EventBus>,
    container: Container,
    builtins: parking_lot::RwLock<HashMap<String, HandlerMap>>,
    descriptions: parking_lot::RwLock<HashMap<String, String>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>, event_bus: Arc<EventBus>, container: Container) -> Self {
        Self {
            registry,
            event_bus,
            container,
            builtins: parking_lot::RwLock::new(HashMap::new()),
            descriptions: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// 내장 오퍼레이션 등록 (같은 이름의 플러그인 오퍼레이션보다 우선)
    pub fn register_builtin_operations(&self, tool_name: &str, handlers: HandlerMap) {
        debug!(tool = tool_name, count = handlers.len(), "Registered builtin operations");
        self.builtins
            .write()
            .entry(tool_name.to_string())
            .or_default()
            .extend(handlers);
    }

    /// 도구 설명 지정
    pub fn describe_tool(&self, tool_name: &str, description: impl Into<String>) {
        self.descriptions
            .write()
            .insert(tool_name.to_string(), description.into());
    }

    /// 도구의 전체 오퍼레이션 (plugin ops → tool plugins → builtins 순으로 덮어씀)
    pub async fn operation_handlers(&self, tool_name: &str) -> HandlerMap {
        let mut handlers = self.registry.get_operation_handlers(tool_name).await;

        for plugin in self.registry.get_plugins_by_type(PluginKind::Tool).await {
            let name = plugin.as_tool_provider().and_then(|tool| tool.tool_name());
            if name.as_deref() == Some(tool_name) {
                handlers.insert(
                    TOOL_EXECUTE_OPERATION.to_string(),
                    Arc::new(ToolPluginOperation { plugin }),
                );
            }
        }

        if let Some(builtins) = self.builtins.read().get(tool_name) {
            handlers.extend(builtins.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
        }

        handlers
    }

    /// `params["operation"]`에서 오퍼레이션을 읽어 실행
    pub async fn call(&self, tool_name: &str, mut params: Params) -> Value {
        let operation = match params.remove("operation") {
            Some(Value::String(operation)) => Some(operation),
            _ => None,
        };
        self.execute(tool_name, operation.as_deref(), params).await
    }

    /// 오퍼레이션 실행
    ///
    /// 항상 구조화된 결과를 반환하며 에러를 전파하지 않습니다.
    pub async fn execute(&self, tool_name: &str, operation: Option<&str>, params: Params) -> Value {
        let Some(operation) = operation.filter(|op| !op.is_empty()) else {
            return unknown_operation(tool_name, None);
        };

        let handler = match self.operation_handlers(tool_name).await.remove(operation) {
            Some(handler) => handler,
            None => return unknown_operation(tool_name, Some(operation)),
        };

        let mut ctx = OperationContext::from_params(tool_name, operation, &params);
        if let Some(client) = self.memory_client().await {
            ctx = ctx.with_memory_client(client);
        }

        let chain = self.registry.get_middleware_chain().await;

        let mut params = params;
        for plugin in &chain {
            let Some(middleware) = plugin.as_middleware() else {
                continue;
            };
            params = match middleware.process_request(&ctx, params).await {
                Ok(params) => params,
                Err(e) => return middleware_failed(&ctx, plugin.as_ref(), "request", e),
            };
        }

        let mut result = match take_short_circuit(&mut params) {
            Some(cached) => {
                debug!(
                    tool = tool_name,
                    operation,
                    request_id = ctx.request_id,
                    "Handler skipped by request middleware"
                );
                short_circuit_response(cached)
            }
            None => handler.call(&ctx, params.clone()).await,
        };

        for plugin in chain.iter().rev() {
            let Some(middleware) = plugin.as_middleware() else {
                continue;
            };
            result = match middleware.process_response(&ctx, result).await {
                Ok(result) => result,
                Err(e) => return middleware_failed(&ctx, plugin.as_ref(), "response", e),
            };
        }

        let topic = format!("tool.{}.{}", tool_name, operation);
        if let Value::Object(data) = json!({
            "params": params,
            "result": result,
            "context": ctx.to_json(),
        }) {
            self.event_bus.emit(&topic, data).await;
        }

        result
    }

    async fn memory_client(&self) -> Option<Arc<dyn MemoryClient>> {
        match self.container.resolve::<dyn MemoryClient>().await {
            Ok(client) => Some(client),
            Err(Error::NoRegistration { .. }) => None,
            Err(e) => {
                warn!(error = %e, "Failed to resolve memory client");
                None
            }
        }
    }

    /// 등록된 모든 도구
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: BTreeMap<String, ToolSource> = BTreeMap::new();

        for name in self.builtins.read().keys() {
            tools.insert(name.clone(), ToolSource::Builtin);
        }
        for plugin in self.registry.get_plugins_by_type(PluginKind::Operation).await {
            if let Some(provider) = plugin.as_operation_provider() {
                tools.entry(provider.tool_name()).or_insert(ToolSource::Plugin);
            }
        }
        for plugin in self.registry.get_plugins_by_type(PluginKind::Tool).await {
            if let Some(name) = plugin.as_tool_provider().and_then(|tool| tool.tool_name()) {
                tools.entry(name).or_insert(ToolSource::ToolPlugin);
            }
        }

        let mut descriptors = Vec::with_capacity(tools.len());
        for (name, source) in tools {
            let mut operations: Vec<_> = self
                .operation_handlers(&name)
                .await
                .values()
                .map(|handler| handler.metadata())
                .collect();
            operations.sort_by(|a, b| a.name.cmp(&b.name));

            let description = self.descriptions.read().get(&name).cloned().or_else(|| {
                (source == ToolSource::ToolPlugin)
                    .then(|| operations.first().map(|op| op.description.clone()))
                    .flatten()
            });

            descriptors.push(ToolDescriptor {
                name,
                description,
                operations,
                source,
            });
        }

        descriptors
    }
}

fn unknown_operation(tool_name: &str, operation: Option<&str>) -> Value {
    let error = Error::UnknownOperation {
        tool: tool_name.to_string(),
        operation: operation.unwrap_or_default().to_string(),
    };
    let ctx = OperationContext::new(tool_name, operation.unwrap_or_default());
    let mut payload = error_payload(&ctx, &error);
    if operation.is_none() {
        payload["message"] = json!("Operation parameter is required");
        payload["operation"] = Value::Null;
    }
    warn!(tool = tool_name, operation = ?operation, message = %payload["message"], "Unknown operation");
    payload
}

/// 요청 미들웨어가 `FROM_CACHE_KEY: true`와 함께 둔 결과를 꺼냄
fn take_short_circuit(params: &mut Params) -> Option<Value> {
    if params.get(FROM_CACHE_KEY) != Some(&Value::Bool(true)) {
        return None;
    }
    params.remove(FROM_CACHE_KEY);
    Some(params.remove(CACHED_RESULT_KEY).unwrap_or(Value::Null))
}

/// 핸들러 대신 응답 미들웨어로 흘려보낼 값
///
/// 같은 표시를 달아 두어, 결과를 넣어 둔 미들웨어가 응답 단계에서 알아보고 풀어냅니다.
pub fn short_circuit_response(cached: Value) -> Value {
    let mut response = Params::new();
    response.insert(FROM_CACHE_KEY.to_string(), Value::Bool(true));
    response.insert(CACHED_RESULT_KEY.to_string(), cached);
    Value::Object(response)
}

fn middleware_failed(ctx: &OperationContext, plugin: &dyn Plugin, phase: &str, e: Error) -> Value {
    let middleware = plugin.metadata().name;
    error!(
        tool = %ctx.tool_name,
        operation = %ctx.operation_name,
        middleware = %middleware,
        phase,
        error = %e,
        "Middleware failed"
    );

    let mut payload = error_payload(ctx, &e);
    if let Value::Object(ref mut map) = payload {
        map.insert("error".to_string(), json!("middleware_failed"));
        map.insert("middleware".to_string(), json!(middleware));
        map.insert("phase".to_string(), json!(phase));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::operation_fn;
    use crate::plugin::{Middleware, PluginFactory, PluginMetadata, ToolProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use mem0_foundation::{handler_fn, HistoryQuery, SubscribeOptions};

    fn echo(tag: &'static str) -> Arc<dyn OperationHandler> {
        operation_fn(OperationMetadata::new("echo", "Echo"), move |_, params| async move {
            Ok::<Value, Error>(json!({"status": "success", "from": tag, "params": params}))
        })
    }

    fn dispatcher(registry: PluginRegistry) -> (Dispatcher, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::clone(&bus), Container::new());
        (dispatcher, bus)
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (dispatcher, bus) = dispatcher(PluginRegistry::new());
        dispatcher.register_builtin_operations("mem0_memory", HashMap::from([("echo".to_string(), echo("builtin"))]));

        let missing = dispatcher.execute("mem0_memory", None, Params::new()).await;
        assert_eq!(missing["error"], "unknown_operation");
        assert_eq!(missing["message"], "Operation parameter is required");
        assert!(missing["operation"].is_null());

        let unknown = dispatcher.execute("mem0_memory", Some("nonexistent_op"), Params::new()).await;
        assert_eq!(unknown["status"], "error");
        assert_eq!(unknown["message"], "Unknown operation: nonexistent_op");
        assert_eq!(unknown["tool"], "mem0_memory");
        assert_eq!(unknown["operation"], "nonexistent_op");

        assert_eq!(bus.event_count(), 0);
    }

    #[tokio::test]
    async fn test_call_emits_event() {
        let (dispatcher, bus) = dispatcher(PluginRegistry::new());
        dispatcher.register_builtin_operations("mem0_memory", HashMap::from([("echo".to_string(), echo("builtin"))]));

        let result = dispatcher
            .call("mem0_memory", params(json!({"operation": "echo", "user_id": "alice"})))
            .await;
        assert_eq!(result["from"], "builtin");
        assert!(result["params"].get("operation").is_none());

        let history = bus.get_history(&HistoryQuery::new().topic("tool.mem0_memory.echo")).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].data["context"]["user_id"], "alice");
        assert_eq!(history[0].data["result"]["from"], "builtin");
    }

    struct Calculator;

    #[async_trait]
    impl ToolProvider for Calculator {
        fn tool_definition(&self) -> Value {
            json!({
                "name": "calculator",
                "description": "Adds numbers",
                "inputSchema": {
                    "type": "object",
                    "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                    "required": ["a", "b"]
                }
            })
        }

        async fn execute(&self, params: Params) -> Result<Value> {
            let sum: f64 = ["a", "b"]
                .iter()
                .filter_map(|k| params.get(*k).and_then(Value::as_f64))
                .sum();
            Ok(json!({"status": "success", "sum": sum}))
        }
    }

    #[async_trait]
    impl Plugin for Calculator {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("calculator", "1.0.0")
        }

        fn as_tool_provider(&self) -> Option<&dyn ToolProvider> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn test_tool_plugin_dispatch() {
        let registry = PluginRegistry::new();
        registry.add_builtin_plugin(PluginFactory::new("calculator", |_| {
            Ok(Arc::new(Calculator) as Arc<dyn Plugin>)
        }));
        registry.discover_and_load().await.unwrap();
        let (dispatcher, _bus) = dispatcher(registry);

        let result = dispatcher
            .execute("calculator", Some("execute"), params(json!({"a": 2, "b": 3})))
            .await;
        assert_eq!(result["sum"], 5.0);

        let invalid = dispatcher
            .execute("calculator", Some("execute"), params(json!({"a": 2})))
            .await;
        assert_eq!(invalid["error"], "validation_error");

        let tools = dispatcher.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].source, ToolSource::ToolPlugin);
        assert_eq!(tools[0].description.as_deref(), Some("Adds numbers"));
    }

    #[tokio::test]
    async fn test_event_subscriber_failure_does_not_leak() {
        let (dispatcher, bus) = dispatcher(PluginRegistry::new());
        dispatcher.register_builtin_operations("mem0_memory", HashMap::from([("echo".to_string(), echo("builtin"))]));
        bus.subscribe(
            "tool.mem0_memory.echo",
            handler_fn("webhook", |_| Err(Error::Backend("delivery failed".into()))),
            SubscribeOptions::new(),
        )
        .await;

        let result = dispatcher.execute("mem0_memory", Some("echo"), Params::new()).await;
        assert_eq!(result["status"], "success");
    }

    /// 요청 단계에서 결과를 미리 채우는 미들웨어
    struct Prefilled;

    #[async_trait]
    impl Middleware for Prefilled {
        async fn process_request(&self, _ctx: &OperationContext, mut params: Params) -> Result<Params> {
            params.insert(FROM_CACHE_KEY.to_string(), json!(true));
            params.insert(CACHED_RESULT_KEY.to_string(), json!({"status": "success", "from": "prefilled"}));
            Ok(params)
        }

        async fn process_response(&self, _ctx: &OperationContext, response: Value) -> Result<Value> {
            Ok(response.get(CACHED_RESULT_KEY).cloned().unwrap_or(response))
        }
    }

    #[async_trait]
    impl Plugin for Prefilled {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("prefilled", "1.0.0")
        }

        fn as_middleware(&self) -> Option<&dyn Middleware> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn test_request_middleware_can_skip_handler() {
        let registry = PluginRegistry::new();
        registry.add_builtin_plugin(PluginFactory::new("prefilled", |_| {
            Ok(Arc::new(Prefilled) as Arc<dyn Plugin>)
        }));
        registry.discover_and_load().await.unwrap();
        let (dispatcher, bus) = dispatcher(registry);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let counted = operation_fn(OperationMetadata::new("echo", "Echo"), move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<Value, Error>(json!({"status": "success", "from": "handler"}))
            }
        });
        dispatcher.register_builtin_operations("mem0_memory", HashMap::from([("echo".to_string(), counted)]));

        let result = dispatcher.execute("mem0_memory", Some("echo"), Params::new()).await;
        assert_eq!(result["from"], "prefilled");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let history = bus.get_history(&HistoryQuery::new().topic("tool.mem0_memory.echo")).await;
        assert_eq!(history.len(), 1);
        assert!(history[0].data["params"].get(FROM_CACHE_KEY).is_none());
    }

    #[test]
    fn test_take_short_circuit() {
        let mut plain = params(json!({"query": "x", "_from_cache": false}));
        assert!(take_short_circuit(&mut plain).is_none());
        assert!(plain.contains_key(FROM_CACHE_KEY));

        let mut marked = params(json!({"query": "x", "_from_cache": true, "_cached_result": [1]}));
        assert_eq!(take_short_circuit(&mut marked), Some(json!([1])));
        assert_eq!(marked, params(json!({"query": "x"})));
        assert_eq!(short_circuit_response(json!(1))[FROM_CACHE_KEY], true);
    }
}
