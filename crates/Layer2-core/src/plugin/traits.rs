//! Plugin traits - 플러그인 수명주기 계약과 역할 인터페이스

use super::metadata::{PluginKind, PluginMetadata};
use crate::backend::GraphBackend;
use crate::operation::{OperationContext, OperationHandler, Params};
use async_trait::async_trait;
use mem0_foundation::{Container, Error, EventBus, Result, ServerConfig};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Plugin Trait - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// 플러그인 트레이트
///
/// 레지스트리는 아래 순서로 훅을 호출합니다:
///
/// ```text
/// validate_config → setup → on_load → on_start ... on_stop → on_unload → teardown
/// ```
///
/// 역할(operation/tool/backend/middleware/extension)은 `as_*` 접근자로
/// 명시적으로 선언합니다. 기본값은 모두 `None`입니다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 플러그인 메타데이터
    fn metadata(&self) -> PluginMetadata;

    /// 생성 시 전달받은 설정
    fn config(&self) -> Map<String, Value> {
        Map::new()
    }

    /// `config_schema.required`에 나열된 키가 모두 있는지 확인
    fn validate_config(&self) -> Result<()> {
        let metadata = self.metadata();
        let Some(schema) = metadata.config_schema else {
            return Ok(());
        };

        let config = self.config();
        let missing: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|key| !config.contains_key(*key))
                    .collect()
            })
            .unwrap_or_default();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Plugin '{}' is missing required config: {}",
                metadata.name,
                missing.join(", ")
            )))
        }
    }

    /// 초기화 (리소스 획득)
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// 정리 (리소스 해제)
    async fn teardown(&self) -> Result<()> {
        Ok(())
    }

    async fn on_load(&self) -> Result<()> {
        Ok(())
    }

    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    async fn on_unload(&self) -> Result<()> {
        Ok(())
    }

    // ========================================================================
    // 역할 접근자
    // ========================================================================

    fn as_operation_provider(&self) -> Option<&dyn OperationProvider> {
        None
    }

    fn as_tool_provider(&self) -> Option<&dyn ToolProvider> {
        None
    }

    fn as_backend_provider(&self) -> Option<&dyn BackendProvider> {
        None
    }

    fn as_middleware(&self) -> Option<&dyn Middleware> {
        None
    }

    fn as_extension(&self) -> Option<&dyn Extension> {
        None
    }

    /// 선언된 역할 목록 (접근자에서 파생)
    fn kinds(&self) -> Vec<PluginKind> {
        PluginKind::ALL
            .into_iter()
            .filter(|kind| self.has_kind(*kind))
            .collect()
    }

    /// 특정 역할 선언 여부
    fn has_kind(&self, kind: PluginKind) -> bool {
        match kind {
            PluginKind::Operation => self.as_operation_provider().is_some(),
            PluginKind::Tool => self.as_tool_provider().is_some(),
            PluginKind::Backend => self.as_backend_provider().is_some(),
            PluginKind::Middleware => self.as_middleware().is_some(),
            PluginKind::Extension => self.as_extension().is_some(),
        }
    }
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metadata = self.metadata();
        f.debug_struct("Plugin")
            .field("name", &metadata.name)
            .field("version", &metadata.version)
            .field("kinds", &self.kinds())
            .finish()
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// 기존 도구에 오퍼레이션을 추가하는 플러그인
pub trait OperationProvider: Send + Sync {
    /// 대상 도구 이름 (예: "mem0_memory")
    fn tool_name(&self) -> String;

    /// 오퍼레이션 이름 -> 핸들러
    fn operations(&self) -> HashMap<String, Arc<dyn OperationHandler>>;
}

/// 새 도구를 추가하는 플러그인
///
/// 디스패처는 `tool_definition()["name"]` 도구의 `execute` 오퍼레이션으로 노출합니다.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// 도구 정의 (`name`, `description`, `inputSchema`)
    fn tool_definition(&self) -> Value;

    async fn execute(&self, params: Params) -> Result<Value>;

    /// 정의에서 도구 이름 추출
    fn tool_name(&self) -> Option<String> {
        self.tool_definition()
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// 그래프 백엔드 구현을 제공하는 플러그인
pub trait BackendProvider: Send + Sync {
    /// 백엔드 분류 (예: "graph")
    fn backend_type(&self) -> String;

    /// 구현 이름 (예: "neo4j")
    fn backend_name(&self) -> String;

    /// 설정을 덮어써서 클라이언트 생성
    fn create_client(&self, overrides: Map<String, Value>) -> Result<Arc<dyn GraphBackend>>;
}

/// 요청/응답 미들웨어
///
/// 요청은 우선순위 오름차순, 응답은 정확히 그 역순으로 통과합니다.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process_request(&self, ctx: &OperationContext, params: Params) -> Result<Params>;

    async fn process_response(&self, ctx: &OperationContext, response: Value) -> Result<Value>;

    /// 낮을수록 먼저 실행
    fn priority(&self) -> i32 {
        100
    }
}

/// 서버 확장 플러그인에 제공되는 컨텍스트
#[derive(Clone)]
pub struct ExtensionContext {
    pub event_bus: Arc<EventBus>,
    pub container: Container,
    pub config: ServerConfig,
}

/// 서버 자체를 확장하는 플러그인
#[async_trait]
pub trait Extension: Send + Sync {
    async fn extend(&self, ctx: &ExtensionContext) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Schemaed {
        config: Map<String, Value>,
    }

    #[async_trait]
    impl Plugin for Schemaed {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("schemaed", "1.0.0")
                .with_config_schema(json!({"type": "object", "required": ["api_url"]}))
        }

        fn config(&self) -> Map<String, Value> {
            self.config.clone()
        }
    }

    struct Both;

    #[async_trait]
    impl Middleware for Both {
        async fn process_request(&self, _ctx: &OperationContext, params: Params) -> Result<Params> {
            Ok(params)
        }

        async fn process_response(&self, _ctx: &OperationContext, response: Value) -> Result<Value> {
            Ok(response)
        }
    }

    #[async_trait]
    impl ToolProvider for Both {
        fn tool_definition(&self) -> Value {
            json!({"name": "both_tool", "description": "Both"})
        }

        async fn execute(&self, params: Params) -> Result<Value> {
            Ok(Value::Object(params))
        }
    }

    #[async_trait]
    impl Plugin for Both {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("both", "1.0.0")
        }

        fn as_tool_provider(&self) -> Option<&dyn ToolProvider> {
            Some(self)
        }

        fn as_middleware(&self) -> Option<&dyn Middleware> {
            Some(self)
        }
    }

    #[test]
    fn test_validate_config_required_keys() {
        let missing = Schemaed { config: Map::new() };
        let err = missing.validate_config().unwrap_err();
        assert!(err.to_string().contains("api_url"));

        let mut config = Map::new();
        config.insert("api_url".into(), json!("http://localhost"));
        assert!(Schemaed { config }.validate_config().is_ok());
    }

    #[test]
    fn test_kinds_from_accessors() {
        assert_eq!(Both.kinds(), vec![PluginKind::Tool, PluginKind::Middleware]);
        assert!(Schemaed { config: Map::new() }.kinds().is_empty());
        assert_eq!(Both.as_tool_provider().and_then(|t| t.tool_name()).as_deref(), Some("both_tool"));
        assert_eq!(Both.as_middleware().map(|m| m.priority()), Some(100));
    }
}
