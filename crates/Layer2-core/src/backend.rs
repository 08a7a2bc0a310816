//! Backend - 외부 협력자 인터페이스
//!
//! 원격 메모리 저장소 클라이언트와 그래프 백엔드는 이 crate 밖에서
//! 구현됩니다. 코어는 아래 trait을 통해서만 호출합니다.

use async_trait::async_trait;
use mem0_foundation::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// MemoryFilters
// ============================================================================

/// 메모리 범위 필터 (user/agent/app/run)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl MemoryFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// 요청 파라미터에서 범위 필드 추출
    pub fn from_params(params: &Map<String, Value>) -> Self {
        let field = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            user_id: field("user_id"),
            agent_id: field("agent_id"),
            app_id: field("app_id"),
            run_id: field("run_id"),
        }
    }

    /// 범위가 하나도 지정되지 않았는지 확인
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.agent_id.is_none()
            && self.app_id.is_none()
            && self.run_id.is_none()
    }
}

// ============================================================================
// MemoryClient
// ============================================================================

/// 원격 메모리 저장소 클라이언트
///
/// 서버 시작 시 컨테이너에 싱글톤으로 등록되고,
/// `OperationContext::memory_client`로 핸들러에 전달됩니다.
#[async_trait]
pub trait MemoryClient: Send + Sync {
    async fn add(&self, messages: Value, filters: &MemoryFilters, options: Map<String, Value>)
        -> Result<Value>;

    async fn get(&self, memory_id: &str) -> Result<Value>;

    async fn get_all(&self, filters: &MemoryFilters) -> Result<Value>;

    async fn search(&self, query: &str, filters: &MemoryFilters, limit: Option<usize>)
        -> Result<Value>;

    async fn update(&self, memory_id: &str, data: Value) -> Result<Value>;

    async fn delete(&self, memory_id: &str) -> Result<Value>;

    async fn delete_all(&self, filters: &MemoryFilters) -> Result<Value>;
}

// ============================================================================
// GraphBackend
// ============================================================================

/// 그래프 백엔드 클라이언트
///
/// `BackendProvider` 플러그인이 생성하며, 레지스트리는
/// `(backend_type, backend_name)`으로 찾습니다.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn add(&self, data: Value, filters: &MemoryFilters) -> Result<Value>;

    async fn search(
        &self,
        query: &str,
        filters: &MemoryFilters,
        limit: usize,
        threshold: f64,
    ) -> Result<Value>;

    async fn get_all(&self, filters: &MemoryFilters) -> Result<Value>;

    async fn delete_all(&self, filters: &MemoryFilters) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filters_from_params() {
        let params = json!({"user_id": "alice", "run_id": "r1", "limit": 5});
        let filters = MemoryFilters::from_params(params.as_object().unwrap());

        assert_eq!(filters, MemoryFilters::user("alice").with_run("r1"));
        assert!(!filters.is_empty());
        assert!(MemoryFilters::new().is_empty());
    }

    #[test]
    fn test_filters_serialize_skips_empty() {
        let value = serde_json::to_value(MemoryFilters::user("bob")).unwrap();
        assert_eq!(value, json!({"user_id": "bob"}));
    }
}
