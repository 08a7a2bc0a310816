//! Operation Context - 오퍼레이션 실행 컨텍스트

use crate::backend::MemoryClient;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// 오퍼레이션 파라미터
pub type Params = Map<String, Value>;

/// 한 번의 오퍼레이션 호출에 대한 컨텍스트
///
/// 디스패처가 요청마다 생성하며, 미들웨어와 핸들러가 같은 인스턴스를 봅니다.
#[derive(Clone)]
pub struct OperationContext {
    /// 프로세스 내에서 고유한 요청 ID
    ///
    /// 요청과 응답 사이에 상태를 들고 있어야 하는 미들웨어가 키로 사용합니다.
    pub request_id: u64,

    /// 도구 이름
    pub tool_name: String,

    /// 오퍼레이션 이름
    pub operation_name: String,

    /// 사용자 ID
    pub user_id: Option<String>,

    /// 세션 ID
    pub session_id: Option<String>,

    /// 추가 메타데이터
    pub metadata: Map<String, Value>,

    /// 시작 시각 (지연 시간 측정용)
    pub started_at: Instant,

    /// 메모리 저장소 클라이언트 (등록된 경우)
    pub memory_client: Option<Arc<dyn MemoryClient>>,
}

impl OperationContext {
    /// 새 컨텍스트 생성
    pub fn new(tool_name: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            tool_name: tool_name.into(),
            operation_name: operation_name.into(),
            user_id: None,
            session_id: None,
            metadata: Map::new(),
            started_at: Instant::now(),
            memory_client: None,
        }
    }

    /// 파라미터의 `user_id`/`session_id`로 컨텍스트 생성
    pub fn from_params(
        tool_name: impl Into<String>,
        operation_name: impl Into<String>,
        params: &Params,
    ) -> Self {
        let field = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);
        let mut ctx = Self::new(tool_name, operation_name);
        ctx.user_id = field("user_id");
        ctx.session_id = field("session_id");
        ctx
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_memory_client(mut self, client: Arc<dyn MemoryClient>) -> Self {
        self.memory_client = Some(client);
        self
    }

    /// 시작 후 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 이벤트 데이터용 JSON 표현
    pub fn to_json(&self) -> Value {
        json!({
            "request_id": self.request_id,
            "tool_name": self.tool_name,
            "operation_name": self.operation_name,
            "user_id": self.user_id,
            "session_id": self.session_id,
            "metadata": self.metadata,
            "elapsed_ms": self.elapsed().as_millis() as u64,
        })
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("request_id", &self.request_id)
            .field("tool_name", &self.tool_name)
            .field("operation_name", &self.operation_name)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("has_memory_client", &self.memory_client.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params() {
        let params = json!({"user_id": "alice", "session_id": "s-1", "query": "x"});
        let ctx = OperationContext::from_params("mem0_memory", "search", params.as_object().unwrap());

        assert_eq!(ctx.user_id.as_deref(), Some("alice"));
        assert_eq!(ctx.session_id.as_deref(), Some("s-1"));

        let json = ctx.to_json();
        assert_eq!(json["tool_name"], "mem0_memory");
        assert_eq!(json["operation_name"], "search");
    }

    #[test]
    fn test_request_ids_are_unique() {
        let first = OperationContext::new("mem0_memory", "search");
        let second = OperationContext::new("mem0_memory", "search");

        assert_ne!(first.request_id, second.request_id);
        assert_eq!(first.clone().request_id, first.request_id);
    }
}
