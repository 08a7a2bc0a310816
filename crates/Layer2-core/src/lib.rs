//! mem0-core: Core Runtime for the Mem0 MCP server
//!
//! Layer2 - 플러그인, 오퍼레이션, 디스패치 레이어
//!
//! # 주요 모듈
//!
//! - `backend`: 외부 메모리 저장소/그래프 백엔드 인터페이스
//! - `operation`: 오퍼레이션 핸들러 계약 (파라미터 검증, 에러 페이로드)
//! - `plugin`: 플러그인 수명주기와 레지스트리
//! - `dispatcher`: 미들웨어 체인을 거치는 요청 라우팅
//! - `server`: 서버 호스트 (initialize / start / stop / shutdown)
//! - `plugins`: 빌트인 플러그인
//!
//! # 사용 예시
//!
//! ```ignore
//! use mem0_core::{load_config, Mem0Server};
//!
//! let server = Mem0Server::new(load_config(None)?)
//!     .with_memory_client(client);
//!
//! server.initialize().await?;
//! server.start().await;
//!
//! let result = server
//!     .handle_tool_call("mem0_memory", params)
//!     .await;
//!
//! server.shutdown().await;
//! ```

pub mod backend;
pub mod dispatcher;
pub mod operation;
pub mod plugin;
pub mod plugins;
pub mod server;

// Re-exports: Backend
pub use backend::{GraphBackend, MemoryClient, MemoryFilters};

// Re-exports: Operation
pub use operation::{
    error_payload, operation_fn, BatchOperation, BatchOperationHandler, OperationContext,
    OperationHandler, OperationMetadata, ParameterDefinition, ParameterType, Params,
};

// Re-exports: Plugin
pub use plugin::{
    BackendProvider, Extension, ExtensionContext, Middleware, OperationProvider, Plugin,
    PluginCatalog, PluginFactory, PluginInfo, PluginKind, PluginManifest, PluginMetadata,
    PluginModule, PluginRegistry, PluginState, ToolProvider,
};

// Re-exports: Dispatcher / Server
pub use dispatcher::{
    Dispatcher, ToolDescriptor, ToolSource, CACHED_RESULT_KEY, FROM_CACHE_KEY, TOOL_EXECUTE_OPERATION,
};
pub use server::{load_config, Mem0Server};

// Re-exports: Foundation
pub use mem0_foundation::{Container, Error, EventBus, Result, Scope, ServerConfig};
