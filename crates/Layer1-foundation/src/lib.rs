//! # mem0-foundation
//!
//! Foundation layer for the Mem0 MCP server:
//! - Error: 공통 에러 타입
//! - Config: 계층형 설정 (JSON/TOML/환경 변수)
//! - Event: 우선순위 기반 이벤트 버스
//! - Container: 스코프 기반 의존성 주입
//! - Logging: tracing subscriber 초기화
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  mem0-core (Plugin Registry / Dispatcher / Server)      │
//! │                     │                                   │
//! │          ┌──────────┴──────────┐                        │
//! │          ▼                     ▼                        │
//! │      EventBus              Container                    │
//! │   (pub/sub, replay)    (singleton/request/transient)    │
//! │                                                         │
//! │      ConfigStore ──▶ ServerConfig                       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod logging;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    ConfigProvider, ConfigStore, LoggingConfig, PluginsConfig, ServerConfig,
    DEFAULT_CONFIG_FILE, ENV_PREFIX,
};

// ============================================================================
// Container
// ============================================================================
pub use container::{Container, Dependency, RequestScope, Scope};

// ============================================================================
// Event
// ============================================================================
pub use event::{
    async_handler_fn, handler_fn, middleware_fn, Event, EventBus, EventBusConfig, EventHandler,
    EventId, EventMiddleware, EventPriority, HistoryQuery, MiddlewareId, SubscribeOptions,
    SubscriptionId,
};

// ============================================================================
// Logging
// ============================================================================
pub use logging::init_logging;
