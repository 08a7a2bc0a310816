//! Event System - 이벤트 발행/구독 시스템
//!
//! 플러그인 생명주기, 도구 호출 완료 등 런타임 전반의 이벤트를 전달합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventBus                              │
//! │                                                              │
//! │  emit(topic) ──▶ history ──▶ middleware ──▶ handlers         │
//! │                              (등록 순)      (우선순위 순)      │
//! │                                                              │
//! │  emit_async(event) ──▶ queue ──▶ worker ──▶ emit             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! use mem0_foundation::event::{handler_fn, EventBus, SubscribeOptions};
//!
//! let bus = Arc::new(EventBus::new());
//! bus.subscribe("plugin.loaded", handler_fn("log", |e| Ok(e.name.clone().into())), SubscribeOptions::new()).await;
//!
//! bus.start().await;
//! bus.emit_async(Event::new("plugin.loaded"))?;
//! bus.stop().await;
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    async_handler_fn, handler_fn, middleware_fn, AsyncFnHandler, EventBus, EventBusConfig,
    EventFilterFn, EventHandler, EventMiddleware, FnHandler, HistoryQuery, MiddlewareId,
    SubscribeOptions, SubscriptionId,
};
pub use types::{Event, EventId, EventPriority, REPLAYED_KEY};
