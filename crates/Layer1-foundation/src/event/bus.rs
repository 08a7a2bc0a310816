//! Event Bus - 우선순위 기반 이벤트 발행/구독 시스템
//!
//! 토픽별 핸들러 목록을 우선순위 순으로 유지하며, 미들웨어 체인,
//! 히스토리, 비동기 큐, 재생(replay)을 지원합니다.

use super::types::{Event, EventPriority, REPLAYED_KEY};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

// ============================================================================
// IDs
// ============================================================================

/// 구독 ID (구독 해제에 사용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// 미들웨어 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

impl std::fmt::Display for MiddlewareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "middleware-{}", self.0)
    }
}

// ============================================================================
// EventHandler Trait
// ============================================================================

/// 이벤트 핸들러 trait
///
/// 반환값은 `emit` 결과 목록에 핸들러 호출 순서대로 담깁니다.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 핸들러 이름 (로깅용)
    fn name(&self) -> &str {
        "anonymous"
    }

    /// 이벤트 처리
    async fn handle(&self, event: &Event) -> Result<Value>;
}

/// 동기 클로저 핸들러
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<Value> {
        (self.f)(event)
    }
}

/// 비동기 클로저 핸들러
pub struct AsyncFnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for AsyncFnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<Value> {
        (self.f)(event.clone()).await
    }
}

/// 동기 클로저로 핸들러 생성
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// 비동기 클로저로 핸들러 생성
pub fn async_handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(AsyncFnHandler {
        name: name.into(),
        f,
    })
}

// ============================================================================
// EventMiddleware Trait
// ============================================================================

/// 이벤트 미들웨어
///
/// `None`을 반환하면 해당 발행이 취소되어 어떤 핸들러도 호출되지 않습니다.
#[async_trait]
pub trait EventMiddleware: Send + Sync {
    fn name(&self) -> &str {
        "middleware"
    }

    async fn process(&self, event: Event) -> Option<Event>;
}

struct FnMiddleware<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventMiddleware for FnMiddleware<F>
where
    F: Fn(Event) -> Option<Event> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Option<Event> {
        (self.f)(event)
    }
}

/// 동기 클로저로 미들웨어 생성
pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn EventMiddleware>
where
    F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware {
        name: name.into(),
        f,
    })
}

// ============================================================================
// SubscribeOptions
// ============================================================================

/// 이벤트 필터 함수
pub type EventFilterFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// 구독 옵션
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// 실행 우선순위
    pub priority: EventPriority,

    /// 필터 (false면 해당 이벤트 건너뜀)
    pub filter: Option<EventFilterFn>,

    /// 한 번만 실행
    pub once: bool,

    /// 약한 참조로 보관 (호출자가 강한 참조를 유지해야 함)
    pub weak: bool,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn weak(mut self) -> Self {
        self.weak = true;
        self
    }
}

impl std::fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("priority", &self.priority)
            .field("filter", &self.filter.is_some())
            .field("once", &self.once)
            .field("weak", &self.weak)
            .finish()
    }
}

// ============================================================================
// Registered handler
// ============================================================================

enum HandlerRef {
    Strong(Arc<dyn EventHandler>),
    Weak(Weak<dyn EventHandler>),
}

impl HandlerRef {
    fn upgrade(&self) -> Option<Arc<dyn EventHandler>> {
        match self {
            Self::Strong(handler) => Some(Arc::clone(handler)),
            Self::Weak(handler) => handler.upgrade(),
        }
    }
}

struct RegisteredHandler {
    id: SubscriptionId,
    handler: HandlerRef,
    priority: EventPriority,
    filter: Option<EventFilterFn>,
    once: bool,
    /// once 핸들러 선점 플래그 (중첩 발행에서 중복 실행 방지)
    claimed: AtomicBool,
}

// ============================================================================
// Config / Query
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// 이벤트 히스토리 보관 개수
    pub history_size: usize,

    /// 디버그 모드 (모든 이벤트 로깅)
    pub debug_mode: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            debug_mode: false,
        }
    }
}

/// 히스토리 조회 조건 (모든 조건은 AND)
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// 토픽
    pub topic: Option<String>,

    /// 가장 최근 N개
    pub limit: Option<usize>,

    /// 이 시각 이후 (포함하지 않음)
    pub since: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// 최근 `limit`개만 반환 (0은 제한 없음)
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    fn matches(&self, event: &Event) -> bool {
        if let Some(ref topic) = self.topic {
            if &event.name != topic {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp <= since {
                return false;
            }
        }
        true
    }
}

enum QueueItem {
    Event(Event),
    Stop,
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스
///
/// ## 사용법
///
/// ```ignore
/// use mem0_foundation::event::{handler_fn, EventBus, EventPriority, SubscribeOptions};
///
/// let bus = EventBus::new();
///
/// let id = bus
///     .subscribe(
///         "memory.added",
///         handler_fn("audit", |event| Ok(event.data.clone().into())),
///         SubscribeOptions::new().priority(EventPriority::High),
///     )
///     .await;
///
/// let results = bus.emit("memory.added", Map::new()).await;
/// bus.unsubscribe("memory.added", id).await;
/// ```
pub struct EventBus {
    /// 설정
    config: EventBusConfig,

    /// 토픽별 핸들러 (우선순위 오름차순, 동순위는 등록 순)
    handlers: RwLock<HashMap<String, Vec<Arc<RegisteredHandler>>>>,

    /// 미들웨어 (등록 순)
    middleware: RwLock<Vec<(MiddlewareId, Arc<dyn EventMiddleware>)>>,

    /// 이벤트 히스토리
    history: RwLock<VecDeque<Event>>,

    /// ID 카운터
    id_counter: AtomicU64,

    /// 발행된 이벤트 수
    event_count: AtomicU64,

    /// 비동기 큐
    queue_tx: mpsc::UnboundedSender<QueueItem>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<QueueItem>>>,
    queued: AtomicUsize,

    /// 큐 워커 (종료 시 수신자를 돌려줌)
    worker: Mutex<Option<JoinHandle<mpsc::UnboundedReceiver<QueueItem>>>>,
    running: AtomicBool,
}

impl EventBus {
    /// 기본 설정으로 이벤트 버스 생성
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// 커스텀 설정으로 이벤트 버스 생성
    pub fn with_config(config: EventBusConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            id_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            queued: AtomicUsize::new(0),
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    fn next_id(&self) -> u64 {
        self.id_counter.fetch_add(1, Ordering::SeqCst)
    }

    // ========================================================================
    // 구독
    // ========================================================================

    /// 핸들러 구독
    ///
    /// `options.weak`이면 약한 참조만 보관합니다. 호출자가 가진 마지막
    /// `Arc`가 사라지면 다음 발행 때 목록에서 제거됩니다.
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id());

        debug!(
            topic,
            handler_name = handler.name(),
            subscription_id = %id,
            priority = options.priority.as_str(),
            once = options.once,
            weak = options.weak,
            "Subscribing event handler"
        );

        let handler = if options.weak {
            HandlerRef::Weak(Arc::downgrade(&handler))
        } else {
            HandlerRef::Strong(handler)
        };

        let registered = Arc::new(RegisteredHandler {
            id,
            handler,
            priority: options.priority,
            filter: options.filter,
            once: options.once,
            claimed: AtomicBool::new(false),
        });

        let mut handlers = self.handlers.write().await;
        let list = handlers.entry(topic.to_string()).or_default();

        // 같은 우선순위 안에서는 등록 순서 유지
        let value = registered.priority.value();
        let pos = list.partition_point(|h| h.priority.value() <= value);
        list.insert(pos, registered);

        id
    }

    /// 구독 해제
    pub async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().await;
        let Some(list) = handlers.get_mut(topic) else {
            return false;
        };

        let Some(pos) = list.iter().position(|h| h.id == id) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            handlers.remove(topic);
        }

        debug!(topic, subscription_id = %id, "Unsubscribed event handler");
        true
    }

    /// 토픽(또는 전체)의 모든 핸들러 해제, 해제된 수 반환
    pub async fn unsubscribe_all(&self, topic: Option<&str>) -> usize {
        let mut handlers = self.handlers.write().await;
        let removed = match topic {
            Some(topic) => handlers.remove(topic).map(|l| l.len()).unwrap_or(0),
            None => {
                let count = handlers.values().map(Vec::len).sum();
                handlers.clear();
                count
            }
        };

        debug!(topic = topic.unwrap_or("*"), removed, "Unsubscribed all handlers");
        removed
    }

    /// 토픽의 핸들러 수
    pub async fn handler_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .await
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// 구독된 토픽 목록
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    // ========================================================================
    // 미들웨어
    // ========================================================================

    /// 미들웨어 추가 (등록 순으로 실행)
    pub async fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>) -> MiddlewareId {
        let id = MiddlewareId(self.next_id());
        debug!(middleware = middleware.name(), middleware_id = %id, "Adding event middleware");
        self.middleware.write().await.push((id, middleware));
        id
    }

    /// 미들웨어 제거
    pub async fn remove_middleware(&self, id: MiddlewareId) -> bool {
        let mut middleware = self.middleware.write().await;
        let before = middleware.len();
        middleware.retain(|(mid, _)| *mid != id);
        middleware.len() != before
    }

    // ========================================================================
    // 발행
    // ========================================================================

    /// 토픽으로 이벤트 발행
    pub async fn emit(&self, topic: &str, data: Map<String, Value>) -> Vec<Value> {
        self.emit_event(Event::new(topic).with_data(data)).await
    }

    /// 이벤트 발행 (핸들러 결과를 호출 순서대로 반환)
    ///
    /// 핸들러는 잠금 없이 호출되므로 핸들러 안에서 다시 발행하거나
    /// 구독해도 안전합니다.
    pub async fn emit_event(&self, event: Event) -> Vec<Value> {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);

        if self.config.debug_mode {
            trace!(
                event_id = %event.id,
                topic = %event.name,
                "Emitting event #{}", event_count + 1
            );
        }

        self.record(&event).await;

        let Some(event) = self.apply_middleware(event).await else {
            return Vec::new();
        };

        let snapshot: Vec<Arc<RegisteredHandler>> = self
            .handlers
            .read()
            .await
            .get(&event.name)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(snapshot.len());
        let mut finished = Vec::new();

        for registered in &snapshot {
            let Some(handler) = registered.handler.upgrade() else {
                trace!(subscription_id = %registered.id, "Dropping dead weak handler");
                finished.push(registered.id);
                continue;
            };

            if let Some(ref filter) = registered.filter {
                if !filter(&event) {
                    continue;
                }
            }

            if registered.once && registered.claimed.swap(true, Ordering::SeqCst) {
                continue;
            }

            let outcome = AssertUnwindSafe(handler.handle(&event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(value)) => {
                    results.push(value);
                    if registered.once {
                        finished.push(registered.id);
                    }
                }
                Ok(Err(e)) => {
                    error!(
                        topic = %event.name,
                        handler_name = handler.name(),
                        error = %e,
                        "Event handler failed"
                    );
                    registered.claimed.store(false, Ordering::SeqCst);
                }
                Err(_) => {
                    error!(
                        topic = %event.name,
                        handler_name = handler.name(),
                        "Event handler panicked"
                    );
                    registered.claimed.store(false, Ordering::SeqCst);
                }
            }
        }

        if !finished.is_empty() {
            let mut handlers = self.handlers.write().await;
            if let Some(list) = handlers.get_mut(&event.name) {
                list.retain(|h| !finished.contains(&h.id));
                if list.is_empty() {
                    handlers.remove(&event.name);
                }
            }
        }

        results
    }

    async fn record(&self, event: &Event) {
        if self.config.history_size == 0 {
            return;
        }

        let mut history = self.history.write().await;
        history.push_back(event.clone());
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    async fn apply_middleware(&self, mut event: Event) -> Option<Event> {
        let chain: Vec<Arc<dyn EventMiddleware>> = self
            .middleware
            .read()
            .await
            .iter()
            .map(|(_, m)| Arc::clone(m))
            .collect();

        for middleware in chain {
            match middleware.process(event).await {
                Some(next) => event = next,
                None => {
                    debug!(middleware = middleware.name(), "Event cancelled by middleware");
                    return None;
                }
            }
        }

        Some(event)
    }

    // ========================================================================
    // 비동기 큐
    // ========================================================================

    /// 큐에 이벤트 추가 (워커가 FIFO 순서로 발행)
    pub fn emit_async(&self, event: Event) -> Result<()> {
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.queue_tx.send(QueueItem::Event(event)).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            Error::Internal("Event queue is closed".to_string())
        })
    }

    /// 큐에 남은 이벤트 수
    pub fn queued_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// 워커 실행 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 큐 워커 시작 (이미 실행 중이면 무시)
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }

        let Some(mut rx) = self.queue_rx.lock().await.take() else {
            warn!("Event queue receiver unavailable, worker not started");
            return;
        };

        // 버스가 사라지면 송신자도 사라져 워커가 종료됨
        let bus = Arc::downgrade(self);
        *worker = Some(tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    QueueItem::Stop => break,
                    QueueItem::Event(event) => {
                        let Some(bus) = bus.upgrade() else {
                            break;
                        };
                        bus.queued.fetch_sub(1, Ordering::SeqCst);
                        bus.emit_event(event).await;
                    }
                }
            }
            rx
        }));

        self.running.store(true, Ordering::SeqCst);
        debug!("Event bus worker started");
    }

    /// 큐 워커 중지
    ///
    /// 중지 신호보다 먼저 큐에 들어간 이벤트는 모두 처리된 뒤 반환합니다.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(handle) = worker.take() else {
            return;
        };

        let _ = self.queue_tx.send(QueueItem::Stop);

        match handle.await {
            Ok(rx) => *self.queue_rx.lock().await = Some(rx),
            Err(e) => error!(error = %e, "Event bus worker terminated abnormally"),
        }

        self.running.store(false, Ordering::SeqCst);
        debug!("Event bus worker stopped");
    }

    // ========================================================================
    // 히스토리 / 재생
    // ========================================================================

    /// 히스토리 조회 (발행 순서)
    pub async fn get_history(&self, query: &HistoryQuery) -> Vec<Event> {
        let history = self.history.read().await;
        let matched: Vec<&Event> = history.iter().filter(|e| query.matches(e)).collect();

        let skip = match query.limit {
            Some(limit) if limit > 0 => matched.len().saturating_sub(limit),
            _ => 0,
        };

        matched.into_iter().skip(skip).cloned().collect()
    }

    /// 히스토리 클리어
    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// 캡처된 이벤트 재발행
    ///
    /// 원래 이벤트 간 시간 간격을 `speed`로 나눈 만큼 대기합니다.
    /// 재발행된 이벤트는 새 ID와 현재 시각을 가지며 `replayed` 메타데이터가 붙습니다.
    pub async fn replay_events(&self, events: &[Event], speed: f64) -> Result<usize> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(Error::Validation(format!(
                "Replay speed must be positive, got {}",
                speed
            )));
        }

        debug!(count = events.len(), speed, "Replaying events");

        let mut previous: Option<DateTime<Utc>> = None;
        for original in events {
            if let Some(prev) = previous {
                let delta = (original.timestamp - prev).to_std().unwrap_or(Duration::ZERO);
                if !delta.is_zero() {
                    tokio::time::sleep(delta.div_f64(speed)).await;
                }
            }
            previous = Some(original.timestamp);

            let mut metadata = original.metadata.clone();
            metadata.insert(REPLAYED_KEY.to_string(), Value::Bool(true));

            let mut replayed = Event::new(original.name.clone())
                .with_data(original.data.clone())
                .with_metadata(metadata);
            replayed.source = original.source.clone();

            self.emit_event(replayed).await;
        }

        Ok(events.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(name: &str, value: Value) -> Arc<dyn EventHandler> {
        handler_fn(name, move |_| Ok(value.clone()))
    }

    #[tokio::test]
    async fn test_priority_order() {
        let bus = EventBus::new();

        bus.subscribe("x", constant("low", json!("h2")), SubscribeOptions::new().priority(EventPriority::Low))
            .await;
        bus.subscribe("x", constant("high", json!("h1")), SubscribeOptions::new().priority(EventPriority::High))
            .await;
        bus.subscribe("x", constant("normal-a", json!("n1")), SubscribeOptions::new())
            .await;
        bus.subscribe("x", constant("normal-b", json!("n2")), SubscribeOptions::new())
            .await;

        let results = bus.emit("x", Map::new()).await;
        assert_eq!(results, vec![json!("h1"), json!("n1"), json!("n2"), json!("h2")]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe("x", constant("a", json!(1)), SubscribeOptions::new()).await;

        assert_eq!(bus.handler_count("x").await, 1);
        assert!(bus.unsubscribe("x", id).await);
        assert!(!bus.unsubscribe("x", id).await);
        assert!(bus.emit("x", Map::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_all() {
        let bus = EventBus::new();
        bus.subscribe("a", constant("1", json!(1)), SubscribeOptions::new()).await;
        bus.subscribe("a", constant("2", json!(2)), SubscribeOptions::new()).await;
        bus.subscribe("b", constant("3", json!(3)), SubscribeOptions::new()).await;

        assert_eq!(bus.unsubscribe_all(Some("a")).await, 2);
        assert_eq!(bus.topics().await, vec!["b"]);
        assert_eq!(bus.unsubscribe_all(None).await, 1);
        assert!(bus.topics().await.is_empty());
    }

    #[tokio::test]
    async fn test_once_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        bus.subscribe(
            "x",
            handler_fn("once", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }),
            SubscribeOptions::new().once(),
        )
        .await;

        for _ in 0..3 {
            bus.emit("x", Map::new()).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count("x").await, 0);
    }

    #[tokio::test]
    async fn test_failed_once_handler_stays() {
        let bus = EventBus::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        bus.subscribe(
            "x",
            handler_fn("flaky", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::Internal("first attempt".into()))
                } else {
                    Ok(json!("ok"))
                }
            }),
            SubscribeOptions::new().once(),
        )
        .await;

        assert!(bus.emit("x", Map::new()).await.is_empty());
        assert_eq!(bus.emit("x", Map::new()).await, vec![json!("ok")]);
        assert!(bus.emit("x", Map::new()).await.is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_weak_handler_collected() {
        let bus = EventBus::new();
        let handler = constant("weak", json!("alive"));

        bus.subscribe("x", handler.clone(), SubscribeOptions::new().weak())
            .await;
        assert_eq!(bus.emit("x", Map::new()).await, vec![json!("alive")]);

        drop(handler);

        assert!(bus.emit("x", Map::new()).await.is_empty());
        assert_eq!(bus.handler_count("x").await, 0);
    }

    #[tokio::test]
    async fn test_filter() {
        let bus = EventBus::new();
        bus.subscribe(
            "memory.added",
            constant("filtered", json!("seen")),
            SubscribeOptions::new().filter(|e| e.get("user_id") == Some(&json!("alice"))),
        )
        .await;

        let mut data = Map::new();
        data.insert("user_id".into(), json!("bob"));
        assert!(bus.emit("memory.added", data).await.is_empty());

        let mut data = Map::new();
        data.insert("user_id".into(), json!("alice"));
        assert_eq!(bus.emit("memory.added", data).await, vec![json!("seen")]);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let bus = EventBus::new();
        bus.subscribe(
            "x",
            handler_fn("broken", |_| Err(Error::Internal("boom".into()))),
            SubscribeOptions::new().priority(EventPriority::Highest),
        )
        .await;
        bus.subscribe(
            "x",
            handler_fn("panics", |_| panic!("handler panic")),
            SubscribeOptions::new().priority(EventPriority::High),
        )
        .await;
        bus.subscribe("x", constant("ok", json!("ok")), SubscribeOptions::new())
            .await;

        assert_eq!(bus.emit("x", Map::new()).await, vec![json!("ok")]);
    }

    #[tokio::test]
    async fn test_middleware_transform_and_cancel() {
        let bus = EventBus::new();
        bus.subscribe(
            "x",
            handler_fn("echo", |e| Ok(e.get("tag").cloned().unwrap_or(Value::Null))),
            SubscribeOptions::new(),
        )
        .await;

        let tagger = bus
            .add_middleware(middleware_fn("tagger", |e| {
                Some(e.with_field("tag", json!("tagged")))
            }))
            .await;
        assert_eq!(bus.emit("x", Map::new()).await, vec![json!("tagged")]);

        let blocker = bus.add_middleware(middleware_fn("blocker", |_| None)).await;
        assert!(bus.emit("x", Map::new()).await.is_empty());

        assert!(bus.remove_middleware(blocker).await);
        assert!(bus.remove_middleware(tagger).await);
        assert!(!bus.remove_middleware(tagger).await);
        assert_eq!(bus.emit("x", Map::new()).await, vec![Value::Null]);

        // 취소된 이벤트도 히스토리에는 남음
        assert_eq!(bus.get_history(&HistoryQuery::new()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_nested_emit() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = Arc::downgrade(&bus);

        bus.subscribe("inner", constant("inner", json!("inner")), SubscribeOptions::new())
            .await;
        bus.subscribe(
            "outer",
            async_handler_fn("outer", move |_| {
                let bus = inner_bus.clone();
                async move {
                    let bus = bus
                        .upgrade()
                        .ok_or_else(|| Error::Internal("bus dropped".into()))?;
                    let inner = bus.emit("inner", Map::new()).await;
                    Ok::<Value, Error>(Value::Array(inner))
                }
            }),
            SubscribeOptions::new(),
        )
        .await;

        let results = bus.emit("outer", Map::new()).await;
        assert_eq!(results, vec![json!(["inner"])]);
    }

    #[tokio::test]
    async fn test_history_bound() {
        let bus = EventBus::with_config(EventBusConfig {
            history_size: 3,
            ..Default::default()
        });

        for i in 0..5 {
            bus.emit(&format!("event.{}", i), Map::new()).await;
        }

        let names: Vec<String> = bus
            .get_history(&HistoryQuery::new())
            .await
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["event.2", "event.3", "event.4"]);
    }

    #[tokio::test]
    async fn test_history_query() {
        let bus = EventBus::new();
        bus.emit("a", Map::new()).await;
        let marker = Utc::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        bus.emit("b", Map::new()).await;
        bus.emit("a", Map::new()).await;
        bus.emit("a", Map::new()).await;

        assert_eq!(bus.get_history(&HistoryQuery::new().topic("a")).await.len(), 3);
        assert_eq!(
            bus.get_history(&HistoryQuery::new().topic("a").since(marker))
                .await
                .len(),
            2
        );
        assert_eq!(
            bus.get_history(&HistoryQuery::new().topic("a").limit(1)).await.len(),
            1
        );
        assert_eq!(
            bus.get_history(&HistoryQuery::new().topic("a").limit(0)).await.len(),
            3
        );

        bus.clear_history().await;
        assert!(bus.get_history(&HistoryQuery::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_emit_async_worker() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();

        bus.subscribe(
            "queued",
            handler_fn("collector", move |e| {
                sink.lock().push(e.get("n").cloned().unwrap_or(Value::Null));
                Ok(Value::Null)
            }),
            SubscribeOptions::new(),
        )
        .await;

        // 워커 시작 전 적재된 이벤트도 처리됨
        for n in 0..3 {
            bus.emit_async(Event::new("queued").with_field("n", json!(n)))
                .unwrap();
        }
        assert_eq!(bus.queued_len(), 3);

        bus.start().await;
        assert!(bus.is_running());
        for n in 3..5 {
            bus.emit_async(Event::new("queued").with_field("n", json!(n)))
                .unwrap();
        }
        bus.stop().await;

        assert!(!bus.is_running());
        assert_eq!(bus.queued_len(), 0);
        assert_eq!(*seen.lock(), vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);

        // 재시작 가능
        bus.start().await;
        bus.emit_async(Event::new("queued").with_field("n", json!(5)))
            .unwrap();
        bus.stop().await;
        assert_eq!(seen.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_replay_events() {
        let bus = EventBus::new();
        let base = Utc::now();
        let captured = vec![
            Event::new("a").with_timestamp(base),
            Event::new("b").with_timestamp(base + chrono::Duration::milliseconds(40)),
        ];

        bus.subscribe(
            "b",
            handler_fn("replay-check", |e| Ok(json!(e.is_replayed()))),
            SubscribeOptions::new(),
        )
        .await;

        let started = std::time::Instant::now();
        assert_eq!(bus.replay_events(&captured, 2.0).await.unwrap(), 2);
        assert!(started.elapsed() >= Duration::from_millis(20));

        let history = bus.get_history(&HistoryQuery::new()).await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(Event::is_replayed));
        assert_ne!(history[0].id, captured[0].id);

        assert!(matches!(
            bus.replay_events(&captured, 0.0).await,
            Err(Error::Validation(_))
        ));
    }
}
