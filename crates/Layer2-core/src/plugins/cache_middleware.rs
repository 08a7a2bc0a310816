//! Cache Middleware - 읽기 오퍼레이션 결과 캐싱
//!
//! 요청 단계에서 캐시 키를 계산해 적중하면 핸들러를 건너뛰고,
//! 응답 단계에서 성공한 결과를 저장합니다. 만료된 항목은 백그라운드 태스크가 정리합니다.

use crate::dispatcher::{CACHED_RESULT_KEY, FROM_CACHE_KEY};
use crate::operation::{OperationContext, Params};
use crate::plugin::{Middleware, Plugin, PluginFactory, PluginMetadata};
use async_trait::async_trait;
use mem0_foundation::{Error, Result};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

pub const PLUGIN_NAME: &str = "cache_middleware";

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_MAX_SIZE: usize = 1000;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CACHEABLE: &[&str] = &["search", "get", "get_all"];

/// 캐시 키에서 빠지는 파라미터 (`_` 접두사 키도 제외)
const IGNORED_PARAMS: &[&str] = &["session_id"];

struct CacheEntry {
    stored_at: Instant,
    value: Value,
}

/// 캐시 상태 (정리 태스크와 공유)
#[derive(Default)]
struct CacheState {
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// 요청 ID → (캐시 키, 요청 시각). 응답 단계에서 소비됨
    pending: Mutex<HashMap<u64, (String, Instant)>>,
}

impl CacheState {
    fn lookup(&self, key: &str, ttl: Duration) -> Option<Value> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    /// 가득 차면 가장 오래된 항목을 밀어냄
    fn store(&self, key: String, value: Value, max_size: usize) {
        if max_size == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                trace!(key = %oldest, "Evicting oldest cache entry");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// 만료 항목 정리, 제거된 개수 반환
    fn purge_expired(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        // 응답 단계에 도달하지 못한 요청
        self.pending
            .lock()
            .retain(|_, (_, requested_at)| requested_at.elapsed() < ttl);
        before - entries.len()
    }
}

/// 결과 캐싱 미들웨어
///
/// 설정:
/// - `ttl`: 항목 유효 시간 (초, 기본 300)
/// - `max_size`: 최대 항목 수 (기본 1000)
/// - `cacheable_operations`: 캐싱할 오퍼레이션 (기본 search/get/get_all)
/// - `cleanup_interval`: 만료 정리 주기 (초, 기본 60)
pub struct CacheMiddleware {
    config: Map<String, Value>,
    ttl: Duration,
    max_size: usize,
    cleanup_interval: Duration,
    cacheable: Vec<String>,
    state: Arc<CacheState>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl CacheMiddleware {
    pub fn new(config: Map<String, Value>) -> Result<Self> {
        let ttl = seconds(&config, "ttl", DEFAULT_TTL_SECS)?;
        let cleanup_interval = seconds(&config, "cleanup_interval", DEFAULT_CLEANUP_INTERVAL_SECS)?;
        if cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup_interval must be positive".into()));
        }

        let max_size = match config.get("max_size") {
            None => DEFAULT_MAX_SIZE,
            Some(value) => value
                .as_u64()
                .map(|size| size as usize)
                .ok_or_else(|| Error::Config(format!("max_size must be a non-negative integer, got {}", value)))?,
        };

        let cacheable = match config.get("cacheable_operations") {
            None => DEFAULT_CACHEABLE.iter().map(|op| op.to_string()).collect(),
            Some(Value::Array(ops)) => ops
                .iter()
                .map(|op| {
                    op.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Error::Config(format!("cacheable_operations entries must be strings, got {}", op)))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::Config(format!(
                    "cacheable_operations must be an array, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            config,
            ttl,
            max_size,
            cleanup_interval,
            cacheable,
            state: Arc::default(),
            cleanup: Mutex::new(None),
        })
    }

    /// 팩토리 (빌트인 카탈로그 등록용)
    pub fn factory() -> PluginFactory {
        PluginFactory::new(PLUGIN_NAME, |config| {
            Ok(Arc::new(CacheMiddleware::new(config)?) as Arc<dyn Plugin>)
        })
    }

    pub fn is_cacheable(&self, operation: &str) -> bool {
        self.cacheable.iter().any(|op| op == operation)
    }

    /// 현재 캐시된 항목 수
    pub fn len(&self) -> usize {
        self.state.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.entries.lock().clear();
    }

    /// 정리 태스크 실행 여부
    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn seconds(config: &Map<String, Value>, key: &str, default: u64) -> Result<Duration> {
    match config.get(key) {
        None => Ok(Duration::from_secs(default)),
        Some(value) => value
            .as_f64()
            .filter(|secs| *secs >= 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or_else(|| Error::Config(format!("{} must be a non-negative number, got {}", key, value))),
    }
}

/// 도구, 오퍼레이션, 파라미터로 만든 캐시 키
///
/// 파라미터는 키 순으로 정렬되므로 입력 순서와 무관합니다.
pub fn cache_key(tool: &str, operation: &str, params: &Params) -> String {
    let filtered: BTreeMap<&str, &Value> = params
        .iter()
        .filter(|(key, _)| !key.starts_with('_') && !IGNORED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.as_str(), value))
        .collect();
    json!({"tool": tool, "operation": operation, "params": filtered}).to_string()
}

#[async_trait]
impl Middleware for CacheMiddleware {
    async fn process_request(&self, ctx: &OperationContext, mut params: Params) -> Result<Params> {
        if !self.is_cacheable(&ctx.operation_name) {
            return Ok(params);
        }

        let key = cache_key(&ctx.tool_name, &ctx.operation_name, &params);
        match self.state.lookup(&key, self.ttl) {
            Some(cached) => {
                debug!(tool = %ctx.tool_name, operation = %ctx.operation_name, "Cache hit");
                params.insert(FROM_CACHE_KEY.to_string(), Value::Bool(true));
                params.insert(CACHED_RESULT_KEY.to_string(), cached);
            }
            None => {
                trace!(tool = %ctx.tool_name, operation = %ctx.operation_name, "Cache miss");
                self.state
                    .pending
                    .lock()
                    .insert(ctx.request_id, (key, Instant::now()));
            }
        }
        Ok(params)
    }

    async fn process_response(&self, ctx: &OperationContext, response: Value) -> Result<Value> {
        if response.get(FROM_CACHE_KEY) == Some(&Value::Bool(true)) {
            let mut cached = response
                .get(CACHED_RESULT_KEY)
                .cloned()
                .unwrap_or(Value::Null);
            if let Value::Object(ref mut map) = cached {
                map.insert("_cached".to_string(), Value::Bool(true));
            }
            return Ok(cached);
        }

        let Some((key, _)) = self.state.pending.lock().remove(&ctx.request_id) else {
            return Ok(response);
        };
        if response.get("status").and_then(Value::as_str) == Some("success") {
            self.state.store(key, response.clone(), self.max_size);
        }
        Ok(response)
    }

    fn priority(&self) -> i32 {
        50
    }
}

#[async_trait]
impl Plugin for CacheMiddleware {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(PLUGIN_NAME, "1.0.0")
            .with_description("Caches read operation results to reduce backend calls")
            .with_author("Mem0 Team")
            .with_capability("caching")
            .with_capability("performance")
    }

    fn config(&self) -> Map<String, Value> {
        self.config.clone()
    }

    async fn setup(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;
        let period = self.cleanup_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 첫 tick은 즉시 완료됨
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = state.purge_expired(ttl);
                if removed > 0 {
                    debug!(removed, "Expired cache entries removed");
                }
            }
        });

        if let Some(previous) = self.cleanup.lock().replace(handle) {
            previous.abort();
        }
        info!(ttl_secs = ttl.as_secs(), max_size = self.max_size, "Cache middleware initialized");
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let handle = self.cleanup.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // 취소 완료까지 대기 (JoinError::Cancelled)
            let _ = handle.await;
        }
        self.clear();
        self.state.pending.lock().clear();
        Ok(())
    }

    fn as_middleware(&self) -> Option<&dyn Middleware> {
        Some(self)
    }
}
