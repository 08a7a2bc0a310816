//! Logging Middleware - 모든 오퍼레이션 요청/응답 로깅

use crate::operation::{OperationContext, Params};
use crate::plugin::{Middleware, Plugin, PluginFactory, PluginMetadata};
use async_trait::async_trait;
use mem0_foundation::{Error, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn, Level};

pub const PLUGIN_NAME: &str = "logging_middleware";

/// 로그에서 가려지는 파라미터
const SENSITIVE_FIELDS: &[&str] = &["api_key", "password", "token", "secret"];

const REDACTED: &str = "***REDACTED***";

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::TRACE => trace!($($arg)+),
            Level::DEBUG => debug!($($arg)+),
            Level::INFO => info!($($arg)+),
            Level::WARN => warn!($($arg)+),
            _ => error!($($arg)+),
        }
    };
}

/// 요청/응답 로깅 미들웨어
///
/// - 요청: 민감한 파라미터를 가린 뒤 로깅
/// - 응답: 상태와 지연 시간을 로깅하고 객체 응답에 `_execution_time_ms` 추가
pub struct LoggingMiddleware {
    config: Map<String, Value>,
    level: Level,
}

impl LoggingMiddleware {
    pub fn new(config: Map<String, Value>) -> Result<Self> {
        let level = match config.get("log_level") {
            None => Level::INFO,
            Some(Value::String(level)) => level
                .parse::<Level>()
                .map_err(|_| Error::Config(format!("Invalid log_level: {}", level)))?,
            Some(other) => {
                return Err(Error::Config(format!("log_level must be a string, got {}", other)))
            }
        };
        Ok(Self { config, level })
    }

    /// 팩토리 (빌트인 등록용)
    pub fn factory() -> PluginFactory {
        PluginFactory::new(PLUGIN_NAME, |config| {
            Ok(Arc::new(LoggingMiddleware::new(config)?) as Arc<dyn Plugin>)
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

/// 민감한 필드를 가린 사본
pub fn sanitize_params(params: &Params) -> Params {
    let mut sanitized = params.clone();
    for field in SENSITIVE_FIELDS {
        if let Some(value) = sanitized.get_mut(*field) {
            *value = json!(REDACTED);
        }
    }
    sanitized
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn process_request(&self, ctx: &OperationContext, params: Params) -> Result<Params> {
        let sanitized = Value::Object(sanitize_params(&params));
        log_at!(
            self.level,
            tool = %ctx.tool_name,
            operation = %ctx.operation_name,
            params = %sanitized,
            "Request: {}.{}", ctx.tool_name, ctx.operation_name
        );
        Ok(params)
    }

    async fn process_response(&self, ctx: &OperationContext, mut response: Value) -> Result<Value> {
        let elapsed_ms = ctx.elapsed().as_millis() as u64;
        if let Value::Object(ref mut map) = response {
            map.insert("_execution_time_ms".to_string(), json!(elapsed_ms));
        }

        let status = response
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        if status == "success" {
            log_at!(
                self.level,
                tool = %ctx.tool_name,
                operation = %ctx.operation_name,
                status,
                execution_time_ms = elapsed_ms,
                "Response: {}.{} - {}", ctx.tool_name, ctx.operation_name, status
            );
        } else {
            let error = response.get("error").map(Value::to_string).unwrap_or_default();
            error!(
                tool = %ctx.tool_name,
                operation = %ctx.operation_name,
                status,
                execution_time_ms = elapsed_ms,
                error = %error,
                "Response: {}.{} - {}", ctx.tool_name, ctx.operation_name, status
            );
        }

        Ok(response)
    }

    fn priority(&self) -> i32 {
        10
    }
}

#[async_trait]
impl Plugin for LoggingMiddleware {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(PLUGIN_NAME, "1.0.0")
            .with_description("Logs all tool operations for debugging and monitoring")
            .with_author("Mem0 Team")
            .with_capability("logging")
            .with_capability("monitoring")
    }

    fn config(&self) -> Map<String, Value> {
        self.config.clone()
    }

    async fn setup(&self) -> Result<()> {
        info!(level = %self.level, "Logging middleware initialized");
        Ok(())
    }

    fn as_middleware(&self) -> Option<&dyn Middleware> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginKind;

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_sanitize_params() {
        let params = config(json!({"api_key": "sk-123", "query": "hello", "token": "t"}));
        let sanitized = sanitize_params(&params);

        assert_eq!(sanitized["api_key"], REDACTED);
        assert_eq!(sanitized["token"], REDACTED);
        assert_eq!(sanitized["query"], "hello");
        assert_eq!(params["api_key"], "sk-123");
    }

    #[test]
    fn test_log_level_config() {
        assert_eq!(LoggingMiddleware::new(Map::new()).unwrap().level(), Level::INFO);
        assert_eq!(
            LoggingMiddleware::new(config(json!({"log_level": "DEBUG"}))).unwrap().level(),
            Level::DEBUG
        );
        assert!(LoggingMiddleware::new(config(json!({"log_level": "loud"}))).is_err());
        assert!(LoggingMiddleware::factory().create(config(json!({"log_level": 3}))).is_err());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let plugin = LoggingMiddleware::new(Map::new()).unwrap();
        let ctx = OperationContext::new("mem0_memory", "search");

        let params = config(json!({"query": "x", "password": "p"}));
        let passed = plugin.process_request(&ctx, params.clone()).await.unwrap();
        assert_eq!(passed, params);

        let response = plugin
            .process_response(&ctx, json!({"status": "success"}))
            .await
            .unwrap();
        assert!(response["_execution_time_ms"].is_u64());

        let scalar = plugin.process_response(&ctx, json!("done")).await.unwrap();
        assert_eq!(scalar, json!("done"));
    }

    #[test]
    fn test_metadata() {
        let plugin = LoggingMiddleware::new(Map::new()).unwrap();
        let metadata = plugin.metadata();

        assert_eq!(metadata.name, PLUGIN_NAME);
        assert!(metadata.has_capability("monitoring"));
        assert_eq!(plugin.kinds(), vec![PluginKind::Middleware]);
        assert_eq!(Middleware::priority(&plugin), 10);
    }
}
