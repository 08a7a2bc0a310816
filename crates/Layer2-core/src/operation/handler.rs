//! Operation Handler - 오퍼레이션 실행 계약

use super::context::{OperationContext, Params};
use super::param::OperationMetadata;
use async_trait::async_trait;
use mem0_foundation::{Error, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// OperationHandler Trait
// ============================================================================

/// 오퍼레이션 핸들러
///
/// `call`이 전체 흐름을 실행합니다:
/// `validate_parameters → pre_execute → execute → post_execute`.
/// 어느 단계에서든 에러가 나면 `handle_error`가 구조화된 에러 결과로 바꿉니다.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// 메타데이터
    fn metadata(&self) -> OperationMetadata;

    /// 파라미터 검증 및 정규화
    ///
    /// 선언된 파라미터는 기본값을 채우고 검증합니다. 선언되지 않은 키는
    /// 그대로 통과합니다.
    async fn validate_parameters(&self, mut params: Params) -> Result<Params> {
        let metadata = self.metadata();
        let mut errors = Vec::new();

        for definition in &metadata.parameters {
            if !params.contains_key(&definition.name) {
                if let Some(ref default) = definition.default {
                    params.insert(definition.name.clone(), default.clone());
                }
            }

            if !definition.validate(params.get(&definition.name)) {
                errors.push(format!("Invalid value for parameter '{}'", definition.name));
            }
        }

        if errors.is_empty() {
            Ok(params)
        } else {
            Err(Error::Validation(format!(
                "Parameter validation failed: {}",
                errors.join(", ")
            )))
        }
    }

    /// 실행 전 훅
    async fn pre_execute(&self, _ctx: &OperationContext, params: Params) -> Result<Params> {
        Ok(params)
    }

    /// 실행
    async fn execute(&self, ctx: &OperationContext, params: Params) -> Result<Value>;

    /// 실행 후 훅
    async fn post_execute(&self, _ctx: &OperationContext, result: Value) -> Result<Value> {
        Ok(result)
    }

    /// 에러를 결과 페이로드로 변환
    async fn handle_error(&self, ctx: &OperationContext, error: Error) -> Value {
        error_payload(ctx, &error)
    }

    /// 전체 흐름 실행 (에러를 전파하지 않음)
    async fn call(&self, ctx: &OperationContext, params: Params) -> Value {
        let outcome = async {
            let params = self.validate_parameters(params).await?;
            let params = self.pre_execute(ctx, params).await?;
            let result = self.execute(ctx, params).await?;
            self.post_execute(ctx, result).await
        }
        .await;

        match outcome {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    tool = %ctx.tool_name,
                    operation = %ctx.operation_name,
                    error = %error,
                    "Operation failed"
                );
                self.handle_error(ctx, error).await
            }
        }
    }
}

/// 표준 에러 결과 `{status, error, message, operation, tool}`
pub fn error_payload(ctx: &OperationContext, error: &Error) -> Value {
    json!({
        "status": "error",
        "error": error.kind(),
        "message": error.to_string(),
        "operation": ctx.operation_name,
        "tool": ctx.tool_name,
    })
}

// ============================================================================
// Closure handler
// ============================================================================

/// 클로저 기반 오퍼레이션 핸들러
pub struct FnOperation<F> {
    metadata: OperationMetadata,
    f: F,
}

#[async_trait]
impl<F, Fut> OperationHandler for FnOperation<F>
where
    F: Fn(OperationContext, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    fn metadata(&self) -> OperationMetadata {
        self.metadata.clone()
    }

    async fn execute(&self, ctx: &OperationContext, params: Params) -> Result<Value> {
        (self.f)(ctx.clone(), params).await
    }
}

/// 비동기 클로저로 오퍼레이션 핸들러 생성
pub fn operation_fn<F, Fut>(metadata: OperationMetadata, f: F) -> Arc<dyn OperationHandler>
where
    F: Fn(OperationContext, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnOperation { metadata, f })
}

// ============================================================================
// Batch
// ============================================================================

/// 배치 처리를 지원하는 오퍼레이션
///
/// `BatchOperationHandler`로 감싸면 `items` 배열이 있을 때 항목별로
/// `execute_single`을 호출합니다.
#[async_trait]
pub trait BatchOperation: Send + Sync {
    fn metadata(&self) -> OperationMetadata;

    /// 단일 항목 실행
    async fn execute_single(&self, ctx: &OperationContext, params: Params) -> Result<Value>;

    /// 여러 항목 실행 (항목별 실패는 해당 항목의 에러 결과가 됨)
    async fn execute_batch(&self, ctx: &OperationContext, items: Vec<Value>) -> Result<Vec<Value>> {
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let result = match item {
                Value::Object(params) => match self.execute_single(ctx, params).await {
                    Ok(value) => value,
                    Err(e) => error_payload(ctx, &e),
                },
                other => error_payload(
                    ctx,
                    &Error::InvalidInput(format!("Batch item must be an object, got {}", other)),
                ),
            };
            results.push(result);
        }

        Ok(results)
    }
}

/// `BatchOperation`을 `OperationHandler`로 노출하는 어댑터
pub struct BatchOperationHandler<B> {
    inner: B,
}

impl<B: BatchOperation> BatchOperationHandler<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: BatchOperation> OperationHandler for BatchOperationHandler<B> {
    fn metadata(&self) -> OperationMetadata {
        self.inner.metadata()
    }

    async fn execute(&self, ctx: &OperationContext, mut params: Params) -> Result<Value> {
        match params.remove("items") {
            Some(Value::Array(items)) => {
                debug!(
                    operation = %ctx.operation_name,
                    count = items.len(),
                    "Executing batch operation"
                );
                let results = self.inner.execute_batch(ctx, items).await?;
                Ok(json!({
                    "status": "success",
                    "count": results.len(),
                    "results": results,
                }))
            }
            Some(other) => {
                params.insert("items".to_string(), other);
                self.inner.execute_single(ctx, params).await
            }
            None => self.inner.execute_single(ctx, params).await,
        }
    }
}
