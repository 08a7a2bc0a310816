//! Operation - 오퍼레이션 핸들러 계약
//!
//! - `param.rs` - 파라미터 정의/검증, 메타데이터
//! - `context.rs` - 실행 컨텍스트
//! - `handler.rs` - 핸들러 trait, 배치 어댑터

mod context;
mod handler;
mod param;

pub use context::{OperationContext, Params};
pub use handler::{
    error_payload, operation_fn, BatchOperation, BatchOperationHandler, FnOperation,
    OperationHandler,
};
pub use param::{OperationMetadata, ParameterDefinition, ParameterType, ValidatorFn};
