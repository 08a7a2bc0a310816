//! Container - 의존성 주입 컨테이너
//!
//! - `scope.rs` - 수명(Scope)과 등록 정의
//! - `resolver.rs` - 해석/캐시/순환 감지
//! - `dependency.rs` - 생성자 인자 자동 해석

mod dependency;
mod resolver;
mod scope;

pub use dependency::Dependency;
pub use resolver::{Container, RequestScope};
pub use scope::Scope;
