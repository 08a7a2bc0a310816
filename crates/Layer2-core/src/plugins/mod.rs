//! Built-in plugins

pub mod cache_middleware;
pub mod logging_middleware;

pub use cache_middleware::CacheMiddleware;
pub use logging_middleware::LoggingMiddleware;

use crate::plugin::{PluginCatalog, PluginFactory};

/// 서버가 항상 추가하는 빌트인 플러그인
pub fn builtin_plugins() -> Vec<PluginFactory> {
    vec![LoggingMiddleware::factory()]
}

/// 매니페스트에서 참조할 수 있는 빌트인 카탈로그
///
/// 캐시 미들웨어는 기본으로 켜지지 않고 매니페스트로만 활성화됩니다.
pub fn builtin_catalog() -> PluginCatalog {
    builtin_plugins()
        .into_iter()
        .chain([CacheMiddleware::factory()])
        .fold(PluginCatalog::new(), PluginCatalog::with_factory)
}
