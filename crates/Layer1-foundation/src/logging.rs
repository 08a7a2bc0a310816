//! Logging - tracing subscriber 초기화
//!
//! `RUST_LOG` 환경 변수가 있으면 우선 사용하고, 없으면 주어진 레벨을 사용합니다.

use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static LOGGING_INIT: OnceLock<bool> = OnceLock::new();

/// 전역 tracing subscriber 설치
///
/// 여러 번 호출해도 안전합니다. 첫 호출만 적용되며, 다른 subscriber가
/// 이미 설치되어 있으면 `false`를 반환합니다.
pub fn init_logging(default_level: &str) -> bool {
    *LOGGING_INIT.get_or_init(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
            )
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_idempotent() {
        let first = init_logging("debug");
        let second = init_logging("info");
        assert_eq!(first, second);
    }
}
