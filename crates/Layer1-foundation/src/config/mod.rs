//! Config - 통합 설정 관리
//!
//! - `store.rs` - 계층형 설정 저장소 (JSON/TOML/환경 변수)
//! - `server.rs` - ServerConfig 타입화된 설정

mod server;
mod store;

pub use server::{LoggingConfig, PluginsConfig, ServerConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use store::{ConfigProvider, ConfigStore};
