//! Server Config - 서버 통합 설정
//!
//! `ConfigProvider`에서 읽어오는 타입화된 서버 설정

use super::store::ConfigProvider;
use crate::event::EventBusConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// 환경 변수 접두사
pub const ENV_PREFIX: &str = "MEM0_";

/// 기본 설정 파일명
pub const DEFAULT_CONFIG_FILE: &str = "mem0-config.json";

/// 서버 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 서버 이름
    #[serde(default = "default_name")]
    pub name: String,

    /// 플러그인 설정
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// 이벤트 버스 설정
    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            plugins: PluginsConfig::default(),
            event_bus: EventBusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// 설정 제공자에서 읽기
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self> {
        let mut root = Map::new();
        for key in ["name", "plugins", "event_bus", "logging"] {
            if let Some(value) = provider.get(key) {
                root.insert(key.to_string(), value);
            }
        }
        Ok(serde_json::from_value(Value::Object(root))?)
    }

    /// 특정 플러그인의 설정 블롭
    pub fn plugin_config(&self, name: &str) -> Map<String, Value> {
        self.plugins.config.get(name).cloned().unwrap_or_default()
    }

    /// 플러그인 비활성화 여부
    pub fn is_plugin_disabled(&self, name: &str) -> bool {
        self.plugins.disabled.iter().any(|d| d == name)
    }
}

/// 플러그인 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// 플러그인 매니페스트 검색 디렉토리
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// 활성화할 플러그인 모듈 이름
    #[serde(default)]
    pub modules: Vec<String>,

    /// 비활성화할 플러그인 이름
    #[serde(default)]
    pub disabled: Vec<String>,

    /// 플러그인별 설정 (플러그인 이름 -> 설정)
    #[serde(default)]
    pub config: HashMap<String, Map<String, Value>>,
}

/// 로깅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 기본 로그 레벨 (`RUST_LOG`가 우선)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_name() -> String {
    "mem0-mcp".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
