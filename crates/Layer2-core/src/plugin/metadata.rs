//! Plugin Metadata - 플러그인 메타데이터, 역할, 상태

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// PluginMetadata
// ============================================================================

/// 플러그인 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// 고유 이름
    pub name: String,

    /// 버전
    pub version: String,

    /// 설명
    #[serde(default)]
    pub description: String,

    /// 작성자
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// 먼저 초기화되어야 하는 플러그인 이름
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 자유 형식 기능 태그 (예: "logging", "monitoring")
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// 설정 스키마 (JSON Schema 형식, `required`만 검사)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: None,
            dependencies: Vec::new(),
            capabilities: Vec::new(),
            config_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }

    /// 기능 태그 보유 여부
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

// ============================================================================
// PluginKind
// ============================================================================

/// 플러그인이 선언하는 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// 기존 도구에 오퍼레이션 추가
    Operation,
    /// 새 도구 추가
    Tool,
    /// 백엔드 구현 제공
    Backend,
    /// 요청/응답 미들웨어
    Middleware,
    /// 서버 확장
    Extension,
}

impl PluginKind {
    pub const ALL: [PluginKind; 5] = [
        PluginKind::Operation,
        PluginKind::Tool,
        PluginKind::Backend,
        PluginKind::Middleware,
        PluginKind::Extension,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operation => "operation",
            Self::Tool => "tool",
            Self::Backend => "backend",
            Self::Middleware => "middleware",
            Self::Extension => "extension",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PluginState
// ============================================================================

/// 레지스트리 안에서의 플러그인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// 등록됨 (아직 초기화 안됨)
    Created,
    /// setup + on_load 완료
    Initialized,
    /// on_start 완료
    Started,
    /// on_stop 완료
    Stopped,
    /// on_unload + teardown 완료
    Unloaded,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initialized => write!(f, "initialized"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unloaded => write!(f, "unloaded"),
        }
    }
}

// ============================================================================
// PluginInfo
// ============================================================================

/// 로드된 플러그인 요약 (`server.initialized` 이벤트 등에 사용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    pub kinds: Vec<PluginKind>,
    pub capabilities: Vec<String>,
    pub dependencies: Vec<String>,
    pub state: PluginState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_builder() {
        let metadata = PluginMetadata::new("history_operations", "1.0.0")
            .with_description("Memory history")
            .with_dependency("logging_middleware")
            .with_capability("history");

        assert_eq!(metadata.dependencies, vec!["logging_middleware"]);
        assert!(metadata.has_capability("history"));
        assert!(!metadata.has_capability("cache"));
    }

    #[test]
    fn test_metadata_deserialize_defaults() {
        let metadata: PluginMetadata =
            serde_json::from_value(json!({"name": "x", "version": "0.1.0"})).unwrap();

        assert!(metadata.dependencies.is_empty());
        assert!(metadata.config_schema.is_none());
    }

    #[test]
    fn test_kind_serde() {
        assert_eq!(serde_json::to_value(PluginKind::Middleware).unwrap(), json!("middleware"));
        assert_eq!(PluginState::Started.to_string(), "started");
    }
}
