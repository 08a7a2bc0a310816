//! Error types for the Mem0 MCP server
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Mem0 MCP 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 플러그인 관련
    // ========================================================================
    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    // ========================================================================
    // 의존성 주입 관련
    // ========================================================================
    #[error("No registration found for {interface}{}", .name.as_ref().map(|n| format!(" with name '{}'", n)).unwrap_or_default())]
    NoRegistration {
        interface: String,
        name: Option<String>,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    // ========================================================================
    // 오퍼레이션 관련
    // ========================================================================
    #[error("Unknown operation: {operation}")]
    UnknownOperation { tool: String, operation: String },

    #[error("Backend error: {0}")]
    Backend(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 구조화된 에러 응답에 쓰이는 안정적인 종류 문자열
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Plugin(_) => "plugin_error",
            Error::PluginNotFound(_) => "plugin_not_found",
            Error::DuplicatePlugin(_) => "duplicate_plugin",
            Error::NoRegistration { .. } => "no_registration",
            Error::CircularDependency(_) => "circular_dependency",
            Error::UnknownOperation { .. } => "unknown_operation",
            Error::Backend(_) => "backend_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::Validation(_) => "validation_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Toml(_) => "toml_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// 등록 누락 에러 생성 헬퍼
    pub fn no_registration(interface: impl Into<String>, name: Option<&str>) -> Self {
        Error::NoRegistration {
            interface: interface.into(),
            name: name.map(str::to_string),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
