//! Config Store - 계층형 설정 저장소
//!
//! 파일(JSON/TOML), 환경 변수, 런타임 값을 하나의 JSON 트리로 병합합니다.
//! 나중에 병합된 값이 우선합니다.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

// ============================================================================
// ConfigProvider Trait
// ============================================================================

/// 설정 접근 인터페이스
///
/// 키는 점으로 구분된 경로입니다 (예: `"plugins.paths"`).
pub trait ConfigProvider: Send + Sync {
    /// 키에 해당하는 값
    fn get(&self, key: &str) -> Option<Value>;

    /// 값이 없으면 기본값 반환
    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// 문자열 값
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// 문자열 목록 (단일 문자열은 원소 하나짜리 목록으로 취급)
    fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => vec![s],
            _ => Vec::new(),
        }
    }

    /// 객체 값 (없거나 객체가 아니면 빈 맵)
    fn get_object(&self, key: &str) -> Map<String, Value> {
        match self.get(key) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

// ============================================================================
// ConfigStore
// ============================================================================

/// 계층형 설정 저장소
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    root: Map<String, Value>,
}

impl ConfigStore {
    /// 빈 저장소 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON 값에서 생성 (최상위는 객체여야 함)
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::new()),
            other => Err(Error::Config(format!(
                "Configuration root must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// JSON 문자열에서 생성
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    /// TOML 문자열에서 생성
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(content)?;
        Self::from_value(serde_json::to_value(value)?)
    }

    /// 파일에서 로드 (확장자로 형식 결정)
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let store = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => {
                return Err(Error::Config(format!(
                    "Unsupported config format {:?}: {}",
                    other,
                    path.display()
                )))
            }
        }
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(store)
    }

    /// 파일이 있으면 로드, 없으면 None
    pub fn load_optional(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "Configuration file not found");
            return Ok(None);
        }
        Self::load_file(path).map(Some)
    }

    /// 현재 프로세스 환경 변수에서 생성
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// 변수 목록에서 생성
    ///
    /// `MEM0_PLUGINS_PATHS` → `plugins.paths`. 값은 JSON으로 파싱을
    /// 시도하고 실패하면 문자열로 둡니다.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut store = Self::new();

        for (key, value) in vars {
            let Some(stripped) = key.as_ref().strip_prefix(prefix) else {
                continue;
            };
            if stripped.is_empty() {
                continue;
            }

            let config_key = stripped.to_lowercase().replace('_', ".");
            let raw = value.as_ref();
            let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.into()));
            store.set(&config_key, parsed);
        }

        store
    }

    /// 다른 저장소 병합 (other가 우선)
    pub fn merge(&mut self, other: ConfigStore) {
        for (key, value) in other.root {
            merge_value(self.root.entry(key).or_insert(Value::Null), value);
        }
    }

    /// 값 설정 (중간 경로는 객체로 생성)
    pub fn set(&mut self, key: &str, value: Value) {
        let mut parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        let Some(last) = parts.pop() else {
            return;
        };

        let mut current = &mut self.root;
        for part in parts {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return;
            };
            current = map;
        }

        current.insert(last.to_string(), value);
    }

    /// 전체 설정 트리
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// 비어있는지 확인
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl ConfigProvider for ConfigStore {
    fn get(&self, key: &str) -> Option<Value> {
        let mut parts = key.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current.clone())
    }
}

fn merge_value(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                merge_value(target_map.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, incoming) => *target = incoming,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
