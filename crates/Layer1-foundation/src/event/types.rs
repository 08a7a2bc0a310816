//! Event Types - 이벤트 버스에서 사용되는 이벤트 타입 정의

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 재생된 이벤트에 붙는 메타데이터 키
pub const REPLAYED_KEY: &str = "replayed";

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// 새 이벤트 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Priority
// ============================================================================

/// 핸들러 실행 우선순위 (값이 작을수록 먼저 실행)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Highest,
    High,
    Normal,
    Low,
    Lowest,
}

impl EventPriority {
    /// 정렬에 쓰이는 숫자 값
    pub fn value(&self) -> u8 {
        match self {
            Self::Highest => 0,
            Self::High => 25,
            Self::Normal => 50,
            Self::Low => 75,
            Self::Lowest => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Lowest => "lowest",
        }
    }
}

impl Default for EventPriority {
    fn default() -> Self {
        Self::Normal
    }
}

// ============================================================================
// Event - 핵심 이벤트 타입
// ============================================================================

/// 이벤트 버스로 전달되는 이벤트
///
/// 발행 시점에 만들어지며, 이후에는 미들웨어가 새 값을 돌려주는
/// 방식으로만 바뀝니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 이벤트 ID
    pub id: EventId,

    /// 토픽 이름 (예: "tool.mem0_memory.add", "plugin.loaded")
    pub name: String,

    /// 이벤트 데이터
    #[serde(default)]
    pub data: Map<String, Value>,

    /// 발생 시간
    pub timestamp: DateTime<Utc>,

    /// 이벤트 소스
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// 추가 메타데이터
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Event {
    /// 새 이벤트 생성
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            data: Map::new(),
            timestamp: Utc::now(),
            source: None,
            metadata: Map::new(),
        }
    }

    /// 데이터 설정
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// 데이터 필드 하나 추가
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// 소스 설정
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 메타데이터 설정
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// 타임스탬프 지정 (캡처된 이벤트 복원용)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 데이터 필드 조회
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// 재생된 이벤트인지 확인
    pub fn is_replayed(&self) -> bool {
        self.metadata
            .get(REPLAYED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_order() {
        let mut priorities = vec![
            EventPriority::Low,
            EventPriority::Highest,
            EventPriority::Lowest,
            EventPriority::Normal,
            EventPriority::High,
        ];
        priorities.sort_by_key(|p| p.value());

        assert_eq!(
            priorities,
            vec![
                EventPriority::Highest,
                EventPriority::High,
                EventPriority::Normal,
                EventPriority::Low,
                EventPriority::Lowest,
            ]
        );
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new("memory.added")
            .with_field("memory_id", json!("m-1"))
            .with_source("mem0_memory");

        assert_eq!(event.name, "memory.added");
        assert_eq!(event.get("memory_id"), Some(&json!("m-1")));
        assert_eq!(event.source.as_deref(), Some("mem0_memory"));
        assert!(!event.is_replayed());
    }

    #[test]
    fn test_event_serde() {
        let event = Event::new("x").with_field("n", json!(1));
        let json = serde_json::to_value(&event).unwrap();
        let restored: Event = serde_json::from_value(json).unwrap();

        assert_eq!(restored.id, event.id);
        assert_eq!(restored.timestamp, event.timestamp);
        assert_eq!(restored.data, event.data);
    }
}
