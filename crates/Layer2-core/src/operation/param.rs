//! Operation parameters & metadata

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// 파라미터 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParameterType {
    /// 값이 이 타입인지 확인
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

/// 커스텀 검증 함수
pub type ValidatorFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 파라미터 정의
#[derive(Clone, Serialize)]
pub struct ParameterDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParameterType,

    pub description: String,

    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,

    /// 타입 검사 대신 쓰이는 검증 함수
    #[serde(skip)]
    pub validator: Option<ValidatorFn>,
}

impl ParameterDefinition {
    /// 필수 파라미터
    pub fn required(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            choices: None,
            validator: None,
        }
    }

    /// 선택 파라미터
    pub fn optional(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// 값 검증 (`None`/`null`은 선택 파라미터일 때만 통과)
    pub fn validate(&self, value: Option<&Value>) -> bool {
        let value = match value {
            None | Some(Value::Null) => return !self.required,
            Some(value) => value,
        };

        if let Some(ref choices) = self.choices {
            if !choices.contains(value) {
                return false;
            }
        }

        match self.validator {
            Some(ref validator) => validator(value),
            None => self.param_type.accepts(value),
        }
    }
}

impl std::fmt::Debug for ParameterDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterDefinition")
            .field("name", &self.name)
            .field("type", &self.param_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("choices", &self.choices)
            .finish()
    }
}

/// 오퍼레이션 메타데이터
#[derive(Debug, Clone, Serialize)]
pub struct OperationMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterDefinition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,

    pub deprecated: bool,
    pub version: String,
    pub tags: Vec<String>,
}

impl OperationMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            returns: None,
            deprecated: false,
            version: "1.0.0".to_string(),
            tags: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = Some(returns.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_and_optional() {
        let required = ParameterDefinition::required("user_id", ParameterType::String, "User");
        assert!(!required.validate(None));
        assert!(!required.validate(Some(&Value::Null)));
        assert!(required.validate(Some(&json!("alice"))));
        assert!(!required.validate(Some(&json!(42))));

        let optional = ParameterDefinition::optional("limit", ParameterType::Integer, "Limit");
        assert!(optional.validate(None));
        assert!(optional.validate(Some(&json!(10))));
        assert!(!optional.validate(Some(&json!(1.5))));
    }

    #[test]
    fn test_choices_and_validator() {
        let format = ParameterDefinition::required("format", ParameterType::String, "Format")
            .with_choices(vec![json!("json"), json!("csv")]);
        assert!(format.validate(Some(&json!("csv"))));
        assert!(!format.validate(Some(&json!("xml"))));

        let positive = ParameterDefinition::required("limit", ParameterType::Integer, "Limit")
            .with_validator(|v| v.as_i64().map(|n| n > 0).unwrap_or(false));
        assert!(positive.validate(Some(&json!(3))));
        assert!(!positive.validate(Some(&json!(-1))));
    }

    #[test]
    fn test_float_accepts_integers() {
        assert!(ParameterType::Float.accepts(&json!(1)));
        assert!(ParameterType::Float.accepts(&json!(0.5)));
        assert!(!ParameterType::Integer.accepts(&json!(0.5)));
    }
}
