use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{EmberError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// `total_tokens` is derived here; it is never stored independently.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Final shape of one completed generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Name of the model that produced the response.
    pub model: String,
    pub usage: Usage,
    pub message: Message,
}

/// One generated unit, passed by reference to token hooks. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEvent {
    /// Backend-assigned token identifier.
    pub id: u32,
    /// Text of this unit alone.
    pub text: String,
    /// Full text accumulated so far, this unit included.
    pub accumulated: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    Inference,
    Embedding,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Inference => "inference",
            ModelType::Embedding => "embedding",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = EmberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "inference" => Ok(ModelType::Inference),
            "embedding" => Ok(ModelType::Embedding),
            other => Err(EmberError::InvalidModelType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total_is_sum_of_parts() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);

        let saturated = Usage::new(u64::MAX, 1);
        assert_eq!(saturated.total_tokens, u64::MAX);
    }

    #[test]
    fn model_type_parses_known_values() -> Result<()> {
        assert_eq!("inference".parse::<ModelType>()?, ModelType::Inference);
        assert_eq!(" embedding ".parse::<ModelType>()?, ModelType::Embedding);
        Ok(())
    }

    #[test]
    fn model_type_rejects_unknown_values() {
        let err = "chat".parse::<ModelType>().expect_err("should reject");
        match err {
            EmberError::InvalidModelType(value) => assert_eq!(value, "chat"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn completion_response_serializes_round_trip() -> Result<()> {
        let response = CompletionResponse {
            model: "test-model.gguf".to_string(),
            usage: Usage::new(5, 3),
            message: Message::assistant("hello"),
        };

        let raw = serde_json::to_value(&response)?;
        assert_eq!(raw["message"]["role"], "assistant");
        let parsed: CompletionResponse = serde_json::from_value(raw)?;
        assert_eq!(parsed, response);
        Ok(())
    }
}
