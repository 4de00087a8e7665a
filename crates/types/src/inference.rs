//! Inference request/response DTOs shared between the router and the broker.

use serde::{Deserialize, Serialize};

use crate::task::{Provider, TaskType};

/// Role in a chat conversation, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One turn of conversation history passed to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A typed inference request flowing into the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    pub task_type: TaskType,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            prompt: prompt.into(),
            task_type,
            system_prompt: None,
            history: Vec::new(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The broker's result for a completed inference call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub content: String,
    pub provider: Provider,
    pub task_type: TaskType,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: f64,
    pub estimated_cost_usd: f64,
}

/// One chunk of a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub provider: Option<Provider>,
}

impl StreamChunk {
    pub fn token(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
            model: None,
            input_tokens: None,
            output_tokens: None,
            provider: None,
        }
    }

    pub fn done(
        provider: Provider,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Self {
        Self {
            content: String::new(),
            done: true,
            model: Some(model.into()),
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            provider: Some(provider),
        }
    }
}
