//! Adapts a single `ProviderClient` into a `corvus_router::RouterBackend`.
//! The router's cascade talks to two *fixed* backends (its own primary and
//! fallback classification models, per spec.md §6's
//! `router.backend ∈ {gemini, ollama}`), deliberately bypassing the
//! broker's capability-matrix routing and fallback walk — the classifier
//! always wants the same cheap model, not whatever the task-type matrix
//! would pick.

use std::sync::Arc;

use async_trait::async_trait;
use corvus_broker::{BrokerError, ProviderClient};
use corvus_router::{classification_system_prompt, RouterBackend, RouterError};
use corvus_types::{InferenceRequest, TaskType};

fn to_router_error(err: BrokerError) -> RouterError {
    match err {
        BrokerError::Transport { message, .. } => RouterError::Transport(message),
        BrokerError::RateLimit { .. } => RouterError::Transport("rate limited".to_string()),
        BrokerError::Auth { .. } => RouterError::Transport("auth rejected".to_string()),
        BrokerError::Parse { message, .. } => RouterError::Parse(message),
        BrokerError::NoProviderAvailable => RouterError::Unexpected("no provider configured".to_string()),
    }
}

pub struct ClientRouterBackend {
    client: Arc<dyn ProviderClient>,
}

impl ClientRouterBackend {
    pub fn new(client: Arc<dyn ProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RouterBackend for ClientRouterBackend {
    async fn classify_raw(&self, text: &str) -> Result<String, RouterError> {
        let request = InferenceRequest::new(text, TaskType::Classification)
            .with_system_prompt(classification_system_prompt())
            .with_max_tokens(200)
            .with_temperature(0.0);
        self.client.call(&request).await.map(|r| r.content).map_err(to_router_error)
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, RouterError> {
        let request = InferenceRequest::new(prompt, TaskType::Conversation).with_max_tokens(max_tokens);
        self.client.call(&request).await.map(|r| r.content).map_err(to_router_error)
    }
}
