//! Per-provider HTTP adapters. Each provider places the system prompt
//! differently: Claude takes it out-of-band via a top-level `system` field,
//! OpenAI and Ollama take it as a leading `system`-role message, and Gemini
//! has no system role at all so it gets folded into the leading content.

use std::time::Duration;

use async_trait::async_trait;
use corvus_types::{ChatRole, InferenceRequest, Provider, StreamChunk};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc::Sender;

use crate::{estimate_tokens, BrokerError, ProviderClient, RawCallResult};

fn history_as_json(request: &InferenceRequest, include_system: bool) -> Vec<Value> {
    let mut messages = Vec::new();
    if include_system {
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
    }
    for turn in &request.history {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        };
        messages.push(json!({"role": role, "content": turn.content}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));
    messages
}

fn status_to_error(provider: Provider, status: reqwest::StatusCode, body: &str) -> BrokerError {
    if status.as_u16() == 429 {
        BrokerError::RateLimit { provider }
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        BrokerError::Auth { provider }
    } else {
        BrokerError::Transport {
            provider,
            message: format!("http {status}: {body}"),
        }
    }
}

fn transport_err(provider: Provider, err: reqwest::Error) -> BrokerError {
    BrokerError::Transport {
        provider,
        message: err.to_string(),
    }
}

fn parse_err(provider: Provider, message: impl Into<String>) -> BrokerError {
    BrokerError::Parse {
        provider,
        message: message.into(),
    }
}

// ── Claude ──────────────────────────────────────────────────────────────────

pub struct ClaudeClient {
    http: Client,
    api_key: String,
    model: String,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn do_call(&self, request: &InferenceRequest, max_tokens: u32) -> Result<Value, BrokerError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "messages": history_as_json(request, false),
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_err(Provider::Claude, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_err(Provider::Claude, e))?;
        if !status.is_success() {
            return Err(status_to_error(Provider::Claude, status, &text));
        }
        serde_json::from_str(&text).map_err(|e| parse_err(Provider::Claude, e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    async fn call(&self, request: &InferenceRequest) -> Result<RawCallResult, BrokerError> {
        let body = self.do_call(request, request.max_tokens).await?;
        let content = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| parse_err(Provider::Claude, "missing content[0].text"))?
            .to_string();
        let (input_tokens, output_tokens, estimated) = match (
            body["usage"]["input_tokens"].as_u64(),
            body["usage"]["output_tokens"].as_u64(),
        ) {
            (Some(i), Some(o)) => (i, o, false),
            _ => (estimate_tokens(&request.prompt), estimate_tokens(&content), true),
        };
        Ok(RawCallResult {
            content,
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            tokens_estimated: estimated,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        sender: Sender<StreamChunk>,
    ) -> Result<(), BrokerError> {
        let raw = self.call(request).await?;
        for word in raw.content.split_inclusive(' ') {
            let _ = sender.send(StreamChunk::token(word.to_string())).await;
        }
        let _ = sender
            .send(StreamChunk::done(
                Provider::Claude,
                raw.model,
                raw.input_tokens,
                raw.output_tokens,
            ))
            .await;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut probe = InferenceRequest::new("ping", corvus_types::TaskType::SimpleQa);
        probe.max_tokens = 5;
        self.do_call(&probe, 5).await.is_ok()
    }
}

// ── OpenAI ──────────────────────────────────────────────────────────────────

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn do_call(&self, request: &InferenceRequest, max_tokens: u32) -> Result<Value, BrokerError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "messages": history_as_json(request, true),
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_err(Provider::Openai, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_err(Provider::Openai, e))?;
        if !status.is_success() {
            return Err(status_to_error(Provider::Openai, status, &text));
        }
        serde_json::from_str(&text).map_err(|e| parse_err(Provider::Openai, e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::Openai
    }

    async fn call(&self, request: &InferenceRequest) -> Result<RawCallResult, BrokerError> {
        let body = self.do_call(request, request.max_tokens).await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| parse_err(Provider::Openai, "missing choices[0].message.content"))?
            .to_string();
        let (input_tokens, output_tokens, estimated) = match (
            body["usage"]["prompt_tokens"].as_u64(),
            body["usage"]["completion_tokens"].as_u64(),
        ) {
            (Some(i), Some(o)) => (i, o, false),
            _ => (estimate_tokens(&request.prompt), estimate_tokens(&content), true),
        };
        Ok(RawCallResult {
            content,
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            tokens_estimated: estimated,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        sender: Sender<StreamChunk>,
    ) -> Result<(), BrokerError> {
        let raw = self.call(request).await?;
        for word in raw.content.split_inclusive(' ') {
            let _ = sender.send(StreamChunk::token(word.to_string())).await;
        }
        let _ = sender
            .send(StreamChunk::done(
                Provider::Openai,
                raw.model,
                raw.input_tokens,
                raw.output_tokens,
            ))
            .await;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut probe = InferenceRequest::new("ping", corvus_types::TaskType::SimpleQa);
        probe.max_tokens = 5;
        self.do_call(&probe, 5).await.is_ok()
    }
}

// ── Gemini ──────────────────────────────────────────────────────────────────

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Gemini has no system role; the system prompt is concatenated onto
    /// the front of the user content instead.
    fn combined_content(request: &InferenceRequest) -> String {
        match &request.system_prompt {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        }
    }

    async fn do_call(&self, request: &InferenceRequest, max_output_tokens: u32) -> Result<Value, BrokerError> {
        let content = Self::combined_content(request);
        let body = json!({
            "contents": [{"parts": [{"text": content}]}],
            "generationConfig": {
                "maxOutputTokens": max_output_tokens,
                "temperature": request.temperature,
            },
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_err(Provider::Gemini, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_err(Provider::Gemini, e))?;
        if !status.is_success() {
            return Err(status_to_error(Provider::Gemini, status, &text));
        }
        serde_json::from_str(&text).map_err(|e| parse_err(Provider::Gemini, e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn call(&self, request: &InferenceRequest) -> Result<RawCallResult, BrokerError> {
        let body = self.do_call(request, request.max_tokens).await?;
        let content = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                parse_err(Provider::Gemini, "missing candidates[0].content.parts[0].text")
            })?
            .to_string();
        // The SDK's usage metadata is inconsistent across model versions;
        // treat it as absent and estimate the same way a provider with no
        // usage counters at all would.
        let input_tokens = estimate_tokens(&Self::combined_content(request));
        let output_tokens = estimate_tokens(&content);
        Ok(RawCallResult {
            content,
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            tokens_estimated: true,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        sender: Sender<StreamChunk>,
    ) -> Result<(), BrokerError> {
        // Gemini's REST API here is called non-streaming; synthesize a
        // stream by chunking the full response the same way the original
        // implementation wraps its synchronous SDK call.
        let raw = self.call(request).await?;
        for word in raw.content.split_inclusive(' ') {
            let _ = sender.send(StreamChunk::token(word.to_string())).await;
        }
        let _ = sender
            .send(StreamChunk::done(
                Provider::Gemini,
                raw.model,
                raw.input_tokens,
                raw.output_tokens,
            ))
            .await;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut probe = InferenceRequest::new("ping", corvus_types::TaskType::SimpleQa);
        probe.max_tokens = 5;
        self.do_call(&probe, 5).await.is_ok()
    }
}

// ── Ollama ──────────────────────────────────────────────────────────────────

pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn call(&self, request: &InferenceRequest) -> Result<RawCallResult, BrokerError> {
        let body = json!({
            "model": self.model,
            "messages": history_as_json(request, true),
            "stream": false,
            "options": {"temperature": request.temperature},
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_err(Provider::Ollama, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_err(Provider::Ollama, e))?;
        if !status.is_success() {
            return Err(status_to_error(Provider::Ollama, status, &text));
        }
        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| parse_err(Provider::Ollama, e.to_string()))?;

        let content = parsed["message"]["content"]
            .as_str()
            .ok_or_else(|| parse_err(Provider::Ollama, "missing message.content"))?
            .to_string();
        let (input_tokens, output_tokens, estimated) = match (
            parsed["prompt_eval_count"].as_u64(),
            parsed["eval_count"].as_u64(),
        ) {
            (Some(i), Some(o)) => (i, o, false),
            _ => (estimate_tokens(&request.prompt), estimate_tokens(&content), true),
        };

        Ok(RawCallResult {
            content,
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            tokens_estimated: estimated,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        sender: Sender<StreamChunk>,
    ) -> Result<(), BrokerError> {
        let raw = self.call(request).await?;
        for word in raw.content.split_inclusive(' ') {
            let _ = sender.send(StreamChunk::token(word.to_string())).await;
        }
        let _ = sender
            .send(StreamChunk::done(
                Provider::Ollama,
                raw.model,
                raw.input_tokens,
                raw.output_tokens,
            ))
            .await;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let response = self.http.get(format!("{}/api/tags", self.base_url)).send().await;
        matches!(response, Ok(r) if r.status().is_success())
    }
}
