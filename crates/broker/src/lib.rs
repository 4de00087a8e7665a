//! The inference broker: routes a request to the right provider, retries
//! through the fixed fallback order on failure, and records one
//! [`CostRecord`] per attempt regardless of outcome.

mod clients;

pub use clients::{ClaudeClient, GeminiClient, OllamaClient, OpenAiClient};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use corvus_types::{
    error::ErrorKind, Classify, CostRecord, CostSink, InferenceRequest, InferenceResult, Provider,
    StreamChunk,
};
use thiserror::Error;
use tokio::sync::mpsc::Sender;

/// Errors a provider adapter can raise. Mapped onto the shared [`ErrorKind`]
/// taxonomy so the retry primitive and the broker's own fallback walk agree
/// on what's transient.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transport error calling {provider}: {message}")]
    Transport { provider: Provider, message: String },
    #[error("{provider} rate limited the request")]
    RateLimit { provider: Provider },
    #[error("{provider} rejected credentials")]
    Auth { provider: Provider },
    #[error("{provider} returned a response we couldn't parse: {message}")]
    Parse { provider: Provider, message: String },
    #[error("no provider is configured or available for this task")]
    NoProviderAvailable,
}

impl Classify for BrokerError {
    fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Transport { .. } => ErrorKind::Transport,
            BrokerError::RateLimit { .. } => ErrorKind::RateLimit,
            BrokerError::Auth { .. } => ErrorKind::Auth,
            BrokerError::Parse { .. } => ErrorKind::Parse,
            BrokerError::NoProviderAvailable => ErrorKind::Capacity,
        }
    }
}

/// What one provider call returned, before cost/latency bookkeeping.
/// `tokens_estimated` is true when the provider's response carried no real
/// usage counters and we fell back to whitespace-tokenization.
#[derive(Debug, Clone)]
pub struct RawCallResult {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tokens_estimated: bool,
}

/// Estimates token count the same crude way every provider adapter falls
/// back to when it has no real usage counters: roughly two tokens per
/// whitespace-separated word.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as u64) * 2
}

/// What one provider adapter implements. Adapters are cheap to construct
/// and hold their own `reqwest::Client`.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn call(&self, request: &InferenceRequest) -> Result<RawCallResult, BrokerError>;

    /// Streams tokens to `sender`. Providers with no native streaming API
    /// (Gemini) synthesize a stream by chunking the full response instead.
    async fn stream(
        &self,
        request: &InferenceRequest,
        sender: Sender<StreamChunk>,
    ) -> Result<(), BrokerError>;

    /// A cheap, low-token call used to decide whether this provider should
    /// stay in `available_providers`.
    async fn health_check(&self) -> bool;
}

/// Routes inference requests across providers, retrying through the fixed
/// fallback order on failure and recording cost for every attempt.
pub struct InferenceBroker {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
    available_providers: Vec<Provider>,
    local_model: Option<String>,
    cost_sink: Option<Arc<dyn CostSink>>,
    totals: tokio::sync::Mutex<HashMap<Provider, ProviderCostSummary>>,
}

impl InferenceBroker {
    /// `clients` need not cover every `Provider` variant; only providers
    /// with a registered client and a usable credential belong in
    /// `available_providers`. Ollama is conventionally included
    /// unconditionally, the same way the original implementation always
    /// adds it at startup regardless of whether it has been health-checked
    /// yet.
    pub fn new(
        clients: Vec<Arc<dyn ProviderClient>>,
        available_providers: Vec<Provider>,
        local_model: Option<String>,
        cost_sink: Option<Arc<dyn CostSink>>,
    ) -> Self {
        let clients = clients.into_iter().map(|c| (c.provider(), c)).collect();
        Self {
            clients,
            available_providers,
            local_model,
            cost_sink,
            totals: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn available_providers(&self) -> Vec<Provider> {
        self.available_providers.clone()
    }

    /// Runs `health_check` against every registered client and rebuilds
    /// `available_providers` from the results. Ollama being unreachable
    /// still removes it, unlike the initial unconditional-add at
    /// construction time.
    pub async fn refresh_availability(&mut self) {
        let mut healthy = Vec::new();
        for provider in Provider::FALLBACK_ORDER {
            if let Some(client) = self.clients.get(&provider) {
                if client.health_check().await {
                    healthy.push(provider);
                }
            }
        }
        self.available_providers = healthy;
    }

    pub async fn health_check(&self, provider: Provider) -> bool {
        match self.clients.get(&provider) {
            Some(client) => client.health_check().await,
            None => false,
        }
    }

    /// Picks a provider, calls it, and walks the fixed fallback order on
    /// failure. A record is tracked for every attempt, failed or not.
    pub async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResult, BrokerError> {
        let chosen = corvus_providers::provider_for_task(
            request.task_type,
            &self.available_providers,
            self.local_model.as_deref(),
            false,
            false,
        );

        let mut order = vec![chosen];
        order.extend(
            Provider::FALLBACK_ORDER
                .into_iter()
                .filter(|p| *p != chosen && self.available_providers.contains(p)),
        );

        let mut last_err: Option<BrokerError> = None;
        for provider in order {
            let Some(client) = self.clients.get(&provider) else {
                continue;
            };
            let started = Instant::now();
            match client.call(request).await {
                Ok(raw) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    let cost = corvus_providers::cost_rate(provider)
                        .cost_usd(raw.input_tokens, raw.output_tokens);
                    self.track_cost(CostRecord {
                        ts: chrono::Utc::now(),
                        provider,
                        model: raw.model.clone(),
                        tokens_in: raw.input_tokens,
                        tokens_out: raw.output_tokens,
                        cost_usd: cost,
                        cost_estimated: raw.tokens_estimated,
                        task_type: Some(format!("{:?}", request.task_type)),
                        user_id: None,
                        latency_ms: Some(latency_ms),
                        rate_limit_hit: false,
                        success: true,
                        error: None,
                    })
                    .await;
                    self.accumulate(
                        provider,
                        request.task_type,
                        raw.input_tokens,
                        raw.output_tokens,
                        cost,
                    )
                    .await;
                    tracing::info!(
                        provider = provider.as_str(),
                        model = %raw.model,
                        latency_ms,
                        cost_usd = cost,
                        "inference_complete"
                    );
                    return Ok(InferenceResult {
                        content: raw.content,
                        provider,
                        task_type: request.task_type,
                        model: raw.model,
                        input_tokens: raw.input_tokens,
                        output_tokens: raw.output_tokens,
                        latency_ms,
                        estimated_cost_usd: cost,
                    });
                }
                Err(err) => {
                    let rate_limited = matches!(err, BrokerError::RateLimit { .. });
                    self.track_cost(CostRecord {
                        ts: chrono::Utc::now(),
                        provider,
                        model: String::new(),
                        tokens_in: 0,
                        tokens_out: 0,
                        cost_usd: 0.0,
                        cost_estimated: false,
                        task_type: Some(format!("{:?}", request.task_type)),
                        user_id: None,
                        latency_ms: None,
                        rate_limit_hit: rate_limited,
                        success: false,
                        error: Some(err.to_string()),
                    })
                    .await;
                    tracing::warn!(
                        provider = provider.as_str(),
                        error = %err,
                        "fallback_failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(BrokerError::NoProviderAvailable))
    }

    /// Streams the response from the chosen provider, falling back through
    /// the same order as [`Self::infer`] if the stream fails before any
    /// tokens are sent. Every adapter's `stream` makes its full, non-
    /// streaming `call` first and only chunks the result afterward, so a
    /// failure here always happens before any token reaches `sender` —
    /// abandoning it and re-chunking the next provider's non-streaming
    /// response is always safe, which is what falling through to the next
    /// candidate's own `stream` does.
    pub async fn stream(
        &self,
        request: &InferenceRequest,
        sender: Sender<StreamChunk>,
    ) -> Result<(), BrokerError> {
        let chosen = corvus_providers::provider_for_task(
            request.task_type,
            &self.available_providers,
            self.local_model.as_deref(),
            false,
            false,
        );

        let mut order = vec![chosen];
        order.extend(
            Provider::FALLBACK_ORDER
                .into_iter()
                .filter(|p| *p != chosen && self.available_providers.contains(p)),
        );

        let mut last_err: Option<BrokerError> = None;
        for provider in order {
            let Some(client) = self.clients.get(&provider) else {
                continue;
            };
            match client.stream(request, sender.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(provider = provider.as_str(), error = %err, "stream_fallback_failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(BrokerError::NoProviderAvailable))
    }

    async fn track_cost(&self, record: CostRecord) {
        if let Some(sink) = &self.cost_sink {
            sink.record(record).await;
        }
    }

    async fn accumulate(
        &self,
        provider: Provider,
        task_type: corvus_types::TaskType,
        tokens_in: u64,
        tokens_out: u64,
        cost: f64,
    ) {
        let mut totals = self.totals.lock().await;
        let entry = totals.entry(provider).or_default();
        entry.calls += 1;
        entry.tokens_in += tokens_in;
        entry.tokens_out += tokens_out;
        entry.cost_usd += cost;
        *entry.by_task_type.entry(task_type).or_insert(0) += 1;
    }

    /// Per-provider running totals accumulated since this broker was
    /// constructed, plus the grand total cost across all providers. This is
    /// a cheap in-memory session view; the persisted, range-queryable
    /// aggregations live in the cost tracker.
    pub async fn cost_summary(&self) -> CostSummary {
        let totals = self.totals.lock().await;
        let by_provider = totals.clone();
        let total_cost_usd = by_provider.values().map(|s| s.cost_usd).sum();
        CostSummary {
            by_provider,
            total_cost_usd,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderCostSummary {
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub by_task_type: HashMap<corvus_types::TaskType, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct CostSummary {
    pub by_provider: HashMap<Provider, ProviderCostSummary>,
    pub total_cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_types::TaskType;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyThenOk {
        provider: Provider,
        fail_first_n: AtomicU32,
    }

    #[async_trait]
    impl ProviderClient for FlakyThenOk {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn call(&self, _request: &InferenceRequest) -> Result<RawCallResult, BrokerError> {
            if self.fail_first_n.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(BrokerError::Transport {
                    provider: self.provider,
                    message: "connection refused".into(),
                });
            }
            Ok(RawCallResult {
                content: "hi".into(),
                model: "test-model".into(),
                input_tokens: 10,
                output_tokens: 5,
                tokens_estimated: false,
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
                .send(StreamChunk::done(self.provider, raw.model, raw.input_tokens, raw.output_tokens))
                .await;
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_available_provider_on_failure() {
        let claude = Arc::new(FlakyThenOk {
            provider: Provider::Claude,
            fail_first_n: AtomicU32::new(99),
        });
        let openai = Arc::new(FlakyThenOk {
            provider: Provider::Openai,
            fail_first_n: AtomicU32::new(0),
        });
        let broker = InferenceBroker::new(
            vec![claude, openai],
            vec![Provider::Claude, Provider::Openai],
            None,
            None,
        );

        let request = InferenceRequest::new("hello", TaskType::CodeGeneration);
        let result = broker.infer(&request).await.unwrap();
        assert_eq!(result.provider, Provider::Openai);
    }

    #[tokio::test]
    async fn no_available_provider_is_capacity_error() {
        let broker = InferenceBroker::new(vec![], vec![], None, None);
        let request = InferenceRequest::new("hello", TaskType::SimpleQa);
        let err = broker.infer(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[tokio::test]
    async fn cost_summary_accumulates_across_calls() {
        let claude = Arc::new(FlakyThenOk {
            provider: Provider::Claude,
            fail_first_n: AtomicU32::new(0),
        });
        let broker = InferenceBroker::new(vec![claude], vec![Provider::Claude], None, None);
        let request = InferenceRequest::new("hello", TaskType::SimpleQa);
        broker.infer(&request).await.unwrap();
        broker.infer(&request).await.unwrap();

        let summary = broker.cost_summary().await;
        let claude_summary = summary.by_provider.get(&Provider::Claude).unwrap();
        assert_eq!(claude_summary.tokens_in, 20);
        assert_eq!(claude_summary.tokens_out, 10);
    }

    #[tokio::test]
    async fn stream_falls_back_to_next_provider_when_the_first_fails() {
        let claude = Arc::new(FlakyThenOk {
            provider: Provider::Claude,
            fail_first_n: AtomicU32::new(99),
        });
        let openai = Arc::new(FlakyThenOk {
            provider: Provider::Openai,
            fail_first_n: AtomicU32::new(0),
        });
        let broker = InferenceBroker::new(
            vec![claude, openai],
            vec![Provider::Claude, Provider::Openai],
            None,
            None,
        );

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let request = InferenceRequest::new("hello there", TaskType::CodeGeneration);
        broker.stream(&request, tx).await.unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        let done = chunks.last().expect("at least a done chunk");
        assert!(done.done);
        assert_eq!(done.provider, Some(Provider::Openai));
        assert!(chunks.iter().any(|c| !c.done && !c.content.is_empty()));
    }

    #[tokio::test]
    async fn stream_fails_when_every_provider_fails() {
        let claude = Arc::new(FlakyThenOk {
            provider: Provider::Claude,
            fail_first_n: AtomicU32::new(99),
        });
        let broker = InferenceBroker::new(vec![claude], vec![Provider::Claude], None, None);

        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let request = InferenceRequest::new("hello", TaskType::CodeGeneration);
        assert!(broker.stream(&request, tx).await.is_err());
    }
}
