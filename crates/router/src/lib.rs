//! The intent router: a two-stage cascade classifier that maps free text to
//! a closed-set [`MessageIntent`] with a confidence score.
//!
//! The router never trusts an LLM's raw JSON blindly: `use_complex_model` is
//! always re-derived from `(intent, confidence)` rather than taken from the
//! model's own opinion, and any transport failure, timeout, or malformed
//! response on the primary backend gets exactly one retry against the
//! fallback backend before the hardcoded safe default is returned.

use async_trait::async_trait;
use corvus_types::{error::ErrorKind, Classify, MessageIntent, RoutingDecision};
use thiserror::Error;

/// The fixed system prompt instructing the backend to return strict JSON.
/// Kept as a function of the intent list so the prompt and `MessageIntent`
/// can never drift out of sync with each other.
pub fn classification_system_prompt() -> String {
    format!(
        "You are an intent classifier for a personal-assistant system. \
         Given a user message, respond with ONLY a JSON object of the form \
         {{\"intent\": <INTENT>, \"confidence\": <0.0-1.0>, \"reasoning\": <short string>}}. \
         <INTENT> must be exactly one of: {}. \
         Do not include any text outside the JSON object.",
        intent_list()
    )
}

fn intent_list() -> String {
    [
        "SIMPLE_QUERY",
        "COMPLEX_TASK",
        "MEMORY_STORE",
        "MEMORY_RECALL",
        "SYSTEM_COMMAND",
        "TASK_MANAGEMENT",
        "CALENDAR_QUERY",
        "PROFILE_QUERY",
        "PERSONAL_MODEL",
        "EMAIL_MANAGEMENT",
        "DEV_WATCHER",
        "MILESTONE_MANAGEMENT",
        "YOUTUBE_INTELLIGENCE",
        "YOUTUBE_MANAGEMENT",
        "YOUTUBE_STRATEGY",
    ]
    .join(", ")
}

/// Errors a router backend can raise. `Unexpected` is distinct from the
/// others: it's the only variant that makes `classify` return
/// [`RoutingDecision::router_failed`] instead of falling back or returning
/// the safe default, since it signals a bug rather than a transient
/// condition the cascade is designed to absorb.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("transport error talking to classifier backend: {0}")]
    Transport(String),
    #[error("classifier backend timed out")]
    Timeout,
    #[error("classifier backend returned unparseable JSON: {0}")]
    Parse(String),
    #[error("unexpected router failure: {0}")]
    Unexpected(String),
}

impl Classify for RouterError {
    fn kind(&self) -> ErrorKind {
        match self {
            RouterError::Transport(_) | RouterError::Timeout => ErrorKind::Transport,
            RouterError::Parse(_) => ErrorKind::Parse,
            RouterError::Unexpected(_) => ErrorKind::Validation,
        }
    }
}

/// A classifier backend: something that can turn free text into the router's
/// strict JSON contract, and separately generate a cheap conversational
/// response for `SIMPLE_QUERY` turns.
#[async_trait]
pub trait RouterBackend: Send + Sync {
    /// Returns the backend's raw text response to the classification prompt.
    /// Implementations should not attempt to parse JSON themselves — that's
    /// the cascade's job, so the same parser is exercised regardless of
    /// which stage produced the text.
    async fn classify_raw(&self, text: &str) -> Result<String, RouterError>;

    /// A short, cheap generation used for `SIMPLE_QUERY` responses and for
    /// the backend's own health check.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, RouterError>;

    async fn health_check(&self) -> bool {
        matches!(self.generate("test", 5).await, Ok(text) if !text.trim().is_empty())
    }

    /// Optional: some backends (e.g. an Ollama model) benefit from an
    /// explicit warmup call before the first real request.
    async fn warmup(&self) {}

    /// Optional: ping the backend periodically so it doesn't cold-start on
    /// the next real request (relevant for locally hosted models that get
    /// unloaded from memory when idle).
    async fn keep_warm(&self) {}
}

/// Parses the backend's raw text into `(intent, confidence, reasoning)`.
/// Tolerates a fenced ```` ```json ```` block, a fenced ```` ``` ```` block
/// with no language tag, or raw JSON with no fence at all. Confidence
/// missing from the JSON defaults to 0.8; an unrecognized or missing intent
/// field is a parse failure.
fn parse_classification(raw: &str) -> Result<(MessageIntent, f32, String), RouterError> {
    let candidate = strip_fence(raw);
    let value: serde_json::Value = serde_json::from_str(candidate.trim())
        .map_err(|e| RouterError::Parse(format!("invalid JSON: {e}")))?;

    let intent_str = value
        .get("intent")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RouterError::Parse("missing `intent` field".to_string()))?;
    let intent = MessageIntent::parse_case_insensitive(intent_str)
        .ok_or_else(|| RouterError::Parse(format!("unrecognized intent `{intent_str}`")))?;

    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|c| c as f32)
        .unwrap_or(0.8);

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    Ok((intent, confidence, reasoning))
}

/// Strips a leading/trailing fenced code block, with or without a language
/// tag, leaving raw JSON untouched if there was no fence at all.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_lang = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches(['\n', '\r']);
    after_lang.strip_suffix("```").unwrap_or(after_lang).trim()
}

/// The two-stage cascade: primary backend, with an optional fallback tried
/// exactly once on any primary failure.
pub struct IntentRouter {
    primary: Box<dyn RouterBackend>,
    fallback: Option<Box<dyn RouterBackend>>,
}

impl IntentRouter {
    pub fn new(primary: Box<dyn RouterBackend>, fallback: Option<Box<dyn RouterBackend>>) -> Self {
        Self { primary, fallback }
    }

    async fn try_classify(backend: &dyn RouterBackend, text: &str) -> Result<RoutingDecision, RouterError> {
        let raw = backend.classify_raw(text).await?;
        let (intent, confidence, reasoning) = parse_classification(&raw)?;
        Ok(RoutingDecision::derive(intent, confidence, reasoning))
    }

    /// Classifies `text`. On any transport/timeout/parse failure from the
    /// primary, retries once against the fallback (if configured); if both
    /// fail, returns the hardcoded safe default. This function itself never
    /// returns an error — `router_failed` only fires from
    /// [`Self::classify_or_fail_open`]'s caller catching an unexpected panic
    /// is out of scope for safe Rust, so `Unexpected` is raised explicitly
    /// by backends that detect their own invariant violations.
    pub async fn classify(&self, text: &str) -> RoutingDecision {
        match Self::try_classify(self.primary.as_ref(), text).await {
            Ok(decision) => decision,
            Err(primary_err) => {
                if matches!(primary_err, RouterError::Unexpected(_)) {
                    tracing::error!(error = %primary_err, "router failed unexpectedly");
                    return RoutingDecision::router_failed();
                }
                tracing::warn!(error = %primary_err, "primary classifier failed, trying fallback");
                let Some(fallback) = self.fallback.as_deref() else {
                    return RoutingDecision::safe_default();
                };
                match Self::try_classify(fallback, text).await {
                    Ok(decision) => decision,
                    Err(fallback_err) => {
                        tracing::warn!(error = %fallback_err, "fallback classifier also failed");
                        RoutingDecision::safe_default()
                    }
                }
            }
        }
    }

    /// A cheap conversational reply for `SIMPLE_QUERY` turns, delegated to
    /// the primary backend. On failure, returns a generic apology rather
    /// than propagating an error to the transport.
    pub async fn generate_simple_response(&self, text: &str) -> String {
        match self.primary.generate(text, 512).await {
            Ok(response) if !response.trim().is_empty() => response,
            Ok(_) => "Sorry, I had trouble putting that into words. Could you rephrase?".to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "generate_simple_response failed, using fallback text");
                "Sorry, I'm having trouble processing that right now.".to_string()
            }
        }
    }

    /// Healthy iff the primary backend's own health check passes.
    pub async fn health_check(&self) -> bool {
        self.primary.health_check().await
    }

    pub async fn warmup(&self) {
        self.primary.warmup().await;
        if let Some(fallback) = &self.fallback {
            fallback.warmup().await;
        }
    }

    pub async fn keep_warm(&self) {
        self.primary.keep_warm().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedBackend {
        responses: Vec<Result<&'static str, RouterError>>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RouterBackend for ScriptedBackend {
        async fn classify_raw(&self, _text: &str) -> Result<String, RouterError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match &self.responses[i.min(self.responses.len() - 1)] {
                Ok(s) => Ok(s.to_string()),
                Err(_) => Err(RouterError::Transport("boom".into())),
            }
        }

        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, RouterError> {
            Ok("hello there".to_string())
        }
    }

    fn backend(responses: Vec<Result<&'static str, RouterError>>) -> Box<dyn RouterBackend> {
        Box::new(ScriptedBackend {
            responses,
            calls: Arc::new(AtomicU32::new(0)),
        })
    }

    #[tokio::test]
    async fn classifies_raw_json_with_no_fence() {
        let router = IntentRouter::new(
            backend(vec![Ok(r#"{"intent": "SIMPLE_QUERY", "confidence": 0.95, "reasoning": "greeting"}"#)]),
            None,
        );
        let decision = router.classify("Hello!").await;
        assert_eq!(decision.intent, MessageIntent::SimpleQuery);
        assert_eq!(decision.confidence, 0.95);
    }

    #[tokio::test]
    async fn classifies_fenced_json_with_language_tag() {
        let router = IntentRouter::new(
            backend(vec![Ok(
                "```json\n{\"intent\": \"COMPLEX_TASK\", \"confidence\": 0.9, \"reasoning\": \"code\"}\n```",
            )]),
            None,
        );
        let decision = router.classify("write me a parser").await;
        assert_eq!(decision.intent, MessageIntent::ComplexTask);
        assert!(decision.use_complex_model);
    }

    #[tokio::test]
    async fn classifies_fenced_json_without_language_tag() {
        let router = IntentRouter::new(
            backend(vec![Ok(
                "```\n{\"intent\": \"MEMORY_RECALL\", \"confidence\": 0.7, \"reasoning\": \"asking to recall\"}\n```",
            )]),
            None,
        );
        let decision = router.classify("what did I tell you yesterday?").await;
        assert_eq!(decision.intent, MessageIntent::MemoryRecall);
    }

    #[tokio::test]
    async fn falls_back_once_on_primary_transport_error() {
        let primary = backend(vec![Err(RouterError::Transport("down".into()))]);
        let fallback = backend(vec![Ok(r#"{"intent": "SIMPLE_QUERY", "confidence": 0.6, "reasoning": "fallback model"}"#)]);
        let router = IntentRouter::new(primary, Some(fallback));
        let decision = router.classify("hi").await;
        assert_eq!(decision.intent, MessageIntent::SimpleQuery);
        assert_eq!(decision.confidence, 0.6);
    }

    #[tokio::test]
    async fn both_stages_failing_returns_safe_default() {
        let primary = backend(vec![Err(RouterError::Timeout)]);
        let fallback = backend(vec![Err(RouterError::Parse("garbage".into()))]);
        let router = IntentRouter::new(primary, Some(fallback));
        let decision = router.classify("anything").await;
        assert_eq!(decision.intent, MessageIntent::SimpleQuery);
        assert_eq!(decision.confidence, 0.5);
        assert!(!decision.use_complex_model);
    }

    #[tokio::test]
    async fn no_fallback_configured_returns_safe_default_on_primary_failure() {
        let router = IntentRouter::new(backend(vec![Err(RouterError::Timeout)]), None);
        let decision = router.classify("anything").await;
        assert_eq!(decision.reasoning, "fallback");
    }

    #[tokio::test]
    async fn missing_intent_field_is_a_parse_failure_that_falls_back() {
        let primary = backend(vec![Ok(r#"{"confidence": 0.9}"#)]);
        let fallback = backend(vec![Ok(r#"{"intent": "SIMPLE_QUERY", "confidence": 0.8, "reasoning": "ok"}"#)]);
        let router = IntentRouter::new(primary, Some(fallback));
        let decision = router.classify("anything").await;
        assert_eq!(decision.intent, MessageIntent::SimpleQuery);
        assert_eq!(decision.confidence, 0.8);
    }

    #[tokio::test]
    async fn missing_confidence_defaults_to_point_eight() {
        let router = IntentRouter::new(
            backend(vec![Ok(r#"{"intent": "SIMPLE_QUERY", "reasoning": "no confidence given"}"#)]),
            None,
        );
        let decision = router.classify("hi").await;
        assert_eq!(decision.confidence, 0.8);
    }

    #[tokio::test]
    async fn generate_simple_response_falls_back_to_apology_on_error() {
        struct AlwaysFails;
        #[async_trait]
        impl RouterBackend for AlwaysFails {
            async fn classify_raw(&self, _text: &str) -> Result<String, RouterError> {
                Err(RouterError::Timeout)
            }
            async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, RouterError> {
                Err(RouterError::Transport("down".into()))
            }
        }
        let router = IntentRouter::new(Box::new(AlwaysFails), None);
        let response = router.generate_simple_response("hi").await;
        assert!(response.contains("trouble processing"));
    }
}
