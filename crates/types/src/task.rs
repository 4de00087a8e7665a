//! The closed `TaskType`/`Provider`/`LocalTier` vocabulary and the static
//! provider capability matrix.

use serde::{Deserialize, Serialize};

/// A finer-grained label the broker uses to choose a provider. Assigned
/// either by the router (refining `COMPLEX_TASK`) or statically by a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    CodeGeneration,
    CodeReview,
    CodeDebugging,
    ComplexReasoning,
    MathAnalysis,
    LongDocument,
    Summarization,
    CreativeWriting,
    SimpleQa,
    Classification,
    DataExtraction,
    Conversation,
    ProfileExtraction,
    TaskParsing,
    HeartbeatDecision,
}

impl TaskType {
    /// All members, used to assert capability-matrix completeness.
    pub const ALL: &'static [TaskType] = &[
        TaskType::CodeGeneration,
        TaskType::CodeReview,
        TaskType::CodeDebugging,
        TaskType::ComplexReasoning,
        TaskType::MathAnalysis,
        TaskType::LongDocument,
        TaskType::Summarization,
        TaskType::CreativeWriting,
        TaskType::SimpleQa,
        TaskType::Classification,
        TaskType::DataExtraction,
        TaskType::Conversation,
        TaskType::ProfileExtraction,
        TaskType::TaskParsing,
        TaskType::HeartbeatDecision,
    ];
}

/// An LLM backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Openai,
    Gemini,
    Ollama,
}

impl Provider {
    /// Fixed preference order used when walking fallbacks.
    pub const FALLBACK_ORDER: [Provider; 4] = [
        Provider::Claude,
        Provider::Openai,
        Provider::Gemini,
        Provider::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Openai => "openai",
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
        }
    }
}

/// USD cost per one million tokens, input and output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl CostRate {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// `Ollama`'s rate: local inference is free.
    pub const FREE: CostRate = CostRate::new(0.0, 0.0);

    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Capability ceiling of a locally hosted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocalTier {
    Small,
    Medium,
    Large,
}

/// Static per-task provider routing policy.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub primary: Provider,
    pub fallbacks: &'static [Provider],
    pub rationale: &'static str,
}

impl ProviderConfig {
    /// Invariant: `|fallbacks| >= 1` for every entry in the matrix.
    pub fn is_well_formed(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}
