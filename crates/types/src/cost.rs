//! Persisted per-call cost accounting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Provider;

/// One row per inference call attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub ts: DateTime<Utc>,
    pub provider: Provider,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub cost_estimated: bool,
    pub task_type: Option<String>,
    pub user_id: Option<String>,
    pub latency_ms: Option<f64>,
    pub rate_limit_hit: bool,
    pub success: bool,
    pub error: Option<String>,
}

impl CostRecord {
    /// A record for a call that never reached a provider successfully.
    pub fn failed(provider: Provider, model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            provider,
            model: model.into(),
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            cost_estimated: false,
            task_type: None,
            user_id: None,
            latency_ms: None,
            rate_limit_hit: false,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregated cost figures over an arbitrary grouping key (day, provider,
/// task type, or model) and time range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostAggregate {
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

impl CostAggregate {
    pub fn accumulate(&mut self, record: &CostRecord) {
        self.calls += 1;
        self.tokens_in += record.tokens_in;
        self.tokens_out += record.tokens_out;
        self.cost_usd += record.cost_usd;
    }
}

/// Implemented by whatever persists [`CostRecord`]s, so the broker can emit
/// one per call without depending on the storage crate directly.
#[async_trait]
pub trait CostSink: Send + Sync {
    async fn record(&self, record: CostRecord);
}
