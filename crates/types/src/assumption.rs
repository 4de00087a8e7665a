//! Versioned YouTube-channel belief tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssumptionCategory {
    Audience,
    Tone,
    Content,
    Schedule,
    Topic,
    Competitor,
    Performance,
}

impl AssumptionCategory {
    /// Categories a fully onboarded channel is expected to have a
    /// `CONFIRMED` assumption for. `Performance` is never required since
    /// it's derived from analytics rather than stated or inferred belief.
    pub const REQUIRED: [AssumptionCategory; 6] = [
        AssumptionCategory::Audience,
        AssumptionCategory::Tone,
        AssumptionCategory::Content,
        AssumptionCategory::Schedule,
        AssumptionCategory::Topic,
        AssumptionCategory::Competitor,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssumptionSource {
    Confirmed,
    Inferred,
    NeedsReview,
    Invalidated,
}

/// A timestamped, evidence-bearing belief about a YouTube channel.
///
/// Invariants: `source == Confirmed => confidence == 1.0`;
/// `source == Invalidated => confidence == 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumption {
    pub id: Uuid,
    pub channel_id: String,
    pub category: AssumptionCategory,
    pub statement: String,
    pub evidence: Vec<String>,
    pub confidence: f32,
    pub source: AssumptionSource,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
    pub next_validation: DateTime<Utc>,
    /// Set when `source == Invalidated`; distinct from `ACTIVE` so at most
    /// one assumption per category stays active at a time.
    pub active: bool,
}

impl Assumption {
    pub fn is_active(&self) -> bool {
        self.active && self.source != AssumptionSource::Invalidated
    }
}
