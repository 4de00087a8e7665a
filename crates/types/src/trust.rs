//! Escalating per-user/-channel autonomy state.

use serde::{Deserialize, Serialize};

/// Ordered autonomy level, derived from approval/rejection history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustLevel {
    New,
    Building,
    Established,
    Trusted,
}

impl TrustLevel {
    pub const ALL_ASCENDING: [TrustLevel; 4] = [
        TrustLevel::New,
        TrustLevel::Building,
        TrustLevel::Established,
        TrustLevel::Trusted,
    ];

    pub fn promote(self) -> Self {
        match self {
            TrustLevel::New => TrustLevel::Building,
            TrustLevel::Building => TrustLevel::Established,
            TrustLevel::Established | TrustLevel::Trusted => TrustLevel::Trusted,
        }
    }

    pub fn demote(self) -> Self {
        match self {
            TrustLevel::New | TrustLevel::Building => TrustLevel::New,
            TrustLevel::Established => TrustLevel::Building,
            TrustLevel::Trusted => TrustLevel::Established,
        }
    }
}

/// A reply category gating auto-approval (e.g. `QUESTION`, `SPAM`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustCategory(pub String);

impl TrustCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Counters and derived level for one (user, category) or channel key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustState {
    pub level: TrustLevel,
    pub approvals: u32,
    pub rejections: u32,
    pub edits: u32,
    pub total_interactions: u32,
}

impl Default for TrustState {
    fn default() -> Self {
        Self {
            level: TrustLevel::New,
            approvals: 0,
            rejections: 0,
            edits: 0,
            total_interactions: 0,
        }
    }
}
