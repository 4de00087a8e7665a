//! Persistent multi-priority work queue task shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority band. Ordering is `Critical > High > Normal > Scheduled`; the
/// derived `Ord` impl relies on declaration order matching that, from
/// lowest to highest variant-discriminant, so callers sort descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QueuePriority {
    Scheduled,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Running,
    Done,
    Failed,
    Deferred,
}

/// One persisted unit of deferred work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: Uuid,
    pub task_type: String,
    pub user_id: String,
    pub payload: serde_json::Value,
    pub priority: QueuePriority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: QueueStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Monotonic sequence number assigned at enqueue time, used to break
    /// ties FIFO within the same priority band and `scheduled_for` bucket.
    pub sequence: u64,
}

impl QueueTask {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_for {
            Some(t) => t <= now,
            None => true,
        }
    }

    pub fn next_backoff_delay(&self, base_secs: u64, cap_secs: u64) -> u64 {
        let exp = 2u64.saturating_pow(self.attempts.min(32));
        (base_secs.saturating_mul(exp)).min(cap_secs)
    }
}
