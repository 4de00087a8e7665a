//! Proactive work units produced by skills and consumed by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A unit of proactive work proposed by a skill during `on_heartbeat`.
///
/// Priority is an ordering hint only: 9-10 critical, 7-8 high, 4-6 normal,
/// 1-3 low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAction {
    pub skill_name: String,
    pub action_type: String,
    pub user_id: String,
    pub data: HashMap<String, serde_json::Value>,
    pub priority: u8,
}

impl HeartbeatAction {
    pub fn new(
        skill_name: impl Into<String>,
        action_type: impl Into<String>,
        user_id: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            skill_name: skill_name.into(),
            action_type: action_type.into(),
            user_id: user_id.into(),
            data: HashMap::new(),
            priority: priority.clamp(1, 10),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Lifecycle status of a [`ScheduledEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduledEventStatus {
    Pending,
    Completed,
    Failed,
}

/// A one-shot event scheduled by a skill or the orchestrator, triggered once
/// `now >= trigger_time` and then removed from the pending set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: Uuid,
    pub user_id: String,
    pub skill_name: String,
    pub action_type: String,
    pub data: HashMap<String, serde_json::Value>,
    pub trigger_time: DateTime<Utc>,
    pub status: ScheduledEventStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ScheduledEvent {
    pub fn new(
        user_id: impl Into<String>,
        skill_name: impl Into<String>,
        action_type: impl Into<String>,
        trigger_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            skill_name: skill_name.into(),
            action_type: action_type.into(),
            data: HashMap::new(),
            trigger_time,
            status: ScheduledEventStatus::Pending,
            triggered_at: None,
            error: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduledEventStatus::Pending && self.trigger_time <= now
    }

    /// The action this event turns into when the scheduler processes it.
    pub fn to_action(&self) -> HeartbeatAction {
        HeartbeatAction {
            skill_name: self.skill_name.clone(),
            action_type: self.action_type.clone(),
            user_id: self.user_id.clone(),
            data: self.data.clone(),
            priority: 5,
        }
    }
}

/// Outcome of executing a single [`HeartbeatAction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
        }
    }

    /// True when the failure reason looks like a rate-limit signal
    /// (case-insensitive match on "rate limit").
    pub fn is_rate_limited(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| e.to_ascii_lowercase().contains("rate limit"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn event_is_due_only_after_trigger_time() {
        let now = Utc::now();
        let event = ScheduledEvent::new("u1", "task_manager", "reminder", now - Duration::seconds(1));
        assert!(event.is_due(now));
        let future = ScheduledEvent::new("u1", "task_manager", "reminder", now + Duration::seconds(60));
        assert!(!future.is_due(now));
    }

    #[test]
    fn rate_limit_detection_is_case_insensitive() {
        let r = ActionResult::failed("Rate Limit exceeded for user");
        assert!(r.is_rate_limited());
        let r = ActionResult::failed("connection refused");
        assert!(!r.is_rate_limited());
    }

    #[test]
    fn priority_is_clamped_to_valid_range() {
        let a = HeartbeatAction::new("task_manager", "reminder", "u1", 99);
        assert_eq!(a.priority, 10);
        let a = HeartbeatAction::new("task_manager", "reminder", "u1", 0);
        assert_eq!(a.priority, 1);
    }
}
