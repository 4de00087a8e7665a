//! Glue between the skill registry/chat transport and the heartbeat
//! scheduler's two collaborator traits. `SkillRegistry` already knows how
//! to fan `on_heartbeat` out across skills; `ChatTransport` already knows
//! how to deliver a message. Neither crate depends on the other, so the
//! adapters live here, in the process that wires both up.

use std::sync::Arc;

use async_trait::async_trait;
use corvus_queue::QueueHandler;
use corvus_scheduler::{ActionExecutor, SkillActionsSource};
use corvus_skills::SkillRegistry;
use corvus_transport::ChatTransport;
use corvus_types::{ActionResult, HeartbeatAction, QueueTask};

pub struct RegistryActionsSource {
    skills: Arc<SkillRegistry>,
}

impl RegistryActionsSource {
    pub fn new(skills: Arc<SkillRegistry>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl SkillActionsSource for RegistryActionsSource {
    async fn trigger_heartbeat(&self, user_ids: &[String]) -> Result<Vec<HeartbeatAction>, String> {
        Ok(self.skills.trigger_heartbeat(user_ids).await)
    }
}

/// Turns a `HeartbeatAction` into a plain-text notification and sends it to
/// the acting user over the configured transport. `user_id` doubles as the
/// transport channel id, since this core has no separate channel-routing
/// table for proactive notifications.
pub struct TransportActionExecutor {
    transport: Arc<dyn ChatTransport>,
}

impl TransportActionExecutor {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ActionExecutor for TransportActionExecutor {
    async fn execute(&self, action: &HeartbeatAction) -> ActionResult {
        let Ok(channel_id) = action.user_id.parse::<i64>() else {
            return ActionResult::failed(format!("action user_id is not a channel id: {}", action.user_id));
        };

        let message = render_action(action);
        match self.transport.send(channel_id, &message).await {
            Ok(()) => ActionResult::ok(format!("delivered {} to {}", action.action_type, action.user_id)),
            Err(err) => ActionResult::failed(err.to_string()),
        }
    }
}

fn render_action(action: &HeartbeatAction) -> String {
    let count = action.data.get("count").and_then(|v| v.as_u64());
    match (action.action_type.as_str(), count) {
        ("deadline_reminder", Some(n)) => format!("Heads up: {n} task(s) are due within 24 hours."),
        ("overdue_alert", Some(n)) => format!("{n} task(s) are overdue and need attention."),
        ("stale_task_check", Some(n)) => format!("{n} task(s) haven't moved in a while — still relevant?"),
        _ => format_generic(action),
    }
}

const HEARTBEAT_QUEUE_TASK_TYPE: &str = "heartbeat_action";

/// Consumes `heartbeat_action` tasks enqueued by the scheduler's
/// `with_queue` path, replaying them through the same executor a
/// non-queued beat would have used directly.
pub struct HeartbeatQueueHandler {
    executor: Arc<dyn ActionExecutor>,
}

impl HeartbeatQueueHandler {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl QueueHandler for HeartbeatQueueHandler {
    async fn handle(&self, task: &QueueTask) -> Result<(), String> {
        if task.task_type != HEARTBEAT_QUEUE_TASK_TYPE {
            return Err(format!("unsupported task type: {}", task.task_type));
        }
        let action: HeartbeatAction =
            serde_json::from_value(task.payload.clone()).map_err(|err| format!("bad heartbeat payload: {err}"))?;
        let result = self.executor.execute(&action).await;
        if result.success {
            Ok(())
        } else {
            Err(result.error.unwrap_or_else(|| "heartbeat action failed".to_string()))
        }
    }
}

fn format_generic(action: &HeartbeatAction) -> String {
    if action.data.is_empty() {
        format!("[{}] {}", action.skill_name, action.action_type)
    } else {
        format!(
            "[{}] {}: {}",
            action.skill_name,
            action.action_type,
            serde_json::to_string(&action.data).unwrap_or_default()
        )
    }
}
