//! The heartbeat scheduler: a fixed-interval loop that drains scheduled
//! events, polls skills for proactive actions, and executes or enqueues
//! them, respecting quiet hours along the way.
//!
//! Ported almost beat-for-beat from the original Python scheduler: the same
//! ordering (scheduled events, then quiet-hours gate, then skill polling,
//! then sort-and-cap, then execute) holds here, with two additions the
//! original didn't have — a per-user quiet-hours check that defers
//! `send_message` actions into a `ScheduledEvent` instead of sending them,
//! and a per-user sliding-window rate limit ([`rate_limit::RateLimiter`])
//! applied right before an action is executed or enqueued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use corvus_config::DynamicConfig;
use corvus_queue::PriorityQueue;
use corvus_types::{ActionResult, HeartbeatAction, QueuePriority, ScheduledEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod rate_limit;

pub use rate_limit::RateLimiter;

const SEND_MESSAGE_ACTION_TYPE: &str = "send_message";
const HEARTBEAT_QUEUE_TASK_TYPE: &str = "heartbeat_action";

/// Source of proactive actions for a heartbeat, normally backed by the
/// skill registry's `on_heartbeat` fan-out.
#[async_trait]
pub trait SkillActionsSource: Send + Sync {
    async fn trigger_heartbeat(&self, user_ids: &[String]) -> Result<Vec<HeartbeatAction>, String>;
}

/// Executes a single action, normally by dispatching it back into the
/// owning skill.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &HeartbeatAction) -> ActionResult;
}

/// Per-user quiet-hours override, queried in addition to the global
/// quiet-hours window. Returns the next time the user is reachable, or
/// `None` if they're reachable right now.
#[async_trait]
pub trait UserQuietHoursProvider: Send + Sync {
    async fn quiet_until(&self, user_id: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// The default provider: no per-user overrides, everyone is always
/// reachable outside the global window.
pub struct NoUserQuietHours;

#[async_trait]
impl UserQuietHoursProvider for NoUserQuietHours {
    async fn quiet_until(&self, _user_id: &str, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatStats {
    pub total_beats: u64,
    pub total_actions: u64,
    pub successful_actions: u64,
    pub failed_actions: u64,
    pub rate_limited: u64,
    pub last_beat: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Default sliding-window budget: 10 actions per user per five minutes,
/// loose enough that a normal beat cadence never trips it but tight enough
/// to cap a runaway skill.
const DEFAULT_RATE_LIMIT_MAX: usize = 10;
const DEFAULT_RATE_LIMIT_WINDOW: std::time::Duration = std::time::Duration::from_secs(300);

pub struct HeartbeatScheduler {
    actions_source: Arc<dyn SkillActionsSource>,
    executor: Arc<dyn ActionExecutor>,
    quiet_hours_provider: Arc<dyn UserQuietHoursProvider>,
    dynamic_config: Arc<DynamicConfig>,
    queue: Option<Arc<PriorityQueue>>,
    rate_limiter: Arc<RateLimiter>,
    max_actions_per_beat: usize,
    user_ids: RwLock<Vec<String>>,
    scheduled_events: RwLock<HashMap<Uuid, ScheduledEvent>>,
    stats: RwLock<HeartbeatStats>,
    running: AtomicBool,
}

impl HeartbeatScheduler {
    pub fn new(
        actions_source: Arc<dyn SkillActionsSource>,
        executor: Arc<dyn ActionExecutor>,
        dynamic_config: Arc<DynamicConfig>,
        max_actions_per_beat: usize,
    ) -> Self {
        Self {
            actions_source,
            executor,
            quiet_hours_provider: Arc::new(NoUserQuietHours),
            dynamic_config,
            queue: None,
            rate_limiter: Arc::new(RateLimiter::new(DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW)),
            max_actions_per_beat,
            user_ids: RwLock::new(Vec::new()),
            scheduled_events: RwLock::new(HashMap::new()),
            stats: RwLock::new(HeartbeatStats::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_queue(mut self, queue: Arc<PriorityQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_quiet_hours_provider(mut self, provider: Arc<dyn UserQuietHoursProvider>) -> Self {
        self.quiet_hours_provider = provider;
        self
    }

    /// Overrides the default per-user action budget (10 per 5 minutes).
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub async fn stats(&self) -> HeartbeatStats {
        self.stats.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn set_user_ids(&self, user_ids: Vec<String>) {
        let count = user_ids.len();
        *self.user_ids.write().await = user_ids;
        tracing::debug!(count, "user_ids_updated");
    }

    pub async fn add_user(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let mut ids = self.user_ids.write().await;
        if !ids.contains(&user_id) {
            ids.push(user_id);
        }
    }

    pub async fn remove_user(&self, user_id: &str) {
        self.user_ids.write().await.retain(|id| id != user_id);
    }

    pub async fn schedule_event(&self, event: ScheduledEvent) {
        tracing::debug!(event_id = %event.id, trigger_time = %event.trigger_time, "event_scheduled");
        self.scheduled_events.write().await.insert(event.id, event);
    }

    pub async fn cancel_event(&self, event_id: Uuid) -> bool {
        self.scheduled_events.write().await.remove(&event_id).is_some()
    }

    /// Runs `corvus_config::DynamicConfig`'s quiet-hours window check at
    /// hour granularity, the same resolution the scheduler config exposes.
    /// Overnight windows (`start > end`) wrap across midnight.
    pub async fn is_quiet_hours(&self) -> bool {
        let qh = self.dynamic_config.quiet_hours().await;
        let hour = Utc::now().hour();
        if qh.start_hour > qh.end_hour {
            hour >= qh.start_hour || hour < qh.end_hour
        } else {
            hour >= qh.start_hour && hour < qh.end_hour
        }
    }

    /// Runs the main loop until `shutdown` fires. Sleeps
    /// `dynamic_config.heartbeat_interval_seconds()` between beats, read
    /// fresh each iteration so an operator override takes effect on the
    /// next cycle without a restart.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("heartbeat_scheduler_started");
        loop {
            if let Err(err) = self.run_heartbeat().await {
                tracing::error!(%err, "heartbeat_error");
                self.stats.write().await.last_error = Some(err);
            }

            let interval = self.dynamic_config.heartbeat_interval_seconds().await;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(interval)) => {}
            }
        }
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("heartbeat_scheduler_stopped");
    }

    /// One beat: scheduled events first, then (unless in quiet hours) skill
    /// polling, sort-and-cap, per-user deferral, and execution.
    async fn run_heartbeat(&self) -> Result<(), String> {
        {
            let mut stats = self.stats.write().await;
            stats.total_beats += 1;
            stats.last_beat = Some(Utc::now());
        }

        let in_quiet_hours = self.is_quiet_hours().await;
        self.process_scheduled_events().await;

        if in_quiet_hours {
            tracing::debug!("skipping_heartbeat_quiet_hours");
            return Ok(());
        }

        let user_ids = self.user_ids.read().await.clone();
        if user_ids.is_empty() {
            tracing::debug!("skipping_heartbeat_no_users");
            return Ok(());
        }

        let mut actions = self.get_skill_actions(&user_ids).await;
        if actions.is_empty() {
            return Ok(());
        }

        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        actions.truncate(self.max_actions_per_beat);

        let actions = self.defer_quiet_hour_actions(actions).await;
        let results = self.execute_actions(actions.clone()).await;
        self.update_stats(&results).await;

        tracing::debug!(
            actions = actions.len(),
            successful = results.iter().filter(|r| r.success).count(),
            "heartbeat_complete"
        );
        Ok(())
    }

    /// Runs one heartbeat manually regardless of quiet hours, mirroring the
    /// original scheduler's test/operator-triggered `run_once`.
    pub async fn run_once(&self) -> Vec<ActionResult> {
        self.process_scheduled_events().await;

        let user_ids = self.user_ids.read().await.clone();
        let mut actions = self.get_skill_actions(&user_ids).await;
        if actions.is_empty() {
            return Vec::new();
        }
        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        actions.truncate(self.max_actions_per_beat);

        let actions = self.defer_quiet_hour_actions(actions).await;
        let results = self.execute_actions(actions).await;
        self.update_stats(&results).await;
        results
    }

    async fn get_skill_actions(&self, user_ids: &[String]) -> Vec<HeartbeatAction> {
        match self.actions_source.trigger_heartbeat(user_ids).await {
            Ok(actions) => {
                self.stats.write().await.total_actions += actions.len() as u64;
                actions
            }
            Err(err) => {
                tracing::error!(%err, "skills_heartbeat_failed");
                Vec::new()
            }
        }
    }

    /// Pulls out `send_message` actions whose recipient is in their own
    /// quiet hours right now, turning each into a `ScheduledEvent` due when
    /// that user becomes reachable instead of executing it immediately.
    async fn defer_quiet_hour_actions(&self, actions: Vec<HeartbeatAction>) -> Vec<HeartbeatAction> {
        let now = Utc::now();
        let mut remaining = Vec::with_capacity(actions.len());
        for action in actions {
            if action.action_type.eq_ignore_ascii_case(SEND_MESSAGE_ACTION_TYPE) {
                if let Some(until) = self.quiet_hours_provider.quiet_until(&action.user_id, now).await {
                    let mut event = ScheduledEvent::new(
                        action.user_id.clone(),
                        action.skill_name.clone(),
                        action.action_type.clone(),
                        until,
                    );
                    event.data = action.data.clone();
                    tracing::debug!(user_id = %action.user_id, until = %until, "deferring_action_to_user_quiet_hours");
                    self.schedule_event(event).await;
                    continue;
                }
            }
            remaining.push(action);
        }
        remaining
    }

    async fn execute_actions(&self, actions: Vec<HeartbeatAction>) -> Vec<ActionResult> {
        if let Some(queue) = &self.queue {
            return self.enqueue_actions(queue, actions).await;
        }
        let mut results = Vec::with_capacity(actions.len());
        for action in &actions {
            if !self.rate_limiter.check(&action.user_id).await {
                tracing::debug!(user_id = %action.user_id, "heartbeat_action_rate_limited");
                results.push(ActionResult::failed(format!("rate limit exceeded for user {}", action.user_id)));
                continue;
            }
            results.push(self.executor.execute(action).await);
        }
        results
    }

    async fn enqueue_actions(&self, queue: &Arc<PriorityQueue>, actions: Vec<HeartbeatAction>) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        for action in &actions {
            if !self.rate_limiter.check(&action.user_id).await {
                tracing::debug!(user_id = %action.user_id, "heartbeat_action_rate_limited");
                results.push(ActionResult::failed(format!("rate limit exceeded for user {}", action.user_id)));
                continue;
            }
            let payload = serde_json::json!({
                "skill_name": action.skill_name,
                "action_type": action.action_type,
                "user_id": action.user_id,
                "data": action.data,
                "priority": action.priority,
            });
            match queue.enqueue(
                HEARTBEAT_QUEUE_TASK_TYPE,
                action.user_id.clone(),
                payload,
                QueuePriority::Scheduled,
                None,
            ) {
                Ok(_) => results.push(ActionResult::ok("enqueued")),
                Err(err) => {
                    tracing::warn!(%err, "heartbeat_enqueue_failed");
                    results.push(self.executor.execute(action).await);
                }
            }
        }
        results
    }

    async fn process_scheduled_events(&self) {
        let now = Utc::now();
        let due_ids: Vec<Uuid> = {
            let events = self.scheduled_events.read().await;
            events.values().filter(|e| e.is_due(now)).map(|e| e.id).collect()
        };

        for id in due_ids {
            let event = {
                let mut events = self.scheduled_events.write().await;
                match events.remove(&id) {
                    Some(e) => e,
                    None => continue,
                }
            };
            let action = event.to_action();
            let result = self.executor.execute(&action).await;
            tracing::debug!(event_id = %id, success = result.success, "scheduled_event_processed");
        }
    }

    async fn update_stats(&self, results: &[ActionResult]) {
        let mut stats = self.stats.write().await;
        for result in results {
            if result.success {
                stats.successful_actions += 1;
            } else if result.is_rate_limited() {
                stats.rate_limited += 1;
            } else {
                stats.failed_actions += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_config::AppConfig;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use tokio::sync::Mutex;

    struct ScriptedSource(Vec<HeartbeatAction>);

    #[async_trait]
    impl SkillActionsSource for ScriptedSource {
        async fn trigger_heartbeat(&self, _user_ids: &[String]) -> Result<Vec<HeartbeatAction>, String> {
            Ok(self.0.clone())
        }
    }

    struct RecordingExecutor {
        seen: Mutex<Vec<String>>,
        fail_action_types: Vec<String>,
    }

    impl RecordingExecutor {
        fn new() -> Self {
            Self { seen: Mutex::new(Vec::new()), fail_action_types: Vec::new() }
        }
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &HeartbeatAction) -> ActionResult {
            self.seen.lock().await.push(action.action_type.clone());
            if self.fail_action_types.contains(&action.action_type) {
                ActionResult::failed("boom")
            } else {
                ActionResult::ok("done")
            }
        }
    }

    fn dynamic_config() -> Arc<DynamicConfig> {
        Arc::new(DynamicConfig::from_app_config(&AppConfig::default()))
    }

    #[tokio::test]
    async fn skips_skill_polling_during_quiet_hours_but_still_processes_scheduled_events() {
        let config = dynamic_config();
        config.set_quiet_hours(0, 23).await; // nearly the whole day is quiet
        let source = Arc::new(ScriptedSource(vec![HeartbeatAction::new("task_manager", "reminder", "u1", 5)]));
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = HeartbeatScheduler::new(source, executor.clone(), config, 10);

        scheduler
            .schedule_event(ScheduledEvent::new("u1", "task_manager", "scheduled_ping", Utc::now() - chrono::Duration::seconds(1)))
            .await;
        scheduler.set_user_ids(vec!["u1".to_string()]).await;

        scheduler.run_heartbeat().await.unwrap();

        let seen = executor.seen.lock().await.clone();
        assert_eq!(seen, vec!["scheduled_ping".to_string()]);
        assert!(scheduler.scheduled_events.read().await.is_empty());
    }

    #[tokio::test]
    async fn actions_are_capped_and_sorted_by_descending_priority() {
        let config = dynamic_config();
        config.set_quiet_hours(0, 0).await; // never quiet
        let source = Arc::new(ScriptedSource(vec![
            HeartbeatAction::new("a", "low", "u1", 2),
            HeartbeatAction::new("a", "high", "u1", 9),
            HeartbeatAction::new("a", "mid", "u1", 5),
        ]));
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = HeartbeatScheduler::new(source, executor.clone(), config, 2);
        scheduler.set_user_ids(vec!["u1".to_string()]).await;

        scheduler.run_heartbeat().await.unwrap();

        let seen = executor.seen.lock().await.clone();
        assert_eq!(seen, vec!["high".to_string(), "mid".to_string()]);
    }

    #[tokio::test]
    async fn no_users_skips_the_beat_entirely() {
        let config = dynamic_config();
        config.set_quiet_hours(0, 0).await;
        let calls = Arc::new(AtomicU32::new(0));
        struct CountingSource(Arc<AtomicU32>);
        #[async_trait]
        impl SkillActionsSource for CountingSource {
            async fn trigger_heartbeat(&self, _user_ids: &[String]) -> Result<Vec<HeartbeatAction>, String> {
                self.0.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(vec![])
            }
        }
        let source = Arc::new(CountingSource(calls.clone()));
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = HeartbeatScheduler::new(source, executor, config, 10);

        scheduler.run_heartbeat().await.unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    struct AlwaysQuiet;

    #[async_trait]
    impl UserQuietHoursProvider for AlwaysQuiet {
        async fn quiet_until(&self, _user_id: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
            Some(now + chrono::Duration::hours(1))
        }
    }

    #[tokio::test]
    async fn send_message_actions_defer_when_user_is_in_quiet_hours() {
        let config = dynamic_config();
        config.set_quiet_hours(0, 0).await;
        let source = Arc::new(ScriptedSource(vec![HeartbeatAction::new(
            "task_manager",
            "send_message",
            "u1",
            8,
        )]));
        let executor = Arc::new(RecordingExecutor::new());
        let scheduler = HeartbeatScheduler::new(source, executor.clone(), config, 10)
            .with_quiet_hours_provider(Arc::new(AlwaysQuiet));
        scheduler.set_user_ids(vec!["u1".to_string()]).await;

        scheduler.run_heartbeat().await.unwrap();

        assert!(executor.seen.lock().await.is_empty());
        assert_eq!(scheduler.scheduled_events.read().await.len(), 1);
    }

    #[tokio::test]
    async fn rate_limited_failures_are_tallied_separately_from_plain_failures() {
        let config = dynamic_config();
        config.set_quiet_hours(0, 0).await;
        let source = Arc::new(ScriptedSource(vec![HeartbeatAction::new("a", "reminder", "u1", 5)]));
        struct FailingExecutor;
        #[async_trait]
        impl ActionExecutor for FailingExecutor {
            async fn execute(&self, _action: &HeartbeatAction) -> ActionResult {
                ActionResult::failed("Rate limit hit")
            }
        }
        let scheduler = HeartbeatScheduler::new(source, Arc::new(FailingExecutor), config, 10);
        scheduler.set_user_ids(vec!["u1".to_string()]).await;

        scheduler.run_heartbeat().await.unwrap();
        let stats = scheduler.stats().await;
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(stats.failed_actions, 0);
    }
}
