//! Task and project management: create/list/update/complete/delete plus
//! deadline and staleness heartbeat checks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use corvus_types::{HeartbeatAction, Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Todo,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl TaskPriority {
    pub fn from_str_loose(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "critical" | "urgent" => Self::Critical,
            "high" | "important" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: String::new(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            project: None,
            tags: vec![],
            deadline: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_overdue(&self) -> bool {
        match self.deadline {
            Some(deadline) if self.status != TaskStatus::Done => Utc::now() > deadline,
            _ => false,
        }
    }

    pub fn is_stale(&self, days: i64) -> bool {
        if matches!(self.status, TaskStatus::Done | TaskStatus::Cancelled) {
            return false;
        }
        self.updated_at < Utc::now() - Duration::days(days)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

const DEFAULT_STALE_DAYS: i64 = 7;

#[derive(Default)]
pub struct TaskManagerSkill {
    tasks: RwLock<HashMap<String, HashMap<Uuid, Task>>>,
}

impl TaskManagerSkill {
    pub fn new() -> Self {
        Self::default()
    }

    async fn user_tasks(&self, user_id: &str) -> Vec<Task> {
        self.tasks.read().await.get(user_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    async fn get_task(&self, user_id: &str, task_id: Uuid) -> Option<Task> {
        self.tasks.read().await.get(user_id).and_then(|m| m.get(&task_id)).cloned()
    }

    async fn store_task(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.entry(task.user_id.clone()).or_default().insert(task.id, task);
    }

    async fn delete_task(&self, user_id: &str, task_id: Uuid) {
        if let Some(user_tasks) = self.tasks.write().await.get_mut(user_id) {
            user_tasks.remove(&task_id);
        }
    }

    fn parse_task_id(context: &HashMap<String, serde_json::Value>) -> Result<Uuid, String> {
        let raw = context.get("task_id").and_then(|v| v.as_str()).ok_or("no task_id provided")?;
        Uuid::parse_str(raw).map_err(|_| "invalid task_id format".to_string())
    }

    async fn handle_create(&self, request: &SkillRequest) -> SkillResponse {
        let context = &request.context;
        let mut task = Task::new(&request.user_id);
        task.title = context.get("title").and_then(|v| v.as_str()).unwrap_or(&request.message).to_string();
        task.description = context.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string();
        task.priority = context
            .get("priority")
            .and_then(|v| v.as_str())
            .map(TaskPriority::from_str_loose)
            .unwrap_or(TaskPriority::Medium);
        task.project = context.get("project").and_then(|v| v.as_str()).map(String::from);
        task.tags = context
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if let Some(deadline) = context.get("deadline").and_then(|v| v.as_str()) {
            match DateTime::parse_from_rfc3339(deadline) {
                Ok(dt) => task.deadline = Some(dt.with_timezone(&Utc)),
                Err(_) => tracing::warn!(deadline, "invalid_deadline_format"),
            }
        }

        let title = task.title.clone();
        self.store_task(task.clone()).await;
        tracing::info!(task_id = %task.id, user_id = %request.user_id, %title, "task_created");

        SkillResponse::ok(request.id.clone(), format!("Created task: {title}")).with_data("task", task.to_json())
    }

    async fn handle_list(&self, request: &SkillRequest) -> SkillResponse {
        let context = &request.context;
        let mut tasks = self.user_tasks(&request.user_id).await;

        if let Some(status) = context.get("status").and_then(|v| v.as_str()) {
            if let Ok(parsed) = serde_json::from_value::<TaskStatus>(json!(status)) {
                tasks.retain(|t| t.status == parsed);
            }
        }
        if let Some(project) = context.get("project").and_then(|v| v.as_str()) {
            tasks.retain(|t| t.project.as_deref() == Some(project));
        }
        if let Some(priority) = context.get("priority").and_then(|v| v.as_str()) {
            let parsed = TaskPriority::from_str_loose(priority);
            tasks.retain(|t| t.priority == parsed);
        }

        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.deadline.cmp(&b.deadline)));

        let count = tasks.len();
        let list: Vec<_> = tasks.iter().map(Task::to_json).collect();
        SkillResponse::ok(request.id.clone(), format!("Found {count} task(s)"))
            .with_data("tasks", json!(list))
            .with_data("count", json!(count))
    }

    async fn handle_update(&self, request: &SkillRequest) -> SkillResponse {
        let task_id = match Self::parse_task_id(&request.context) {
            Ok(id) => id,
            Err(e) => return SkillResponse::error_response(request.id.clone(), e),
        };
        let Some(mut task) = self.get_task(&request.user_id, task_id).await else {
            return SkillResponse::error_response(request.id.clone(), "Task not found");
        };

        let context = &request.context;
        if let Some(v) = context.get("title").and_then(|v| v.as_str()) {
            task.title = v.to_string();
        }
        if let Some(v) = context.get("description").and_then(|v| v.as_str()) {
            task.description = v.to_string();
        }
        if let Some(v) = context.get("status").and_then(|v| v.as_str()) {
            if let Ok(parsed) = serde_json::from_value::<TaskStatus>(json!(v)) {
                task.status = parsed;
            }
        }
        if let Some(v) = context.get("priority").and_then(|v| v.as_str()) {
            task.priority = TaskPriority::from_str_loose(v);
        }
        if let Some(v) = context.get("project").and_then(|v| v.as_str()) {
            task.project = Some(v.to_string());
        }
        if let Some(v) = context.get("tags").and_then(|v| v.as_array()) {
            task.tags = v.iter().filter_map(|t| t.as_str().map(String::from)).collect();
        }
        if let Some(v) = context.get("deadline").and_then(|v| v.as_str()) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
                task.deadline = Some(dt.with_timezone(&Utc));
            }
        }
        task.updated_at = Utc::now();

        let title = task.title.clone();
        self.store_task(task.clone()).await;
        tracing::info!(task_id = %task_id, user_id = %request.user_id, "task_updated");

        SkillResponse::ok(request.id.clone(), format!("Updated task: {title}")).with_data("task", task.to_json())
    }

    async fn handle_complete(&self, request: &SkillRequest) -> SkillResponse {
        let task_id = match Self::parse_task_id(&request.context) {
            Ok(id) => id,
            Err(e) => return SkillResponse::error_response(request.id.clone(), e),
        };
        let Some(mut task) = self.get_task(&request.user_id, task_id).await else {
            return SkillResponse::error_response(request.id.clone(), "Task not found");
        };

        let now = Utc::now();
        task.status = TaskStatus::Done;
        task.completed_at = Some(now);
        task.updated_at = now;

        let title = task.title.clone();
        self.store_task(task.clone()).await;
        tracing::info!(task_id = %task_id, user_id = %request.user_id, "task_completed");

        SkillResponse::ok(request.id.clone(), format!("Completed task: {title}")).with_data("task", task.to_json())
    }

    async fn handle_delete(&self, request: &SkillRequest) -> SkillResponse {
        let task_id = match Self::parse_task_id(&request.context) {
            Ok(id) => id,
            Err(e) => return SkillResponse::error_response(request.id.clone(), e),
        };
        let Some(task) = self.get_task(&request.user_id, task_id).await else {
            return SkillResponse::error_response(request.id.clone(), "Task not found");
        };

        self.delete_task(&request.user_id, task_id).await;
        tracing::info!(task_id = %task_id, user_id = %request.user_id, "task_deleted");

        SkillResponse::ok(request.id.clone(), format!("Deleted task: {}", task.title))
            .with_data("task_id", json!(task_id.to_string()))
    }

    async fn handle_summary(&self, request: &SkillRequest) -> SkillResponse {
        let tasks = self.user_tasks(&request.user_id).await;

        let mut by_status: HashMap<String, u32> = HashMap::new();
        let mut by_priority: HashMap<String, u32> = HashMap::new();
        let mut by_project: HashMap<String, u32> = HashMap::new();
        let mut overdue_count = 0u32;
        let mut stale_count = 0u32;

        for task in &tasks {
            let status_key = serde_json::to_value(task.status).unwrap_or_default().as_str().unwrap_or("").to_string();
            *by_status.entry(status_key).or_default() += 1;
            let priority_key = format!("{:?}", task.priority).to_lowercase();
            *by_priority.entry(priority_key).or_default() += 1;
            if let Some(project) = &task.project {
                *by_project.entry(project.clone()).or_default() += 1;
            }
            if task.is_overdue() {
                overdue_count += 1;
            }
            if task.is_stale(DEFAULT_STALE_DAYS) {
                stale_count += 1;
            }
        }

        let active_count: u32 = by_status
            .iter()
            .filter(|(status, _)| status.as_str() != "done" && status.as_str() != "cancelled")
            .map(|(_, count)| *count)
            .sum();

        let mut parts = vec![format!("You have {active_count} active task(s)")];
        if overdue_count > 0 {
            parts.push(format!("{overdue_count} overdue"));
        }
        if stale_count > 0 {
            parts.push(format!("{stale_count} stale"));
        }

        SkillResponse::ok(request.id.clone(), format!("{}.", parts.join(". "))).with_data(
            "summary",
            json!({
                "total": tasks.len(),
                "active": active_count,
                "by_status": by_status,
                "by_priority": by_priority,
                "by_project": by_project,
                "overdue": overdue_count,
                "stale": stale_count,
            }),
        )
    }
}

#[async_trait]
impl Skill for TaskManagerSkill {
    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            name: "task_manager".to_string(),
            description: "Manage tasks, projects, and deadlines with reminders".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSet::new([
                Permission::ReadOwnCollection,
                Permission::WriteOwnCollection,
                Permission::SendMessages,
                Permission::ReadProfile,
            ]),
            collections: vec!["skill_tasks".to_string()],
            intents: vec![
                "create_task".to_string(),
                "list_tasks".to_string(),
                "update_task".to_string(),
                "complete_task".to_string(),
                "delete_task".to_string(),
                "task_summary".to_string(),
            ],
        }
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn handle(&self, request: SkillRequest) -> SkillResponse {
        match request.intent.as_str() {
            "create_task" => self.handle_create(&request).await,
            "list_tasks" => self.handle_list(&request).await,
            "update_task" => self.handle_update(&request).await,
            "complete_task" => self.handle_complete(&request).await,
            "delete_task" => self.handle_delete(&request).await,
            "task_summary" => self.handle_summary(&request).await,
            other => SkillResponse::error_response(request.id.clone(), format!("Unknown intent: {other}")),
        }
    }

    async fn on_heartbeat(&self, user_ids: &[String]) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();

        for user_id in user_ids {
            let tasks = self.user_tasks(user_id).await;

            let deadline_soon: Vec<_> = tasks
                .iter()
                .filter(|t| {
                    !matches!(t.status, TaskStatus::Done | TaskStatus::Cancelled)
                        && t.deadline.is_some_and(|d| {
                            let until = d - Utc::now();
                            until > Duration::zero() && until < Duration::hours(24)
                        })
                })
                .collect();
            if !deadline_soon.is_empty() {
                actions.push(
                    HeartbeatAction::new("task_manager", "deadline_reminder", user_id, 8)
                        .with_data("tasks", json!(deadline_soon.iter().map(|t| t.to_json()).collect::<Vec<_>>()))
                        .with_data("count", json!(deadline_soon.len())),
                );
            }

            let overdue: Vec<_> = tasks.iter().filter(|t| t.is_overdue()).collect();
            if !overdue.is_empty() {
                actions.push(
                    HeartbeatAction::new("task_manager", "overdue_alert", user_id, 9)
                        .with_data("tasks", json!(overdue.iter().map(|t| t.to_json()).collect::<Vec<_>>()))
                        .with_data("count", json!(overdue.len())),
                );
            }

            let stale: Vec<_> = tasks.iter().filter(|t| t.is_stale(DEFAULT_STALE_DAYS)).collect();
            if !stale.is_empty() {
                actions.push(
                    HeartbeatAction::new("task_manager", "stale_task_check", user_id, 3)
                        .with_data("tasks", json!(stale.iter().map(|t| t.to_json()).collect::<Vec<_>>()))
                        .with_data("count", json!(stale.len())),
                );
            }
        }

        actions
    }

    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {
        self.tasks.write().await.clear();
    }
}
