//! Passive development-activity journal: ingests commits, annotations,
//! coding-session summaries, and tags, then answers status/next/ideas/
//! journal/summary queries over them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use corvus_types::{HeartbeatAction, Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

const STALE_ANNOTATION_DAYS: i64 = 14;
const IDEA_REMINDER_DAYS: i64 = 5;
const DEFAULT_QUERY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevEntry {
    pub id: Uuid,
    pub user_id: String,
    pub entry_type: String,
    pub project: String,
    pub title: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

impl DevEntry {
    fn new(user_id: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            entry_type: entry_type.into(),
            project: String::new(),
            title: String::new(),
            content: String::new(),
            metadata: HashMap::new(),
            status: EntryStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, days: i64) -> bool {
        self.status == EntryStatus::Active && Utc::now() - self.created_at > Duration::days(days)
    }

    fn annotation_type(&self) -> &str {
        self.metadata.get("annotation_type").and_then(|v| v.as_str()).unwrap_or("TODO")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn format_age(dt: DateTime<Utc>) -> String {
    let delta = Utc::now() - dt;
    if delta.num_days() > 0 {
        format!("{}d ago", delta.num_days())
    } else if delta.num_hours() > 0 {
        format!("{}h ago", delta.num_hours())
    } else {
        format!("{}m ago", delta.num_minutes())
    }
}

#[derive(Default)]
pub struct DevWatcherSkill {
    entries: RwLock<HashMap<String, HashMap<Uuid, DevEntry>>>,
}

impl DevWatcherSkill {
    pub fn new() -> Self {
        Self::default()
    }

    async fn store_entry(&self, entry: DevEntry) {
        self.entries.write().await.entry(entry.user_id.clone()).or_default().insert(entry.id, entry);
    }

    async fn user_entries(&self, user_id: &str) -> Vec<DevEntry> {
        self.entries.read().await.get(user_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    async fn recent_entries(&self, user_id: &str, limit: usize, entry_types: Option<&[&str]>) -> Vec<DevEntry> {
        let mut entries = self.user_entries(user_id).await;
        if let Some(types) = entry_types {
            entries.retain(|e| types.contains(&e.entry_type.as_str()));
        }
        entries.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        entries.truncate(limit);
        entries
    }

    async fn entries_by_type(&self, user_id: &str, entry_type: &str, limit: usize) -> Vec<DevEntry> {
        self.recent_entries(user_id, limit, Some(&[entry_type])).await
    }

    async fn active_annotations(&self, user_id: &str, limit: usize) -> Vec<DevEntry> {
        self.entries_by_type(user_id, "annotation", 100)
            .await
            .into_iter()
            .filter(|a| a.status == EntryStatus::Active)
            .take(limit)
            .collect()
    }

    async fn resolve_annotation(&self, user_id: &str, file: &str, content: &str) {
        let mut entries = self.entries.write().await;
        if let Some(user_entries) = entries.get_mut(user_id) {
            for entry in user_entries.values_mut() {
                if entry.entry_type == "annotation"
                    && entry.metadata.get("file").and_then(|v| v.as_str()) == Some(file)
                    && entry.content == content
                {
                    entry.status = EntryStatus::Resolved;
                }
            }
        }
    }

    async fn handle_ingest_commit(&self, request: &SkillRequest) -> SkillResponse {
        let ctx = &request.context;
        let mut entry = DevEntry::new(&request.user_id, "commit");
        entry.project = ctx.get("project").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let message = ctx.get("message").and_then(|v| v.as_str()).unwrap_or(&request.message);
        entry.title = message.chars().take(200).collect();
        entry.content = request.message.clone();
        entry.metadata.insert("sha".to_string(), json!(ctx.get("sha").and_then(|v| v.as_str()).unwrap_or("")));
        entry.metadata.insert("branch".to_string(), json!(ctx.get("branch").and_then(|v| v.as_str()).unwrap_or("")));

        let title: String = entry.title.chars().take(80).collect();
        tracing::info!(project = %entry.project, "dev_commit_ingested");
        self.store_entry(entry).await;
        SkillResponse::ok(request.id.clone(), format!("Ingested commit: {title}"))
    }

    async fn handle_ingest_annotation(&self, request: &SkillRequest) -> SkillResponse {
        let ctx = &request.context;
        let annotation_type = ctx.get("annotation_type").and_then(|v| v.as_str()).unwrap_or("TODO").to_string();
        let action = ctx.get("action").and_then(|v| v.as_str()).unwrap_or("added").to_string();
        let file = ctx.get("file").and_then(|v| v.as_str()).unwrap_or("").to_string();

        let mut entry = DevEntry::new(&request.user_id, "annotation");
        entry.project = ctx.get("project").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let short_message: String = request.message.chars().take(150).collect();
        entry.title = format!("{annotation_type}: {short_message}");
        entry.content = request.message.clone();
        entry.metadata.insert("annotation_type".to_string(), json!(annotation_type));
        entry.metadata.insert("file".to_string(), json!(file));

        if action == "removed" {
            self.resolve_annotation(&request.user_id, &file, &request.message).await;
            entry.status = EntryStatus::Resolved;
        }

        tracing::info!(%annotation_type, %action, "dev_annotation_ingested");
        self.store_entry(entry).await;
        SkillResponse::ok(request.id.clone(), format!("Ingested {annotation_type} annotation"))
    }

    async fn handle_ingest_session(&self, request: &SkillRequest) -> SkillResponse {
        let ctx = &request.context;
        let mut entry = DevEntry::new(&request.user_id, "session");
        entry.project = ctx.get("project").and_then(|v| v.as_str()).unwrap_or("").to_string();
        entry.title = ctx
            .get("summary")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| request.message.chars().take(200).collect());
        entry.content = request.message.clone();

        tracing::info!(project = %entry.project, "dev_session_ingested");
        self.store_entry(entry).await;
        SkillResponse::ok(request.id.clone(), "Ingested Claude Code session")
    }

    async fn handle_ingest_tag(&self, request: &SkillRequest) -> SkillResponse {
        let ctx = &request.context;
        let tag_name = ctx.get("tag_name").and_then(|v| v.as_str()).unwrap_or(&request.message).to_string();
        let mut entry = DevEntry::new(&request.user_id, "tag");
        entry.project = ctx.get("project").and_then(|v| v.as_str()).unwrap_or("").to_string();
        entry.title = format!("Tag: {tag_name}");
        entry.content = request.message.clone();
        entry.metadata.insert("tag_name".to_string(), json!(tag_name.clone()));

        tracing::info!(tag = %tag_name, "dev_tag_ingested");
        self.store_entry(entry).await;
        SkillResponse::ok(request.id.clone(), format!("Ingested tag: {tag_name}"))
    }

    async fn handle_status(&self, request: &SkillRequest) -> SkillResponse {
        let entries = self.recent_entries(&request.user_id, 10, Some(&["commit", "session"])).await;
        if entries.is_empty() {
            return SkillResponse::ok(
                request.id.clone(),
                "No recent development activity recorded yet. Make sure the dev agent is running and sending events.",
            );
        }

        let mut by_project: HashMap<String, Vec<&DevEntry>> = HashMap::new();
        for e in &entries {
            let key = if e.project.is_empty() { "unknown".to_string() } else { e.project.clone() };
            by_project.entry(key).or_default().push(e);
        }

        let mut parts = vec!["**Current Dev Activity:**\n".to_string()];
        for (project, proj_entries) in &by_project {
            parts.push(format!("\n**{project}**"));
            for e in proj_entries.iter().take(5) {
                let age = format_age(e.created_at);
                match e.entry_type.as_str() {
                    "commit" => {
                        let sha: String = e.metadata.get("sha").and_then(|v| v.as_str()).unwrap_or("").chars().take(7).collect();
                        parts.push(format!("  - `{sha}` {} ({age})", e.title));
                    }
                    "session" => {
                        let title: String = e.title.chars().take(80).collect();
                        parts.push(format!("  - Session: {title} ({age})"));
                    }
                    _ => {}
                }
            }
        }

        let annotations = self.active_annotations(&request.user_id, 5).await;
        if !annotations.is_empty() {
            parts.push("\n**Active Annotations:**".to_string());
            for a in &annotations {
                let afile = a.metadata.get("file").and_then(|v| v.as_str()).unwrap_or("");
                let content: String = a.content.chars().take(60).collect();
                parts.push(format!("  - [{}] {content} ({afile})", a.annotation_type()));
            }
        }

        SkillResponse::ok(request.id.clone(), parts.join("\n"))
            .with_data("entries", json!(entries.iter().map(DevEntry::to_json).collect::<Vec<_>>()))
    }

    async fn handle_next(&self, request: &SkillRequest) -> SkillResponse {
        let annotations = self.active_annotations(&request.user_id, 15).await;
        let ideas: Vec<_> = self
            .entries_by_type(&request.user_id, "annotation", 20)
            .await
            .into_iter()
            .filter(|a| a.status == EntryStatus::Active && a.annotation_type() == "IDEA")
            .collect();

        let mut parts = vec!["**Suggestions for what to work on next:**\n".to_string()];

        let todos: Vec<_> = annotations.iter().filter(|a| matches!(a.annotation_type(), "TODO" | "FIXME" | "HACK")).collect();
        if !todos.is_empty() {
            parts.push("**Open TODOs/FIXMEs:**".to_string());
            for t in todos.iter().take(7) {
                let age = format_age(t.created_at);
                let afile = t.metadata.get("file").and_then(|v| v.as_str()).unwrap_or("");
                let stale = if t.is_stale(STALE_ANNOTATION_DAYS) { " (stale!)" } else { "" };
                let content: String = t.content.chars().take(60).collect();
                parts.push(format!("  - [{}] {content} ({afile}, {age}){stale}", t.annotation_type()));
            }
        }

        if !ideas.is_empty() {
            parts.push("\n**Captured Ideas:**".to_string());
            for i in ideas.iter().take(5) {
                let age = format_age(i.created_at);
                let content: String = i.content.chars().take(80).collect();
                parts.push(format!("  - {content} ({age})"));
            }
        }

        let sessions = self.entries_by_type(&request.user_id, "session", 5).await;
        if !sessions.is_empty() {
            parts.push("\n**Recent Session Context:**".to_string());
            for s in sessions.iter().take(3) {
                let age = format_age(s.created_at);
                let title: String = s.title.chars().take(80).collect();
                parts.push(format!("  - {title} ({age})"));
            }
        }

        if parts.len() == 1 {
            parts.push("No open items found. Either everything is done or the dev agent hasn't captured any annotations yet.".to_string());
        }

        SkillResponse::ok(request.id.clone(), parts.join("\n"))
    }

    async fn handle_ideas(&self, request: &SkillRequest) -> SkillResponse {
        let ideas: Vec<_> = self
            .entries_by_type(&request.user_id, "annotation", 50)
            .await
            .into_iter()
            .filter(|a| a.annotation_type() == "IDEA" && a.status == EntryStatus::Active)
            .collect();

        if ideas.is_empty() {
            return SkillResponse::ok(request.id.clone(), "No active ideas captured. Add `IDEA:` comments in your code to have them tracked.");
        }

        let mut parts = vec![format!("**Captured Ideas ({}):**\n", ideas.len())];
        for idea in &ideas {
            let age = format_age(idea.created_at);
            let afile = idea.metadata.get("file").and_then(|v| v.as_str()).unwrap_or("");
            let loc = if afile.is_empty() { String::new() } else { format!(" ({afile})") };
            let content: String = idea.content.chars().take(100).collect();
            parts.push(format!("  - {content}{loc} — {age}"));
        }

        SkillResponse::ok(request.id.clone(), parts.join("\n"))
            .with_data("ideas", json!(ideas.iter().map(DevEntry::to_json).collect::<Vec<_>>()))
    }

    async fn handle_journal(&self, request: &SkillRequest) -> SkillResponse {
        let entries = self.recent_entries(&request.user_id, DEFAULT_QUERY_LIMIT, None).await;
        if entries.is_empty() {
            return SkillResponse::ok(request.id.clone(), "No journal entries yet.");
        }

        let mut by_date: Vec<(String, Vec<&DevEntry>)> = Vec::new();
        for e in &entries {
            let key = e.created_at.format("%Y-%m-%d").to_string();
            match by_date.iter_mut().find(|(d, _)| *d == key) {
                Some((_, v)) => v.push(e),
                None => by_date.push((key, vec![e])),
            }
        }
        by_date.sort_by(|a, b| b.0.cmp(&a.0));

        let mut parts = vec!["**Dev Journal:**\n".to_string()];
        for (date, day_entries) in &by_date {
            parts.push(format!("\n**{date}**"));
            for e in day_entries {
                let time = e.created_at.format("%H:%M");
                let icon = entry_type_icon(&e.entry_type);
                let title: String = e.title.chars().take(80).collect();
                parts.push(format!("  {icon} [{time}] {title}"));
            }
        }

        SkillResponse::ok(request.id.clone(), parts.join("\n"))
            .with_data("entries", json!(entries.iter().map(DevEntry::to_json).collect::<Vec<_>>()))
    }

    async fn handle_summary(&self, request: &SkillRequest) -> SkillResponse {
        let entries = self.recent_entries(&request.user_id, 30, None).await;
        if entries.is_empty() {
            return SkillResponse::ok(request.id.clone(), "No dev activity to summarise.");
        }

        let commits: Vec<_> = entries.iter().filter(|e| e.entry_type == "commit").collect();
        let annotations: Vec<_> = entries.iter().filter(|e| e.entry_type == "annotation").collect();
        let sessions: Vec<_> = entries.iter().filter(|e| e.entry_type == "session").collect();
        let tags: Vec<_> = entries.iter().filter(|e| e.entry_type == "tag").collect();
        let active_annotations: Vec<_> = annotations.iter().filter(|a| a.status == EntryStatus::Active).collect();
        let resolved_annotations: Vec<_> = annotations.iter().filter(|a| a.status == EntryStatus::Resolved).collect();

        let mut projects: Vec<&str> = entries.iter().filter(|e| !e.project.is_empty()).map(|e| e.project.as_str()).collect();
        projects.sort_unstable();
        projects.dedup();

        let mut parts = vec!["**Dev Summary:**\n".to_string()];
        parts.push(format!(
            "Projects active: {}\nCommits: {} | Sessions: {} | Tags: {}\nAnnotations: {} open, {} resolved",
            if projects.is_empty() { "none".to_string() } else { projects.join(", ") },
            commits.len(),
            sessions.len(),
            tags.len(),
            active_annotations.len(),
            resolved_annotations.len(),
        ));

        if !commits.is_empty() {
            parts.push("\n**Recent Commits:**".to_string());
            for c in commits.iter().take(5) {
                let sha: String = c.metadata.get("sha").and_then(|v| v.as_str()).unwrap_or("").chars().take(7).collect();
                let title: String = c.title.chars().take(80).collect();
                parts.push(format!("  - `{sha}` {title}"));
            }
        }

        if !tags.is_empty() {
            parts.push("\n**Tags/Releases:**".to_string());
            for t in tags.iter().take(3) {
                parts.push(format!("  - {}", t.title));
            }
        }

        let ideas = active_annotations.iter().filter(|a| a.annotation_type() == "IDEA").count();
        if ideas > 0 {
            parts.push(format!("\n**Open Ideas:** {ideas}"));
        }

        SkillResponse::ok(request.id.clone(), parts.join("\n")).with_data(
            "summary",
            json!({
                "commits": commits.len(),
                "sessions": sessions.len(),
                "tags": tags.len(),
                "active_annotations": active_annotations.len(),
                "projects": projects,
            }),
        )
    }
}

fn entry_type_icon(entry_type: &str) -> &'static str {
    match entry_type {
        "commit" => "[commit]",
        "annotation" => "[note]",
        "session" => "[session]",
        "tag" => "[tag]",
        _ => "[?]",
    }
}

#[async_trait]
impl Skill for DevWatcherSkill {
    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            name: "dev_watcher".to_string(),
            description: "Monitor development activity and build a queryable dev journal".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSet::new([
                Permission::ReadOwnCollection,
                Permission::WriteOwnCollection,
                Permission::SendMessages,
                Permission::ReadProfile,
            ]),
            collections: vec!["skill_dev_journal".to_string()],
            intents: vec![
                "dev_ingest_commit".to_string(),
                "dev_ingest_annotation".to_string(),
                "dev_ingest_session".to_string(),
                "dev_ingest_tag".to_string(),
                "dev_status".to_string(),
                "dev_next".to_string(),
                "dev_ideas".to_string(),
                "dev_journal".to_string(),
                "dev_summary".to_string(),
            ],
        }
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn handle(&self, request: SkillRequest) -> SkillResponse {
        match request.intent.as_str() {
            "dev_ingest_commit" => self.handle_ingest_commit(&request).await,
            "dev_ingest_annotation" => self.handle_ingest_annotation(&request).await,
            "dev_ingest_session" => self.handle_ingest_session(&request).await,
            "dev_ingest_tag" => self.handle_ingest_tag(&request).await,
            "dev_status" => self.handle_status(&request).await,
            "dev_next" => self.handle_next(&request).await,
            "dev_ideas" => self.handle_ideas(&request).await,
            "dev_journal" => self.handle_journal(&request).await,
            "dev_summary" => self.handle_summary(&request).await,
            other => SkillResponse::error_response(request.id.clone(), format!("Unknown intent: {other}")),
        }
    }

    async fn on_heartbeat(&self, user_ids: &[String]) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();

        for user_id in user_ids {
            let annotations = self.active_annotations(user_id, 50).await;
            let stale: Vec<_> = annotations.iter().filter(|a| a.is_stale(STALE_ANNOTATION_DAYS)).collect();
            if !stale.is_empty() {
                let mut by_type: HashMap<String, u32> = HashMap::new();
                for s in &stale {
                    *by_type.entry(s.annotation_type().to_string()).or_default() += 1;
                }
                actions.push(
                    HeartbeatAction::new("dev_watcher", "dev_stale_annotation", user_id, 2)
                        .with_data("count", json!(stale.len()))
                        .with_data("by_type", json!(by_type))
                        .with_data("entries", json!(stale.iter().take(5).map(|s| s.to_json()).collect::<Vec<_>>())),
                );
            }

            let old_ideas: Vec<_> = self
                .entries_by_type(user_id, "annotation", 50)
                .await
                .into_iter()
                .filter(|a| a.status == EntryStatus::Active && a.annotation_type() == "IDEA" && Utc::now() - a.created_at > Duration::days(IDEA_REMINDER_DAYS))
                .collect();
            if !old_ideas.is_empty() {
                actions.push(
                    HeartbeatAction::new("dev_watcher", "dev_idea_reminder", user_id, 3)
                        .with_data("count", json!(old_ideas.len()))
                        .with_data("ideas", json!(old_ideas.iter().take(3).map(|i| i.to_json()).collect::<Vec<_>>())),
                );
            }
        }

        actions
    }

    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(intent: &str, user_id: &str, context: HashMap<String, serde_json::Value>) -> SkillRequest {
        let mut req = SkillRequest::new(Uuid::new_v4().to_string(), user_id, intent, "fix the bug");
        req.context = context;
        req
    }

    #[tokio::test]
    async fn ingest_commit_then_status_reports_it() {
        let skill = DevWatcherSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("project".to_string(), json!("corvus"));
        ctx.insert("sha".to_string(), json!("abcdef1234"));
        skill.handle(request("dev_ingest_commit", "u1", ctx)).await;

        let response = skill.handle(request("dev_status", "u1", HashMap::new())).await;
        assert!(response.success);
        assert!(response.message.contains("corvus"));
    }

    #[tokio::test]
    async fn removed_annotation_resolves_matching_active_one() {
        let skill = DevWatcherSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("annotation_type".to_string(), json!("TODO"));
        ctx.insert("file".to_string(), json!("src/lib.rs"));
        skill.handle(request("dev_ingest_annotation", "u1", ctx.clone())).await;

        ctx.insert("action".to_string(), json!("removed"));
        skill.handle(request("dev_ingest_annotation", "u1", ctx)).await;

        let ideas = skill.handle(request("dev_next", "u1", HashMap::new())).await;
        assert!(!ideas.message.contains("stale"));
    }

    #[tokio::test]
    async fn ideas_query_filters_to_idea_annotations_only() {
        let skill = DevWatcherSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("annotation_type".to_string(), json!("IDEA"));
        skill.handle(request("dev_ingest_annotation", "u1", ctx)).await;

        let response = skill.handle(request("dev_ideas", "u1", HashMap::new())).await;
        assert!(response.message.contains("Captured Ideas"));
    }

    #[tokio::test]
    async fn heartbeat_flags_stale_annotations() {
        let skill = DevWatcherSkill::new();
        let mut entry = DevEntry::new("u1", "annotation");
        entry.created_at = Utc::now() - Duration::days(STALE_ANNOTATION_DAYS + 1);
        entry.metadata.insert("annotation_type".to_string(), json!("TODO"));
        skill.store_entry(entry).await;

        let actions = skill.on_heartbeat(&["u1".to_string()]).await;
        assert!(actions.iter().any(|a| a.action_type == "dev_stale_annotation"));
    }

    #[tokio::test]
    async fn summary_with_no_activity_says_so() {
        let skill = DevWatcherSkill::new();
        let response = skill.handle(request("dev_summary", "nobody", HashMap::new())).await;
        assert_eq!(response.message, "No dev activity to summarise.");
    }
}
