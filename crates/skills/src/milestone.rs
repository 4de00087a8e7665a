//! Milestone detection and platform-specific promo draft generation.
//!
//! Significance scoring and draft templates are heuristic, matching the
//! original's explicit note that LLM-based scoring and generation could
//! augment these later.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corvus_types::{HeartbeatAction, Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

const DRAFT_THRESHOLD: u8 = 6;
const PLATFORMS: [&str; 3] = ["x", "linkedin", "github"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneStatus {
    Detected,
    DraftsReady,
    Posted,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub significance: u8,
    pub detected_from: String,
    pub source_entries: Vec<String>,
    pub status: MilestoneStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStatus {
    Pending,
    Approved,
    Rejected,
    Posted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoDraft {
    pub id: Uuid,
    pub milestone_id: Uuid,
    pub user_id: String,
    pub platform: String,
    pub content: String,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
}

fn status_icon(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::Detected => "[new]",
        MilestoneStatus::DraftsReady => "[drafts]",
        MilestoneStatus::Posted => "[posted]",
        MilestoneStatus::Dismissed => "[dismissed]",
    }
}

fn platform_label(platform: &str) -> &str {
    match platform {
        "x" => "X/Twitter",
        "linkedin" => "LinkedIn",
        "github" => "GitHub",
        other => other,
    }
}

fn score_significance(event_type: &str, title: &str, description: &str, files_changed: u32) -> (u8, &'static str) {
    let title_lower = title.to_lowercase();
    let combined = format!("{title_lower} {}", description.to_lowercase());

    if event_type == "tag" {
        return (8, "release");
    }

    if title_lower.starts_with("feat:") || title_lower.starts_with("feat(") {
        return if files_changed >= 10 {
            (8, "feature")
        } else if files_changed >= 5 {
            (7, "feature")
        } else {
            (6, "feature")
        };
    }

    const ARCHITECTURE: [&str; 8] = ["refactor", "architecture", "restructure", "migrate", "docker", "compose", "ci/cd", "pipeline"];
    if ARCHITECTURE.iter().any(|s| combined.contains(s)) {
        return if files_changed >= 10 { (8, "architecture") } else { (6, "architecture") };
    }

    const INTEGRATION: [&str; 9] = ["integration", "api", "webhook", "oauth", "gmail", "github", "discord", "slack", "database"];
    if INTEGRATION.iter().any(|s| combined.contains(s)) {
        return (7, "integration");
    }

    const SECURITY: [&str; 5] = ["security", "encrypt", "auth", "rbac", "permission"];
    if SECURITY.iter().any(|s| combined.contains(s)) {
        return (6, "security");
    }

    const TEST: [&str; 4] = ["test", "coverage", "ci", "pytest"];
    if TEST.iter().any(|s| combined.contains(s)) {
        return (5, "coverage");
    }

    const PERF: [&str; 4] = ["performance", "optimiz", "cache", "speed"];
    if PERF.iter().any(|s| combined.contains(s)) {
        return (5, "performance");
    }

    (3, "maintenance")
}

fn generate_draft(platform: &str, milestone: &Milestone) -> String {
    match platform {
        "x" => generate_x_draft(milestone),
        "linkedin" => generate_linkedin_draft(milestone),
        "github" => generate_github_draft(milestone),
        other => format!("[{other}] {}: {}", milestone.title, milestone.description.chars().take(200).collect::<String>()),
    }
}

fn generate_x_draft(milestone: &Milestone) -> String {
    let hashtags = match milestone.category.as_str() {
        "feature" => "#buildinpublic #devlife",
        "architecture" => "#softwarearchitecture #engineering",
        "release" => "#release #opensource",
        "integration" => "#api #integration",
        "security" => "#security #infosec",
        "coverage" => "#testing #quality",
        "performance" => "#performance #optimization",
        "maintenance" => "#coding #devlife",
        _ => "#buildinpublic",
    };

    let mut title = milestone.title.clone();
    for prefix in ["feat: ", "feat(", "fix: ", "refactor: ", "chore: "] {
        if title.to_lowercase().starts_with(prefix) {
            title = title[prefix.len()..].to_string();
            if let Some(rest) = title.strip_prefix(')') {
                title = rest.split_once(": ").map(|(_, r)| r.to_string()).unwrap_or(title[1..].to_string());
            }
            break;
        }
    }

    let desc: String = milestone.description.chars().take(150).collect();
    let title_cap = {
        let mut t = title.trim().to_string();
        if let Some(c) = t.get_mut(0..1) {
            c.make_ascii_uppercase();
        }
        t
    };
    let mut tweet = title_cap.clone();
    if !desc.is_empty() && desc != title_cap {
        tweet.push_str(&format!(" — {desc}"));
    }

    let max_content = 280usize.saturating_sub(hashtags.len() + 2);
    if tweet.chars().count() > max_content {
        let truncated: String = tweet.chars().take(max_content.saturating_sub(3)).collect();
        tweet = format!("{truncated}...");
    }

    format!("{tweet}\n\n{hashtags}")
}

fn generate_linkedin_draft(milestone: &Milestone) -> String {
    let desc = if milestone.description.is_empty() { "No description" } else { &milestone.description };
    format!(
        "Excited to share a development milestone on my AI assistant project:\n\n**{}**\n\n{desc}\n\nThis falls under {} work and represents a significant step forward. Building an AI assistant that truly understands its user requires getting these foundations right.\n\nMore updates to come as the project evolves.\n\n#AI #SoftwareEngineering #BuildInPublic",
        milestone.title, milestone.category,
    )
}

fn generate_github_draft(milestone: &Milestone) -> String {
    let desc = if milestone.description.is_empty() { "No description provided." } else { &milestone.description };
    format!(
        "## {}\n\n{desc}\n\n**Category:** {}\n**Significance:** {}/10\n\n### What changed\n\nSee the associated commits for details.\n\n### What's next\n\nStay tuned for more updates.",
        milestone.title, milestone.category, milestone.significance,
    )
}

#[derive(Default)]
pub struct MilestoneSkill {
    milestones: RwLock<HashMap<String, HashMap<Uuid, Milestone>>>,
    drafts: RwLock<HashMap<String, HashMap<Uuid, PromoDraft>>>,
}

impl MilestoneSkill {
    pub fn new() -> Self {
        Self::default()
    }

    async fn user_milestones(&self, user_id: &str) -> Vec<Milestone> {
        self.milestones.read().await.get(user_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    async fn user_drafts(&self, user_id: &str) -> Vec<PromoDraft> {
        self.drafts.read().await.get(user_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    async fn store_milestone(&self, milestone: Milestone) {
        self.milestones.write().await.entry(milestone.user_id.clone()).or_default().insert(milestone.id, milestone);
    }

    async fn store_draft(&self, draft: PromoDraft) {
        self.drafts.write().await.entry(draft.user_id.clone()).or_default().insert(draft.id, draft);
    }

    async fn find_draft(&self, user_id: &str, prefix: &str) -> Option<PromoDraft> {
        self.user_drafts(user_id).await.into_iter().find(|d| d.id.to_string().starts_with(prefix))
    }

    async fn handle_list(&self, request: &SkillRequest) -> SkillResponse {
        let mut milestones = self.user_milestones(&request.user_id).await;
        if milestones.is_empty() {
            return SkillResponse::ok(request.id.clone(), "No milestones detected yet. Keep coding — I'll spot them as they happen!");
        }
        milestones.sort_by_key(|m| std::cmp::Reverse(m.created_at));

        let mut parts = vec![format!("**Milestones ({}):**\n", milestones.len())];
        for m in milestones.iter().take(10) {
            let date = m.created_at.format("%Y-%m-%d");
            parts.push(format!("  {} **{}** (significance: {}/10, {}, {date})", status_icon(m.status), m.title, m.significance, m.category));
            if !m.description.is_empty() {
                let desc: String = m.description.chars().take(100).collect();
                parts.push(format!("     {desc}"));
            }
        }

        SkillResponse::ok(request.id.clone(), parts.join("\n")).with_data(
            "milestones",
            json!(milestones.iter().take(10).map(|m| serde_json::to_value(m).unwrap_or_default()).collect::<Vec<_>>()),
        )
    }

    async fn handle_drafts(&self, request: &SkillRequest) -> SkillResponse {
        let drafts = self.user_drafts(&request.user_id).await;
        let pending: Vec<_> = drafts.into_iter().filter(|d| d.status == DraftStatus::Pending).collect();
        if pending.is_empty() {
            return SkillResponse::ok(request.id.clone(), "No pending promo drafts. Drafts are generated when milestones are detected.");
        }

        let mut by_milestone: Vec<(Uuid, Vec<&PromoDraft>)> = Vec::new();
        for d in &pending {
            match by_milestone.iter_mut().find(|(id, _)| *id == d.milestone_id) {
                Some((_, v)) => v.push(d),
                None => by_milestone.push((d.milestone_id, vec![d])),
            }
        }

        let milestones = self.user_milestones(&request.user_id).await;
        let mut parts = vec![format!("**Pending Promo Drafts ({}):**\n", pending.len())];
        for (ms_id, ms_drafts) in &by_milestone {
            let title = milestones.iter().find(|m| m.id == *ms_id).map(|m| m.title.clone()).unwrap_or_else(|| "Unknown milestone".to_string());
            parts.push(format!("\n**{title}:**"));
            for d in ms_drafts {
                let id_prefix: String = d.id.to_string().chars().take(8).collect();
                parts.push(format!("\n  {} (ID: `{id_prefix}`):", platform_label(&d.platform)));
                let preview = if d.content.chars().count() > 200 {
                    format!("{}...", d.content.chars().take(200).collect::<String>())
                } else {
                    d.content.clone()
                };
                parts.push(format!("  > {preview}"));
            }
        }
        parts.push("\nTo approve: tell me to approve with the draft ID. To reject: tell me to reject with the draft ID.".to_string());

        SkillResponse::ok(request.id.clone(), parts.join("\n"))
            .with_data("drafts", json!(pending.iter().map(|d| serde_json::to_value(d).unwrap_or_default()).collect::<Vec<_>>()))
    }

    async fn handle_approve(&self, request: &SkillRequest) -> SkillResponse {
        let Some(draft_id) = request.context.get("draft_id").and_then(|v| v.as_str()) else {
            return SkillResponse::error_response(request.id.clone(), "Please specify which draft to approve (include the draft ID).");
        };
        let Some(mut draft) = self.find_draft(&request.user_id, draft_id).await else {
            return SkillResponse::error_response(request.id.clone(), format!("Draft not found: {draft_id}"));
        };

        draft.status = DraftStatus::Approved;
        let message = format!("Approved {} draft. Content is ready to post:\n\n{}", platform_label(&draft.platform), draft.content);
        let data = serde_json::to_value(&draft).unwrap_or_default();
        self.store_draft(draft).await;

        SkillResponse::ok(request.id.clone(), message).with_data("draft", data)
    }

    async fn handle_reject(&self, request: &SkillRequest) -> SkillResponse {
        let Some(draft_id) = request.context.get("draft_id").and_then(|v| v.as_str()) else {
            return SkillResponse::error_response(request.id.clone(), "Please specify which draft to reject (include the draft ID).");
        };
        let Some(mut draft) = self.find_draft(&request.user_id, draft_id).await else {
            return SkillResponse::error_response(request.id.clone(), format!("Draft not found: {draft_id}"));
        };

        draft.status = DraftStatus::Rejected;
        let message = format!("Rejected {} draft.", platform_label(&draft.platform));
        let data = serde_json::to_value(&draft).unwrap_or_default();
        self.store_draft(draft).await;

        SkillResponse::ok(request.id.clone(), message).with_data("draft", data)
    }

    async fn handle_detect(&self, request: &SkillRequest) -> SkillResponse {
        let ctx = &request.context;
        let event_type = ctx.get("event_type").and_then(|v| v.as_str()).unwrap_or("commit").to_string();
        let title: String = ctx.get("title").and_then(|v| v.as_str()).map(String::from).unwrap_or_else(|| request.message.chars().take(200).collect());
        let description = ctx.get("description").and_then(|v| v.as_str()).map(String::from).unwrap_or_else(|| request.message.clone());
        let files_changed = ctx.get("files_changed").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

        let (significance, category) = score_significance(&event_type, &title, &description, files_changed);

        if significance < DRAFT_THRESHOLD {
            return SkillResponse::ok(request.id.clone(), format!("Event scored {significance}/10 — below milestone threshold."))
                .with_data("significance", json!(significance))
                .with_data("milestone", json!(false));
        }

        let source_entries = ctx
            .get("source_entries")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|e| e.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let milestone = Milestone {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            title: title.clone(),
            description: description.chars().take(500).collect(),
            category: category.to_string(),
            significance,
            detected_from: event_type,
            source_entries,
            status: MilestoneStatus::DraftsReady,
            created_at: Utc::now(),
        };
        self.store_milestone(milestone.clone()).await;

        let mut drafts_created = Vec::new();
        for platform in PLATFORMS {
            let draft = PromoDraft {
                id: Uuid::new_v4(),
                milestone_id: milestone.id,
                user_id: request.user_id.clone(),
                platform: platform.to_string(),
                content: generate_draft(platform, &milestone),
                status: DraftStatus::Pending,
                created_at: Utc::now(),
            };
            self.store_draft(draft.clone()).await;
            drafts_created.push(draft);
        }

        tracing::info!(title = %title.chars().take(80).collect::<String>(), significance, category, drafts = drafts_created.len(), "milestone_detected");

        SkillResponse::ok(
            request.id.clone(),
            format!("Milestone detected: **{title}** (significance: {significance}/10). Generated {} draft(s). Use `show milestone drafts` to review.", drafts_created.len()),
        )
        .with_data("milestone", serde_json::to_value(&milestone).unwrap_or_default())
        .with_data("drafts", json!(drafts_created.iter().map(|d| serde_json::to_value(d).unwrap_or_default()).collect::<Vec<_>>()))
    }
}

#[async_trait]
impl Skill for MilestoneSkill {
    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            name: "milestone_tracker".to_string(),
            description: "Detect dev milestones and generate promotional social media drafts".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSet::new([
                Permission::ReadOwnCollection,
                Permission::WriteOwnCollection,
                Permission::SendMessages,
                Permission::ReadProfile,
            ]),
            collections: vec!["skill_milestones".to_string()],
            intents: vec![
                "milestone_list".to_string(),
                "milestone_drafts".to_string(),
                "milestone_approve".to_string(),
                "milestone_reject".to_string(),
                "milestone_detect".to_string(),
            ],
        }
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn handle(&self, request: SkillRequest) -> SkillResponse {
        match request.intent.as_str() {
            "milestone_list" => self.handle_list(&request).await,
            "milestone_drafts" => self.handle_drafts(&request).await,
            "milestone_approve" => self.handle_approve(&request).await,
            "milestone_reject" => self.handle_reject(&request).await,
            "milestone_detect" => self.handle_detect(&request).await,
            other => SkillResponse::error_response(request.id.clone(), format!("Unknown intent: {other}")),
        }
    }

    async fn on_heartbeat(&self, user_ids: &[String]) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();
        for user_id in user_ids {
            let pending: Vec<_> = self.user_drafts(user_id).await.into_iter().filter(|d| d.status == DraftStatus::Pending).collect();
            if !pending.is_empty() {
                let mut platforms: Vec<String> = pending.iter().map(|d| d.platform.clone()).collect();
                platforms.sort_unstable();
                platforms.dedup();
                actions.push(
                    HeartbeatAction::new("milestone_tracker", "milestone_drafts_pending", user_id, 4)
                        .with_data("count", json!(pending.len()))
                        .with_data("platforms", json!(platforms)),
                );
            }
        }
        actions
    }

    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {
        self.milestones.write().await.clear();
        self.drafts.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(intent: &str, user_id: &str, context: HashMap<String, serde_json::Value>) -> SkillRequest {
        let mut req = SkillRequest::new(Uuid::new_v4().to_string(), user_id, intent, "");
        req.context = context;
        req
    }

    #[tokio::test]
    async fn detect_below_threshold_creates_no_milestone() {
        let skill = MilestoneSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("title".to_string(), json!("chore: bump deps"));
        let response = skill.handle(request("milestone_detect", "u1", ctx)).await;
        assert_eq!(response.data["milestone"], json!(false));
    }

    #[tokio::test]
    async fn detect_tag_always_creates_milestone_with_drafts() {
        let skill = MilestoneSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("event_type".to_string(), json!("tag"));
        ctx.insert("title".to_string(), json!("v1.0.0"));
        let response = skill.handle(request("milestone_detect", "u1", ctx)).await;
        assert!(response.success);
        assert_eq!(response.data["drafts"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn approve_unknown_draft_errors() {
        let skill = MilestoneSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("draft_id".to_string(), json!("deadbeef"));
        let response = skill.handle(request("milestone_approve", "u1", ctx)).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn approve_by_id_prefix_succeeds() {
        let skill = MilestoneSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("event_type".to_string(), json!("tag"));
        ctx.insert("title".to_string(), json!("v2.0.0"));
        let detect = skill.handle(request("milestone_detect", "u1", ctx)).await;
        let draft_id = detect.data["drafts"][0]["id"].as_str().unwrap();
        let prefix = &draft_id[..8];

        let mut approve_ctx = HashMap::new();
        approve_ctx.insert("draft_id".to_string(), json!(prefix));
        let response = skill.handle(request("milestone_approve", "u1", approve_ctx)).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn heartbeat_reports_pending_draft_count() {
        let skill = MilestoneSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("event_type".to_string(), json!("tag"));
        ctx.insert("title".to_string(), json!("v3.0.0"));
        skill.handle(request("milestone_detect", "u1", ctx)).await;

        let actions = skill.on_heartbeat(&["u1".to_string()]).await;
        let action = actions.iter().find(|a| a.action_type == "milestone_drafts_pending").unwrap();
        assert_eq!(action.data["count"], json!(3));
    }

    #[test]
    fn significance_scoring_rates_feature_commits_by_file_count() {
        assert_eq!(score_significance("commit", "feat: add billing", "", 12).0, 8);
        assert_eq!(score_significance("commit", "feat: add billing", "", 6).0, 7);
        assert_eq!(score_significance("commit", "feat: add billing", "", 1).0, 6);
    }
}
