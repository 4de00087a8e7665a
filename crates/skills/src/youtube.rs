//! YouTube channel management and intelligence, built on the assumption
//! tracker's per-channel belief bookkeeping.
//!
//! The original pipeline hands comment classification and audience
//! synthesis off to the inference broker (Ollama for classification,
//! Gemini/Claude for summarization and reasoning). `corvus-skills` has no
//! dependency on the broker crate, so the heuristics below stand in for
//! that analysis pass; wiring a real `ProviderClient` through is future
//! work for the orchestrator, which already sits between skills and the
//! broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corvus_trust::{TrustKey, TrustManager};
use corvus_types::{AssumptionCategory, HeartbeatAction, Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse, TrustCategory};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::assumption::{AssumptionStore, AssumptionTracker, InMemoryAssumptionStore};

/// The reply-category every generated comment draft is trust-gated under.
/// The original skill only ever generates one kind of auto-reply draft, so
/// a single category is sufficient; a future draft type (e.g. a DM reply)
/// would get its own category and its own trust key.
const REPLY_CATEGORY: &str = "QUESTION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Pending,
    Approved,
    Rejected,
    Posted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub id: Uuid,
    pub channel_id: String,
    pub comment: String,
    pub draft: String,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
}

fn resolve_channel_id(request: &SkillRequest) -> Option<String> {
    request.context.get("channel_id").and_then(|v| v.as_str()).map(String::from)
}

fn category_from_str(value: &str) -> Option<AssumptionCategory> {
    match value {
        "audience" => Some(AssumptionCategory::Audience),
        "tone" => Some(AssumptionCategory::Tone),
        "content" | "topics" => Some(AssumptionCategory::Content),
        "schedule" => Some(AssumptionCategory::Schedule),
        "topic" => Some(AssumptionCategory::Topic),
        "competitor" | "exclusions" => Some(AssumptionCategory::Competitor),
        "performance" => Some(AssumptionCategory::Performance),
        _ => None,
    }
}

const ONBOARDING_QUESTIONS: [(&str, &str, &str); 5] = [
    ("topics", "What are the main topics of your channel?", "e.g., tech reviews, cooking tutorials, fitness tips"),
    ("audience", "Who is your target audience?", "e.g., developers aged 25-40, home cooks, fitness beginners"),
    ("tone", "What tone should replies use?", "e.g., professional, casual, friendly, technical, humorous"),
    ("exclusions", "Are there topics or competitors that should never be mentioned?", "e.g., brand X, political topics, specific products"),
    ("schedule", "What is your posting frequency goal?", "e.g., 2 videos per week, daily shorts, monthly deep-dives"),
];

/// Channel management skill: onboarding, configuration, and health/tag
/// heuristics scoped by what the channel has confirmed so far.
pub struct YouTubeManagementSkill {
    tracker: AssumptionTracker,
    trust: Arc<TrustManager>,
    drafts: RwLock<HashMap<String, Vec<ReplyDraft>>>,
}

impl YouTubeManagementSkill {
    pub fn new() -> Self {
        Self {
            tracker: AssumptionTracker::new(std::sync::Arc::new(InMemoryAssumptionStore::default())),
            trust: Arc::new(TrustManager::new()),
            drafts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_store(store: std::sync::Arc<dyn AssumptionStore>) -> Self {
        Self {
            tracker: AssumptionTracker::new(store),
            trust: Arc::new(TrustManager::new()),
            drafts: RwLock::new(HashMap::new()),
        }
    }

    /// Shares a trust manager with the rest of the process (e.g. the one the
    /// HTTP surface exposes) so approvals recorded through `yt_review_replies`
    /// and approvals recorded anywhere else agree on the same trust state.
    pub fn with_trust(mut self, trust: Arc<TrustManager>) -> Self {
        self.trust = trust;
        self
    }

    async fn handle_configure(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };
        let Some(answers) = request.context.get("answers").and_then(|v| v.as_object()) else {
            return SkillResponse::error_response(request.id.clone(), "answers required");
        };

        let mut confirmed = Vec::new();
        for (category_str, answer) in answers {
            let Some(category) = category_from_str(category_str) else { continue };
            let Some(statement) = answer.as_str() else { continue };
            let assumption = self
                .tracker
                .add_confirmed(&channel_id, category, statement, vec!["onboarding answer".to_string()])
                .await;
            if let Ok(a) = assumption {
                confirmed.push(a.id.to_string());
            }
        }

        let missing = self.tracker.get_missing_categories(&channel_id).await;
        SkillResponse::ok(request.id.clone(), format!("Recorded {} onboarding answer(s).", confirmed.len()))
            .with_data("confirmed", json!(confirmed))
            .with_data("missing_categories", json!(missing.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>()))
    }

    async fn handle_get_state(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };

        let assumptions = self.tracker.get_all(&channel_id, true).await;
        let missing = self.tracker.get_missing_categories(&channel_id).await;
        let onboarded = missing.is_empty();

        SkillResponse::ok(request.id.clone(), if onboarded { "Channel fully onboarded." } else { "Channel onboarding incomplete." })
            .with_data("assumption_count", json!(assumptions.len()))
            .with_data("missing_categories", json!(missing.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>()))
            .with_data("onboarded", json!(onboarded))
    }

    async fn handle_manage(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };
        let comments = request
            .context
            .get("comments")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|c| c.as_str().map(String::from)).collect::<Vec<_>>())
            .unwrap_or_default();

        let tone = self
            .tracker
            .get_confirmed(&channel_id)
            .await
            .into_iter()
            .find(|a| a.category == AssumptionCategory::Tone)
            .map(|a| a.statement)
            .unwrap_or_else(|| "friendly".to_string());

        let key = TrustKey::user_category(&channel_id, &TrustCategory::new(REPLY_CATEGORY));
        let auto_approve = self.trust.should_auto_approve(&key, REPLY_CATEGORY).await;

        let mut new_drafts = Vec::with_capacity(comments.len());
        for comment in &comments {
            new_drafts.push(ReplyDraft {
                id: Uuid::new_v4(),
                channel_id: channel_id.clone(),
                comment: comment.clone(),
                draft: format!("Thanks for the comment! ({tone} tone)"),
                status: if auto_approve { DraftStatus::Approved } else { DraftStatus::Pending },
                created_at: Utc::now(),
            });
        }

        let rendered: Vec<_> = new_drafts.iter().map(|d| serde_json::to_value(d).unwrap_or_default()).collect();
        let count = new_drafts.len();
        self.drafts.write().await.entry(channel_id).or_default().extend(new_drafts);

        SkillResponse::ok(request.id.clone(), format!("Generated {count} reply draft(s)."))
            .with_data("drafts", json!(rendered))
            .with_data("auto_approved", json!(auto_approve))
    }

    /// `yt_review_replies`: list pending drafts, or approve/reject/mark a
    /// specific one as posted. Approvals and rejections feed back into the
    /// same trust key `handle_manage` reads, so a run of manual approvals
    /// eventually promotes the channel into auto-approving future drafts.
    async fn handle_review_replies(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };
        let action = request.context.get("action").and_then(|v| v.as_str()).unwrap_or("list");

        if action == "list" {
            let drafts = self.drafts.read().await;
            let pending: Vec<_> = drafts
                .get(&channel_id)
                .into_iter()
                .flatten()
                .filter(|d| d.status == DraftStatus::Pending)
                .map(|d| serde_json::to_value(d).unwrap_or_default())
                .collect();
            let count = pending.len();
            return SkillResponse::ok(request.id.clone(), format!("{count} reply draft(s) awaiting review.")).with_data("drafts", json!(pending));
        }

        let Some(draft_id) = request.context.get("draft_id").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok()) else {
            return SkillResponse::error_response(request.id.clone(), "draft_id required");
        };

        let mut drafts = self.drafts.write().await;
        let Some(draft) = drafts.get_mut(&channel_id).and_then(|list| list.iter_mut().find(|d| d.id == draft_id)) else {
            return SkillResponse::error_response(request.id.clone(), "draft not found");
        };

        let key = TrustKey::user_category(&channel_id, &TrustCategory::new(REPLY_CATEGORY));
        match action {
            "approve" => {
                draft.status = DraftStatus::Approved;
                self.trust.record_approval(&key).await;
            }
            "reject" => {
                draft.status = DraftStatus::Rejected;
                self.trust.record_rejection(&key).await;
            }
            "mark_posted" => {
                if draft.status != DraftStatus::Approved {
                    return SkillResponse::error_response(request.id.clone(), "only an approved draft can be marked posted");
                }
                draft.status = DraftStatus::Posted;
            }
            other => return SkillResponse::error_response(request.id.clone(), format!("unknown review action: {other}")),
        }

        SkillResponse::ok(request.id.clone(), format!("Draft {draft_id} marked {:?}.", draft.status))
            .with_data("draft", serde_json::to_value(&*draft).unwrap_or_default())
    }

    async fn handle_tag_recommendations(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };

        let topics = self
            .tracker
            .get_confirmed(&channel_id)
            .await
            .into_iter()
            .find(|a| a.category == AssumptionCategory::Content)
            .map(|a| a.statement)
            .unwrap_or_default();

        let tags: Vec<String> = topics.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2).map(|w| w.to_lowercase()).collect();

        SkillResponse::ok(request.id.clone(), format!("{} tag recommendation(s).", tags.len())).with_data("tags", json!(tags))
    }

    async fn handle_channel_health(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };

        let missing = self.tracker.get_missing_categories(&channel_id).await;
        let total = AssumptionCategory::REQUIRED.len();
        let known = total - missing.len();
        let score = (known * 100 / total) as u32;

        SkillResponse::ok(request.id.clone(), format!("Channel health: {score}/100 ({known}/{total} categories known)"))
            .with_data("score", json!(score))
            .with_data("missing_categories", json!(missing.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>()))
    }
}

impl Default for YouTubeManagementSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for YouTubeManagementSkill {
    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            name: "youtube_management".to_string(),
            description: "Automate YouTube channel management with trust-scaled auto-replies".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSet::new([Permission::ReadProfile, Permission::SendMessages]),
            collections: vec!["yt_comments".to_string()],
            intents: vec![
                "yt_manage_channel".to_string(),
                "yt_get_management_state".to_string(),
                "yt_configure_management".to_string(),
                "yt_get_tag_recommendations".to_string(),
                "yt_channel_health".to_string(),
                "yt_review_replies".to_string(),
            ],
        }
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn handle(&self, request: SkillRequest) -> SkillResponse {
        match request.intent.as_str() {
            "yt_manage_channel" => self.handle_manage(&request).await,
            "yt_get_management_state" => self.handle_get_state(&request).await,
            "yt_configure_management" => self.handle_configure(&request).await,
            "yt_get_tag_recommendations" => self.handle_tag_recommendations(&request).await,
            "yt_channel_health" => self.handle_channel_health(&request).await,
            "yt_review_replies" => self.handle_review_replies(&request).await,
            other => SkillResponse::error_response(request.id.clone(), format!("Unknown intent: {other}")),
        }
    }

    async fn on_heartbeat(&self, _user_ids: &[String]) -> Vec<HeartbeatAction> {
        vec![]
    }

    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {
        self.drafts.write().await.clear();
    }
}

/// A heuristic stand-in for the broker-driven intelligence report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceReport {
    pub id: Uuid,
    pub channel_id: String,
    pub comment_count: usize,
    pub positive_ratio: f32,
    pub generated_at: DateTime<Utc>,
}

const POSITIVE_WORDS: [&str; 6] = ["love", "great", "amazing", "thanks", "awesome", "helpful"];
const NEGATIVE_WORDS: [&str; 5] = ["hate", "terrible", "boring", "worst", "spam"];

fn classify_comment(comment: &str) -> i32 {
    let lower = comment.to_lowercase();
    let positive = POSITIVE_WORDS.iter().any(|w| lower.contains(w));
    let negative = NEGATIVE_WORDS.iter().any(|w| lower.contains(w));
    match (positive, negative) {
        (true, false) => 1,
        (false, true) => -1,
        _ => 0,
    }
}

pub struct YouTubeIntelligenceSkill {
    reports: RwLock<HashMap<String, Vec<IntelligenceReport>>>,
}

impl YouTubeIntelligenceSkill {
    pub fn new() -> Self {
        Self { reports: RwLock::new(HashMap::new()) }
    }

    async fn handle_analyze(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };
        let comments: Vec<String> = request
            .context
            .get("comments")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|c| c.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let classified: Vec<_> = comments.iter().map(|c| classify_comment(c)).collect();
        let positive = classified.iter().filter(|&&s| s > 0).count();
        let positive_ratio = if classified.is_empty() { 0.0 } else { positive as f32 / classified.len() as f32 };

        let report = IntelligenceReport { id: Uuid::new_v4(), channel_id: channel_id.clone(), comment_count: comments.len(), positive_ratio, generated_at: Utc::now() };
        self.reports.write().await.entry(channel_id).or_default().push(report.clone());

        tracing::info!(channel_id = %report.channel_id, comments = report.comment_count, "youtube_channel_analyzed");
        SkillResponse::ok(request.id.clone(), format!("Analyzed {} comment(s), {:.0}% positive.", report.comment_count, report.positive_ratio * 100.0))
            .with_data("report", serde_json::to_value(&report).unwrap_or_default())
    }

    async fn handle_get_intelligence(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };
        let reports = self.reports.read().await;
        match reports.get(&channel_id).and_then(|r| r.last()) {
            Some(report) => SkillResponse::ok(request.id.clone(), "Latest intelligence report.").with_data("report", serde_json::to_value(report).unwrap_or_default()),
            None => SkillResponse::error_response(request.id.clone(), "No intelligence report available yet"),
        }
    }

    async fn handle_history(&self, request: &SkillRequest) -> SkillResponse {
        let Some(channel_id) = resolve_channel_id(request) else {
            return SkillResponse::error_response(request.id.clone(), "channel_id required");
        };
        let reports = self.reports.read().await;
        let history = reports.get(&channel_id).cloned().unwrap_or_default();
        SkillResponse::ok(request.id.clone(), format!("{} report(s) on file.", history.len()))
            .with_data("reports", json!(history.iter().map(|r| serde_json::to_value(r).unwrap_or_default()).collect::<Vec<_>>()))
    }
}

impl Default for YouTubeIntelligenceSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for YouTubeIntelligenceSkill {
    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            name: "youtube_intelligence".to_string(),
            description: "Analyze YouTube channels and produce structured intelligence reports".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSet::new([Permission::ReadProfile, Permission::SendMessages]),
            collections: vec!["yt_comments".to_string()],
            intents: vec!["yt_analyze_channel".to_string(), "yt_get_intelligence".to_string(), "yt_intelligence_history".to_string()],
        }
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn handle(&self, request: SkillRequest) -> SkillResponse {
        match request.intent.as_str() {
            "yt_analyze_channel" => self.handle_analyze(&request).await,
            "yt_get_intelligence" => self.handle_get_intelligence(&request).await,
            "yt_intelligence_history" => self.handle_history(&request).await,
            other => SkillResponse::error_response(request.id.clone(), format!("Unknown intent: {other}")),
        }
    }

    async fn on_heartbeat(&self, user_ids: &[String]) -> Vec<HeartbeatAction> {
        // Re-analysis cadence (12-24h) is left to the orchestrator, which
        // knows which channels have ingested new data since the last run;
        // this skill only ever analyzes on explicit request.
        let _ = user_ids;
        vec![]
    }

    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {
        self.reports.write().await.clear();
    }
}

/// Onboarding questions a conversational flow can walk a new channel
/// through before calling `yt_configure_management`.
pub fn onboarding_questions() -> Vec<HashMap<&'static str, &'static str>> {
    ONBOARDING_QUESTIONS
        .iter()
        .map(|(category, question, hint)| HashMap::from([("category", *category), ("question", *question), ("hint", *hint)]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(intent: &str, context: HashMap<String, serde_json::Value>) -> SkillRequest {
        let mut req = SkillRequest::new(Uuid::new_v4().to_string(), "u1", intent, "");
        req.context = context;
        req
    }

    #[tokio::test]
    async fn configure_then_get_state_reflects_answers() {
        let skill = YouTubeManagementSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("c1"));
        ctx.insert("answers".to_string(), json!({"tone": "casual", "audience": "developers"}));
        skill.handle(request("yt_configure_management", ctx)).await;

        let mut state_ctx = HashMap::new();
        state_ctx.insert("channel_id".to_string(), json!("c1"));
        let response = skill.handle(request("yt_get_management_state", state_ctx)).await;
        assert_eq!(response.data["assumption_count"], json!(2));
        assert_eq!(response.data["onboarded"], json!(false));
    }

    #[tokio::test]
    async fn channel_health_scales_with_known_categories() {
        let skill = YouTubeManagementSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("c1"));
        ctx.insert(
            "answers".to_string(),
            json!({"tone": "casual", "audience": "devs", "topics": "rust", "schedule": "weekly", "exclusions": "none", "topic": "rust"}),
        );
        skill.handle(request("yt_configure_management", ctx)).await;

        let mut health_ctx = HashMap::new();
        health_ctx.insert("channel_id".to_string(), json!("c1"));
        let response = skill.handle(request("yt_channel_health", health_ctx)).await;
        assert_eq!(response.data["score"], json!(100));
    }

    #[tokio::test]
    async fn missing_channel_id_errors_on_every_intent() {
        let skill = YouTubeManagementSkill::new();
        let response = skill.handle(request("yt_get_management_state", HashMap::new())).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn analyze_then_get_intelligence_returns_latest_report() {
        let skill = YouTubeIntelligenceSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("c1"));
        ctx.insert("comments".to_string(), json!(["this is amazing", "I hate this", "meh"]));
        skill.handle(request("yt_analyze_channel", ctx)).await;

        let mut get_ctx = HashMap::new();
        get_ctx.insert("channel_id".to_string(), json!("c1"));
        let response = skill.handle(request("yt_get_intelligence", get_ctx)).await;
        assert!(response.success);
        assert_eq!(response.data["report"]["comment_count"], json!(3));
    }

    #[tokio::test]
    async fn get_intelligence_without_prior_analysis_errors() {
        let skill = YouTubeIntelligenceSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("never_analyzed"));
        let response = skill.handle(request("yt_get_intelligence", ctx)).await;
        assert!(!response.success);
    }

    #[test]
    fn onboarding_questions_cover_all_required_categories() {
        let questions = onboarding_questions();
        assert_eq!(questions.len(), 5);
        assert!(questions.iter().any(|q| q["category"] == "tone"));
    }

    #[tokio::test]
    async fn drafts_stay_pending_for_a_new_channel() {
        let skill = YouTubeManagementSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("new_channel"));
        ctx.insert("comments".to_string(), json!(["nice video!"]));
        let response = skill.handle(request("yt_manage_channel", ctx)).await;

        assert_eq!(response.data["auto_approved"], json!(false));
        assert_eq!(response.data["drafts"][0]["status"], json!("pending"));
    }

    #[tokio::test]
    async fn established_trust_auto_approves_subsequent_drafts() {
        let trust = Arc::new(TrustManager::new());
        let key = TrustKey::user_category("established_channel", &TrustCategory::new(REPLY_CATEGORY));
        for _ in 0..20 {
            trust.record_approval(&key).await;
        }
        let skill = YouTubeManagementSkill::new().with_trust(trust);

        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("established_channel"));
        ctx.insert("comments".to_string(), json!(["another comment"]));
        let response = skill.handle(request("yt_manage_channel", ctx)).await;

        assert_eq!(response.data["auto_approved"], json!(true));
        assert_eq!(response.data["drafts"][0]["status"], json!("approved"));
    }

    #[tokio::test]
    async fn review_replies_approve_then_mark_posted() {
        let skill = YouTubeManagementSkill::new();
        let mut manage_ctx = HashMap::new();
        manage_ctx.insert("channel_id".to_string(), json!("c2"));
        manage_ctx.insert("comments".to_string(), json!(["question about the episode"]));
        let manage_response = skill.handle(request("yt_manage_channel", manage_ctx)).await;
        let draft_id = manage_response.data["drafts"][0]["id"].as_str().unwrap().to_string();

        let mut list_ctx = HashMap::new();
        list_ctx.insert("channel_id".to_string(), json!("c2"));
        list_ctx.insert("action".to_string(), json!("list"));
        let list_response = skill.handle(request("yt_review_replies", list_ctx)).await;
        assert_eq!(list_response.data["drafts"].as_array().unwrap().len(), 1);

        let mut approve_ctx = HashMap::new();
        approve_ctx.insert("channel_id".to_string(), json!("c2"));
        approve_ctx.insert("action".to_string(), json!("approve"));
        approve_ctx.insert("draft_id".to_string(), json!(draft_id));
        let approve_response = skill.handle(request("yt_review_replies", approve_ctx.clone())).await;
        assert!(approve_response.success);
        assert_eq!(approve_response.data["draft"]["status"], json!("approved"));

        let mut posted_ctx = HashMap::new();
        posted_ctx.insert("channel_id".to_string(), json!("c2"));
        posted_ctx.insert("action".to_string(), json!("mark_posted"));
        posted_ctx.insert("draft_id".to_string(), approve_ctx["draft_id"].clone());
        let posted_response = skill.handle(request("yt_review_replies", posted_ctx)).await;
        assert_eq!(posted_response.data["draft"]["status"], json!("posted"));
    }

    #[tokio::test]
    async fn rejecting_a_draft_records_a_trust_rejection() {
        let trust = Arc::new(TrustManager::new());
        let skill = YouTubeManagementSkill::new().with_trust(Arc::clone(&trust));

        let mut manage_ctx = HashMap::new();
        manage_ctx.insert("channel_id".to_string(), json!("c3"));
        manage_ctx.insert("comments".to_string(), json!(["spammy comment"]));
        let manage_response = skill.handle(request("yt_manage_channel", manage_ctx)).await;
        let draft_id = manage_response.data["drafts"][0]["id"].as_str().unwrap().to_string();

        let mut reject_ctx = HashMap::new();
        reject_ctx.insert("channel_id".to_string(), json!("c3"));
        reject_ctx.insert("action".to_string(), json!("reject"));
        reject_ctx.insert("draft_id".to_string(), json!(draft_id));
        skill.handle(request("yt_review_replies", reject_ctx)).await;

        let key = TrustKey::user_category("c3", &TrustCategory::new(REPLY_CATEGORY));
        assert_eq!(trust.state(&key).await.rejections, 1);
    }

    #[tokio::test]
    async fn mark_posted_refuses_a_pending_draft() {
        let skill = YouTubeManagementSkill::new();
        let mut manage_ctx = HashMap::new();
        manage_ctx.insert("channel_id".to_string(), json!("c4"));
        manage_ctx.insert("comments".to_string(), json!(["hello"]));
        let manage_response = skill.handle(request("yt_manage_channel", manage_ctx)).await;
        let draft_id = manage_response.data["drafts"][0]["id"].as_str().unwrap().to_string();

        let mut ctx = HashMap::new();
        ctx.insert("channel_id".to_string(), json!("c4"));
        ctx.insert("action".to_string(), json!("mark_posted"));
        ctx.insert("draft_id".to_string(), json!(draft_id));
        let response = skill.handle(request("yt_review_replies", ctx)).await;
        assert!(!response.success);
    }
}
