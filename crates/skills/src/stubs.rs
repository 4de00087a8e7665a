//! Minimal skills for collaborators whose full implementation depends on
//! components outside this port's scope (a profile builder over the
//! vector memory store, a Gmail OAuth client, a YouTube growth-strategy
//! model). Each still satisfies the `Skill` contract and registers its
//! real intents so the registry and orchestrator can route to it; the
//! handlers return a plain acknowledgement rather than performing the
//! full original behavior.

use async_trait::async_trait;
use corvus_types::{HeartbeatAction, Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse};

macro_rules! stub_skill {
    ($name:ident, $skill_name:expr, $description:expr, $collection:expr, [$($intent:expr),+ $(,)?]) => {
        #[derive(Default)]
        pub struct $name;

        impl $name {
            pub fn new() -> Self {
                Self
            }
        }

        #[async_trait]
        impl Skill for $name {
            fn metadata(&self) -> SkillMetadata {
                SkillMetadata {
                    name: $skill_name.to_string(),
                    description: $description.to_string(),
                    version: "0.1.0".to_string(),
                    permissions: PermissionSet::new([Permission::ReadProfile, Permission::SendMessages]),
                    collections: vec![$collection.to_string()],
                    intents: vec![$($intent.to_string()),+],
                }
            }

            async fn initialize(&mut self) -> Result<(), String> {
                Ok(())
            }

            async fn handle(&self, request: SkillRequest) -> SkillResponse {
                if [$($intent),+].contains(&request.intent.as_str()) {
                    SkillResponse::ok(request.id, format!("{} is not yet fully implemented.", $skill_name))
                } else {
                    SkillResponse::error_response(request.id, format!("Unknown intent: {}", request.intent))
                }
            }

            async fn on_heartbeat(&self, _user_ids: &[String]) -> Vec<HeartbeatAction> {
                vec![]
            }

            async fn cleanup(&mut self) {}
        }
    };
}

stub_skill!(
    ProfileManagerSkill,
    "profile_manager",
    "View and manage what the bot knows about you",
    "user_profiles",
    ["profile_summary", "profile_view", "profile_update", "profile_delete", "profile_export", "profile_confidence"]
);

stub_skill!(
    PersonalModelSkill,
    "personal_model",
    "Maintain a longitudinal model of the user's preferences and habits",
    "personal_model",
    ["model_summary", "model_update"]
);

stub_skill!(
    GmailSkill,
    "gmail",
    "Read and triage the user's inbox",
    "gmail_threads",
    ["gmail_summary", "gmail_search", "gmail_draft_reply"]
);

stub_skill!(
    YoutubeStrategySkill,
    "youtube_strategy",
    "Recommend content and growth strategy for a YouTube channel",
    "yt_strategy",
    ["yt_strategy_recommend", "yt_strategy_review"]
);

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn stub_skill_acknowledges_its_declared_intents() {
        let skill = ProfileManagerSkill::new();
        let request = SkillRequest::new(Uuid::new_v4().to_string(), "u1", "profile_summary", "");
        let response = skill.handle(request).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn stub_skill_rejects_intents_it_did_not_declare() {
        let skill = GmailSkill::new();
        let request = SkillRequest::new(Uuid::new_v4().to_string(), "u1", "gmail_delete_everything", "");
        let response = skill.handle(request).await;
        assert!(!response.success);
    }

    #[test]
    fn every_stub_declares_at_least_one_intent() {
        assert!(!ProfileManagerSkill::new().metadata().intents.is_empty());
        assert!(!PersonalModelSkill::new().metadata().intents.is_empty());
        assert!(!GmailSkill::new().metadata().intents.is_empty());
        assert!(!YoutubeStrategySkill::new().metadata().intents.is_empty());
    }
}
