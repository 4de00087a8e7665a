//! The skill registry and the concrete skills it dispatches to.
//!
//! Every skill implements `corvus_types::Skill`. The registry is a flat
//! `HashMap<&'static str, Box<dyn Skill>>` keyed by skill name plus an
//! `intent → skill name` lookup built from each skill's declared intents,
//! generalizing `crates/tools/src/lib.rs`'s `ToolRegistry` from tools to
//! skills: same register-then-look-up-by-name shape, plus the intent index
//! a skill registry needs that a tool registry doesn't.

use std::collections::HashMap;

use corvus_types::{Skill, SkillRequest, SkillResponse};

pub mod assumption;
pub mod calendar;
pub mod dev_watcher;
pub mod milestone;
pub mod stubs;
pub mod task_manager;
pub mod youtube;

/// Holds every registered skill and the intent → skill-name index derived
/// from their metadata at registration time.
#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Box<dyn Skill>>,
    intent_index: HashMap<String, String>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Box<dyn Skill>) {
        let metadata = skill.metadata();
        let name = metadata.name.clone();
        for intent in &metadata.intents {
            self.intent_index.insert(intent.clone(), name.clone());
        }
        self.skills.insert(name, skill);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Skill> {
        self.skills.get(name).map(|s| s.as_ref())
    }

    pub fn skill_for_intent(&self, intent: &str) -> Option<&dyn Skill> {
        self.intent_index.get(intent).and_then(|name| self.get(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.skills.keys().map(|s| s.as_str()).collect()
    }

    /// Dispatches `request` to the skill registered for `request.intent`,
    /// returning an error response if no skill declares that intent.
    pub async fn dispatch(&self, request: SkillRequest) -> SkillResponse {
        match self.skill_for_intent(&request.intent) {
            Some(skill) => skill.handle(request).await,
            None => SkillResponse::error_response(
                request.id.clone(),
                format!("no skill registered for intent: {}", request.intent),
            ),
        }
    }

    /// Fans `on_heartbeat` out to every registered skill and concatenates
    /// the resulting actions.
    pub async fn trigger_heartbeat(&self, user_ids: &[String]) -> Vec<corvus_types::HeartbeatAction> {
        let mut actions = Vec::new();
        for skill in self.skills.values() {
            actions.extend(skill.on_heartbeat(user_ids).await);
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use corvus_types::{HeartbeatAction, PermissionSet, SkillMetadata};

    struct EchoSkill;

    #[async_trait]
    impl Skill for EchoSkill {
        fn metadata(&self) -> SkillMetadata {
            SkillMetadata {
                name: "echo".to_string(),
                description: "echoes the message back".to_string(),
                version: "1.0.0".to_string(),
                permissions: PermissionSet::default(),
                collections: vec![],
                intents: vec!["echo".to_string()],
            }
        }

        async fn initialize(&mut self) -> Result<(), String> {
            Ok(())
        }

        async fn handle(&self, request: SkillRequest) -> SkillResponse {
            SkillResponse::ok(request.id, request.message)
        }

        async fn on_heartbeat(&self, _user_ids: &[String]) -> Vec<HeartbeatAction> {
            vec![]
        }
    }

    #[tokio::test]
    async fn dispatches_by_declared_intent() {
        let mut registry = SkillRegistry::new();
        registry.register(Box::new(EchoSkill));

        let request = SkillRequest::new("r1", "u1", "echo", "hello");
        let response = registry.dispatch(request).await;
        assert!(response.success);
        assert_eq!(response.message, "hello");
    }

    #[tokio::test]
    async fn unknown_intent_returns_error_response() {
        let registry = SkillRegistry::new();
        let request = SkillRequest::new("r1", "u1", "nonexistent", "hi");
        let response = registry.dispatch(request).await;
        assert!(!response.success);
    }
}
