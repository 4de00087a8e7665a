//! The skill capability set: `Skill`, `SkillRequest`, `SkillResponse`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::heartbeat::HeartbeatAction;

/// A coarse-grained capability a skill may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ReadOwnCollection,
    WriteOwnCollection,
    SendMessages,
    ReadProfile,
    NetworkAccess,
}

/// A set of granted permissions, checked before a skill performs a
/// privileged operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSet(pub HashSet<Permission>);

impl PermissionSet {
    pub fn new(perms: impl IntoIterator<Item = Permission>) -> Self {
        Self(perms.into_iter().collect())
    }

    pub fn has(&self, perm: Permission) -> bool {
        self.0.contains(&perm)
    }
}

/// Static description of a skill, returned by `Skill::metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    pub permissions: PermissionSet,
    pub collections: Vec<String>,
    pub intents: Vec<String>,
}

/// A synchronous request dispatched to a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRequest {
    pub id: String,
    pub user_id: String,
    pub intent: String,
    pub message: String,
    pub context: HashMap<String, serde_json::Value>,
}

impl SkillRequest {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, intent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            intent: intent.into(),
            message: message.into(),
            context: HashMap::new(),
        }
    }
}

/// A skill's response to a [`SkillRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResponse {
    pub request_id: String,
    pub success: bool,
    pub message: String,
    pub data: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl SkillResponse {
    pub fn ok(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            message: message.into(),
            data: HashMap::new(),
            error: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returned on any recoverable failure instead of propagating an error
    /// across the skill boundary.
    pub fn error_response(request_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self {
            request_id: request_id.into(),
            success: false,
            message: msg.clone(),
            data: HashMap::new(),
            error: Some(msg),
        }
    }
}

/// The capability set every skill implements.
///
/// A skill must handle exactly the intents it declares in its metadata, must
/// be idempotent w.r.t. its own persisted state when a request id is
/// replayed, and must never call the inference broker directly for
/// task-type decisions it owns — it declares the `TaskType` and lets the
/// broker route.
#[async_trait]
pub trait Skill: Send + Sync {
    fn metadata(&self) -> SkillMetadata;

    async fn initialize(&mut self) -> Result<(), String>;

    async fn handle(&self, request: SkillRequest) -> SkillResponse;

    async fn on_heartbeat(&self, user_ids: &[String]) -> Vec<HeartbeatAction>;

    /// Optional fragment the orchestrator may splice into a system prompt.
    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {}
}
