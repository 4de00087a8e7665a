//! The memory store contract every collaborator (orchestrator, skills)
//! programs against. The real implementation is a content-addressed
//! vector store out of scope for this core; [`crate::InMemoryStore`] is a
//! reference implementation good enough for tests and a single-process
//! deployment with no external vector database configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corvus_types::error::ErrorKind;
use corvus_types::Classify;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a standalone memory, mirroring the tiers the
/// original implementation's consolidation pipeline assigned: a one-off
/// observation (`Episodic`), a durable fact (`Semantic`), a learned
/// behavior (`Procedural`), or an identity-level belief (`Core`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Episodic,
    Semantic,
    Procedural,
    Core,
}

/// One turn of a conversation, as passed to `store_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub user_id: String,
    pub channel_id: String,
    pub role: corvus_types::ChatRole,
    pub content: String,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// A standalone memory, as passed to `store_memory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub content: String,
    pub kind: MemoryKind,
    pub user_id: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("collection `{0}` has not been created")]
    UnknownCollection(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
}

impl Classify for MemoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::UnknownCollection(_) => ErrorKind::Validation,
            MemoryError::Backend(_) => ErrorKind::Transport,
        }
    }
}

/// The contract the orchestrator and skills program against. Named
/// collections (`ensure_collection`) hold arbitrary skill-owned JSON
/// records addressed by id (`get_by_id`/`delete_by_id`/`filter_by_field`);
/// conversation turns and standalone memories are first-class, since the
/// orchestrator's C13 pipeline and background profile extraction depend on
/// them directly.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn initialize(&self) -> Result<(), MemoryError>;

    /// Declares a named collection. `vector_size` is accepted for contract
    /// parity with the real vector store; a reference implementation with
    /// no embedding backend is free to ignore it.
    async fn ensure_collection(&self, name: &str, vector_size: usize) -> Result<(), MemoryError>;

    async fn store_message(
        &self,
        user_id: &str,
        channel_id: &str,
        role: corvus_types::ChatRole,
        content: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Uuid, MemoryError>;

    async fn store_memory(
        &self,
        content: &str,
        memory_type: MemoryKind,
        user_id: Option<&str>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Uuid, MemoryError>;

    /// The most recent `limit` turns for `(user_id, channel_id)`, oldest
    /// first, the order a chat history is conventionally rendered in.
    async fn get_recent_context(
        &self,
        user_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MemoryError>;

    async fn search_memories(
        &self,
        query: &str,
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    async fn search_conversations(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MemoryError>;

    /// Scans `collection` for JSON records whose `field` equals `value`.
    async fn filter_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, MemoryError>;

    async fn get_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Value>, MemoryError>;

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> Result<bool, MemoryError>;

    /// Inserts or overwrites a JSON record by id in `collection`. Not named
    /// in spec.md's contract list but required to make `filter_by_field`/
    /// `get_by_id` usable by anything other than the reference store's own
    /// tests; the real relational-repository-backed skills would write
    /// through their own repository instead.
    async fn put(&self, collection: &str, id: Uuid, value: Value) -> Result<(), MemoryError>;
}
