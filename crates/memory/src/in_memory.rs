//! An in-process [`MemoryStore`] reference implementation: conversation
//! turns and standalone memories live in `Vec`s guarded by an `RwLock`;
//! skill-owned collections are a `HashMap<String, HashMap<Uuid, Value>>`.
//! Nothing here is durable across a restart — the real deployment backs
//! this contract with a vector database, which is out of scope for this
//! core (spec.md §1, "Out of scope").

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use corvus_types::ChatRole;
use serde_json::Value;
use uuid::Uuid;

use crate::contract::{ConversationTurn, MemoryError, MemoryKind, MemoryRecord, MemoryStore};
use crate::similarity::overlap_score;

#[derive(Default)]
struct State {
    collections: HashMap<String, HashMap<Uuid, Value>>,
    turns: Vec<ConversationTurn>,
    memories: Vec<MemoryRecord>,
}

pub struct InMemoryStore {
    state: RwLock<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().expect("memory store lock poisoned")
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().expect("memory store lock poisoned")
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn initialize(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn ensure_collection(&self, name: &str, _vector_size: usize) -> Result<(), MemoryError> {
        self.state_mut().collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn store_message(
        &self,
        user_id: &str,
        channel_id: &str,
        role: ChatRole,
        content: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Uuid, MemoryError> {
        let turn = ConversationTurn {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            role,
            content: content.to_string(),
            metadata: metadata.unwrap_or_default(),
            created_at: Utc::now(),
        };
        let id = turn.id;
        self.state_mut().turns.push(turn);
        Ok(id)
    }

    async fn store_memory(
        &self,
        content: &str,
        memory_type: MemoryKind,
        user_id: Option<&str>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Uuid, MemoryError> {
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            content: content.to_string(),
            kind: memory_type,
            user_id: user_id.map(str::to_string),
            metadata: metadata.unwrap_or_default(),
            created_at: Utc::now(),
        };
        let id = record.id;
        self.state_mut().memories.push(record);
        Ok(id)
    }

    async fn get_recent_context(
        &self,
        user_id: &str,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        let state = self.state();
        let mut matching: Vec<&ConversationTurn> = state
            .turns
            .iter()
            .filter(|t| t.user_id == user_id && t.channel_id == channel_id)
            .collect();
        matching.sort_by_key(|t| t.created_at);
        let start = matching.len().saturating_sub(limit);
        Ok(matching[start..].iter().map(|t| (*t).clone()).collect())
    }

    async fn search_memories(
        &self,
        query: &str,
        limit: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let state = self.state();
        let mut scored: Vec<(f32, &MemoryRecord)> = state
            .memories
            .iter()
            .filter(|m| user_id.is_none_or(|uid| m.user_id.as_deref() == Some(uid)))
            .map(|m| (overlap_score(query, &m.content), m))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, m)| m.clone()).collect())
    }

    async fn search_conversations(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        let state = self.state();
        let mut scored: Vec<(f32, &ConversationTurn)> = state
            .turns
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| (overlap_score(query, &t.content), t))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, t)| t.clone()).collect())
    }

    async fn filter_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, MemoryError> {
        let state = self.state();
        let records = state
            .collections
            .get(collection)
            .ok_or_else(|| MemoryError::UnknownCollection(collection.to_string()))?;
        Ok(records
            .values()
            .filter(|record| record.get(field) == Some(value))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Value>, MemoryError> {
        let state = self.state();
        let records = state
            .collections
            .get(collection)
            .ok_or_else(|| MemoryError::UnknownCollection(collection.to_string()))?;
        Ok(records.get(&id).cloned())
    }

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> Result<bool, MemoryError> {
        let mut state = self.state_mut();
        let records = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| MemoryError::UnknownCollection(collection.to_string()))?;
        Ok(records.remove(&id).is_some())
    }

    async fn put(&self, collection: &str, id: Uuid, value: Value) -> Result<(), MemoryError> {
        let mut state = self.state_mut();
        let records = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| MemoryError::UnknownCollection(collection.to_string()))?;
        records.insert(id, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn recent_context_is_scoped_to_user_and_channel_and_ordered() {
        let store = InMemoryStore::new();
        store
            .store_message("u1", "c1", ChatRole::User, "first", None)
            .await
            .unwrap();
        store
            .store_message("u1", "c1", ChatRole::Assistant, "second", None)
            .await
            .unwrap();
        store
            .store_message("u1", "c2", ChatRole::User, "other channel", None)
            .await
            .unwrap();
        store
            .store_message("u2", "c1", ChatRole::User, "other user", None)
            .await
            .unwrap();

        let context = store.get_recent_context("u1", "c1", 10).await.unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].content, "first");
        assert_eq!(context[1].content, "second");
    }

    #[tokio::test]
    async fn recent_context_respects_limit_keeping_the_newest() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .store_message("u1", "c1", ChatRole::User, &format!("turn {i}"), None)
                .await
                .unwrap();
        }
        let context = store.get_recent_context("u1", "c1", 2).await.unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].content, "turn 3");
        assert_eq!(context[1].content, "turn 4");
    }

    #[tokio::test]
    async fn search_memories_ranks_by_token_overlap_and_scopes_by_user() {
        let store = InMemoryStore::new();
        store
            .store_memory("likes writing Rust parsers", MemoryKind::Semantic, Some("u1"), None)
            .await
            .unwrap();
        store
            .store_memory("prefers tea over coffee", MemoryKind::Episodic, Some("u1"), None)
            .await
            .unwrap();
        store
            .store_memory("likes writing Rust parsers", MemoryKind::Semantic, Some("u2"), None)
            .await
            .unwrap();

        let results = store.search_memories("rust parser", 5, Some("u1")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("Rust parsers"));
    }

    #[tokio::test]
    async fn collection_round_trips_put_get_filter_delete() {
        let store = InMemoryStore::new();
        store.ensure_collection("skill_tasks", 0).await.unwrap();
        let id = Uuid::new_v4();
        store
            .put("skill_tasks", id, json!({"title": "ship it", "status": "open"}))
            .await
            .unwrap();

        let fetched = store.get_by_id("skill_tasks", id).await.unwrap().unwrap();
        assert_eq!(fetched["title"], "ship it");

        let matches = store
            .filter_by_field("skill_tasks", "status", &json!("open"))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);

        assert!(store.delete_by_id("skill_tasks", id).await.unwrap());
        assert!(store.get_by_id("skill_tasks", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_collection_is_an_error() {
        let store = InMemoryStore::new();
        let err = store.get_by_id("nonexistent", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, MemoryError::UnknownCollection(_)));
    }
}
