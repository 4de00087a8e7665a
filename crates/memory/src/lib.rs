//! The memory store contract: conversation history, standalone memories,
//! and skill-owned collections, addressed the way the orchestrator and
//! skills need them. The real vector-backed store is an external
//! collaborator out of scope for this core (spec.md §1); this crate
//! defines the contract and ships an in-process reference implementation.

pub mod contract;
pub mod in_memory;
pub mod similarity;

pub use contract::{ConversationTurn, MemoryError, MemoryKind, MemoryRecord, MemoryStore};
pub use in_memory::InMemoryStore;
