//! Shared domain types for the Corvus personal-assistant core.
//!
//! Every closed-set enum and cross-crate DTO lives here so that the router,
//! broker, skill registry, and scheduler agree on a single vocabulary
//! without depending on one another directly.

pub mod assumption;
pub mod cost;
pub mod error;
pub mod heartbeat;
pub mod inference;
pub mod intent;
pub mod queue;
pub mod skill;
pub mod task;
pub mod trust;

pub use assumption::{Assumption, AssumptionCategory, AssumptionSource};
pub use cost::{CostAggregate, CostRecord, CostSink};
pub use error::{Classify, CoreError, ErrorKind};
pub use heartbeat::{ActionResult, HeartbeatAction, ScheduledEvent, ScheduledEventStatus};
pub use inference::{ChatRole, HistoryMessage, InferenceRequest, InferenceResult, StreamChunk};
pub use intent::{MessageIntent, RoutingDecision};
pub use queue::{QueuePriority, QueueStatus, QueueTask};
pub use skill::{Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse};
pub use task::{CostRate, LocalTier, Provider, ProviderConfig, TaskType};
pub use trust::{TrustCategory, TrustLevel, TrustState};
