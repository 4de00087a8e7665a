//! The message orchestrator (C13): the only crate that knows how to turn a
//! raw inbound chat event into an outbound reply, by composing the router,
//! broker, skill registry, and memory store.

mod orchestrator;
mod skill_dispatch;
mod task_type;

pub use orchestrator::{MessageOrchestrator, NoopProfileExtractor, ProfileExtractor};
pub use skill_dispatch::{parse_sub_intent, skill_name_for_intent};
pub use task_type::classify_task_type;
