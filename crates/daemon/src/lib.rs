//! The Corvus process: wires every crate in the workspace into one
//! long-lived daemon exposing the Skill RPC surface, driving the heartbeat
//! scheduler and priority queue, and hosting the message orchestrator.

pub mod error;
pub mod heartbeat_support;
pub mod router_backend;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use heartbeat_support::{HeartbeatQueueHandler, RegistryActionsSource, TransportActionExecutor};
pub use router_backend::ClientRouterBackend;
pub use routes::api_router;
pub use state::AppState;
