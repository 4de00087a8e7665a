//! Shared process state, wrapped the way the teacher's daemon wraps its
//! own `DaemonState`: one `Arc` per long-lived collaborator, cloned into
//! each axum handler rather than a single `Arc<Mutex<_>>` god object, since
//! none of the collaborators here need a shared lock across them.

use std::sync::Arc;
use std::time::Instant;

use corvus_orchestrator::MessageOrchestrator;
use corvus_skills::SkillRegistry;
use corvus_trust::TrustManager;

#[derive(Clone)]
pub struct AppState {
    pub skills: Arc<SkillRegistry>,
    pub orchestrator: Arc<MessageOrchestrator>,
    pub trust: Arc<TrustManager>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(skills: Arc<SkillRegistry>, orchestrator: Arc<MessageOrchestrator>, trust: Arc<TrustManager>) -> Self {
        Self {
            skills,
            orchestrator,
            trust,
            started_at: Instant::now(),
        }
    }
}
