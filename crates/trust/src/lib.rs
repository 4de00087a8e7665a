//! The trust model: per-(user, category) escalating autonomy state derived
//! from approval/rejection history.
//!
//! Promotion looks at the all-time approval rate and a minimum sample size
//! per level, the same weighted-gate idiom the memory crate's
//! [`is_core_eligible`](corvus_types)-style promotion check uses: multiple
//! signals (rate, volume) must all clear a bar before a level change fires.
//! Demotion instead looks at a short recent window, so a single bad patch
//! after years of good behavior knocks a level down quickly.

use std::collections::{HashMap, VecDeque};

use corvus_types::{TrustCategory, TrustLevel, TrustState};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// The promotion bar for advancing *into* a given level (i.e. this is the
/// bar `Building` must clear to become `Established`, etc.) New has no
/// incoming bar since nothing promotes into it.
#[derive(Debug, Clone, Copy)]
pub struct LevelThreshold {
    pub min_approval_rate: f32,
    pub min_total: u32,
}

/// Static promotion thresholds, ascending. Index 0 is unused (nothing
/// promotes into `New`); kept for index alignment with `TrustLevel::ALL_ASCENDING`.
pub const PROMOTION_THRESHOLDS: [LevelThreshold; 4] = [
    LevelThreshold { min_approval_rate: 0.0, min_total: 0 },
    LevelThreshold { min_approval_rate: 0.60, min_total: 5 },
    LevelThreshold { min_approval_rate: 0.75, min_total: 15 },
    LevelThreshold { min_approval_rate: 0.85, min_total: 40 },
];

/// How many of the most recent interactions are considered when checking
/// for a demotion, and what rejection rate within that window triggers one.
pub const DEMOTION_WINDOW: usize = 10;
pub const DEMOTION_REJECTION_RATE: f32 = 0.40;

/// A key identifying one trust-bearing relationship: a user's history with
/// a particular reply category (e.g. `(u42, "QUESTION")`), or a
/// channel-wide key when `category` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustKey {
    pub subject: String,
    pub category: Option<String>,
}

impl TrustKey {
    pub fn user_category(user_id: impl Into<String>, category: &TrustCategory) -> Self {
        Self {
            subject: user_id.into(),
            category: Some(category.0.clone()),
        }
    }

    pub fn channel(channel_id: impl Into<String>) -> Self {
        Self {
            subject: channel_id.into(),
            category: None,
        }
    }
}

/// Per-category auto-approval policy. `never_auto` overrides `min_auto_level`
/// unconditionally — `SPAM`-like categories never auto-approve regardless of
/// how trusted the subject is.
#[derive(Debug, Clone, Copy)]
pub struct CategoryPolicy {
    pub min_auto_level: TrustLevel,
    pub never_auto: bool,
}

impl CategoryPolicy {
    pub const fn auto_above(level: TrustLevel) -> Self {
        Self {
            min_auto_level: level,
            never_auto: false,
        }
    }

    pub const NEVER: Self = Self {
        min_auto_level: TrustLevel::Trusted,
        never_auto: true,
    };
}

/// Default category policy table. Unknown categories fall back to
/// requiring `Established`, a conservative middle ground.
pub fn default_category_policy(category: &str) -> CategoryPolicy {
    match category.to_ascii_uppercase().as_str() {
        "SPAM" => CategoryPolicy::NEVER,
        "QUESTION" => CategoryPolicy::auto_above(TrustLevel::Established),
        "REMINDER" => CategoryPolicy::auto_above(TrustLevel::Building),
        "DIGEST" => CategoryPolicy::auto_above(TrustLevel::New),
        "PROMOTIONAL" => CategoryPolicy::auto_above(TrustLevel::Trusted),
        _ => CategoryPolicy::auto_above(TrustLevel::Established),
    }
}

/// Recent-outcome tracking plus the derived [`TrustState`] for one key.
#[derive(Debug, Clone)]
struct TrustEntry {
    state: TrustState,
    recent: VecDeque<bool>,
}

impl Default for TrustEntry {
    fn default() -> Self {
        Self {
            state: TrustState::default(),
            recent: VecDeque::with_capacity(DEMOTION_WINDOW),
        }
    }
}

impl TrustEntry {
    fn push_recent(&mut self, approved: bool) {
        if self.recent.len() == DEMOTION_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(approved);
    }

    fn recompute(&mut self) {
        self.maybe_promote();
        self.maybe_demote();
    }

    /// Promotion is monotonic upward within a run of approvals: it only
    /// ever considers moving one level up at a time, re-checked after every
    /// recorded outcome so a long approval streak climbs one level per call
    /// until the thresholds stop clearing.
    fn maybe_promote(&mut self) {
        loop {
            let next = self.state.level.promote();
            if next == self.state.level {
                return;
            }
            let idx = TrustLevel::ALL_ASCENDING
                .iter()
                .position(|l| *l == next)
                .expect("promote() always returns a member of ALL_ASCENDING");
            let bar = PROMOTION_THRESHOLDS[idx];
            let rate = approval_rate(&self.state);
            if rate >= bar.min_approval_rate && self.state.total_interactions >= bar.min_total {
                self.state.level = next;
            } else {
                return;
            }
        }
    }

    fn maybe_demote(&mut self) {
        if self.recent.len() < DEMOTION_WINDOW {
            return;
        }
        let rejections = self.recent.iter().filter(|&&ok| !ok).count();
        let rate = rejections as f32 / self.recent.len() as f32;
        if rate > DEMOTION_REJECTION_RATE {
            self.state.level = self.state.level.demote();
        }
    }
}

fn approval_rate(state: &TrustState) -> f32 {
    if state.total_interactions == 0 {
        return 0.0;
    }
    state.approvals as f32 / state.total_interactions as f32
}

/// In-memory trust store. Persistence is the caller's concern (a
/// repository can snapshot `all()` periodically); the manager itself only
/// guarantees the in-process invalidate-on-write discipline the spec calls
/// for.
#[derive(Default)]
pub struct TrustManager {
    entries: RwLock<HashMap<TrustKey, TrustEntry>>,
}

impl TrustManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds state for a key, used when restoring from a persisted
    /// snapshot at startup.
    pub async fn seed(&self, key: TrustKey, state: TrustState) {
        let mut entries = self.entries.write().await;
        entries.insert(key, TrustEntry { state, recent: VecDeque::with_capacity(DEMOTION_WINDOW) });
    }

    pub async fn state(&self, key: &TrustKey) -> TrustState {
        let entries = self.entries.read().await;
        entries.get(key).map(|e| e.state.clone()).unwrap_or_default()
    }

    pub async fn record_approval(&self, key: &TrustKey) -> TrustState {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.clone()).or_default();
        entry.state.approvals += 1;
        entry.state.total_interactions += 1;
        entry.push_recent(true);
        entry.recompute();
        tracing::debug!(subject = %key.subject, category = ?key.category, level = ?entry.state.level, "trust_approval_recorded");
        entry.state.clone()
    }

    pub async fn record_rejection(&self, key: &TrustKey) -> TrustState {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.clone()).or_default();
        entry.state.rejections += 1;
        entry.state.total_interactions += 1;
        entry.push_recent(false);
        entry.recompute();
        tracing::debug!(subject = %key.subject, category = ?key.category, level = ?entry.state.level, "trust_rejection_recorded");
        entry.state.clone()
    }

    pub async fn record_edit(&self, key: &TrustKey) -> TrustState {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.clone()).or_default();
        entry.state.edits += 1;
        entry.state.total_interactions += 1;
        // An edit counts as neither a clean approval nor a rejection for
        // the demotion window, but it does count toward total volume.
        entry.recompute();
        entry.state.clone()
    }

    /// Whether `category`'s drafts should be auto-approved for `key`, per
    /// the current trust level and the category's policy.
    pub async fn should_auto_approve(&self, key: &TrustKey, category: &str) -> bool {
        let policy = default_category_policy(category);
        if policy.never_auto {
            return false;
        }
        let state = self.state(key).await;
        state.level >= policy.min_auto_level
    }

    /// All categories auto-approved at `key`'s current level, from the
    /// default policy table.
    pub async fn auto_categories(&self, key: &TrustKey, all_categories: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for &category in all_categories {
            if self.should_auto_approve(key, category).await {
                out.push(category.to_string());
            }
        }
        out
    }

    pub async fn review_categories(&self, key: &TrustKey, all_categories: &[&str]) -> Vec<String> {
        let auto = self.auto_categories(key, all_categories).await;
        all_categories
            .iter()
            .filter(|c| !auto.contains(&c.to_string()))
            .map(|c| c.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn promotion_is_monotonic_across_successive_approvals() {
        let manager = TrustManager::new();
        let key = TrustKey::user_category("u1", &TrustCategory::new("QUESTION"));
        let mut last_level = TrustLevel::New;
        for _ in 0..60 {
            let state = manager.record_approval(&key).await;
            assert!(state.level >= last_level, "trust level must never decrease on approval-only streak");
            last_level = state.level;
        }
        assert_eq!(last_level, TrustLevel::Trusted);
    }

    #[tokio::test]
    async fn sustained_rejections_trigger_demotion() {
        let manager = TrustManager::new();
        let key = TrustKey::user_category("u2", &TrustCategory::new("QUESTION"));
        for _ in 0..60 {
            manager.record_approval(&key).await;
        }
        let before = manager.state(&key).await.level;
        assert_eq!(before, TrustLevel::Trusted);

        for _ in 0..DEMOTION_WINDOW {
            manager.record_rejection(&key).await;
        }
        let after = manager.state(&key).await.level;
        assert!(after < before, "a run of rejections must demote the level");
    }

    #[tokio::test]
    async fn spam_category_never_auto_approves_even_at_trusted() {
        let manager = TrustManager::new();
        let key = TrustKey::user_category("u3", &TrustCategory::new("SPAM"));
        for _ in 0..60 {
            manager.record_approval(&key).await;
        }
        assert!(!manager.should_auto_approve(&key, "SPAM").await);
    }

    #[tokio::test]
    async fn established_question_category_auto_approves_once_level_reached() {
        let manager = TrustManager::new();
        let key = TrustKey::user_category("u4", &TrustCategory::new("QUESTION"));
        assert!(!manager.should_auto_approve(&key, "QUESTION").await);
        for _ in 0..20 {
            manager.record_approval(&key).await;
        }
        assert!(manager.state(&key).await.level >= TrustLevel::Established);
        assert!(manager.should_auto_approve(&key, "QUESTION").await);
    }

    #[tokio::test]
    async fn new_subject_starts_at_new_with_zero_counters() {
        let manager = TrustManager::new();
        let key = TrustKey::channel("c1");
        let state = manager.state(&key).await;
        assert_eq!(state.level, TrustLevel::New);
        assert_eq!(state.total_interactions, 0);
    }
}
