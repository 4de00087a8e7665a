//! The YouTube channel assumption tracker.
//!
//! Pinned against the original's documented contract: `add_inferred`
//! always schedules its next validation at the short default interval
//! regardless of the confidence it's given (only `refresh_validation`
//! branches on confidence), `invalidate` without a reason leaves the
//! evidence list untouched entirely rather than appending an empty note,
//! and the confidence boundary for "confirmed-length" revalidation is
//! inclusive at 0.9.
//!
//! The exact interval lengths weren't recoverable from the retained
//! source, so `CONFIRMED_VALIDATION_DAYS`/`DEFAULT_VALIDATION_DAYS` below
//! are a judgment call, not a ported constant.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use corvus_types::{Assumption, AssumptionCategory, AssumptionSource};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const CONFIRMED_VALIDATION_DAYS: i64 = 60;
pub const DEFAULT_VALIDATION_DAYS: i64 = 14;
/// Confidence at or above this uses the confirmed-length interval when a
/// validation is refreshed. Inclusive.
pub const CONFIRMED_CONFIDENCE_GATE: f32 = 0.9;
/// Minimum confidence for an inferred (non-confirmed) assumption to count
/// as "high confidence".
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Patch applied to an assumption by an update call. Every field is
/// optional so callers set exactly the fields the operation changes.
#[derive(Debug, Clone, Default)]
pub struct AssumptionPatch {
    pub source: Option<AssumptionSource>,
    pub confidence: Option<f32>,
    pub confirmed_at: Option<Option<DateTime<Utc>>>,
    pub last_validated: Option<Option<DateTime<Utc>>>,
    pub next_validation: Option<DateTime<Utc>>,
    pub evidence: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[async_trait]
pub trait AssumptionStore: Send + Sync {
    async fn save(&self, assumption: Assumption) -> Result<Assumption, String>;
    async fn get(&self, id: Uuid) -> Option<Assumption>;
    async fn get_all(&self, channel_id: &str, source: Option<AssumptionSource>) -> Vec<Assumption>;
    async fn update(&self, id: Uuid, patch: AssumptionPatch) -> Result<Assumption, String>;
    async fn get_stale(&self, now: DateTime<Utc>) -> Vec<Assumption>;
}

/// Reference in-process store, analogous to the skills' `_*_cache`
/// fallback used when no external store is wired in.
#[derive(Default)]
pub struct InMemoryAssumptionStore {
    entries: RwLock<HashMap<Uuid, Assumption>>,
}

#[async_trait]
impl AssumptionStore for InMemoryAssumptionStore {
    async fn save(&self, assumption: Assumption) -> Result<Assumption, String> {
        let mut entries = self.entries.write().await;
        entries.insert(assumption.id, assumption.clone());
        Ok(assumption)
    }

    async fn get(&self, id: Uuid) -> Option<Assumption> {
        self.entries.read().await.get(&id).cloned()
    }

    async fn get_all(&self, channel_id: &str, source: Option<AssumptionSource>) -> Vec<Assumption> {
        self.entries
            .read()
            .await
            .values()
            .filter(|a| a.channel_id == channel_id)
            .filter(|a| source.map(|s| a.source == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    async fn update(&self, id: Uuid, patch: AssumptionPatch) -> Result<Assumption, String> {
        let mut entries = self.entries.write().await;
        let assumption = entries.get_mut(&id).ok_or_else(|| "assumption not found".to_string())?;
        if let Some(source) = patch.source {
            assumption.source = source;
        }
        if let Some(confidence) = patch.confidence {
            assumption.confidence = confidence;
        }
        if let Some(confirmed_at) = patch.confirmed_at {
            assumption.confirmed_at = confirmed_at;
        }
        if let Some(last_validated) = patch.last_validated {
            assumption.last_validated = last_validated;
        }
        if let Some(next_validation) = patch.next_validation {
            assumption.next_validation = next_validation;
        }
        if let Some(evidence) = patch.evidence {
            assumption.evidence = evidence;
        }
        if let Some(active) = patch.active {
            assumption.active = active;
        }
        Ok(assumption.clone())
    }

    async fn get_stale(&self, now: DateTime<Utc>) -> Vec<Assumption> {
        self.entries
            .read()
            .await
            .values()
            .filter(|a| a.is_active() && a.next_validation <= now)
            .cloned()
            .collect()
    }
}

pub struct AssumptionTracker {
    store: std::sync::Arc<dyn AssumptionStore>,
}

impl AssumptionTracker {
    pub fn new(store: std::sync::Arc<dyn AssumptionStore>) -> Self {
        Self { store }
    }

    fn interval_for(confidence: f32) -> Duration {
        if confidence >= CONFIRMED_CONFIDENCE_GATE {
            Duration::days(CONFIRMED_VALIDATION_DAYS)
        } else {
            Duration::days(DEFAULT_VALIDATION_DAYS)
        }
    }

    pub async fn add_confirmed(
        &self,
        channel_id: impl Into<String>,
        category: AssumptionCategory,
        statement: impl Into<String>,
        evidence: Vec<String>,
    ) -> Result<Assumption, String> {
        let now = Utc::now();
        let assumption = Assumption {
            id: Uuid::new_v4(),
            channel_id: channel_id.into(),
            category,
            statement: statement.into(),
            evidence,
            confidence: 1.0,
            source: AssumptionSource::Confirmed,
            confirmed_at: Some(now),
            last_validated: None,
            next_validation: now + Duration::days(CONFIRMED_VALIDATION_DAYS),
            active: true,
        };
        self.store.save(assumption).await
    }

    /// `confidence` defaults to 0.5 when not otherwise decided by the
    /// caller. The next validation is always scheduled at the default
    /// (short) interval regardless of the confidence passed in — only
    /// `refresh_validation` lets confidence lengthen the interval.
    pub async fn add_inferred(
        &self,
        channel_id: impl Into<String>,
        category: AssumptionCategory,
        statement: impl Into<String>,
        evidence: Vec<String>,
        confidence: f32,
    ) -> Result<Assumption, String> {
        let now = Utc::now();
        let assumption = Assumption {
            id: Uuid::new_v4(),
            channel_id: channel_id.into(),
            category,
            statement: statement.into(),
            evidence,
            confidence,
            source: AssumptionSource::Inferred,
            confirmed_at: None,
            last_validated: None,
            next_validation: now + Duration::days(DEFAULT_VALIDATION_DAYS),
            active: true,
        };
        self.store.save(assumption).await
    }

    pub async fn get_all(&self, channel_id: &str, active_only: bool) -> Vec<Assumption> {
        let all = self.store.get_all(channel_id, None).await;
        if active_only {
            all.into_iter().filter(|a| a.is_active()).collect()
        } else {
            all
        }
    }

    pub async fn get_confirmed(&self, channel_id: &str) -> Vec<Assumption> {
        self.store.get_all(channel_id, Some(AssumptionSource::Confirmed)).await
    }

    /// Confirmed assumptions regardless of confidence, plus any other
    /// active assumption at or above `threshold`.
    pub async fn get_high_confidence(&self, channel_id: &str, threshold: f32) -> Vec<Assumption> {
        self.get_all(channel_id, true)
            .await
            .into_iter()
            .filter(|a| a.source == AssumptionSource::Confirmed || a.confidence >= threshold)
            .collect()
    }

    pub async fn confirm(&self, id: Uuid) -> Result<Assumption, String> {
        let now = Utc::now();
        self.store
            .update(
                id,
                AssumptionPatch {
                    source: Some(AssumptionSource::Confirmed),
                    confidence: Some(1.0),
                    confirmed_at: Some(Some(now)),
                    next_validation: Some(now + Duration::days(CONFIRMED_VALIDATION_DAYS)),
                    ..Default::default()
                },
            )
            .await
    }

    /// With no reason, evidence is left untouched. With a reason, the
    /// existing assumption's evidence (if any) is fetched and a note
    /// appended; if the assumption can't be found, evidence is left
    /// untouched just the same.
    pub async fn invalidate(&self, id: Uuid, reason: Option<&str>) -> Result<Assumption, String> {
        let mut patch = AssumptionPatch {
            source: Some(AssumptionSource::Invalidated),
            confidence: Some(0.0),
            active: Some(false),
            ..Default::default()
        };
        if let Some(reason) = reason {
            if let Some(existing) = self.store.get(id).await {
                let mut evidence = existing.evidence;
                evidence.push(format!("Invalidated: {reason}"));
                patch.evidence = Some(evidence);
            }
        }
        self.store.update(id, patch).await
    }

    pub async fn mark_needs_review(&self, id: Uuid) -> Result<Assumption, String> {
        self.store
            .update(
                id,
                AssumptionPatch {
                    source: Some(AssumptionSource::NeedsReview),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn refresh_validation(&self, id: Uuid, new_confidence: f32) -> Result<Assumption, String> {
        let now = Utc::now();
        self.store
            .update(
                id,
                AssumptionPatch {
                    confidence: Some(new_confidence),
                    last_validated: Some(Some(now)),
                    next_validation: Some(now + Self::interval_for(new_confidence)),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn get_stale(&self) -> Vec<Assumption> {
        self.store.get_stale(Utc::now()).await
    }

    pub async fn has_category(&self, channel_id: &str, category: AssumptionCategory) -> bool {
        self.get_all(channel_id, true).await.iter().any(|a| a.category == category)
    }

    /// Every `AssumptionCategory::REQUIRED` entry not already present,
    /// sorted by the category's `Debug` label for a stable order.
    pub async fn get_missing_categories(&self, channel_id: &str) -> Vec<AssumptionCategory> {
        let present: std::collections::HashSet<AssumptionCategory> =
            self.get_confirmed(channel_id).await.iter().map(|a| a.category).collect();
        let mut missing: Vec<AssumptionCategory> = AssumptionCategory::REQUIRED
            .into_iter()
            .filter(|c| !present.contains(c))
            .collect();
        missing.sort_by_key(|c| format!("{c:?}"));
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> AssumptionTracker {
        AssumptionTracker::new(std::sync::Arc::new(InMemoryAssumptionStore::default()))
    }

    #[tokio::test]
    async fn add_confirmed_sets_full_confidence_and_confirmed_at() {
        let tracker = tracker();
        let a = tracker
            .add_confirmed("c1", AssumptionCategory::Audience, "18-24", vec!["survey".to_string()])
            .await
            .unwrap();
        assert_eq!(a.confidence, 1.0);
        assert!(a.confirmed_at.is_some());
        assert_eq!(a.source, AssumptionSource::Confirmed);
    }

    #[tokio::test]
    async fn add_inferred_uses_default_interval_regardless_of_confidence() {
        let tracker = tracker();
        let before = Utc::now();
        let a = tracker
            .add_inferred("c1", AssumptionCategory::Topic, "cooking", vec![], 0.95)
            .await
            .unwrap();
        assert!(a.confirmed_at.is_none());
        assert!(a.next_validation <= before + Duration::days(DEFAULT_VALIDATION_DAYS) + Duration::seconds(2));
    }

    #[tokio::test]
    async fn get_all_excludes_invalidated_by_default() {
        let tracker = tracker();
        let active = tracker.add_confirmed("c1", AssumptionCategory::Tone, "friendly", vec![]).await.unwrap();
        let to_invalidate = tracker.add_confirmed("c1", AssumptionCategory::Content, "tutorials", vec![]).await.unwrap();
        tracker.invalidate(to_invalidate.id, None).await.unwrap();

        let result = tracker.get_all("c1", true).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, active.id);
    }

    #[tokio::test]
    async fn invalidate_without_reason_leaves_evidence_untouched() {
        let tracker = tracker();
        let a = tracker.add_confirmed("c1", AssumptionCategory::Tone, "friendly", vec!["x".to_string()]).await.unwrap();
        let updated = tracker.invalidate(a.id, None).await.unwrap();
        assert_eq!(updated.evidence, vec!["x".to_string()]);
        assert_eq!(updated.confidence, 0.0);
    }

    #[tokio::test]
    async fn invalidate_with_reason_appends_note() {
        let tracker = tracker();
        let a = tracker
            .add_confirmed("c1", AssumptionCategory::Tone, "friendly", vec!["original evidence".to_string()])
            .await
            .unwrap();
        let updated = tracker.invalidate(a.id, Some("Data contradicts this")).await.unwrap();
        assert_eq!(
            updated.evidence,
            vec!["original evidence".to_string(), "Invalidated: Data contradicts this".to_string()]
        );
    }

    #[tokio::test]
    async fn refresh_validation_boundary_at_point_nine_uses_confirmed_interval() {
        let tracker = tracker();
        let a = tracker.add_inferred("c1", AssumptionCategory::Topic, "x", vec![], 0.5).await.unwrap();
        let before = Utc::now();
        let updated = tracker.refresh_validation(a.id, 0.9).await.unwrap();
        assert!(updated.next_validation >= before + Duration::days(CONFIRMED_VALIDATION_DAYS) - Duration::seconds(2));
    }

    #[tokio::test]
    async fn refresh_validation_just_below_boundary_uses_default_interval() {
        let tracker = tracker();
        let a = tracker.add_inferred("c1", AssumptionCategory::Topic, "x", vec![], 0.5).await.unwrap();
        let before = Utc::now();
        let updated = tracker.refresh_validation(a.id, 0.89).await.unwrap();
        assert!(updated.next_validation <= before + Duration::days(DEFAULT_VALIDATION_DAYS) + Duration::seconds(2));
    }

    #[tokio::test]
    async fn get_missing_categories_excludes_performance_and_present_categories() {
        let tracker = tracker();
        tracker.add_confirmed("c1", AssumptionCategory::Audience, "x", vec![]).await.unwrap();
        tracker.add_confirmed("c1", AssumptionCategory::Tone, "x", vec![]).await.unwrap();

        let missing = tracker.get_missing_categories("c1").await;
        assert!(!missing.contains(&AssumptionCategory::Audience));
        assert!(!missing.contains(&AssumptionCategory::Tone));
        assert!(!missing.contains(&AssumptionCategory::Performance));
        assert!(missing.contains(&AssumptionCategory::Schedule));
        assert!(missing.contains(&AssumptionCategory::Competitor));
    }

    #[tokio::test]
    async fn get_missing_categories_still_reports_inferred_only_categories() {
        let tracker = tracker();
        tracker.add_inferred("c1", AssumptionCategory::Audience, "probably devs", vec![], 0.6).await.unwrap();

        let missing = tracker.get_missing_categories("c1").await;
        assert!(
            missing.contains(&AssumptionCategory::Audience),
            "an inferred-only assumption must not count as a confirmed category"
        );
    }

    #[tokio::test]
    async fn get_missing_categories_is_sorted() {
        let tracker = tracker();
        let missing = tracker.get_missing_categories("c1").await;
        let mut sorted = missing.clone();
        sorted.sort_by_key(|c| format!("{c:?}"));
        assert_eq!(missing, sorted);
    }

    #[tokio::test]
    async fn has_category_reflects_presence() {
        let tracker = tracker();
        tracker.add_confirmed("c1", AssumptionCategory::Audience, "x", vec![]).await.unwrap();
        assert!(tracker.has_category("c1", AssumptionCategory::Audience).await);
        assert!(!tracker.has_category("c1", AssumptionCategory::Tone).await);
    }

    #[tokio::test]
    async fn get_high_confidence_includes_confirmed_regardless_of_confidence() {
        let tracker = tracker();
        let a = tracker.add_confirmed("c1", AssumptionCategory::Audience, "x", vec![]).await.unwrap();
        // Force a low confidence while staying Confirmed, as the Python test does.
        tracker
            .store
            .update(a.id, AssumptionPatch { confidence: Some(0.3), ..Default::default() })
            .await
            .unwrap();
        let result = tracker.get_high_confidence("c1", HIGH_CONFIDENCE_THRESHOLD).await;
        assert_eq!(result.len(), 1);
    }
}
