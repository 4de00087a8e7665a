//! The closed `MessageIntent` set and the router's output contract.

use serde::{Deserialize, Serialize};

/// Closed set of intents the router can classify a message into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageIntent {
    SimpleQuery,
    ComplexTask,
    MemoryStore,
    MemoryRecall,
    SystemCommand,
    TaskManagement,
    CalendarQuery,
    ProfileQuery,
    PersonalModel,
    EmailManagement,
    DevWatcher,
    MilestoneManagement,
    YoutubeIntelligence,
    YoutubeManagement,
    YoutubeStrategy,
}

impl MessageIntent {
    /// Case-insensitive lookup used when parsing the router LLM's JSON
    /// output.
    pub fn parse_case_insensitive(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "SIMPLE_QUERY" => Some(Self::SimpleQuery),
            "COMPLEX_TASK" => Some(Self::ComplexTask),
            "MEMORY_STORE" => Some(Self::MemoryStore),
            "MEMORY_RECALL" => Some(Self::MemoryRecall),
            "SYSTEM_COMMAND" => Some(Self::SystemCommand),
            "TASK_MANAGEMENT" => Some(Self::TaskManagement),
            "CALENDAR_QUERY" => Some(Self::CalendarQuery),
            "PROFILE_QUERY" => Some(Self::ProfileQuery),
            "PERSONAL_MODEL" => Some(Self::PersonalModel),
            "EMAIL_MANAGEMENT" => Some(Self::EmailManagement),
            "DEV_WATCHER" => Some(Self::DevWatcher),
            "MILESTONE_MANAGEMENT" => Some(Self::MilestoneManagement),
            "YOUTUBE_INTELLIGENCE" => Some(Self::YoutubeIntelligence),
            "YOUTUBE_MANAGEMENT" => Some(Self::YoutubeManagement),
            "YOUTUBE_STRATEGY" => Some(Self::YoutubeStrategy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleQuery => "SIMPLE_QUERY",
            Self::ComplexTask => "COMPLEX_TASK",
            Self::MemoryStore => "MEMORY_STORE",
            Self::MemoryRecall => "MEMORY_RECALL",
            Self::SystemCommand => "SYSTEM_COMMAND",
            Self::TaskManagement => "TASK_MANAGEMENT",
            Self::CalendarQuery => "CALENDAR_QUERY",
            Self::ProfileQuery => "PROFILE_QUERY",
            Self::PersonalModel => "PERSONAL_MODEL",
            Self::EmailManagement => "EMAIL_MANAGEMENT",
            Self::DevWatcher => "DEV_WATCHER",
            Self::MilestoneManagement => "MILESTONE_MANAGEMENT",
            Self::YoutubeIntelligence => "YOUTUBE_INTELLIGENCE",
            Self::YoutubeManagement => "YOUTUBE_MANAGEMENT",
            Self::YoutubeStrategy => "YOUTUBE_STRATEGY",
        }
    }
}

/// The router's classification output.
///
/// Invariant: `intent == ComplexTask && confidence < 0.7 => !use_complex_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: MessageIntent,
    pub confidence: f32,
    pub reasoning: String,
    pub use_complex_model: bool,
}

impl RoutingDecision {
    /// Builds a decision, deriving `use_complex_model` rather than trusting
    /// the LLM's own opinion.
    pub fn derive(intent: MessageIntent, confidence: f32, reasoning: impl Into<String>) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let use_complex_model = intent == MessageIntent::ComplexTask && confidence >= 0.7;
        Self {
            intent,
            confidence,
            reasoning: reasoning.into(),
            use_complex_model,
        }
    }

    /// The hardcoded safe default returned when both cascade stages fail.
    pub fn safe_default() -> Self {
        Self::derive(MessageIntent::SimpleQuery, 0.5, "fallback")
    }

    /// Returned on an unexpected (non-transport) router exception, so that
    /// downstream uses the strongest model rather than silently degrading.
    pub fn router_failed() -> Self {
        Self {
            intent: MessageIntent::ComplexTask,
            confidence: 0.5,
            reasoning: "router failed".to_string(),
            use_complex_model: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_task_below_threshold_never_uses_complex_model() {
        let d = RoutingDecision::derive(MessageIntent::ComplexTask, 0.3, "test");
        assert!(!d.use_complex_model);
    }

    #[test]
    fn complex_task_at_threshold_uses_complex_model() {
        let d = RoutingDecision::derive(MessageIntent::ComplexTask, 0.7, "test");
        assert!(d.use_complex_model);
    }

    #[test]
    fn confidence_is_clamped() {
        let d = RoutingDecision::derive(MessageIntent::SimpleQuery, 1.5, "test");
        assert_eq!(d.confidence, 1.0);
        let d = RoutingDecision::derive(MessageIntent::SimpleQuery, -0.5, "test");
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn intent_parsing_is_case_insensitive() {
        assert_eq!(
            MessageIntent::parse_case_insensitive("simple_query"),
            Some(MessageIntent::SimpleQuery)
        );
        assert_eq!(
            MessageIntent::parse_case_insensitive("Complex-Task"),
            Some(MessageIntent::ComplexTask)
        );
    }
}
