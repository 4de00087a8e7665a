//! The static `MessageIntent -> skill_name` table and the keyword-based
//! sub-intent parsers, ported verbatim from `agent/core.py`'s
//! `_parse_*_intent` family. The orchestrator derives a sub-intent from
//! the raw message text and sets it as `SkillRequest.intent` before
//! calling the skill; an unrecognized phrasing falls back to a
//! skill-specific default sub-intent rather than failing the request.

use corvus_types::MessageIntent;

/// The skill registered to handle each skill-bearing `MessageIntent`.
/// `None` for intents the orchestrator handles itself (simple query,
/// complex task, memory store/recall, system command).
pub fn skill_name_for_intent(intent: MessageIntent) -> Option<&'static str> {
    match intent {
        MessageIntent::TaskManagement => Some("task_manager"),
        MessageIntent::CalendarQuery => Some("calendar"),
        MessageIntent::ProfileQuery => Some("profile_manager"),
        MessageIntent::PersonalModel => Some("personal_model"),
        MessageIntent::EmailManagement => Some("gmail"),
        MessageIntent::DevWatcher => Some("dev_watcher"),
        MessageIntent::MilestoneManagement => Some("milestone_tracker"),
        MessageIntent::YoutubeIntelligence => Some("youtube_intelligence"),
        MessageIntent::YoutubeManagement => Some("youtube_management"),
        MessageIntent::YoutubeStrategy => Some("youtube_strategy"),
        MessageIntent::SimpleQuery
        | MessageIntent::ComplexTask
        | MessageIntent::MemoryStore
        | MessageIntent::MemoryRecall
        | MessageIntent::SystemCommand => None,
    }
}

fn any_word(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Derives the sub-intent to put on `SkillRequest.intent` for `skill_name`,
/// from keyword matches against `message`. Unknown skill names return
/// `"unknown"`, matching the original's `intent_map.get(..., "unknown")`.
pub fn parse_sub_intent(skill_name: &str, message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    match skill_name {
        "task_manager" => parse_task_intent(&lower),
        "calendar" => parse_calendar_intent(&lower),
        "profile_manager" => parse_profile_intent(&lower),
        "personal_model" => parse_personal_model_intent(&lower),
        "gmail" => parse_email_intent(&lower),
        "dev_watcher" => parse_dev_watcher_intent(&lower),
        "milestone_tracker" => parse_milestone_intent(&lower),
        "youtube_intelligence" => parse_youtube_intent(&lower, "intelligence"),
        "youtube_management" => parse_youtube_intent(&lower, "management"),
        "youtube_strategy" => parse_youtube_intent(&lower, "strategy"),
        _ => "unknown",
    }
}

fn parse_task_intent(msg: &str) -> &'static str {
    if any_word(msg, &["add", "create", "new", "make"]) {
        "create_task"
    } else if any_word(msg, &["list", "show", "what are", "my tasks"]) {
        "list_tasks"
    } else if any_word(msg, &["complete", "done", "finish", "mark"]) {
        "complete_task"
    } else if any_word(msg, &["delete", "remove", "cancel"]) {
        "delete_task"
    } else if any_word(msg, &["update", "change", "modify", "edit"]) {
        "update_task"
    } else if any_word(msg, &["summary", "overview", "status"]) {
        "task_summary"
    } else {
        "list_tasks"
    }
}

fn parse_calendar_intent(msg: &str) -> &'static str {
    if any_word(msg, &["schedule", "add", "create", "book"]) {
        "schedule_event"
    } else if any_word(msg, &["free", "available", "availability"]) {
        "check_availability"
    } else if any_word(msg, &["today", "today's"]) {
        "today_schedule"
    } else if any_word(msg, &["work hours", "working hours"]) {
        "set_work_hours"
    } else if any_word(msg, &["list", "show", "events", "calendar"]) {
        "list_events"
    } else {
        "today_schedule"
    }
}

fn parse_profile_intent(msg: &str) -> &'static str {
    if any_word(msg, &["update", "change", "set"]) {
        "profile_update"
    } else if any_word(msg, &["forget", "delete", "remove"]) {
        "profile_delete"
    } else if any_word(msg, &["export", "download", "gdpr"]) {
        "profile_export"
    } else if any_word(msg, &["confidence", "certain", "sure"]) {
        "profile_confidence"
    } else if any_word(msg, &["what", "show", "know", "about me"]) {
        "profile_summary"
    } else {
        "profile_summary"
    }
}

fn parse_personal_model_intent(msg: &str) -> &'static str {
    if any_word(msg, &["contact", "contacts", "who do i know"]) {
        "personal_contacts"
    } else if any_word(msg, &["forget", "delete learning", "remove learning"]) {
        "personal_forget"
    } else if any_word(msg, &["export", "download", "gdpr"]) {
        "personal_export"
    } else if any_word(msg, &["policy", "policies", "trust score"]) {
        "personal_policies"
    } else if any_word(
        msg,
        &["timezone", "locale", "my name is", "call me", "set my", "add goal"],
    ) {
        "personal_update"
    } else if any_word(
        msg,
        &["know about me", "learned", "summary", "what do you know", "show me"],
    ) {
        "personal_summary"
    } else {
        "personal_summary"
    }
}

fn parse_email_intent(msg: &str) -> &'static str {
    if any_word(msg, &["draft", "drafts", "review draft", "pending draft"]) {
        "email_drafts"
    } else if any_word(msg, &["digest", "briefing", "summary", "weekly"]) {
        "email_digest"
    } else if any_word(msg, &["status", "connected", "account"]) {
        "email_status"
    } else if any_word(msg, &["search", "find email", "look for"]) {
        "email_search"
    } else if any_word(msg, &["calendar", "events today", "schedule"]) {
        "email_calendar"
    } else if any_word(msg, &["unread", "new email", "urgent"]) {
        "email_unread"
    } else {
        "email_check"
    }
}

fn parse_dev_watcher_intent(msg: &str) -> &'static str {
    if any_word(msg, &["next", "should i work", "what to do"]) {
        "dev_next"
    } else if any_word(msg, &["idea", "ideas"]) {
        "dev_ideas"
    } else if any_word(msg, &["journal", "log", "this week", "today", "yesterday"]) {
        "dev_journal"
    } else if any_word(msg, &["summary", "overview", "recap"]) {
        "dev_summary"
    } else {
        "dev_status"
    }
}

fn parse_milestone_intent(msg: &str) -> &'static str {
    if any_word(msg, &["approve", "publish", "accept"]) {
        "milestone_approve"
    } else if any_word(msg, &["reject", "dismiss", "skip"]) {
        "milestone_reject"
    } else if any_word(msg, &["draft", "drafts", "promo", "post"]) {
        "milestone_drafts"
    } else if any_word(msg, &["setting", "config", "threshold"]) {
        "milestone_settings"
    } else {
        "milestone_list"
    }
}

fn parse_youtube_intent(msg: &str, skill: &str) -> &'static str {
    match skill {
        "intelligence" => {
            if any_word(msg, &["analyze", "analysis", "report"]) {
                "yt_analyze_channel"
            } else if any_word(msg, &["history", "past reports"]) {
                "yt_intelligence_history"
            } else {
                "yt_get_intelligence"
            }
        }
        "management" => {
            if any_word(msg, &["reply", "replies", "comment"]) {
                "yt_review_replies"
            } else if any_word(msg, &["tag", "tags", "seo"]) {
                "yt_get_tag_recommendations"
            } else if any_word(msg, &["health", "audit"]) {
                "yt_channel_health"
            } else if any_word(msg, &["setup", "onboard", "configure"]) {
                "yt_configure_management"
            } else if any_word(msg, &["state", "status"]) {
                "yt_get_management_state"
            } else {
                "yt_manage_channel"
            }
        }
        "strategy" => {
            if any_word(msg, &["generate", "create", "new"]) {
                "yt_generate_strategy"
            } else if any_word(msg, &["history", "past"]) {
                "yt_strategy_history"
            } else {
                "yt_get_strategy"
            }
        }
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_intents_map_to_the_right_skill_name() {
        assert_eq!(skill_name_for_intent(MessageIntent::TaskManagement), Some("task_manager"));
        assert_eq!(skill_name_for_intent(MessageIntent::YoutubeStrategy), Some("youtube_strategy"));
        assert_eq!(skill_name_for_intent(MessageIntent::SimpleQuery), None);
    }

    #[test]
    fn task_intent_defaults_to_list_tasks() {
        assert_eq!(parse_sub_intent("task_manager", "what's going on"), "list_tasks");
    }

    #[test]
    fn task_intent_recognizes_create() {
        assert_eq!(parse_sub_intent("task_manager", "add a task to buy milk"), "create_task");
    }

    #[test]
    fn calendar_intent_recognizes_availability() {
        assert_eq!(parse_sub_intent("calendar", "am I free tomorrow?"), "check_availability");
    }

    #[test]
    fn youtube_management_recognizes_tags() {
        assert_eq!(parse_sub_intent("youtube_management", "give me seo tag ideas"), "yt_get_tag_recommendations");
    }

    #[test]
    fn unknown_skill_name_is_unknown() {
        assert_eq!(parse_sub_intent("not_a_real_skill", "anything"), "unknown");
    }
}
