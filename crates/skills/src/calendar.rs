//! Calendar awareness: schedule tracking, availability checks, and
//! morning/meeting-prep/end-of-day heartbeat nudges.
//!
//! Awareness-based only — it learns about events from conversation
//! context rather than syncing with an external calendar provider.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use corvus_types::{HeartbeatAction, Permission, PermissionSet, Skill, SkillMetadata, SkillRequest, SkillResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Meeting,
    Deadline,
    Reminder,
    WorkHours,
    Break,
    FocusTime,
    Personal,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
    Weekdays,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub user_id: String,
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub recurrence: Option<RecurrencePattern>,
    pub location: Option<String>,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarEvent {
    fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            event_type: EventType::Meeting,
            title: String::new(),
            description: String::new(),
            start_time: None,
            end_time: None,
            all_day: false,
            recurrence: None,
            location: None,
            participants: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn effective_end(&self) -> Option<DateTime<Utc>> {
        self.start_time.map(|start| self.end_time.unwrap_or(start + Duration::hours(1)))
    }

    pub fn is_happening_now(&self) -> bool {
        match (self.start_time, self.effective_end()) {
            (Some(start), Some(end)) => {
                let now = Utc::now();
                start <= now && now <= end
            }
            _ => false,
        }
    }

    pub fn is_today(&self) -> bool {
        self.start_time.is_some_and(|s| s.date_naive() == Utc::now().date_naive())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A learned recurring pattern, e.g. declared work hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePattern {
    pub user_id: String,
    pub pattern_type: String,
    pub day_of_week: Option<u32>,
    pub start_hour: u32,
    pub end_hour: u32,
    pub confidence: f32,
}

#[derive(Default)]
pub struct CalendarSkill {
    events: RwLock<HashMap<String, HashMap<Uuid, CalendarEvent>>>,
    patterns: RwLock<HashMap<String, Vec<SchedulePattern>>>,
}

impl CalendarSkill {
    pub fn new() -> Self {
        Self::default()
    }

    async fn user_events(&self, user_id: &str) -> Vec<CalendarEvent> {
        self.events.read().await.get(user_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    async fn store_event(&self, event: CalendarEvent) {
        self.events.write().await.entry(event.user_id.clone()).or_default().insert(event.id, event);
    }

    async fn handle_schedule(&self, request: &SkillRequest) -> SkillResponse {
        let context = &request.context;
        let mut event = CalendarEvent::new(&request.user_id);
        event.title = context.get("title").and_then(|v| v.as_str()).unwrap_or(&request.message).to_string();
        event.description = context.get("description").and_then(|v| v.as_str()).unwrap_or("").to_string();
        event.event_type = context
            .get("event_type")
            .and_then(|v| v.as_str())
            .and_then(|v| serde_json::from_value(json!(v)).ok())
            .unwrap_or(EventType::Meeting);
        event.location = context.get("location").and_then(|v| v.as_str()).map(String::from);
        event.participants = context
            .get("participants")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|p| p.as_str().map(String::from)).collect())
            .unwrap_or_default();

        if let Some(start) = context.get("start_time").and_then(|v| v.as_str()) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(start) {
                event.start_time = Some(dt.with_timezone(&Utc));
            }
        }
        if let Some(end) = context.get("end_time").and_then(|v| v.as_str()) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(end) {
                event.end_time = Some(dt.with_timezone(&Utc));
            }
        }
        if context.get("all_day").and_then(|v| v.as_bool()).unwrap_or(false) {
            event.all_day = true;
        }
        if let Some(recurrence) = context.get("recurrence").and_then(|v| v.as_str()) {
            event.recurrence = serde_json::from_value(json!(recurrence)).ok();
        }

        let title = event.title.clone();
        self.store_event(event.clone()).await;
        tracing::info!(event_id = %event.id, user_id = %request.user_id, %title, "event_scheduled");

        SkillResponse::ok(request.id.clone(), format!("Scheduled: {title}")).with_data("event", event.to_json())
    }

    async fn handle_list(&self, request: &SkillRequest) -> SkillResponse {
        let days_ahead = request.context.get("days").and_then(|v| v.as_i64()).unwrap_or(7);
        let now = Utc::now();
        let cutoff = now + Duration::days(days_ahead);

        let mut upcoming: Vec<_> = self
            .user_events(&request.user_id)
            .await
            .into_iter()
            .filter(|e| e.start_time.is_some_and(|s| s >= now && s <= cutoff))
            .collect();
        upcoming.sort_by_key(|e| e.start_time);

        let count = upcoming.len();
        SkillResponse::ok(request.id.clone(), format!("Found {count} event(s) in the next {days_ahead} day(s)"))
            .with_data("events", json!(upcoming.iter().map(CalendarEvent::to_json).collect::<Vec<_>>()))
            .with_data("count", json!(count))
    }

    async fn handle_availability(&self, request: &SkillRequest) -> SkillResponse {
        let context = &request.context;
        let Some(start_str) = context.get("start_time").and_then(|v| v.as_str()) else {
            return SkillResponse::error_response(request.id.clone(), "No start_time provided");
        };
        let Ok(start) = DateTime::parse_from_rfc3339(start_str) else {
            return SkillResponse::error_response(request.id.clone(), "Invalid time format");
        };
        let start = start.with_timezone(&Utc);
        let end = match context.get("end_time").and_then(|v| v.as_str()) {
            Some(end_str) => match DateTime::parse_from_rfc3339(end_str) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(_) => return SkillResponse::error_response(request.id.clone(), "Invalid time format"),
            },
            None => start + Duration::hours(1),
        };

        let conflicts: Vec<_> = self
            .user_events(&request.user_id)
            .await
            .into_iter()
            .filter(|e| match (e.start_time, e.effective_end()) {
                (Some(e_start), Some(e_end)) => e_start < end && e_end > start,
                _ => false,
            })
            .collect();
        let available = conflicts.is_empty();

        let message = if available { "Available".to_string() } else { format!("Busy - {} conflict(s)", conflicts.len()) };
        SkillResponse::ok(request.id.clone(), message)
            .with_data("available", json!(available))
            .with_data("conflicts", json!(conflicts.iter().map(CalendarEvent::to_json).collect::<Vec<_>>()))
    }

    async fn handle_today(&self, request: &SkillRequest) -> SkillResponse {
        let mut todays: Vec<_> = self.user_events(&request.user_id).await.into_iter().filter(CalendarEvent::is_today).collect();
        todays.sort_by_key(|e| e.start_time);

        let message = if todays.is_empty() { "No events scheduled for today".to_string() } else { format!("Today: {} event(s)", todays.len()) };
        SkillResponse::ok(request.id.clone(), message)
            .with_data("events", json!(todays.iter().map(CalendarEvent::to_json).collect::<Vec<_>>()))
            .with_data("count", json!(todays.len()))
    }

    async fn handle_work_hours(&self, request: &SkillRequest) -> SkillResponse {
        let context = &request.context;
        let start_hour = context.get("start_hour").and_then(|v| v.as_u64()).unwrap_or(9) as u32;
        let end_hour = context.get("end_hour").and_then(|v| v.as_u64()).unwrap_or(17) as u32;
        let days: Vec<u32> = context
            .get("days")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|d| d.as_u64().map(|d| d as u32)).collect())
            .unwrap_or_else(|| vec![0, 1, 2, 3, 4]);

        let mut patterns = self.patterns.write().await;
        let entry = patterns.entry(request.user_id.clone()).or_default();
        for &day in &days {
            entry.push(SchedulePattern {
                user_id: request.user_id.clone(),
                pattern_type: "work_hours".to_string(),
                day_of_week: Some(day),
                start_hour,
                end_hour,
                confidence: 1.0,
            });
        }

        SkillResponse::ok(request.id.clone(), format!("Work hours set: {start_hour}:00 - {end_hour}:00"))
            .with_data("start_hour", json!(start_hour))
            .with_data("end_hour", json!(end_hour))
            .with_data("days", json!(days))
    }
}

#[async_trait]
impl Skill for CalendarSkill {
    fn metadata(&self) -> SkillMetadata {
        SkillMetadata {
            name: "calendar".to_string(),
            description: "Calendar awareness, schedule tracking, and meeting preparation".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSet::new([
                Permission::ReadOwnCollection,
                Permission::WriteOwnCollection,
                Permission::SendMessages,
                Permission::ReadProfile,
            ]),
            collections: vec!["skill_calendar".to_string()],
            intents: vec![
                "schedule_event".to_string(),
                "list_events".to_string(),
                "check_availability".to_string(),
                "today_schedule".to_string(),
                "set_work_hours".to_string(),
            ],
        }
    }

    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    async fn handle(&self, request: SkillRequest) -> SkillResponse {
        match request.intent.as_str() {
            "schedule_event" => self.handle_schedule(&request).await,
            "list_events" => self.handle_list(&request).await,
            "check_availability" => self.handle_availability(&request).await,
            "today_schedule" => self.handle_today(&request).await,
            "set_work_hours" => self.handle_work_hours(&request).await,
            other => SkillResponse::error_response(request.id.clone(), format!("Unknown intent: {other}")),
        }
    }

    async fn on_heartbeat(&self, user_ids: &[String]) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();
        let now = Utc::now();

        for user_id in user_ids {
            let events = self.user_events(user_id).await;

            if (6..=9).contains(&now.hour()) {
                let todays: Vec<_> = events.iter().filter(|e| e.is_today()).collect();
                if !todays.is_empty() {
                    actions.push(
                        HeartbeatAction::new("calendar", "morning_briefing", user_id, 7)
                            .with_data("events", json!(todays.iter().map(|e| e.to_json()).collect::<Vec<_>>()))
                            .with_data("count", json!(todays.len())),
                    );
                }
            }

            for event in &events {
                if let Some(start) = event.start_time {
                    let until = start - now;
                    if until > Duration::minutes(10) && until < Duration::minutes(20) {
                        actions.push(
                            HeartbeatAction::new("calendar", "meeting_prep", user_id, 9)
                                .with_data("event", event.to_json())
                                .with_data("minutes_until", json!(until.num_minutes())),
                        );
                    }
                }
            }

            if (17..=18).contains(&now.hour()) {
                let tomorrow = (now + Duration::days(1)).date_naive();
                let tomorrows: Vec<_> = events.iter().filter(|e| e.start_time.is_some_and(|s| s.date_naive() == tomorrow)).collect();
                if !tomorrows.is_empty() {
                    actions.push(
                        HeartbeatAction::new("calendar", "end_of_day", user_id, 5)
                            .with_data("tomorrow_events", json!(tomorrows.iter().map(|e| e.to_json()).collect::<Vec<_>>()))
                            .with_data("count", json!(tomorrows.len())),
                    );
                }
            }
        }

        actions
    }

    fn system_prompt_fragment(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn cleanup(&mut self) {
        self.events.write().await.clear();
        self.patterns.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(intent: &str, user_id: &str, context: HashMap<String, serde_json::Value>) -> SkillRequest {
        let mut req = SkillRequest::new(Uuid::new_v4().to_string(), user_id, intent, "");
        req.context = context;
        req
    }

    #[tokio::test]
    async fn schedule_then_list_roundtrips() {
        let skill = CalendarSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("title".to_string(), json!("standup"));
        ctx.insert("start_time".to_string(), json!((Utc::now() + Duration::hours(2)).to_rfc3339()));
        skill.handle(request("schedule_event", "u1", ctx)).await;

        let response = skill.handle(request("list_events", "u1", HashMap::new())).await;
        assert!(response.success);
        assert_eq!(response.data["count"], json!(1));
    }

    #[tokio::test]
    async fn availability_detects_overlap() {
        let skill = CalendarSkill::new();
        let start = Utc::now() + Duration::hours(3);
        let mut ctx = HashMap::new();
        ctx.insert("title".to_string(), json!("review"));
        ctx.insert("start_time".to_string(), json!(start.to_rfc3339()));
        ctx.insert("end_time".to_string(), json!((start + Duration::hours(1)).to_rfc3339()));
        skill.handle(request("schedule_event", "u1", ctx)).await;

        let mut check_ctx = HashMap::new();
        check_ctx.insert("start_time".to_string(), json!((start + Duration::minutes(30)).to_rfc3339()));
        let response = skill.handle(request("check_availability", "u1", check_ctx)).await;
        assert_eq!(response.data["available"], json!(false));
    }

    #[tokio::test]
    async fn availability_without_conflict_is_free() {
        let skill = CalendarSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("start_time".to_string(), json!((Utc::now() + Duration::days(5)).to_rfc3339()));
        let response = skill.handle(request("check_availability", "u1", ctx)).await;
        assert_eq!(response.data["available"], json!(true));
    }

    #[tokio::test]
    async fn set_work_hours_creates_pattern_per_day() {
        let skill = CalendarSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("start_hour".to_string(), json!(9));
        ctx.insert("end_hour".to_string(), json!(17));
        ctx.insert("days".to_string(), json!([0, 1, 2]));
        let response = skill.handle(request("set_work_hours", "u1", ctx)).await;
        assert!(response.success);
        assert_eq!(skill.patterns.read().await.get("u1").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn heartbeat_meeting_prep_fires_within_window() {
        let skill = CalendarSkill::new();
        let mut ctx = HashMap::new();
        ctx.insert("title".to_string(), json!("1:1"));
        ctx.insert("start_time".to_string(), json!((Utc::now() + Duration::minutes(15)).to_rfc3339()));
        skill.handle(request("schedule_event", "u1", ctx)).await;

        let actions = skill.on_heartbeat(&["u1".to_string()]).await;
        assert!(actions.iter().any(|a| a.action_type == "meeting_prep"));
    }
}
