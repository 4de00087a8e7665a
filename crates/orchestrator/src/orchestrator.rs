//! The message orchestrator (C13): the top-level pipeline ported
//! near-verbatim from `agent/core.py::Agent.generate_response` — classify,
//! dispatch by intent, persist the exchange (skipping lightweight
//! intents), then fire a background profile-extraction task that never
//! blocks the response.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use corvus_broker::InferenceBroker;
use corvus_memory::{MemoryKind, MemoryStore};
use corvus_router::IntentRouter;
use corvus_skills::SkillRegistry;
use corvus_transport::InboundEvent;
use corvus_types::{ChatRole, HistoryMessage, InferenceRequest, MessageIntent, SkillRequest};
use serde_json::json;
use uuid::Uuid;

use crate::skill_dispatch::{parse_sub_intent, skill_name_for_intent};
use crate::task_type::classify_task_type;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, concise personal assistant. \
You have access to the user's stored memories and recent conversation history; use them \
when relevant, and say so plainly when you don't know something rather than guessing.";

const HELP_TEXT: &str = "Hi! I'm your personal assistant. Here's what I can do:\n\n\
**Chat & Questions** - Ask me anything; simple questions get fast answers, complex tasks get \
deeper analysis.\n\
**Memory** - Say \"remember that...\" to store information, or ask \"what do you know \
about...\" to recall it.\n\
**Skills** - Tasks, calendar, dev journal, milestones, and YouTube channel management are all \
available; just ask.";

/// Extracts durable facts about the user from a completed exchange in the
/// background. The real pipeline (out of scope for this core, per spec.md
/// §1) is an external tiered-inference system; [`NoopProfileExtractor`]
/// stands in when none is configured.
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn extract(&self, user_id: i64, channel_id: i64, message: &str, response: &str);
}

#[derive(Default)]
pub struct NoopProfileExtractor;

#[async_trait]
impl ProfileExtractor for NoopProfileExtractor {
    async fn extract(&self, _user_id: i64, _channel_id: i64, _message: &str, _response: &str) {}
}

pub struct MessageOrchestrator {
    router: Arc<IntentRouter>,
    broker: Arc<InferenceBroker>,
    skills: Arc<SkillRegistry>,
    memory: Arc<dyn MemoryStore>,
    profile_extractor: Arc<dyn ProfileExtractor>,
    system_prompt: String,
    history_limit: usize,
    memory_limit: usize,
}

impl MessageOrchestrator {
    pub fn new(
        router: Arc<IntentRouter>,
        broker: Arc<InferenceBroker>,
        skills: Arc<SkillRegistry>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            router,
            broker,
            skills,
            memory,
            profile_extractor: Arc::new(NoopProfileExtractor),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: 10,
            memory_limit: 5,
        }
    }

    pub fn with_profile_extractor(mut self, extractor: Arc<dyn ProfileExtractor>) -> Self {
        self.profile_extractor = extractor;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Classifies `event`, dispatches it, persists the exchange (unless
    /// the intent is one of the two deliberately-not-persisted lightweight
    /// intents), then fires the background profile extraction. The memory
    /// writes for this turn are always issued before the extraction task
    /// is spawned, so extraction may observe the stored message.
    pub async fn handle_message(&self, event: InboundEvent) -> String {
        let routing = self.router.classify(&event.content).await;
        tracing::info!(
            intent = routing.intent.as_str(),
            confidence = routing.confidence,
            use_complex_model = routing.use_complex_model,
            "message_routed"
        );

        let response = if let Some(skill_name) = skill_name_for_intent(routing.intent) {
            self.handle_skill_intent(event.user_id, &event.content, skill_name).await
        } else {
            match routing.intent {
                MessageIntent::SimpleQuery => self.router.generate_simple_response(&event.content).await,
                MessageIntent::MemoryStore => self.handle_memory_store(&event.content, event.user_id).await,
                MessageIntent::MemoryRecall => self.handle_memory_recall(event.user_id, &event.content).await,
                MessageIntent::SystemCommand => Self::handle_system_command(&event.content),
                MessageIntent::ComplexTask => {
                    self.handle_complex_task(event.user_id, event.channel_id, &event.content).await
                }
                _ => unreachable!("every skill-bearing intent is handled by the branch above"),
            }
        };

        if !matches!(routing.intent, MessageIntent::SimpleQuery | MessageIntent::SystemCommand) {
            self.store_exchange(&event, &response, routing.intent).await;
        }

        self.spawn_profile_extraction(&event, &response);

        tracing::info!(
            intent = routing.intent.as_str(),
            response_len = response.len(),
            "generate_response_complete"
        );
        response
    }

    async fn handle_skill_intent(&self, user_id: i64, message: &str, skill_name: &str) -> String {
        let Some(skill) = self.skills.get(skill_name) else {
            return "I'm having trouble connecting to my skills service. Please try again in a moment."
                .to_string();
        };

        let sub_intent = parse_sub_intent(skill_name, message);
        let mut context = HashMap::new();
        context.insert("skill_name".to_string(), json!(skill_name));
        let request = SkillRequest {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            intent: sub_intent.to_string(),
            message: message.to_string(),
            context,
        };

        let response = skill.handle(request).await;
        if response.success {
            if response.message.is_empty() {
                "Done!".to_string()
            } else {
                response.message
            }
        } else {
            tracing::warn!(skill = skill_name, error = ?response.error, "skill_request_failed");
            format!("I had trouble with that: {}", response.error.unwrap_or_default())
        }
    }

    async fn handle_complex_task(&self, user_id: i64, channel_id: i64, message: &str) -> String {
        let user_id_s = user_id.to_string();
        let channel_id_s = channel_id.to_string();

        let (recent, memories) = tokio::join!(
            self.memory.get_recent_context(&user_id_s, &channel_id_s, self.history_limit),
            self.memory.search_memories(message, self.memory_limit, Some(&user_id_s)),
        );
        let recent = recent.unwrap_or_default();
        let memories = memories.unwrap_or_default();

        let mut system_prompt = self.system_prompt.clone();
        if !memories.is_empty() {
            let memory_text = memories
                .iter()
                .map(|m| format!("- {}", m.content))
                .collect::<Vec<_>>()
                .join("\n");
            system_prompt = format!("{system_prompt}\n\n## Relevant Memories\n{memory_text}");
        }

        let history: Vec<HistoryMessage> = recent
            .into_iter()
            .map(|turn| HistoryMessage {
                role: turn.role,
                content: turn.content,
            })
            .collect();

        let task_type = classify_task_type(message);
        let request = InferenceRequest::new(message, task_type)
            .with_system_prompt(system_prompt)
            .with_history(history);

        match self.broker.infer(&request).await {
            Ok(result) => result.content,
            Err(err) => {
                tracing::warn!(error = %err, "complex_task_inference_failed");
                "I'm having trouble processing that right now. Please try again in a moment.".to_string()
            }
        }
    }

    async fn handle_memory_store(&self, message: &str, user_id: i64) -> String {
        let extraction_prompt = format!(
            "The user wants to remember something. Extract just the key information to store.\n\n\
             User message: {message}\n\n\
             Respond with ONLY the fact/preference to remember, nothing else."
        );
        let extracted = self.router.generate_simple_response(&extraction_prompt).await;
        let extracted = extracted.trim().to_string();

        if let Err(err) = self
            .memory
            .store_memory(&extracted, MemoryKind::Semantic, Some(&user_id.to_string()), None)
            .await
        {
            tracing::warn!(error = %err, "memory_store_failed");
        }
        format!("Got it! I'll remember: {extracted}")
    }

    async fn handle_memory_recall(&self, user_id: i64, query: &str) -> String {
        let user_id_s = user_id.to_string();
        let (memories, conversations) = tokio::join!(
            self.memory.search_memories(query, 5, Some(&user_id_s)),
            self.memory.search_conversations(query, &user_id_s, 5),
        );
        let memories = memories.unwrap_or_default();
        let conversations = conversations.unwrap_or_default();

        if memories.is_empty() && conversations.is_empty() {
            return "I don't have any memories related to that. Would you like to tell me about it?"
                .to_string();
        }

        let mut parts = Vec::new();
        if !memories.is_empty() {
            let text = memories.iter().map(|m| format!("- {}", m.content)).collect::<Vec<_>>().join("\n");
            parts.push(format!("Stored memories:\n{text}"));
        }
        if !conversations.is_empty() {
            let text = conversations
                .iter()
                .map(|c| format!("- [{:?}]: {}", c.role, truncate(&c.content, 100)))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("Past conversations:\n{text}"));
        }

        let context_text = parts.join("\n");
        let summary_prompt = format!(
            "The user is asking: {query}\n\n\
             Here's what I found in my memory:\n{context_text}\n\n\
             Summarize what I know about this in a helpful, conversational way."
        );
        self.router.generate_simple_response(&summary_prompt).await
    }

    fn handle_system_command(message: &str) -> String {
        let lower = message.to_ascii_lowercase();
        if lower.contains("help") || lower.contains("what can you do") {
            HELP_TEXT.to_string()
        } else {
            "I'm not sure what you're asking. Try saying 'help' to see what I can do!".to_string()
        }
    }

    async fn store_exchange(&self, event: &InboundEvent, response: &str, intent: MessageIntent) {
        let user_id_s = event.user_id.to_string();
        let channel_id_s = event.channel_id.to_string();
        let mut metadata = HashMap::new();
        metadata.insert("intent".to_string(), json!(intent.as_str()));

        if let Err(err) = self
            .memory
            .store_message(&user_id_s, &channel_id_s, ChatRole::User, &event.content, Some(metadata))
            .await
        {
            tracing::warn!(error = %err, "store_user_turn_failed");
        }
        if let Err(err) = self
            .memory
            .store_message(&user_id_s, &channel_id_s, ChatRole::Assistant, response, None)
            .await
        {
            tracing::warn!(error = %err, "store_assistant_turn_failed");
        }
    }

    fn spawn_profile_extraction(&self, event: &InboundEvent, response: &str) {
        let extractor = self.profile_extractor.clone();
        let user_id = event.user_id;
        let channel_id = event.channel_id;
        let message = event.content.clone();
        let response = response.to_string();
        tokio::spawn(async move {
            extractor.extract(user_id, channel_id, &message, &response).await;
        });
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_memory::InMemoryStore;
    use corvus_router::{IntentRouter, RouterBackend, RouterError};
    use corvus_skills::SkillRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        decision_json: &'static str,
        simple_responses: Arc<tokio::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RouterBackend for ScriptedBackend {
        async fn classify_raw(&self, _text: &str) -> Result<String, RouterError> {
            Ok(self.decision_json.to_string())
        }

        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, RouterError> {
            let mut responses = self.simple_responses.lock().await;
            if responses.is_empty() {
                Ok("hi there".to_string())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn router_for(decision_json: &'static str, simple_responses: Vec<&str>) -> Arc<IntentRouter> {
        let backend = ScriptedBackend {
            decision_json,
            simple_responses: Arc::new(tokio::sync::Mutex::new(
                simple_responses.into_iter().map(String::from).collect(),
            )),
        };
        Arc::new(IntentRouter::new(Box::new(backend), None))
    }

    fn broker() -> Arc<InferenceBroker> {
        Arc::new(InferenceBroker::new(vec![], vec![], None, None))
    }

    fn orchestrator(decision_json: &'static str, simple_responses: Vec<&str>) -> MessageOrchestrator {
        MessageOrchestrator::new(
            router_for(decision_json, simple_responses),
            broker(),
            Arc::new(SkillRegistry::new()),
            Arc::new(InMemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn simple_query_is_not_persisted_to_memory() {
        let orch = orchestrator(
            r#"{"intent": "SIMPLE_QUERY", "confidence": 0.95, "reasoning": "greeting"}"#,
            vec!["Hello to you too!"],
        );
        let response = orch
            .handle_message(InboundEvent {
                user_id: 1,
                channel_id: 1,
                content: "Hello!".to_string(),
            })
            .await;
        assert_eq!(response, "Hello to you too!");

        let context = orch.memory.get_recent_context("1", "1", 10).await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn memory_store_intent_persists_and_confirms() {
        let orch = orchestrator(
            r#"{"intent": "MEMORY_STORE", "confidence": 0.9, "reasoning": "remember"}"#,
            vec!["user likes tea"],
        );
        let response = orch
            .handle_message(InboundEvent {
                user_id: 2,
                channel_id: 2,
                content: "remember that I like tea".to_string(),
            })
            .await;
        assert!(response.contains("user likes tea"));

        let context = orch.memory.get_recent_context("2", "2", 10).await.unwrap();
        assert_eq!(context.len(), 2);
    }

    #[tokio::test]
    async fn system_command_help_returns_help_text_and_is_not_persisted() {
        let orch = orchestrator(
            r#"{"intent": "SYSTEM_COMMAND", "confidence": 0.99, "reasoning": "help"}"#,
            vec![],
        );
        let response = orch
            .handle_message(InboundEvent {
                user_id: 3,
                channel_id: 3,
                content: "help".to_string(),
            })
            .await;
        assert!(response.contains("personal assistant"));
        let context = orch.memory.get_recent_context("3", "3", 10).await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn unregistered_skill_intent_returns_graceful_message() {
        let orch = orchestrator(
            r#"{"intent": "TASK_MANAGEMENT", "confidence": 0.9, "reasoning": "task"}"#,
            vec![],
        );
        let response = orch
            .handle_message(InboundEvent {
                user_id: 4,
                channel_id: 4,
                content: "add a task".to_string(),
            })
            .await;
        assert!(response.contains("trouble connecting"));
    }

    #[tokio::test]
    async fn profile_extraction_is_fired_without_blocking_the_response() {
        struct CountingExtractor(Arc<AtomicUsize>);
        #[async_trait]
        impl ProfileExtractor for CountingExtractor {
            async fn extract(&self, _user_id: i64, _channel_id: i64, _message: &str, _response: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let count = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            r#"{"intent": "SIMPLE_QUERY", "confidence": 0.9, "reasoning": "hi"}"#,
            vec!["hi!"],
        )
        .with_profile_extractor(Arc::new(CountingExtractor(count.clone())));

        orch.handle_message(InboundEvent {
            user_id: 5,
            channel_id: 5,
            content: "hi".to_string(),
        })
        .await;

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
