//! Corvus process entry point: loads configuration, wires every crate in
//! the workspace into one long-lived daemon, and runs the Skill RPC HTTP
//! surface alongside the heartbeat scheduler until a shutdown signal
//! arrives.

use std::sync::Arc;

use corvus_broker::{ClaudeClient, GeminiClient, InferenceBroker, OllamaClient, OpenAiClient, ProviderClient};
use corvus_config::{AppConfig, DynamicConfig};
use corvus_costs::CostTracker;
use corvus_daemon::{api_router, AppState, ClientRouterBackend, HeartbeatQueueHandler, RegistryActionsSource, TransportActionExecutor};
use corvus_memory::InMemoryStore;
use corvus_orchestrator::MessageOrchestrator;
use corvus_queue::PriorityQueue;
use corvus_router::IntentRouter;
use corvus_scheduler::HeartbeatScheduler;
use corvus_skills::calendar::CalendarSkill;
use corvus_skills::dev_watcher::DevWatcherSkill;
use corvus_skills::milestone::MilestoneSkill;
use corvus_skills::stubs::{GmailSkill, PersonalModelSkill, ProfileManagerSkill, YoutubeStrategySkill};
use corvus_skills::task_manager::TaskManagerSkill;
use corvus_skills::youtube::{YouTubeIntelligenceSkill, YouTubeManagementSkill};
use corvus_skills::SkillRegistry;
use corvus_transport::LoggingTransport;
use corvus_types::{Provider, Skill};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = AppConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .init();

    if config.has_no_remote_providers() {
        tracing::warn!("no remote provider credentials configured; falling back to Ollama only");
    }

    std::fs::create_dir_all(&config.daemon.data_dir).expect("failed to create data directory");

    let (broker, classifier_client, fallback_client) = build_broker(&config);

    let primary_backend = Box::new(ClientRouterBackend::new(classifier_client));
    let fallback_backend: Option<Box<dyn corvus_router::RouterBackend>> =
        fallback_client.map(|client| Box::new(ClientRouterBackend::new(client)) as Box<_>);
    let router = Arc::new(IntentRouter::new(primary_backend, fallback_backend));

    let queue_path = format!("{}/queue.redb", config.daemon.data_dir);
    let queue = Arc::new(PriorityQueue::open(&queue_path).expect("failed to open priority queue"));

    let trust = Arc::new(corvus_trust::TrustManager::new());
    let skills = Arc::new(build_skill_registry(Arc::clone(&trust)).await);
    let memory = Arc::new(InMemoryStore::new());

    let orchestrator = Arc::new(MessageOrchestrator::new(
        Arc::clone(&router),
        Arc::clone(&broker),
        Arc::clone(&skills),
        memory,
    ));

    let dynamic_config = Arc::new(DynamicConfig::from_app_config(&config));
    let transport = Arc::new(LoggingTransport::new());
    let executor: Arc<dyn corvus_scheduler::ActionExecutor> =
        Arc::new(TransportActionExecutor::new(transport));
    let actions_source: Arc<dyn corvus_scheduler::SkillActionsSource> =
        Arc::new(RegistryActionsSource::new(Arc::clone(&skills)));

    let scheduler = Arc::new(
        HeartbeatScheduler::new(
            actions_source,
            Arc::clone(&executor),
            Arc::clone(&dynamic_config),
            config.scheduler.max_actions_per_beat,
        )
        .with_queue(Arc::clone(&queue)),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let queue_handler = Arc::new(HeartbeatQueueHandler::new(executor));
    let queue_task = {
        let queue = Arc::clone(&queue);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            corvus_queue::run_consumer_loop(
                queue,
                queue_handler,
                std::time::Duration::from_secs(2),
                shutdown_rx,
            )
            .await
        })
    };

    let state = AppState::new(skills, orchestrator, trust);
    let app = api_router(state);
    let listener = tokio::net::TcpListener::bind(&config.daemon.http_bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {}: {err}", config.daemon.http_bind_addr));
    tracing::info!(addr = %config.daemon.http_bind_addr, "corvusd listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(%err, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;
    let _ = queue_task.await;
}

/// Builds the broker from whichever provider clients have credentials, and
/// separately returns the two clients the router's classification cascade
/// uses: the cheap primary model (Claude by default) and an Ollama
/// fallback, so the router never competes with the broker's own
/// capability-matrix routing for the same request.
fn build_broker(
    config: &AppConfig,
) -> (Arc<InferenceBroker>, Arc<dyn ProviderClient>, Option<Arc<dyn ProviderClient>>) {
    let mut clients: Vec<Arc<dyn ProviderClient>> = Vec::new();
    let mut available = Vec::new();

    let claude_client = config.providers.claude_api_key.as_ref().map(|key| {
        Arc::new(ClaudeClient::new(
            key.clone(),
            config.providers.claude_model.clone(),
            config.inference.request_timeout_secs,
        )) as Arc<dyn ProviderClient>
    });
    if let Some(client) = &claude_client {
        clients.push(Arc::clone(client));
        available.push(Provider::Claude);
    }

    if let Some(key) = &config.providers.openai_api_key {
        let client = Arc::new(OpenAiClient::new(
            key.clone(),
            config.providers.openai_model.clone(),
            config.inference.request_timeout_secs,
        ));
        clients.push(client);
        available.push(Provider::Openai);
    }

    if let Some(key) = &config.providers.gemini_api_key {
        let client = Arc::new(GeminiClient::new(
            key.clone(),
            config.providers.gemini_model.clone(),
            config.inference.request_timeout_secs,
        ));
        clients.push(client);
        available.push(Provider::Gemini);
    }

    let ollama_client = Arc::new(OllamaClient::new(
        config.providers.ollama_url.clone(),
        config.providers.ollama_model.clone(),
        config.providers.ollama_timeout_secs,
    ));
    clients.push(Arc::clone(&ollama_client) as Arc<dyn ProviderClient>);
    available.push(Provider::Ollama);

    let costs_path = format!("{}/costs.redb", config.daemon.data_dir);
    let cost_sink: Option<Arc<dyn corvus_types::CostSink>> =
        match CostTracker::open(&costs_path, config.costs.budget_alert_threshold_usd) {
            Ok(tracker) => Some(Arc::new(tracker)),
            Err(err) => {
                tracing::error!(%err, "failed to open cost tracker, proceeding without cost persistence");
                None
            }
        };

    let local_model = Some(config.providers.ollama_model.clone());
    let broker = Arc::new(InferenceBroker::new(clients, available, local_model, cost_sink));

    // The classifier always uses a fixed cheap model, grounded in
    // `router.classification_model`/`fallback_model` rather than the
    // broker's task-type-driven selection.
    let classifier_client: Arc<dyn ProviderClient> = claude_client.unwrap_or_else(|| {
        Arc::new(ClaudeClient::new(
            String::new(),
            config.router.classification_model.clone(),
            config.inference.request_timeout_secs,
        ))
    });
    let fallback_client: Option<Arc<dyn ProviderClient>> = Some(ollama_client);

    (broker, classifier_client, fallback_client)
}

async fn build_skill_registry(trust: Arc<corvus_trust::TrustManager>) -> SkillRegistry {
    let mut registry = SkillRegistry::new();

    register(&mut registry, TaskManagerSkill::new()).await;
    register(&mut registry, CalendarSkill::new()).await;
    register(&mut registry, DevWatcherSkill::new()).await;
    register(&mut registry, MilestoneSkill::new()).await;
    register(&mut registry, YouTubeManagementSkill::new().with_trust(trust)).await;
    register(&mut registry, YouTubeIntelligenceSkill::new()).await;
    register(&mut registry, ProfileManagerSkill::new()).await;
    register(&mut registry, PersonalModelSkill::new()).await;
    register(&mut registry, GmailSkill::new()).await;
    register(&mut registry, YoutubeStrategySkill::new()).await;

    registry
}

async fn register<S: Skill + 'static>(registry: &mut SkillRegistry, mut skill: S) {
    if let Err(err) = skill.initialize().await {
        tracing::error!(skill = skill.metadata().name, %err, "skill_initialize_failed");
    }
    registry.register(Box::new(skill));
}
