//! Environment-driven configuration for the Corvus process.
//!
//! Every knob has a hardcoded default and can be overridden by an
//! environment variable (loaded through `dotenvy` from a `.env` file if one
//! is present). A handful of settings that operators expect to change
//! without a restart — quiet hours and the heartbeat interval — are also
//! exposed through [`DynamicConfig`], a read-through override table guarded
//! by a `tokio::sync::RwLock`.

use std::env;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "failed to parse env var, using default");
            default
        }),
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub classification_model: String,
    pub fallback_model: String,
    pub cascade_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            classification_model: env_string("CORVUS_ROUTER_MODEL", "claude-3-5-haiku-latest"),
            fallback_model: env_string("CORVUS_ROUTER_FALLBACK_MODEL", "llama3.1:8b"),
            cascade_timeout_ms: env_parsed("CORVUS_ROUTER_TIMEOUT_MS", 5_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: env_parsed("CORVUS_DEFAULT_MAX_TOKENS", 2048),
            default_temperature: env_parsed("CORVUS_DEFAULT_TEMPERATURE", 0.7),
            request_timeout_secs: env_parsed("CORVUS_INFERENCE_TIMEOUT_SECS", 60),
        }
    }
}

/// Per-provider credentials and model selection. Providers with no key set
/// are simply absent from `available_providers` at broker startup rather
/// than causing a fatal error, except where every provider is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub claude_api_key: Option<String>,
    pub claude_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub ollama_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            claude_api_key: env_opt_string("ANTHROPIC_API_KEY"),
            claude_model: env_string("CORVUS_CLAUDE_MODEL", "claude-3-5-sonnet-latest"),
            openai_api_key: env_opt_string("OPENAI_API_KEY"),
            openai_model: env_string("CORVUS_OPENAI_MODEL", "gpt-4o-mini"),
            gemini_api_key: env_opt_string("GEMINI_API_KEY"),
            gemini_model: env_string("CORVUS_GEMINI_MODEL", "gemini-1.5-flash"),
            ollama_url: env_string("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_model: env_string("CORVUS_OLLAMA_MODEL", "llama3.1:8b"),
            ollama_timeout_secs: env_parsed("CORVUS_OLLAMA_TIMEOUT_SECS", 30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_seconds: u64,
    pub quiet_start_hour: u32,
    pub quiet_end_hour: u32,
    pub max_actions_per_beat: usize,
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: env_parsed("CORVUS_HEARTBEAT_INTERVAL_SECONDS", 300),
            quiet_start_hour: env_parsed("CORVUS_QUIET_START_HOUR", 22),
            quiet_end_hour: env_parsed("CORVUS_QUIET_END_HOUR", 7),
            max_actions_per_beat: env_parsed("CORVUS_MAX_ACTIONS_PER_BEAT", 10),
            timezone: env_string("CORVUS_TIMEZONE", "UTC"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    pub promotion_threshold: f32,
    pub promotion_confidence_gate: f32,
    pub demotion_rejection_rate: f32,
    pub demotion_window: u32,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: env_parsed("CORVUS_TRUST_PROMOTION_THRESHOLD", 0.75),
            promotion_confidence_gate: env_parsed("CORVUS_TRUST_CONFIDENCE_GATE", 0.6),
            demotion_rejection_rate: env_parsed("CORVUS_TRUST_DEMOTION_REJECTION_RATE", 0.4),
            demotion_window: env_parsed("CORVUS_TRUST_DEMOTION_WINDOW", 10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostsConfig {
    pub budget_alert_threshold_usd: f64,
    pub daily_budget_usd: f64,
}

impl Default for CostsConfig {
    fn default() -> Self {
        Self {
            budget_alert_threshold_usd: env_parsed("CORVUS_BUDGET_ALERT_THRESHOLD_USD", 5.0),
            daily_budget_usd: env_parsed("CORVUS_DAILY_BUDGET_USD", 20.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_seconds: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: env_parsed("CORVUS_RATE_LIMIT_WINDOW_SECONDS", 60),
            max_requests: env_parsed("CORVUS_RATE_LIMIT_MAX_REQUESTS", 20),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: env_string("CORVUS_LOG_LEVEL", "info"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub http_bind_addr: String,
    pub data_dir: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_bind_addr: env_string("CORVUS_HTTP_BIND_ADDR", "127.0.0.1:8787"),
            data_dir: env_string("CORVUS_DATA_DIR", "./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub router: RouterConfig,
    pub inference: InferenceConfig,
    pub providers: ProvidersConfig,
    pub scheduler: SchedulerConfig,
    pub trust: TrustConfig,
    pub costs: CostsConfig,
    pub rate_limit: RateLimitConfig,
    pub telemetry: TelemetryConfig,
    pub daemon: DaemonConfig,
}

impl AppConfig {
    /// Loads `.env` (if present, via `dotenvy`) then builds the config from
    /// environment variables, falling back to defaults for anything unset
    /// or unparsable.
    pub fn load() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !matches!(err, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound)
            {
                tracing::warn!(%err, "failed to load .env file");
            }
        }
        Self::default()
    }

    /// True when no provider has a usable credential, meaning the broker
    /// can only ever reach Ollama (or nothing, if Ollama is unreachable
    /// too). The process still starts; callers decide whether that's fatal.
    pub fn has_no_remote_providers(&self) -> bool {
        self.providers.claude_api_key.is_none()
            && self.providers.openai_api_key.is_none()
            && self.providers.gemini_api_key.is_none()
    }
}

/// Runtime-tunable overrides for settings an operator expects to change
/// without restarting the process. Reads and writes go through an
/// `RwLock`; readers never block writers out for long since updates are
/// just field assignments.
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

#[derive(Debug)]
struct DynamicState {
    quiet_hours: QuietHours,
    heartbeat_interval_seconds: u64,
}

pub struct DynamicConfig {
    state: RwLock<DynamicState>,
}

impl DynamicConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            state: RwLock::new(DynamicState {
                quiet_hours: QuietHours {
                    start_hour: config.scheduler.quiet_start_hour,
                    end_hour: config.scheduler.quiet_end_hour,
                },
                heartbeat_interval_seconds: config.scheduler.interval_seconds,
            }),
        }
    }

    pub async fn quiet_hours(&self) -> QuietHours {
        self.state.read().await.quiet_hours
    }

    pub async fn set_quiet_hours(&self, start_hour: u32, end_hour: u32) {
        let mut state = self.state.write().await;
        state.quiet_hours = QuietHours { start_hour, end_hour };
    }

    pub async fn heartbeat_interval_seconds(&self) -> u64 {
        self.state.read().await.heartbeat_interval_seconds
    }

    pub async fn set_heartbeat_interval_seconds(&self, seconds: u64) {
        self.state.write().await.heartbeat_interval_seconds = seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_well_formed() {
        let config = AppConfig::default();
        assert!(config.scheduler.interval_seconds > 0);
        assert!(config.scheduler.quiet_start_hour < 24);
        assert!(config.scheduler.quiet_end_hour < 24);
        assert!(config.has_no_remote_providers());
    }

    #[tokio::test]
    async fn dynamic_config_overrides_are_read_through() {
        let config = AppConfig::default();
        let dynamic = DynamicConfig::from_app_config(&config);

        let initial = dynamic.quiet_hours().await;
        assert_eq!(initial.start_hour, config.scheduler.quiet_start_hour);

        dynamic.set_quiet_hours(23, 6).await;
        let updated = dynamic.quiet_hours().await;
        assert_eq!(updated.start_hour, 23);
        assert_eq!(updated.end_hour, 6);

        dynamic.set_heartbeat_interval_seconds(60).await;
        assert_eq!(dynamic.heartbeat_interval_seconds().await, 60);
    }
}
