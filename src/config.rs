//! Service configuration, read once from the environment at boot.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Domain the service owns, e.g. "agents.example.com".
    pub domain: String,
    /// Agent types with registered handlers.
    pub agent_types: Vec<String>,
    /// Hard ceiling on one message's dispatch.
    pub dispatch_timeout: Duration,
    /// Analysis worker poll interval.
    pub worker_poll_interval: Duration,
    /// Max queue items drained per worker tick.
    pub worker_batch_size: usize,
    /// Report cache freshness window.
    pub report_ttl: Duration,
    /// How long a cache miss waits on an in-flight build.
    pub report_wait_timeout: Duration,
    /// Local database path.
    pub db_path: String,
    /// Admin HTTP port.
    pub admin_port: u16,
    /// Provider API key; analysis falls back to heuristics without one.
    pub provider_api_key: Option<SecretString>,
    /// Provider model name.
    pub provider_model: String,
}

impl ServiceConfig {
    /// Load from the environment. Only the domain is required; everything
    /// else has a serviceable default. The returned config is the single
    /// fatal-on-error boundary at boot.
    pub fn from_env() -> Result<Self, ConfigError> {
        let domain = std::env::var("INBOX_AGENTS_DOMAIN")
            .map_err(|_| ConfigError::MissingEnvVar("INBOX_AGENTS_DOMAIN".into()))?;

        let agent_types = std::env::var("INBOX_AGENTS_TYPES")
            .unwrap_or_else(|_| "faq,report".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if agent_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_AGENTS_TYPES".into(),
                message: "no agent types configured".into(),
            });
        }

        Ok(Self {
            domain,
            agent_types,
            dispatch_timeout: Duration::from_secs(env_u64("INBOX_AGENTS_DISPATCH_TIMEOUT_SECS", 30)?),
            worker_poll_interval: Duration::from_secs(env_u64("INBOX_AGENTS_WORKER_INTERVAL_SECS", 30)?),
            worker_batch_size: env_u64("INBOX_AGENTS_WORKER_BATCH_SIZE", 25)? as usize,
            report_ttl: Duration::from_secs(env_u64("INBOX_AGENTS_REPORT_TTL_SECS", 900)?),
            report_wait_timeout: Duration::from_secs(env_u64("INBOX_AGENTS_REPORT_WAIT_SECS", 20)?),
            db_path: std::env::var("INBOX_AGENTS_DB_PATH")
                .unwrap_or_else(|_| "./data/inbox-agents.db".to_string()),
            admin_port: env_u64("INBOX_AGENTS_ADMIN_PORT", 8080)? as u16,
            provider_api_key: std::env::var("OPENAI_API_KEY").ok().map(SecretString::from),
            provider_model: std::env::var("INBOX_AGENTS_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("'{raw}' is not a number"),
        }),
        Err(_) => Ok(default),
    }
}
