//! Sliding fixed-window rate limiting per (sender, agent).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::PolicyError;
use crate::message::InboundEmail;
use crate::routing::VisibilityContext;
use crate::security::config::{AgentSecurityConfig, RATE_LIMIT_WINDOW_SECS};
use crate::security::policy::{RateLimitStatus, SecurityPolicy, ValidationResult};

/// One counting window for a (sender, agent) pair.
#[derive(Debug, Clone)]
struct Window {
    count: u32,
    resets_at: DateTime<Utc>,
}

/// Fixed-window request counter keyed by (sender, agent).
///
/// The window resets lazily: the first request with `now > resets_at`
/// starts a fresh window. Counters live in process memory only — a
/// multi-instance deployment would need a shared store.
pub struct RateLimitPolicy {
    windows: Mutex<HashMap<(String, String), Window>>,
    window: Duration,
}

impl RateLimitPolicy {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: Duration::seconds(RATE_LIMIT_WINDOW_SECS),
        }
    }

    /// Override the window length (tests).
    #[cfg(test)]
    pub fn with_window(window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Count one request and report the window state afterwards.
    fn record(&self, sender: &str, agent: &str) -> Window {
        let now = Utc::now();
        let mut windows = self.windows.lock().expect("rate limit lock poisoned");
        let entry = windows
            .entry((sender.to_string(), agent.to_string()))
            .or_insert_with(|| Window {
                count: 0,
                resets_at: now + self.window,
            });
        if now > entry.resets_at {
            entry.count = 0;
            entry.resets_at = now + self.window;
        }
        entry.count += 1;
        entry.clone()
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityPolicy for RateLimitPolicy {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn should_apply(
        &self,
        _email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> bool {
        cfg.max_requests_per_hour > 0
    }

    fn validate(
        &self,
        email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> Result<ValidationResult, PolicyError> {
        let window = self.record(&email.sender, &cfg.agent);
        let status = RateLimitStatus {
            current_count: window.count,
            limit: cfg.max_requests_per_hour,
            resets_at: window.resets_at,
        };

        if window.count > cfg.max_requests_per_hour {
            debug!(
                sender = %email.sender,
                agent = %cfg.agent,
                count = window.count,
                limit = cfg.max_requests_per_hour,
                "Rate limit exceeded"
            );
            return Ok(ValidationResult::deny(format!(
                "rate limit exceeded: {} of {} requests this hour",
                window.count, cfg.max_requests_per_hour
            ))
            .with_rate_limit(status));
        }

        Ok(ValidationResult::allow().with_rate_limit(status))
    }
}
