//! Built-in security policies.
//!
//! Priorities (higher runs first):
//! - domain blacklist: 100 — an explicit block always wins
//! - rate limit:        80
//! - trust:             60
//! - domain whitelist:  50
//! - content scan:      40

pub mod content_scan;
pub mod domains;
pub mod rate_limit;
pub mod trust;

pub use content_scan::ContentScanPolicy;
pub use domains::{DomainBlacklistPolicy, DomainWhitelistPolicy};
pub use rate_limit::RateLimitPolicy;
pub use trust::TrustRelationshipPolicy;

use std::sync::Arc;

use crate::security::engine::PolicyEngine;

/// Build an engine with the full built-in chain registered in the
/// documented priority order.
pub fn default_engine() -> PolicyEngine {
    let mut engine = PolicyEngine::new();
    engine.register(Arc::new(DomainBlacklistPolicy::new()));
    engine.register(Arc::new(RateLimitPolicy::new()));
    engine.register(Arc::new(TrustRelationshipPolicy::new()));
    engine.register(Arc::new(DomainWhitelistPolicy::new()));
    engine.register(Arc::new(ContentScanPolicy::default_signatures()));
    engine
}

/// Exact-or-suffix domain match: "corp.io" matches "corp.io" and
/// "mail.corp.io", but not "notcorp.io".
pub(crate) fn domain_matches(domain: &str, entry: &str) -> bool {
    let entry = entry.to_lowercase();
    domain == entry || domain.ends_with(&format!(".{entry}"))
}
