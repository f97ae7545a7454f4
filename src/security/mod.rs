//! Security policy engine and built-in policies.
//!
//! Every inbound message is gated through an ordered chain of policies
//! before any agent logic runs. The engine is an explicitly constructed
//! service injected into the dispatcher — no global registries.

pub mod builtin;
pub mod config;
pub mod engine;
pub mod policy;

pub use config::{AgentSecurityConfig, ConfigRegistry};
pub use engine::PolicyEngine;
pub use policy::{RateLimitStatus, SecurityPolicy, ValidationResult};
