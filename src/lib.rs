//! Inbox Agents — email-driven agent routing and analysis core.

pub mod admin;
pub mod agents;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod ingest;
pub mod llm;
pub mod message;
pub mod queue;
pub mod report;
pub mod routing;
pub mod security;
pub mod store;
