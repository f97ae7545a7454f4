//! Recipient resolution and visibility classification.

pub mod resolver;
pub mod visibility;

pub use resolver::{AgentAddress, RecipientResolver};
pub use visibility::VisibilityContext;
