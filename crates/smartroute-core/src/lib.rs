//! SmartRoute Core Library
//!
//! This crate provides the core functionality for SmartRoute, including:
//! - Tier resolution from a prompt complexity score
//! - Candidate set resolution (explicit tier, explicit fallback, classified)
//! - Sequential failover and concurrent race dispatch
//! - Admission control for the complexity scorer
//! - HTTP invokers for OpenAI, Anthropic and Gemini
//! - Conversation history keyed by context token
//! - Configuration with file persistence

pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod routing;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::llm::{Message, ModelInvoker};
    pub use crate::routing::{InvocationOutcome, InvocationRequest, Router, TierKey};
}
