//! LLM integration
//!
//! This module provides:
//! - The `ModelInvoker` seam every backend implements
//! - Provider-neutral conversation messages
//! - An HTTP invoker for OpenAI, Anthropic and Gemini endpoints

mod client;
mod invoker;
mod types;

pub use client::{HttpInvoker, HttpInvokerBuilder, HttpInvokerFactory};
pub use invoker::{
    InvokeError, InvokerFactory, ModelInvoker, UNKNOWN_MODEL_NAME, normalize_model_name,
};
pub use types::{Message, MessageRole, Provider};
