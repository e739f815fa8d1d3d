//! The model invocation seam
//!
//! Every backend the router can dispatch to is a [`ModelInvoker`]. The
//! dispatcher only ever sees this trait: it never knows which SDK or
//! provider sits behind a candidate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::types::Message;
use crate::error::Result;
use crate::routing::ModelDescriptor;

/// Name reported when an adapter has nothing better to offer
pub const UNKNOWN_MODEL_NAME: &str = "unknown_model";

/// Failure of a single model invocation.
///
/// The dispatcher absorbs all variants identically; the distinction only
/// exists for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for InvokeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InvokeError::MalformedResponse(err.to_string())
        } else {
            InvokeError::Transport(err.to_string())
        }
    }
}

/// A remote text-generation backend
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// User-facing model name, already normalized by the adapter
    fn display_name(&self) -> &str;

    /// Send the conversation and return the assistant reply.
    ///
    /// `timeout` is the budget the caller will enforce; adapters should pass
    /// it down to their transport so abandoned requests do not linger.
    async fn invoke(
        &self,
        messages: Vec<Message>,
        timeout: Duration,
    ) -> std::result::Result<Message, InvokeError>;
}

/// Builds an invoker for a configured model
pub trait InvokerFactory: Send + Sync {
    fn build(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelInvoker>>;
}

/// Strip any provider path prefix from a model id.
///
/// `"models/gemini-2.0-flash"` becomes `"gemini-2.0-flash"`.
pub fn normalize_model_name(raw: &str) -> &str {
    let name = raw.rsplit('/').next().unwrap_or(raw).trim();
    if name.is_empty() {
        UNKNOWN_MODEL_NAME
    } else {
        name
    }
}
