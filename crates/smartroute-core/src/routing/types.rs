//! Types for tiered model routing
//!
//! Process-wide types (`TierKey`, `ModelDescriptor`) are built once from
//! configuration. Per-request types (`InvocationRequest`, `CandidateSet`,
//! `InvocationOutcome`) live for the duration of one `route` call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::llm::{ModelInvoker, Provider, normalize_model_name};

/// One of the three ordered model tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKey {
    /// Cheap, low-latency models for simple prompts
    Fast,
    /// General-purpose models
    Mid,
    /// Slow reasoning models for complex prompts
    Reasoning,
}

impl TierKey {
    /// All tiers, cheapest first
    pub const ALL: [TierKey; 3] = [TierKey::Fast, TierKey::Mid, TierKey::Reasoning];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Mid => "mid",
            Self::Reasoning => "reasoning",
        }
    }
}

impl std::fmt::Display for TierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TierKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Self::Fast),
            "mid" => Ok(Self::Mid),
            "reasoning" => Ok(Self::Reasoning),
            _ => Err(Error::InvalidTier(s.to_string())),
        }
    }
}

/// A configured backend model. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Globally unique routing key (e.g., "claude-fast")
    pub key: String,
    /// Provider model id (e.g., "claude-3-5-haiku-20241022")
    pub name: String,
    /// Provider family
    pub provider: Provider,
    /// Environment variable holding the provider credential
    pub api_key_env: String,
    /// Per-invocation time budget
    pub timeout: Duration,
}

impl ModelDescriptor {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        provider: Provider,
        api_key_env: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            provider,
            api_key_env: api_key_env.into(),
            timeout,
        }
    }

    /// Model name as reported to callers
    pub fn display_name(&self) -> &str {
        normalize_model_name(&self.name)
    }
}

/// An inbound routing request
///
/// `tier` is kept as the raw caller-supplied string so that unknown tiers
/// surface as [`Error::InvalidTier`] at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Prompt text
    pub text: String,
    /// Explicit tier selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Explicit ordered model keys, bypassing tier selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<String>>,
    /// Race all candidates instead of trying them in order
    #[serde(default)]
    pub latency_mode: bool,
    /// Conversation to continue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_token: Option<String>,
}

impl InvocationRequest {
    /// Create a request that lets the classifier pick the tier
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_fallback<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_latency_mode(mut self, latency_mode: bool) -> Self {
        self.latency_mode = latency_mode;
        self
    }

    pub fn with_context_token(mut self, token: impl Into<String>) -> Self {
        self.context_token = Some(token.into());
        self
    }
}

/// Resolved, ordered candidates plus the time budget for each invocation
#[derive(Clone)]
pub struct CandidateSet {
    pub models: Vec<Arc<dyn ModelInvoker>>,
    pub effective_timeout: Duration,
}

impl CandidateSet {
    pub fn new(models: Vec<Arc<dyn ModelInvoker>>, effective_timeout: Duration) -> Self {
        Self {
            models,
            effective_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Display names in try order
    pub fn names(&self) -> Vec<String> {
        self.models
            .iter()
            .map(|m| m.display_name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for CandidateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateSet")
            .field("models", &self.names())
            .field("effective_timeout", &self.effective_timeout)
            .finish()
    }
}

/// Successful result of a `route` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// Text produced by the winning model
    pub output_text: String,
    /// Display name of the winning model
    pub model_used: String,
    /// Conversation token to continue this exchange
    pub context_token: String,
}
