//! Candidate dispatch
//!
//! Executes a resolved [`CandidateSet`] under one of two strategies:
//!
//! - **Sequential**: try candidates in order, first success wins. Each
//!   attempt gets the full effective timeout, so the worst case is
//!   `N x timeout`.
//! - **Concurrent**: launch every candidate at once and keep the first
//!   success. Losers are cancelled without being awaited. The worst case is
//!   one timeout.
//!
//! A timeout and an invocation error are the same thing here: the candidate
//! drops out of contention. Only total exhaustion reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::types::CandidateSet;
use crate::error::{Error, Result};
use crate::llm::{InvokeError, Message, ModelInvoker};

/// How a candidate set is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchStrategy {
    /// Ordered failover
    #[default]
    Sequential,
    /// Race all candidates, cancel the losers
    Concurrent,
}

impl DispatchStrategy {
    pub fn from_latency_mode(latency_mode: bool) -> Self {
        if latency_mode {
            Self::Concurrent
        } else {
            Self::Sequential
        }
    }
}

impl std::fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// The winning reply and who produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub message: Message,
    pub model_used: String,
}

/// Stateless candidate executor
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn dispatch(
        &self,
        candidates: &CandidateSet,
        messages: Vec<Message>,
        strategy: DispatchStrategy,
    ) -> Result<Completion> {
        debug!(
            strategy = %strategy,
            candidates = candidates.len(),
            timeout = ?candidates.effective_timeout,
            "Dispatching request"
        );
        match strategy {
            DispatchStrategy::Sequential => self.sequential(candidates, messages).await,
            DispatchStrategy::Concurrent => self.concurrent(candidates, messages).await,
        }
    }

    /// Try candidates one after another until one succeeds
    pub async fn sequential(
        &self,
        candidates: &CandidateSet,
        messages: Vec<Message>,
    ) -> Result<Completion> {
        let timeout = candidates.effective_timeout;
        let mut attempted = 0;

        for invoker in &candidates.models {
            attempted += 1;
            let model = invoker.display_name().to_string();
            debug!(model = %model, attempt = attempted, "Invoking model");

            match attempt(Arc::clone(invoker), messages.clone(), timeout).await {
                Ok(message) => {
                    info!(model = %model, attempt = attempted, "Model responded");
                    return Ok(Completion {
                        message,
                        model_used: model,
                    });
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model invocation failed, trying next candidate");
                }
            }
        }

        error!(attempted, "All models failed to process the request");
        Err(Error::AllCandidatesFailed { attempted })
    }

    /// Race every candidate and keep the first success
    pub async fn concurrent(
        &self,
        candidates: &CandidateSet,
        messages: Vec<Message>,
    ) -> Result<Completion> {
        let timeout = candidates.effective_timeout;
        let attempted = candidates.len();
        let cancel = CancellationToken::new();
        let mut racers = JoinSet::new();

        for invoker in &candidates.models {
            let invoker = Arc::clone(invoker);
            let messages = messages.clone();
            let cancel = cancel.clone();
            racers.spawn(async move {
                let model = invoker.display_name().to_string();
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(InvokeError::Cancelled),
                    result = attempt(invoker, messages, timeout) => result,
                };
                (model, result)
            });
        }

        let race = async {
            while let Some(joined) = racers.join_next().await {
                match joined {
                    Ok((model, Ok(message))) => {
                        return Some(Completion {
                            message,
                            model_used: model,
                        });
                    }
                    Ok((model, Err(e))) => {
                        warn!(model = %model, error = %e, "Model invocation failed, still racing");
                    }
                    Err(e) if e.is_panic() => {
                        error!(error = %e, "Model invocation task panicked");
                    }
                    Err(e) => {
                        warn!(error = %e, "Model invocation task cancelled");
                    }
                }
            }
            None
        };

        // A budget too large to express as an instant means no race deadline.
        let winner = match Instant::now().checked_add(timeout) {
            Some(deadline) => tokio::time::timeout_at(deadline, race).await,
            None => Ok(race.await),
        };

        // Losers are told to stop and aborted; neither is awaited.
        let pending = racers.len();
        cancel.cancel();
        racers.abort_all();

        match winner {
            Ok(Some(completion)) => {
                info!(
                    model = %completion.model_used,
                    cancelled = pending,
                    "Model won the race"
                );
                Ok(completion)
            }
            Ok(None) => {
                error!(attempted, "All models failed to process the request");
                Err(Error::AllCandidatesFailed { attempted })
            }
            Err(_) => {
                error!(
                    attempted,
                    ?timeout,
                    "No model responded within the timeout period"
                );
                Err(Error::AllCandidatesFailed { attempted })
            }
        }
    }
}

/// One invocation under a deadline. Timeouts become `InvokeError::Timeout`.
async fn attempt(
    invoker: Arc<dyn ModelInvoker>,
    messages: Vec<Message>,
    timeout: Duration,
) -> std::result::Result<Message, InvokeError> {
    match tokio::time::timeout(timeout, invoker.invoke(messages, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(InvokeError::Timeout(timeout)),
    }
}
