//! Tiered model routing
//!
//! This module decides which models serve a request and drives them. The
//! key components are:
//!
//! - **Admission gate**: caps concurrent calls into the blocking complexity
//!   scorer.
//! - **Tier thresholds**: map a complexity score to `fast`, `mid` or
//!   `reasoning`.
//! - **Candidate set builder**: resolves an explicit tier, an explicit
//!   fallback list, or a classified tier into ordered invokers plus a time
//!   budget.
//! - **Dispatcher**: sequential failover, or a concurrent race that cancels
//!   the losers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use smartroute_core::routing::{InvocationRequest, Router};
//!
//! let router = Router::from_config(&config, &factory, scorer)?;
//!
//! let outcome = router
//!     .route(InvocationRequest::new("Summarize this paragraph").with_latency_mode(true))
//!     .await?;
//! println!("{} answered: {}", outcome.model_used, outcome.output_text);
//! ```

mod candidates;
mod catalog;
mod dispatch;
mod gate;
mod router;
mod scorer;
mod tier;
mod types;

pub use candidates::{CandidateSetBuilder, DEFAULT_FALLBACK_TIMEOUT};
pub use catalog::{CatalogEntry, ModelCatalog, ModelCatalogBuilder, Tier, max_timeout};
pub use dispatch::{Completion, DispatchStrategy, Dispatcher};
pub use gate::{AdmissionGate, AdmissionPermit, DEFAULT_SCORER_CONCURRENCY};
pub use router::{DEFAULT_SYSTEM_PROMPT, Router, RouterBuilder};
pub use scorer::{ComplexityScorer, GatedScorer, LexicalScorer};
pub use tier::{DEFAULT_THRESHOLD_FAST, DEFAULT_THRESHOLD_MID, TierThresholds, decide_tier};
pub use types::{CandidateSet, InvocationOutcome, InvocationRequest, ModelDescriptor, TierKey};
