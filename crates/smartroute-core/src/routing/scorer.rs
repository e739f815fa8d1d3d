//! Complexity scoring
//!
//! The router consumes a scalar complexity score in `[0, 1]`. Where it comes
//! from is up to the embedder: the production deployment uses a pretrained
//! prompt classifier, while [`LexicalScorer`] is a deterministic keyword
//! heuristic good enough for local use and tests.
//!
//! Scorers are blocking. [`GatedScorer`] runs them on the blocking pool,
//! behind an [`AdmissionGate`].

use std::sync::Arc;

use tracing::{debug, error};

use super::gate::AdmissionGate;
use crate::error::{Error, Result};

/// A blocking prompt complexity scorer
pub trait ComplexityScorer: Send + Sync {
    /// Score the prompt. Values are expected in `[0, 1]`.
    fn score(&self, text: &str) -> anyhow::Result<f64>;
}

/// A scorer wrapped in an admission gate
#[derive(Clone)]
pub struct GatedScorer {
    scorer: Arc<dyn ComplexityScorer>,
    gate: AdmissionGate,
}

impl GatedScorer {
    pub fn new(scorer: Arc<dyn ComplexityScorer>, gate: AdmissionGate) -> Self {
        Self { scorer, gate }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Score `text` once a gate slot is free.
    ///
    /// The permit moves into the blocking task, so the slot stays held until
    /// the scorer actually returns even if this future is dropped first.
    pub async fn score(&self, text: &str) -> Result<f64> {
        let permit = self.gate.acquire().await?;
        let scorer = Arc::clone(&self.scorer);
        let text = text.to_string();

        debug!(in_flight = self.gate.in_flight(), "Scoring prompt complexity");

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            scorer.score(&text)
        })
        .await;

        match joined {
            Ok(Ok(score)) => Ok(score),
            Ok(Err(e)) => {
                error!(error = %e, "Complexity scorer failed");
                Err(Error::ScoringFailed(format!("{:#}", e)))
            }
            Err(e) => {
                error!(error = %e, "Complexity scorer task aborted");
                Err(Error::ScoringFailed(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for GatedScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedScorer")
            .field("gate", &self.gate)
            .finish()
    }
}

// Weights of the individual signals, summing to 1.0
const W_CREATIVITY: f64 = 0.35;
const W_REASONING: f64 = 0.25;
const W_CONSTRAINTS: f64 = 0.15;
const W_DOMAIN: f64 = 0.15;
const W_CONTEXT: f64 = 0.05;
const W_FEW_SHOT: f64 = 0.05;

const CREATIVITY_MARKERS: &[&str] = &[
    "story", "poem", "imagine", "creative", "brainstorm", "invent", "fiction", "lyrics",
    "novel", "character",
];

const REASONING_MARKERS: &[&str] = &[
    "why", "explain", "prove", "derive", "analyze", "analyse", "compare", "step by step",
    "reason", "evaluate", "design", "optimize", "trade-off", "tradeoff", "justify",
];

const CONSTRAINT_MARKERS: &[&str] = &[
    "must", "should", "without", "at least", "at most", "exactly", "only", "ensure",
    "format", "json", "no more than", "limit",
];

const DOMAIN_MARKERS: &[&str] = &[
    "```", "fn ", "def ", "class ", "theorem", "algorithm", "complexity", "sql", "integral",
    "equation", "protocol", "compiler", "kernel", "legal", "clinical",
];

const FEW_SHOT_MARKERS: &[&str] = &["example", "input:", "output:", "e.g."];

/// Keyword heuristic complexity scorer
///
/// Combines six saturating signals with fixed weights. Deterministic and
/// allocation-light; it does not try to match the classifier's numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score without the fallible trait wrapper
    pub fn score_text(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let words = lowered.split_whitespace().count();

        let creativity = saturate(count_markers(&lowered, CREATIVITY_MARKERS), 2.0);
        let reasoning = saturate(count_markers(&lowered, REASONING_MARKERS), 3.0);
        let constraints = saturate(count_markers(&lowered, CONSTRAINT_MARKERS), 4.0);
        let domain = saturate(count_markers(&lowered, DOMAIN_MARKERS), 3.0);
        let context = saturate(words, 400.0);
        let few_shot = saturate(count_markers(&lowered, FEW_SHOT_MARKERS), 3.0);

        let score = W_CREATIVITY * creativity
            + W_REASONING * reasoning
            + W_CONSTRAINTS * constraints
            + W_DOMAIN * domain
            + W_CONTEXT * context
            + W_FEW_SHOT * few_shot;

        score.clamp(0.0, 1.0)
    }
}

impl ComplexityScorer for LexicalScorer {
    fn score(&self, text: &str) -> anyhow::Result<f64> {
        Ok(self.score_text(text))
    }
}

fn count_markers(text: &str, markers: &[&str]) -> usize {
    markers.iter().map(|m| text.matches(m).count()).sum()
}

fn saturate(count: usize, ceiling: f64) -> f64 {
    (count as f64 / ceiling).min(1.0)
}
