//! Candidate set resolution
//!
//! Turns a request into the ordered list of invokers the dispatcher will
//! try, plus the time budget for each attempt. Three paths:
//!
//! - **Fallback**: caller-ordered model keys, looked up across all tiers.
//! - **Explicit tier**: the tier's members, shuffled.
//! - **Classified**: score the prompt through the admission gate, pick the
//!   tier from the score, then as above.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::debug;

use super::catalog::{ModelCatalog, max_timeout};
use super::scorer::GatedScorer;
use super::tier::TierThresholds;
use super::types::{CandidateSet, InvocationRequest, TierKey};
use crate::error::{Error, Result};

/// Time budget for an empty fallback list
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

/// Resolves requests against a read-only catalog
#[derive(Debug, Clone)]
pub struct CandidateSetBuilder {
    catalog: Arc<ModelCatalog>,
    scorer: GatedScorer,
    thresholds: TierThresholds,
    fallback_timeout: Duration,
}

impl CandidateSetBuilder {
    pub fn new(catalog: Arc<ModelCatalog>, scorer: GatedScorer, thresholds: TierThresholds) -> Self {
        Self {
            catalog,
            scorer,
            thresholds,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    /// Override the budget used for empty fallback lists
    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Resolve the candidates for a request.
    ///
    /// Request-shape errors are returned before any scoring happens.
    pub async fn resolve(&self, request: &InvocationRequest) -> Result<CandidateSet> {
        match (&request.tier, &request.fallback) {
            (Some(_), Some(_)) => Err(Error::ConflictingSelection),
            (None, Some(keys)) => self.resolve_fallback(keys),
            (Some(tier), None) => self.resolve_tier(tier.parse()?),
            (None, None) => {
                let tier = self.classify(&request.text).await?;
                self.resolve_tier(tier)
            }
        }
    }

    /// Score the prompt and map the score to a tier
    pub async fn classify(&self, text: &str) -> Result<TierKey> {
        let score = self.scorer.score(text).await?;
        let tier = self.thresholds.decide(score);
        debug!(score, tier = %tier, "Determined tier from complexity score");
        Ok(tier)
    }

    /// Candidates for an explicit, ordered list of model keys.
    ///
    /// Order is preserved. Every key must exist; an empty list is accepted
    /// and gets the fallback budget.
    pub fn resolve_fallback(&self, keys: &[String]) -> Result<CandidateSet> {
        let entries = keys
            .iter()
            .map(|key| {
                self.catalog
                    .get(key)
                    .ok_or_else(|| Error::UnknownModel(key.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let effective_timeout = max_timeout(entries.iter().map(|e| e.descriptor.timeout))
            .unwrap_or(self.fallback_timeout);
        let models = entries.iter().map(|e| Arc::clone(&e.invoker)).collect();

        debug!(?keys, ?effective_timeout, "Resolved fallback models");
        Ok(CandidateSet::new(models, effective_timeout))
    }

    /// Candidates for a tier, in a fresh random order each call
    pub fn resolve_tier(&self, tier: TierKey) -> Result<CandidateSet> {
        let tier = self.catalog.tier(tier);
        let mut models: Vec<_> = tier
            .members()
            .iter()
            .map(|e| Arc::clone(&e.invoker))
            .collect();
        models.shuffle(&mut rand::thread_rng());

        let candidates = CandidateSet::new(models, tier.effective_timeout());
        debug!(
            tier = %tier.key(),
            models = ?candidates.names(),
            effective_timeout = ?candidates.effective_timeout,
            "Resolved tier models"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{InvokeError, Message, ModelInvoker, Provider};
    use crate::routing::gate::AdmissionGate;
    use crate::routing::scorer::ComplexityScorer;
    use crate::routing::types::ModelDescriptor;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedInvoker(String);

    #[async_trait]
    impl ModelInvoker for NamedInvoker {
        fn display_name(&self) -> &str {
            &self.0
        }

        async fn invoke(
            &self,
            _messages: Vec<Message>,
            _timeout: Duration,
        ) -> std::result::Result<Message, InvokeError> {
            Ok(Message::assistant("ok"))
        }
    }

    struct FixedScorer {
        score: f64,
        calls: AtomicUsize,
    }

    impl ComplexityScorer for FixedScorer {
        fn score(&self, _text: &str) -> anyhow::Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.score)
        }
    }

    fn builder_with_score(score: f64) -> (CandidateSetBuilder, Arc<FixedScorer>) {
        let mut catalog = ModelCatalog::builder();
        for (tier, key, secs) in [
            (TierKey::Fast, "fast-a", 10),
            (TierKey::Fast, "fast-b", 20),
            (TierKey::Fast, "fast-c", 15),
            (TierKey::Mid, "mid-a", 60),
            (TierKey::Reasoning, "reasoning-a", 300),
        ] {
            catalog = catalog.model(
                tier,
                ModelDescriptor::new(
                    key,
                    key,
                    Provider::Openai,
                    "OPENAI_API_KEY",
                    Duration::from_secs(secs),
                ),
                Arc::new(NamedInvoker(key.to_string())),
            );
        }
        let scorer = Arc::new(FixedScorer {
            score,
            calls: AtomicUsize::new(0),
        });
        let gated = GatedScorer::new(scorer.clone(), AdmissionGate::new(3));
        let builder = CandidateSetBuilder::new(
            Arc::new(catalog.build().unwrap()),
            gated,
            TierThresholds::default(),
        );
        (builder, scorer)
    }

    #[tokio::test]
    async fn test_conflicting_selection_skips_scoring() {
        let (builder, scorer) = builder_with_score(0.1);
        let request = InvocationRequest::new("q")
            .with_tier("fast")
            .with_fallback(["mid-a"]);

        let err = builder.resolve(&request).await.unwrap_err();
        assert!(matches!(err, Error::ConflictingSelection));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_preserves_order_and_takes_max_timeout() {
        let (builder, _) = builder_with_score(0.1);
        let request = InvocationRequest::new("q").with_fallback(["reasoning-a", "fast-a", "mid-a"]);

        let candidates = builder.resolve(&request).await.unwrap();
        assert_eq!(candidates.names(), vec!["reasoning-a", "fast-a", "mid-a"]);
        assert_eq!(candidates.effective_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_fallback_unknown_key() {
        let (builder, _) = builder_with_score(0.1);
        let request = InvocationRequest::new("q").with_fallback(["fast-a", "gpt-9"]);

        let err = builder.resolve(&request).await.unwrap_err();
        assert!(matches!(err, Error::UnknownModel(ref k) if k == "gpt-9"));
    }

    #[tokio::test]
    async fn test_empty_fallback_uses_fixed_budget() {
        let (builder, scorer) = builder_with_score(0.1);
        let request = InvocationRequest::new("q").with_fallback(Vec::<String>::new());

        let candidates = builder.resolve(&request).await.unwrap();
        assert!(candidates.is_empty());
        assert_eq!(candidates.effective_timeout, DEFAULT_FALLBACK_TIMEOUT);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_explicit_tier_uses_tier_budget() {
        let (builder, scorer) = builder_with_score(0.99);
        let request = InvocationRequest::new("q").with_tier("fast");

        let candidates = builder.resolve(&request).await.unwrap();
        let names: HashSet<_> = candidates.names().into_iter().collect();
        assert_eq!(
            names,
            HashSet::from(["fast-a".into(), "fast-b".into(), "fast-c".into()])
        );
        assert_eq!(candidates.effective_timeout, Duration::from_secs(20));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_tier() {
        let (builder, _) = builder_with_score(0.1);
        let request = InvocationRequest::new("q").with_tier("ultra");

        let err = builder.resolve(&request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTier(ref k) if k == "ultra"));
    }

    #[tokio::test]
    async fn test_classified_request_uses_score() {
        let (builder, scorer) = builder_with_score(0.35);
        let candidates = builder.resolve(&InvocationRequest::new("q")).await.unwrap();

        assert_eq!(candidates.names(), vec!["mid-a"]);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tier_order_is_randomized() {
        let (builder, _) = builder_with_score(0.1);
        let firsts: HashSet<String> = (0..200)
            .map(|_| builder.resolve_tier(TierKey::Fast).unwrap().names()[0].clone())
            .collect();
        assert!(firsts.len() > 1, "first candidate never changed: {firsts:?}");
    }
}
