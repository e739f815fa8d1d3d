//! Model catalog
//!
//! Built once at startup from configuration. Holds every invoker, the three
//! tier tables with their precomputed effective timeouts, and the key index
//! used by explicit fallback lists. Read-only afterwards, so it is shared
//! between requests without locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::types::{ModelDescriptor, TierKey};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{InvokerFactory, ModelInvoker};

/// A configured model together with its invoker
#[derive(Clone)]
pub struct CatalogEntry {
    pub descriptor: ModelDescriptor,
    pub invoker: Arc<dyn ModelInvoker>,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("key", &self.descriptor.key)
            .field("invoker", &self.invoker.display_name())
            .finish()
    }
}

/// A tier's members and its shared time budget
#[derive(Debug, Clone)]
pub struct Tier {
    key: TierKey,
    members: Vec<CatalogEntry>,
    effective_timeout: Duration,
}

impl Tier {
    pub fn key(&self) -> TierKey {
        self.key
    }

    pub fn members(&self) -> &[CatalogEntry] {
        &self.members
    }

    /// Longest per-model timeout among the members
    pub fn effective_timeout(&self) -> Duration {
        self.effective_timeout
    }
}

/// Max of the given timeouts, `None` when there are none
pub fn max_timeout<I>(timeouts: I) -> Option<Duration>
where
    I: IntoIterator<Item = Duration>,
{
    timeouts.into_iter().max()
}

/// Read-only model tables
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    fast: Tier,
    mid: Tier,
    reasoning: Tier,
    all: HashMap<String, CatalogEntry>,
}

impl ModelCatalog {
    /// Start assembling a catalog from explicit invokers
    pub fn builder() -> ModelCatalogBuilder {
        ModelCatalogBuilder::default()
    }

    /// Build every configured model with `factory`
    pub fn from_config(config: &Config, factory: &dyn InvokerFactory) -> Result<Self> {
        let mut builder = Self::builder();
        for (tier, model) in config.models.iter() {
            let descriptor = model.descriptor();
            let invoker = factory.build(&descriptor)?;
            builder = builder.model(tier, descriptor, invoker);
        }
        let catalog = builder.build()?;

        info!(
            fast = catalog.fast.members.len(),
            mid = catalog.mid.members.len(),
            reasoning = catalog.reasoning.members.len(),
            "Model catalog built"
        );
        Ok(catalog)
    }

    pub fn tier(&self, key: TierKey) -> &Tier {
        match key {
            TierKey::Fast => &self.fast,
            TierKey::Mid => &self.mid,
            TierKey::Reasoning => &self.reasoning,
        }
    }

    /// Look up a model by routing key across all tiers
    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.all.get(key)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Tiers cheapest first
    pub fn tiers(&self) -> impl Iterator<Item = &Tier> {
        [&self.fast, &self.mid, &self.reasoning].into_iter()
    }
}

/// Builder for ModelCatalog
#[derive(Default)]
pub struct ModelCatalogBuilder {
    entries: Vec<(TierKey, CatalogEntry)>,
}

impl ModelCatalogBuilder {
    /// Add a model to a tier
    pub fn model(
        mut self,
        tier: TierKey,
        descriptor: ModelDescriptor,
        invoker: Arc<dyn ModelInvoker>,
    ) -> Self {
        self.entries.push((tier, CatalogEntry { descriptor, invoker }));
        self
    }

    /// Validate and freeze the tables.
    ///
    /// Fails when a tier is empty, a key repeats, or a timeout is zero.
    pub fn build(self) -> Result<ModelCatalog> {
        let mut all = HashMap::with_capacity(self.entries.len());
        let mut by_tier: HashMap<TierKey, Vec<CatalogEntry>> = HashMap::new();

        for (tier, entry) in self.entries {
            let key = entry.descriptor.key.clone();
            if entry.descriptor.timeout.is_zero() {
                return Err(Error::ConfigError(format!(
                    "Model '{}' must have a positive timeout",
                    key
                )));
            }
            if all.insert(key.clone(), entry.clone()).is_some() {
                return Err(Error::ConfigError(format!(
                    "Model key '{}' is configured more than once",
                    key
                )));
            }
            by_tier.entry(tier).or_default().push(entry);
        }

        let mut take = |key: TierKey| -> Result<Tier> {
            let members = by_tier.remove(&key).unwrap_or_default();
            let effective_timeout = max_timeout(members.iter().map(|m| m.descriptor.timeout))
                .ok_or_else(|| {
                    Error::ConfigError(format!("Tier '{}' has no models configured", key))
                })?;
            Ok(Tier {
                key,
                members,
                effective_timeout,
            })
        };

        Ok(ModelCatalog {
            fast: take(TierKey::Fast)?,
            mid: take(TierKey::Mid)?,
            reasoning: take(TierKey::Reasoning)?,
            all,
        })
    }
}
