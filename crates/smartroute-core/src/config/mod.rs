//! Configuration management with file persistence
//!
//! The configuration is loaded once at startup and turned into a read-only
//! [`ModelCatalog`](crate::routing::ModelCatalog). Nothing in the routing
//! core reads configuration after that.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::Provider;
use crate::routing::{
    DEFAULT_FALLBACK_TIMEOUT, DEFAULT_SCORER_CONCURRENCY, DEFAULT_THRESHOLD_FAST,
    DEFAULT_THRESHOLD_MID, ModelDescriptor, TierKey, TierThresholds,
};

/// Timeout for fast and mid tier models
const FAST_TIMEOUT_SECS: u64 = 60;

/// Timeout for reasoning models
const REASONING_TIMEOUT_SECS: u64 = 300;

/// Upper bound for any configured timeout (one day)
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// SmartRoute configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub routing: RoutingConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Scores below this go to the fast tier
    pub threshold_fast: f64,
    /// Scores below this (and at least `threshold_fast`) go to the mid tier
    pub threshold_mid: f64,
    /// Concurrent complexity scoring calls
    pub scorer_concurrency: usize,
    /// Time budget when an explicit fallback list is empty
    pub fallback_timeout_secs: u64,
}

/// Model tables, one list per tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub fast: Vec<ModelConfig>,
    pub mid: Vec<ModelConfig>,
    pub reasoning: Vec<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Routing key, unique across all tiers
    pub key: String,
    /// Provider model id
    pub name: String,
    pub provider: Provider,
    pub timeout_secs: u64,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
    /// Only present so that keys written into the file can be rejected
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ModelConfig {
    fn new(key: &str, name: &str, provider: Provider, timeout_secs: u64) -> Self {
        let api_key_env = match provider {
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::GoogleGenai => "GEMINI_API_KEY",
        };
        Self {
            key: key.to_string(),
            name: name.to_string(),
            provider,
            timeout_secs,
            api_key_env: api_key_env.to_string(),
            api_key: None,
        }
    }

    /// Runtime descriptor for this model
    pub fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor::new(
            self.key.clone(),
            self.name.clone(),
            self.provider,
            self.api_key_env.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing: RoutingConfig {
                threshold_fast: DEFAULT_THRESHOLD_FAST,
                threshold_mid: DEFAULT_THRESHOLD_MID,
                scorer_concurrency: DEFAULT_SCORER_CONCURRENCY,
                fallback_timeout_secs: DEFAULT_FALLBACK_TIMEOUT.as_secs(),
            },
            models: ModelsConfig {
                fast: vec![
                    ModelConfig::new(
                        "chatgpt-fast",
                        "gpt-4o-mini-2024-07-18",
                        Provider::Openai,
                        FAST_TIMEOUT_SECS,
                    ),
                    ModelConfig::new(
                        "gemini-fast",
                        "gemini-2.0-flash-lite",
                        Provider::GoogleGenai,
                        FAST_TIMEOUT_SECS,
                    ),
                    ModelConfig::new(
                        "claude-fast",
                        "claude-3-5-haiku-20241022",
                        Provider::Anthropic,
                        FAST_TIMEOUT_SECS,
                    ),
                ],
                mid: vec![
                    ModelConfig::new(
                        "chatgpt-mid",
                        "gpt-4o-2024-11-20",
                        Provider::Openai,
                        FAST_TIMEOUT_SECS,
                    ),
                    ModelConfig::new(
                        "claude-mid",
                        "claude-3-5-sonnet-latest",
                        Provider::Anthropic,
                        FAST_TIMEOUT_SECS,
                    ),
                    ModelConfig::new(
                        "gemini-mid",
                        "gemini-2.0-flash",
                        Provider::GoogleGenai,
                        FAST_TIMEOUT_SECS,
                    ),
                ],
                reasoning: vec![
                    ModelConfig::new(
                        "chatgpt-reasoning",
                        "o3-mini-2025-01-31",
                        Provider::Openai,
                        REASONING_TIMEOUT_SECS,
                    ),
                    ModelConfig::new(
                        "gemini-reasoning",
                        "gemini-2.0-pro-exp-02-05",
                        Provider::GoogleGenai,
                        REASONING_TIMEOUT_SECS,
                    ),
                    ModelConfig::new(
                        "claude-reasoning",
                        "claude-3-7-sonnet-20250219",
                        Provider::Anthropic,
                        REASONING_TIMEOUT_SECS,
                    ),
                ],
            },
        }
    }
}

impl ModelsConfig {
    /// Models configured for a tier
    pub fn tier(&self, tier: TierKey) -> &[ModelConfig] {
        match tier {
            TierKey::Fast => &self.fast,
            TierKey::Mid => &self.mid,
            TierKey::Reasoning => &self.reasoning,
        }
    }

    /// Every model with its tier, in tier order
    pub fn iter(&self) -> impl Iterator<Item = (TierKey, &ModelConfig)> {
        TierKey::ALL
            .into_iter()
            .flat_map(move |tier| self.tier(tier).iter().map(move |m| (tier, m)))
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut ModelConfig> {
        self.fast
            .iter_mut()
            .chain(self.mid.iter_mut())
            .chain(self.reasoning.iter_mut())
            .find(|m| m.key == key)
    }

    fn find(&self, key: &str) -> Option<&ModelConfig> {
        self.iter().map(|(_, m)| m).find(|m| m.key == key)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SMARTROUTE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("smartroute")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or use defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, or defaults if it is missing
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let routing = &self.routing;
        for (name, value) in [
            ("threshold_fast", routing.threshold_fast),
            ("threshold_mid", routing.threshold_mid),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("routing.{} must be between 0.0 and 1.0", name));
            }
        }
        if routing.threshold_fast > routing.threshold_mid {
            return Err(anyhow!(
                "routing.threshold_fast ({}) must not exceed routing.threshold_mid ({})",
                routing.threshold_fast,
                routing.threshold_mid
            ));
        }
        if routing.scorer_concurrency == 0 {
            return Err(anyhow!("routing.scorer_concurrency must be at least 1"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&routing.fallback_timeout_secs) {
            return Err(anyhow!(
                "routing.fallback_timeout_secs must be between 1 and {}",
                MAX_TIMEOUT_SECS
            ));
        }

        let mut seen = HashSet::new();
        for tier in TierKey::ALL {
            let models = self.models.tier(tier);
            if models.is_empty() {
                return Err(anyhow!("Tier '{}' has no models configured", tier));
            }
            for model in models {
                if !seen.insert(model.key.as_str()) {
                    return Err(anyhow!("Model key '{}' is configured more than once", model.key));
                }
                if !(1..=MAX_TIMEOUT_SECS).contains(&model.timeout_secs) {
                    return Err(anyhow!(
                        "Model '{}' timeout must be between 1 and {} seconds",
                        model.key,
                        MAX_TIMEOUT_SECS
                    ));
                }
                if model.api_key.is_some() {
                    return Err(anyhow!(
                        "Model '{}': API keys must be provided via environment variables \
                         (set {} instead of storing the key in configuration)",
                        model.key,
                        model.api_key_env
                    ));
                }
            }
        }

        Ok(())
    }

    /// Tier thresholds from the routing section
    pub fn thresholds(&self) -> TierThresholds {
        TierThresholds::new(self.routing.threshold_fast, self.routing.threshold_mid)
    }

    /// Time budget used for an empty fallback list
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.routing.fallback_timeout_secs)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "routing.threshold_fast" => Ok(self.routing.threshold_fast.to_string()),
            "routing.threshold_mid" => Ok(self.routing.threshold_mid.to_string()),
            "routing.scorer_concurrency" => Ok(self.routing.scorer_concurrency.to_string()),
            "routing.fallback_timeout_secs" => Ok(self.routing.fallback_timeout_secs.to_string()),
            _ => {
                let (model_key, field) = split_model_key(key)?;
                let model = self
                    .models
                    .find(model_key)
                    .ok_or_else(|| unknown_key(key))?;
                match field {
                    "name" => Ok(model.name.clone()),
                    "provider" => Ok(model.provider.to_string()),
                    "timeout_secs" => Ok(model.timeout_secs.to_string()),
                    "api_key_env" => Ok(model.api_key_env.clone()),
                    _ => Err(unknown_key(key)),
                }
            }
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "routing.threshold_fast" => {
                self.routing.threshold_fast = parse_unit(key, value)?;
            }
            "routing.threshold_mid" => {
                self.routing.threshold_mid = parse_unit(key, value)?;
            }
            "routing.scorer_concurrency" => {
                let n: usize = value
                    .parse()
                    .with_context(|| format!("Invalid scorer_concurrency value: {}", value))?;
                if n == 0 {
                    return Err(anyhow!("Scorer concurrency must be at least 1"));
                }
                self.routing.scorer_concurrency = n;
            }
            "routing.fallback_timeout_secs" => {
                self.routing.fallback_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid fallback_timeout_secs value: {}", value))?;
            }
            _ => {
                let (model_key, field) = split_model_key(key)?;
                let model = self
                    .models
                    .find_mut(model_key)
                    .ok_or_else(|| unknown_key(key))?;
                match field {
                    "name" => model.name = value.to_string(),
                    "provider" => {
                        model.provider = value.parse().map_err(|e: String| anyhow!(e))?;
                    }
                    "timeout_secs" => {
                        model.timeout_secs = value
                            .parse()
                            .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
                    }
                    "api_key_env" => model.api_key_env = value.to_string(),
                    "api_key" => {
                        return Err(anyhow!(
                            "API keys cannot be stored in configuration for security. \
                             Set the {} environment variable instead.",
                            model.api_key_env
                        ));
                    }
                    _ => return Err(unknown_key(key)),
                }
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut keys: Vec<String> = [
            "routing.threshold_fast",
            "routing.threshold_mid",
            "routing.scorer_concurrency",
            "routing.fallback_timeout_secs",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        for (_, model) in self.models.iter() {
            for field in ["name", "provider", "timeout_secs", "api_key_env"] {
                keys.push(format!("models.{}.{}", model.key, field));
            }
        }

        keys.into_iter()
            .map(|key| {
                let value = self.get(&key)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `smartroute config list` to see available keys.",
        key
    )
}

/// Split `models.<key>.<field>`; model keys may not contain dots
fn split_model_key(key: &str) -> anyhow::Result<(&str, &str)> {
    let rest = key.strip_prefix("models.").ok_or_else(|| unknown_key(key))?;
    // Model keys may contain dots ("gpt-4.1-fast"); field names never do
    rest.rsplit_once('.').ok_or_else(|| unknown_key(key))
}

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f64> {
    let v: f64 = value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();

        assert_eq!(config.routing.threshold_fast, 0.30);
        assert_eq!(config.routing.threshold_mid, 0.42);
        assert_eq!(config.routing.scorer_concurrency, 3);
        assert_eq!(config.routing.fallback_timeout_secs, 600);
        assert_eq!(config.models.iter().count(), 9);
    }

    #[test]
    fn test_default_timeouts_per_tier() {
        let config = Config::default();
        assert!(config.models.fast.iter().all(|m| m.timeout_secs == 60));
        assert!(config.models.mid.iter().all(|m| m.timeout_secs == 60));
        assert!(config.models.reasoning.iter().all(|m| m.timeout_secs == 300));
    }

    #[test]
    fn test_validate_rejects_empty_tier() {
        let mut config = Config::default();
        config.models.mid.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'mid'"));
    }

    #[test]
    fn test_validate_rejects_duplicate_keys() {
        let mut config = Config::default();
        let dup = config.models.fast[0].clone();
        config.models.reasoning.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chatgpt-fast"));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.routing.threshold_fast = 0.6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_stored_api_key() {
        let mut config = Config::default();
        config.models.fast[0].api_key = Some("sk-live".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_validate_rejects_unbounded_timeouts() {
        let mut config = Config::default();
        config.set("models.chatgpt-fast.timeout_secs", &u64::MAX.to_string()).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chatgpt-fast"));

        let mut config = Config::default();
        config.routing.fallback_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());

        config.routing.fallback_timeout_secs = MAX_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dotted_model_keys_are_addressable() {
        let mut config = Config::default();
        config.models.fast[0].key = "gpt-4.1-fast".to_string();
        config.validate().unwrap();

        config.set("models.gpt-4.1-fast.timeout_secs", "30").unwrap();
        assert_eq!(config.get("models.gpt-4.1-fast.timeout_secs").unwrap(), "30");
        assert!(config.list().unwrap().iter().any(|(k, _)| k == "models.gpt-4.1-fast.name"));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = Config::default();
        config.models.fast[0].api_key = Some("sk-live".into());
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("sk-live"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set("routing.threshold_mid", "0.5").unwrap();
        config.set("models.claude-fast.timeout_secs", "45").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.get("models.claude-fast.timeout_secs").unwrap(), "45");
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_load_rejects_key_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut contents = toml::to_string_pretty(&Config::default()).unwrap();
        contents = contents.replacen(
            "api_key_env = \"OPENAI_API_KEY\"",
            "api_key_env = \"OPENAI_API_KEY\"\napi_key = \"sk-live\"",
            1,
        );
        fs::write(&path, contents).unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_set_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        assert!(config.set("routing.threshold_fast", "1.5").is_err());
        assert!(config.set("routing.threshold_fast", "abc").is_err());
    }

    #[test]
    fn test_set_rejects_api_key() {
        let mut config = Config::default();
        let err = config.set("models.gemini-mid.api_key", "x").unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_get_unknown_key() {
        let config = Config::default();
        assert!(config.get("routing.nope").is_err());
        assert!(config.get("models.nope.name").is_err());
        assert!(config.get("models.chatgpt-fast.nope").is_err());
    }

    #[test]
    fn test_list_covers_every_model() {
        let config = Config::default();
        let items = config.list().unwrap();
        assert_eq!(items.len(), 4 + 9 * 4);
        assert!(items.contains(&(
            "models.chatgpt-reasoning.name".to_string(),
            "o3-mini-2025-01-31".to_string()
        )));
    }

    #[test]
    fn test_descriptor_from_model_config() {
        let config = Config::default();
        let descriptor = config.models.reasoning[2].descriptor();
        assert_eq!(descriptor.key, "claude-reasoning");
        assert_eq!(descriptor.timeout, Duration::from_secs(300));
        assert_eq!(descriptor.api_key_env, "ANTHROPIC_API_KEY");
    }
}
