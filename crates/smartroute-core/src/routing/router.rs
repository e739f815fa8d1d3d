//! Request routing entry point
//!
//! Ties the pieces together: resolve candidates, assemble the conversation,
//! dispatch, and record the exchange under the context token.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::candidates::{CandidateSetBuilder, DEFAULT_FALLBACK_TIMEOUT};
use super::catalog::ModelCatalog;
use super::dispatch::{DispatchStrategy, Dispatcher};
use super::gate::{AdmissionGate, DEFAULT_SCORER_CONCURRENCY};
use super::scorer::{ComplexityScorer, GatedScorer, LexicalScorer};
use super::tier::TierThresholds;
use super::types::{InvocationOutcome, InvocationRequest};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::{ConversationStore, InMemoryConversationStore, new_context_token};
use crate::llm::{InvokerFactory, Message};

/// System prompt recorded at the start of every new conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a helpful AI assistant!";

/// Routes requests to models
///
/// Cheap to share behind an `Arc`; all state is either read-only or
/// internally synchronized.
pub struct Router {
    candidates: CandidateSetBuilder,
    dispatcher: Dispatcher,
    history: Arc<dyn ConversationStore>,
    system_prompt: String,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("candidates", &self.candidates)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

impl Router {
    /// Start building a router over an existing catalog
    pub fn builder(catalog: Arc<ModelCatalog>) -> RouterBuilder {
        RouterBuilder::new(catalog)
    }

    /// Build a router from configuration.
    ///
    /// Every configured model is instantiated through `factory` once, here.
    pub fn from_config(
        config: &Config,
        factory: &dyn InvokerFactory,
        scorer: Arc<dyn ComplexityScorer>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("{:#}", e)))?;

        let catalog = ModelCatalog::from_config(config, factory)?;
        Ok(Self::builder(Arc::new(catalog))
            .scorer(scorer)
            .scorer_concurrency(config.routing.scorer_concurrency)
            .thresholds(config.thresholds())
            .fallback_timeout(config.fallback_timeout())
            .build())
    }

    pub fn catalog(&self) -> &ModelCatalog {
        self.candidates.catalog()
    }

    /// Route a request to a model and return its reply.
    ///
    /// Fails with a caller error (`ConflictingSelection`, `UnknownModel`,
    /// `InvalidTier`) before anything is invoked, or with
    /// `AllCandidatesFailed` once every candidate has dropped out.
    pub async fn route(&self, request: InvocationRequest) -> Result<InvocationOutcome> {
        info!(
            tier = ?request.tier,
            fallback = ?request.fallback,
            latency_mode = request.latency_mode,
            "Received invocation request"
        );

        let candidates = self.candidates.resolve(&request).await?;

        let (context_token, mut messages) = match &request.context_token {
            Some(token) => (token.clone(), self.history.load(token).await?),
            None => (new_context_token(), Vec::new()),
        };
        let new_conversation = messages.is_empty();
        messages.push(Message::user(request.text.clone()));

        let strategy = DispatchStrategy::from_latency_mode(request.latency_mode);
        let completion = self
            .dispatcher
            .dispatch(&candidates, messages, strategy)
            .await?;

        let mut exchange = Vec::with_capacity(3);
        if new_conversation {
            exchange.push(Message::system(self.system_prompt.clone()));
        }
        exchange.push(Message::user(request.text));
        exchange.push(completion.message.clone());
        if let Err(e) = self.history.append(&context_token, exchange).await {
            warn!(context_token = %context_token, error = %e, "Failed to record conversation");
        }

        Ok(InvocationOutcome {
            output_text: completion.message.content,
            model_used: completion.model_used,
            context_token,
        })
    }
}

/// Builder for Router
pub struct RouterBuilder {
    catalog: Arc<ModelCatalog>,
    scorer: Option<Arc<dyn ComplexityScorer>>,
    scorer_concurrency: usize,
    thresholds: TierThresholds,
    fallback_timeout: Duration,
    history: Option<Arc<dyn ConversationStore>>,
    system_prompt: String,
}

impl RouterBuilder {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self {
            catalog,
            scorer: None,
            scorer_concurrency: DEFAULT_SCORER_CONCURRENCY,
            thresholds: TierThresholds::default(),
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            history: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Set the complexity scorer (defaults to [`LexicalScorer`])
    pub fn scorer(mut self, scorer: Arc<dyn ComplexityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Set the number of concurrent scoring calls
    pub fn scorer_concurrency(mut self, limit: usize) -> Self {
        self.scorer_concurrency = limit;
        self
    }

    pub fn thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Set the conversation store (defaults to an in-memory store)
    pub fn history(mut self, history: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn build(self) -> Router {
        let scorer = self
            .scorer
            .unwrap_or_else(|| Arc::new(LexicalScorer::new()));
        let gated = GatedScorer::new(scorer, AdmissionGate::new(self.scorer_concurrency));

        Router {
            candidates: CandidateSetBuilder::new(self.catalog, gated, self.thresholds)
                .with_fallback_timeout(self.fallback_timeout),
            dispatcher: Dispatcher::new(),
            history: self
                .history
                .unwrap_or_else(|| Arc::new(InMemoryConversationStore::new())),
            system_prompt: self.system_prompt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{InvokeError, ModelInvoker, MessageRole};
    use crate::routing::types::{ModelDescriptor, TierKey};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with the number of messages it was given
    #[derive(Default)]
    struct RecordingInvoker {
        name: String,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl ModelInvoker for RecordingInvoker {
        fn display_name(&self) -> &str {
            &self.name
        }

        async fn invoke(
            &self,
            messages: Vec<Message>,
            _timeout: Duration,
        ) -> std::result::Result<Message, InvokeError> {
            let reply = format!("{} saw {}", self.name, messages.len());
            self.seen.lock().unwrap().push(messages);
            Ok(Message::assistant(reply))
        }
    }

    struct RecordingFactory {
        built: AtomicUsize,
    }

    impl InvokerFactory for RecordingFactory {
        fn build(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelInvoker>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(RecordingInvoker {
                name: descriptor.display_name().to_string(),
                ..Default::default()
            }))
        }
    }

    struct ConstantScorer(f64);

    impl ComplexityScorer for ConstantScorer {
        fn score(&self, _text: &str) -> anyhow::Result<f64> {
            Ok(self.0)
        }
    }

    fn single_model_router() -> (Router, Arc<RecordingInvoker>, Arc<InMemoryConversationStore>) {
        let invoker = Arc::new(RecordingInvoker {
            name: "solo".to_string(),
            ..Default::default()
        });
        let mut catalog = ModelCatalog::builder();
        for tier in TierKey::ALL {
            let key = format!("{}-solo", tier);
            catalog = catalog.model(
                tier,
                ModelDescriptor::new(
                    key.clone(),
                    key,
                    crate::llm::Provider::Openai,
                    "OPENAI_API_KEY",
                    Duration::from_secs(5),
                ),
                invoker.clone(),
            );
        }
        let history = Arc::new(InMemoryConversationStore::new());
        let router = Router::builder(Arc::new(catalog.build().unwrap()))
            .scorer(Arc::new(ConstantScorer(0.1)))
            .history(history.clone())
            .build();
        (router, invoker, history)
    }

    #[tokio::test]
    async fn test_new_conversation_records_system_prompt() {
        let (router, invoker, history) = single_model_router();

        let outcome = router
            .route(InvocationRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(outcome.model_used, "solo");
        assert_eq!(outcome.output_text, "solo saw 1");
        assert!(!outcome.context_token.is_empty());

        let seen = invoker.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![vec![Message::user("hello")]]);

        let recorded = history.load(&outcome.context_token).await.unwrap();
        let roles: Vec<_> = recorded.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(recorded[0].content, DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_context_token_continues_conversation() {
        let (router, invoker, history) = single_model_router();

        let first = router
            .route(InvocationRequest::new("first"))
            .await
            .unwrap();
        let second = router
            .route(InvocationRequest::new("second").with_context_token(first.context_token.clone()))
            .await
            .unwrap();

        assert_eq!(second.context_token, first.context_token);
        // system, first question, first answer, second question
        assert_eq!(second.output_text, "solo saw 4");

        let seen = invoker.seen.lock().unwrap();
        assert_eq!(seen[1][0].role, MessageRole::System);
        assert_eq!(seen[1][3], Message::user("second"));
        drop(seen);

        assert_eq!(history.load(&first.context_token).await.unwrap().len(), 5);
        assert_eq!(history.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_context_token_starts_fresh() {
        let (router, _invoker, history) = single_model_router();

        let outcome = router
            .route(InvocationRequest::new("hi").with_context_token("not-seen-before"))
            .await
            .unwrap();

        assert_eq!(outcome.context_token, "not-seen-before");
        let recorded = history.load("not-seen-before").await.unwrap();
        assert_eq!(recorded[0].role, MessageRole::System);
    }

    #[tokio::test]
    async fn test_rejected_request_records_nothing() {
        let (router, invoker, history) = single_model_router();

        let err = router
            .route(
                InvocationRequest::new("hi")
                    .with_tier("fast")
                    .with_fallback(["fast-solo"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConflictingSelection));
        assert!(invoker.seen.lock().unwrap().is_empty());
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn test_from_config_builds_every_model_once() {
        let factory = RecordingFactory {
            built: AtomicUsize::new(0),
        };
        let config = Config::default();

        let router = Router::from_config(&config, &factory, Arc::new(ConstantScorer(0.9))).unwrap();

        assert_eq!(factory.built.load(Ordering::SeqCst), 9);
        assert_eq!(router.catalog().len(), 9);

        let outcome = router
            .route(InvocationRequest::new("hard question"))
            .await
            .unwrap();
        let reasoning: Vec<_> = config
            .models
            .tier(TierKey::Reasoning)
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert!(reasoning.contains(&outcome.model_used));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let factory = RecordingFactory {
            built: AtomicUsize::new(0),
        };
        let mut config = Config::default();
        config.routing.threshold_fast = 0.9;
        config.routing.threshold_mid = 0.1;

        let err = Router::from_config(&config, &factory, Arc::new(ConstantScorer(0.5))).unwrap_err();

        assert!(matches!(err, Error::ConfigError(_)));
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
    }
}
