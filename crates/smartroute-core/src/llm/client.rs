//! HTTP model invoker
//!
//! Provides a reqwest-backed [`ModelInvoker`] for the provider families the
//! router is configured with:
//! - OpenAI-compatible chat completions
//! - Anthropic messages
//! - Google Gemini `generateContent`
//!
//! There is no retry logic here. A failed request is reported to the
//! dispatcher, which moves on to the next candidate.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use super::invoker::{InvokeError, InvokerFactory, ModelInvoker, normalize_model_name};
use super::types::{
    AnthropicRequest, AnthropicResponse, ChatRequest, ChatResponse, GeminiContent, GeminiPart,
    GeminiRequest, GeminiResponse, Message, MessageRole, Provider,
};
use crate::error::{Error, Result};
use crate::routing::ModelDescriptor;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic requires an explicit output cap
const DEFAULT_MAX_TOKENS: usize = 4096;

/// Connection establishment limit, independent of the request budget
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP-backed model invoker
#[derive(Clone)]
pub struct HttpInvoker {
    /// HTTP client for making requests
    http_client: HttpClient,
    /// Provider family, decides the wire format
    provider: Provider,
    /// Provider model id sent on the wire
    model: String,
    /// Normalized name reported as `model_used`
    display_name: String,
    /// API key for authentication
    api_key: String,
    /// Base URL for the API
    base_url: String,
    /// Output cap (Anthropic only)
    max_tokens: usize,
}

impl std::fmt::Debug for HttpInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInvoker")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builder for creating an HttpInvoker
pub struct HttpInvokerBuilder {
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<usize>,
}

impl HttpInvokerBuilder {
    /// Create a new builder for a provider model
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            base_url: None,
            max_tokens: None,
        }
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL (defaults to the provider's public endpoint)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the output token cap
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Build the HttpInvoker
    pub fn build(self) -> Result<HttpInvoker> {
        let api_key = self.api_key.ok_or_else(|| {
            Error::ConfigError(format!("API key is required for model '{}'", self.model))
        })?;

        let http_client = HttpClient::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| self.provider.default_base_url().to_string());

        Ok(HttpInvoker {
            http_client,
            provider: self.provider,
            display_name: normalize_model_name(&self.model).to_string(),
            model: self.model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }
}

impl HttpInvoker {
    /// Create a new builder for HttpInvoker
    pub fn builder(provider: Provider, model: impl Into<String>) -> HttpInvokerBuilder {
        HttpInvokerBuilder::new(provider, model)
    }

    /// Provider family of this invoker
    pub fn provider(&self) -> Provider {
        self.provider
    }

    async fn send_openai(
        &self,
        messages: Vec<Message>,
        timeout: Duration,
    ) -> std::result::Result<String, InvokeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };

        let response = self
            .http_client
            .post(&url)
            .timeout(timeout)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_response(status, response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| map_body_error(e, timeout))?;
        extract_openai_text(body)
    }

    async fn send_anthropic(
        &self,
        messages: Vec<Message>,
        timeout: Duration,
    ) -> std::result::Result<String, InvokeError> {
        let url = format!("{}/messages", self.base_url);
        let (system, messages) = split_system(messages);
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages,
        };

        let response = self
            .http_client
            .post(&url)
            .timeout(timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_response(status, response).await);
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| map_body_error(e, timeout))?;
        extract_anthropic_text(body)
    }

    async fn send_gemini(
        &self,
        messages: Vec<Message>,
        timeout: Duration,
    ) -> std::result::Result<String, InvokeError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = gemini_request(messages);

        let response = self
            .http_client
            .post(&url)
            .timeout(timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_response(status, response).await);
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| map_body_error(e, timeout))?;
        extract_gemini_text(body)
    }
}

#[async_trait]
impl ModelInvoker for HttpInvoker {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn invoke(
        &self,
        messages: Vec<Message>,
        timeout: Duration,
    ) -> std::result::Result<Message, InvokeError> {
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages = messages.len(),
            "Sending model request"
        );

        let text = match self.provider {
            Provider::Openai => self.send_openai(messages, timeout).await?,
            Provider::Anthropic => self.send_anthropic(messages, timeout).await?,
            Provider::GoogleGenai => self.send_gemini(messages, timeout).await?,
        };

        Ok(Message::assistant(text))
    }
}

/// Builds [`HttpInvoker`]s from configured model descriptors.
///
/// API keys are read from the environment variable each descriptor names.
/// Explicit keys registered with [`HttpInvokerFactory::with_api_key`] take
/// precedence.
#[derive(Debug, Default, Clone)]
pub struct HttpInvokerFactory {
    api_keys: HashMap<String, String>,
    base_urls: HashMap<Provider, String>,
    max_tokens: Option<usize>,
}

impl HttpInvokerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the value for a credential reference instead of reading the environment
    pub fn with_api_key(mut self, env_name: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(env_name.into(), key.into());
        self
    }

    /// Point a provider at a different endpoint (proxies, local gateways)
    pub fn with_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn resolve_api_key(&self, descriptor: &ModelDescriptor) -> Result<String> {
        if let Some(key) = self.api_keys.get(&descriptor.api_key_env) {
            return Ok(key.clone());
        }
        env::var(&descriptor.api_key_env).map_err(|_| {
            Error::ConfigError(format!(
                "Environment variable {} is not set (required by model '{}')",
                descriptor.api_key_env, descriptor.key
            ))
        })
    }
}

impl InvokerFactory for HttpInvokerFactory {
    fn build(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelInvoker>> {
        let api_key = self.resolve_api_key(descriptor)?;

        let mut builder = HttpInvoker::builder(descriptor.provider, descriptor.name.clone())
            .api_key(api_key);
        if let Some(url) = self.base_urls.get(&descriptor.provider) {
            builder = builder.base_url(url.clone());
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        Ok(Arc::new(builder.build()?))
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> InvokeError {
    if err.is_timeout() {
        InvokeError::Timeout(timeout)
    } else {
        InvokeError::from(err)
    }
}

/// A body that stalls past the deadline is a timeout, anything else is malformed
fn map_body_error(err: reqwest::Error, timeout: Duration) -> InvokeError {
    if err.is_timeout() {
        InvokeError::Timeout(timeout)
    } else {
        InvokeError::MalformedResponse(err.to_string())
    }
}

/// Turn a non-success HTTP response into an invocation error
async fn handle_error_response(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> InvokeError {
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => InvokeError::Provider(format!("unauthorized ({})", status)),
        429 => InvokeError::Provider("rate limited".to_string()),
        _ => InvokeError::Provider(format!("{}: {}", status, truncate(&body, 200))),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Hoist system messages out of the conversation.
///
/// Anthropic and Gemini take system instructions in a dedicated field.
fn split_system(messages: Vec<Message>) -> (Option<String>, Vec<Message>) {
    let (system, rest): (Vec<Message>, Vec<Message>) = messages
        .into_iter()
        .partition(|m| m.role == MessageRole::System);

    let system = if system.is_empty() {
        None
    } else {
        Some(
            system
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    };

    (system, rest)
}

fn gemini_request(messages: Vec<Message>) -> GeminiRequest {
    let (system, rest) = split_system(messages);

    let contents = rest
        .into_iter()
        .map(|m| GeminiContent {
            role: Some(
                match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                }
                .to_string(),
            ),
            parts: vec![GeminiPart {
                text: Some(m.content),
            }],
        })
        .collect();

    GeminiRequest {
        contents,
        system_instruction: system.map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: Some(text) }],
        }),
    }
}

fn extract_openai_text(body: ChatResponse) -> std::result::Result<String, InvokeError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| InvokeError::MalformedResponse("no choices in response".to_string()))
}

fn extract_anthropic_text(body: AnthropicResponse) -> std::result::Result<String, InvokeError> {
    let text: String = body
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.is_empty() {
        Err(InvokeError::MalformedResponse(
            "no text blocks in response".to_string(),
        ))
    } else {
        Ok(text)
    }
}

fn extract_gemini_text(body: GeminiResponse) -> std::result::Result<String, InvokeError> {
    let text: String = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        Err(InvokeError::MalformedResponse(
            "no candidates in response".to_string(),
        ))
    } else {
        Ok(text)
    }
}
