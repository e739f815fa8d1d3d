//! Conversation history keyed by context token
//!
//! A routed exchange can be continued by passing back the context token
//! returned with the outcome. The store only has to remember messages; it
//! knows nothing about tiers or models.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::Message;

/// Generate a fresh context token
pub fn new_context_token() -> String {
    Uuid::new_v4().to_string()
}

/// Storage for conversation messages
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Messages recorded under `token`, oldest first. Unknown tokens are empty.
    async fn load(&self, token: &str) -> Result<Vec<Message>>;

    /// Append messages to the conversation under `token`
    async fn append(&self, token: &str, messages: Vec<Message>) -> Result<()>;
}

/// Process-local conversation store
///
/// Unbounded by default: every token ever issued stays in memory. Long-lived
/// processes should use [`InMemoryConversationStore::with_max_conversations`],
/// which evicts the oldest conversation once the cap is reached.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Conversations>,
    max_conversations: Option<usize>,
}

#[derive(Debug, Default)]
struct Conversations {
    by_token: HashMap<String, Vec<Message>>,
    /// Tokens in the order their conversations were started
    started: VecDeque<String>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` conversations (at least one)
    pub fn with_max_conversations(max: usize) -> Self {
        Self {
            inner: RwLock::default(),
            max_conversations: Some(max.max(1)),
        }
    }

    /// Number of conversations held
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_token.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_token.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, token: &str) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.by_token.get(token).cloned().unwrap_or_default())
    }

    async fn append(&self, token: &str, messages: Vec<Message>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Conversations { by_token, started } = &mut *inner;

        match by_token.get_mut(token) {
            Some(history) => history.extend(messages),
            None => {
                by_token.insert(token.to_string(), messages);
                started.push_back(token.to_string());
            }
        }

        if let Some(max) = self.max_conversations {
            while by_token.len() > max {
                let Some(oldest) = started.pop_front() else {
                    break;
                };
                by_token.remove(&oldest);
                debug!(context_token = %oldest, "Evicted conversation");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_tokens_are_unique_uuids() {
        let a = new_context_token();
        let b = new_context_token();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_token_is_empty() {
        let store = InMemoryConversationStore::new();
        assert!(store.load("missing").await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_append_keeps_order_per_token() {
        let store = InMemoryConversationStore::new();
        store
            .append("t1", vec![Message::user("q1"), Message::assistant("a1")])
            .await
            .unwrap();
        store.append("t2", vec![Message::user("other")]).await.unwrap();
        store
            .append("t1", vec![Message::user("q2"), Message::assistant("a2")])
            .await
            .unwrap();

        let history = store.load("t1").await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_capped_store_evicts_oldest_conversation() {
        let store = InMemoryConversationStore::with_max_conversations(2);
        store.append("first", vec![Message::user("1")]).await.unwrap();
        store.append("second", vec![Message::user("2")]).await.unwrap();
        // continuing a conversation does not start a new one
        store.append("first", vec![Message::assistant("1b")]).await.unwrap();
        assert_eq!(store.len().await, 2);

        store.append("third", vec![Message::user("3")]).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.load("first").await.unwrap().is_empty());
        assert_eq!(store.load("second").await.unwrap(), vec![Message::user("2")]);
        assert_eq!(store.load("third").await.unwrap(), vec![Message::user("3")]);
    }
}
