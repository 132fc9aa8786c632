//! External LLM collaborator contract (spec §6.1). This is a narrow trait,
//! not an implementation — the core never talks to a specific provider.
//! [`MockLlmClient`] is a deterministic stand-in used by tests and by
//! callers that have not wired a real provider yet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::Result;

/// One message in a chat-style LLM request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
}

/// Response format requested from the LLM. The agent loop always requests
/// `Json` for planning (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Chat request options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub response_format: ResponseFormat,
}

/// The two operations the core needs from an LLM provider (spec §6.1).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic, non-semantic embedding + canned-plan chat implementation.
/// Not suitable for production ranking quality, but gives reproducible
/// vectors for tests and for exercising the agent loop without a live
/// provider wired in.
pub struct MockLlmClient {
    pub dimension: usize,
}

impl MockLlmClient {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, messages: &[ChatMessage], _options: &ChatOptions) -> Result<String> {
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!(
            r#"{{"name":"Ad-hoc plan","description":"{}","confidence":0.5,"steps":[]}}"#,
            last.replace('"', "'")
        ))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(deterministic_embedding(text, self.dimension))
    }
}

/// Hash-based pseudo-embedding, normalized to unit length. Used by
/// [`MockLlmClient`] and by any component that needs to embed text without
/// a live provider (e.g. computing a canonical relationship string).
#[must_use]
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut seed = hasher.finish();
    let mut embedding = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let value = ((seed >> 16) as f32) / 32768.0 - 1.0;
        embedding.push(value);
    }
    let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut embedding {
            *v /= norm;
        }
    }
    embedding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_embedding_is_stable() {
        let a = deterministic_embedding("log into example.com", 16);
        let b = deterministic_embedding("log into example.com", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_yields_different_embedding() {
        let a = deterministic_embedding("a", 16);
        let b = deterministic_embedding("b", 16);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn mock_client_embeds_and_chats() {
        let client = MockLlmClient::default();
        let v = client.embed("hello").await.unwrap();
        assert_eq!(v.len(), 32);
        let reply = client
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert!(reply.contains("\"name\""));
    }
}
