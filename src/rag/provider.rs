//! Embedding/chat provider abstraction. Two implementations share one
//! request shape (an OpenAI-compatible `/embeddings` and
//! `/chat/completions` surface) and differ only in base URL and key --
//! `RemoteApiProvider` talks to a hosted API, `LocalDaemonProvider` talks
//! to a local HTTP daemon exposing the same contract.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::models::Embedding;
use crate::{Result, SpiralError};
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct EmbeddingResponseItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingResponseItem>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    breaker: CircuitBreaker,
}

impl HttpProvider {
    fn new(base_url: String, api_key: String, chat_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            chat_model,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if !self.breaker.should_allow_request().await {
            return Err(SpiralError::Unavailable("provider circuit breaker is open".to_string()));
        }
        match fut.await {
            Ok(value) => {
                self.breaker.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure().await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.guarded(async {
            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "input": texts, "model": "text-embedding-3-small" }))
                .send()
                .await?
                .error_for_status()?
                .json::<EmbeddingResponse>()
                .await?;
            Ok(response.data.into_iter().map(|d| Embedding(d.embedding)).collect())
        })
        .await
    }
}

#[async_trait]
impl ChatProvider for HttpProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.guarded(async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "model": self.chat_model,
                    "messages": [
                        {"role": "system", "content": system_prompt},
                        {"role": "user", "content": user_prompt},
                    ],
                }))
                .send()
                .await?
                .error_for_status()?
                .json::<ChatResponse>()
                .await?;
            response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| SpiralError::Unavailable("chat completion returned no choices".to_string()))
        })
        .await
    }
}

pub struct RemoteApiProvider(HttpProvider);

impl RemoteApiProvider {
    pub fn new(base_url: String, api_key: String, chat_model: String) -> Self {
        Self(HttpProvider::new(base_url, api_key, chat_model))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteApiProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.0.embed(texts).await
    }
}

#[async_trait]
impl ChatProvider for RemoteApiProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.0.complete(system_prompt, user_prompt).await
    }
}

pub struct LocalDaemonProvider(HttpProvider);

impl LocalDaemonProvider {
    pub fn new(base_url: String, chat_model: String) -> Self {
        Self(HttpProvider::new(base_url, String::new(), chat_model))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalDaemonProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.0.embed(texts).await
    }
}

#[async_trait]
impl ChatProvider for LocalDaemonProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.0.complete(system_prompt, user_prompt).await
    }
}
