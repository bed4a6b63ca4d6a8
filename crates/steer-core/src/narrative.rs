//! Pluggable narrative generator
//!
//! Optional text-completion backend used to enrich explanations. Every
//! call site keeps a deterministic fallback; the engine never hard-
//! depends on a running model server.
//!
//! # Configuration
//!
//! - `STEER_NARRATIVE_BACKEND`: `ollama` (default) or `mock`
//! - `OLLAMA_HOST`: Ollama server URL (backend disabled when unset)
//! - `OLLAMA_MODEL`: model name (default: llama3.2)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Trait for text-completion backends
#[async_trait]
pub trait NarrativeBackend: Send + Sync {
    /// Complete a prompt into a short narrative
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> bool;
}

/// Ollama-backed narrative generator
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }
}

#[async_trait]
impl NarrativeBackend for OllamaBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "narrative backend returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Mock backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    pub healthy: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self { healthy: true }
    }

    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }
}

#[async_trait]
impl NarrativeBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.healthy {
            return Err(Error::Upstream("mock backend is down".into()));
        }

        let first_line = prompt.lines().next().unwrap_or("").trim();
        Ok(format!("[mock narrative] {}", first_line))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

/// Concrete wrapper providing Clone + compile-time dispatch
#[derive(Clone)]
pub enum NarrativeClient {
    Ollama(OllamaBackend),
    Mock(MockBackend),
}

impl NarrativeClient {
    /// Create from environment, or None when no backend is configured
    pub fn from_env() -> Option<Self> {
        let backend =
            std::env::var("STEER_NARRATIVE_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(NarrativeClient::Ollama),
            "mock" => Some(NarrativeClient::Mock(MockBackend::new())),
            _ => {
                warn!(backend = %backend, "Unknown narrative backend, falling back to ollama");
                OllamaBackend::from_env().map(NarrativeClient::Ollama)
            }
        }
    }

    pub fn mock() -> Self {
        NarrativeClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl NarrativeBackend for NarrativeClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            NarrativeClient::Ollama(b) => b.complete(prompt).await,
            NarrativeClient::Mock(b) => b.complete(prompt).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            NarrativeClient::Ollama(b) => b.health_check().await,
            NarrativeClient::Mock(b) => b.health_check().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_completion_is_deterministic() {
        let backend = MockBackend::new();
        let out = backend.complete("Explain this nudge\nmore detail").await.unwrap();
        assert_eq!(out, "[mock narrative] Explain this nudge");
    }

    #[tokio::test]
    async fn test_unhealthy_mock_errors() {
        let backend = MockBackend::unhealthy();
        assert!(!backend.health_check().await);
        assert!(backend.complete("anything").await.is_err());
    }
}
