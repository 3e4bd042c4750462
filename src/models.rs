use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::aggregator::{FrameSource, ndjson_lines};
use crate::error::ChatError;
use crate::request::GenerationRequest;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest silence tolerated on an open connection. Loading a model can
/// hold back the first frame for a while.
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn list_models(&self) -> Result<Vec<String>, ChatError>;
    /// Sends one chat request and returns its response body as raw frames.
    async fn stream_chat(&self, req: &GenerationRequest) -> Result<FrameSource, ChatError>;
}

#[derive(Clone)]
pub struct OllamaClient {
    pub base_url: Url,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_timeouts(base_url, CONNECT_TIMEOUT, READ_TIMEOUT)
    }

    pub fn with_timeouts(base_url: &str, connect: Duration, read: Duration) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .build()?;
        Ok(Self { base_url, http })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.into());
        Self::new(&base_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        self.base_url
            .join(path)
            .map_err(|e| ChatError::NetworkFailure(format!("bad endpoint {path}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ModelDescriptor {
    name: String,
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let url = self.endpoint("api/tags")?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ChatError::ModelListUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChatError::ModelListUnavailable(format!("status {}", resp.status())));
        }
        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ChatError::ModelListUnavailable(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn stream_chat(&self, req: &GenerationRequest) -> Result<FrameSource, ChatError> {
        let url = self.endpoint("api/chat")?;
        tracing::debug!(%url, model = %req.model, "sending chat request");
        let resp = self.http.post(url).json(&req.to_body()).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChatError::NetworkFailure(format!("chat call failed: {status} {detail}")));
        }
        let chunks = resp.bytes_stream().map(|r| r.map_err(ChatError::from));
        Ok(Box::pin(ndjson_lines(chunks)))
    }
}

/// Available model identifiers, or just `fallback` when the server cannot
/// say. Never fails.
pub async fn list_models(backend: &dyn LanguageModel, fallback: &str) -> Vec<String> {
    match backend.list_models().await {
        Ok(models) if !models.is_empty() => models,
        Ok(_) => {
            tracing::warn!(fallback, "server reported no models");
            vec![fallback.to_string()]
        }
        Err(e) => {
            tracing::warn!(error = %e, fallback, "using fallback model");
            vec![fallback.to_string()]
        }
    }
}
