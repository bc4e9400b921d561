//! Engine backed by an inference runtime on the loopback interface
//!
//! Speaks the Ollama-compatible API: models are loaded with a streamed
//! `/api/pull`, completions come from the `OpenAI`-compatible
//! `/v1/chat/completions` endpoint.

use super::{
    find_model, ChatTurn, CompletionResult, EngineError, EngineLoader, InferenceEngine,
    LoggingEngine, Progress,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:11434";

/// Configuration for the local inference runtime
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENGINE_URL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("EMBER_ENGINE_URL")
                .unwrap_or_else(|_| DEFAULT_ENGINE_URL.to_string()),
        }
    }
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

/// One line of the streamed pull response
#[derive(Debug, Default, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl PullStatus {
    fn progress_text(&self) -> Option<String> {
        let status = self.status.as_deref()?;
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some(format!("{status} ({}%)", done.min(total) * 100 / total))
            }
            _ => Some(status.to_string()),
        }
    }

    fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

/// Loads models into the local runtime
pub struct LocalEngineLoader {
    client: Client,
    base_url: String,
}

impl LocalEngineLoader {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EngineLoader for LocalEngineLoader {
    async fn load(
        &self,
        model_id: &str,
        progress: Progress<'_>,
    ) -> Result<Arc<dyn InferenceEngine>, EngineError> {
        let model = find_model(model_id)
            .ok_or_else(|| EngineError::model_unavailable(format!("Unknown model: {model_id}")))?;

        let response = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&PullRequest {
                model: model.runtime_name,
                stream: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut ready = false;
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                ready |= handle_pull_line(&line, progress)?;
            }
        }
        ready |= handle_pull_line(&buffer, progress)?;

        if !ready {
            return Err(EngineError::model_unavailable(format!(
                "Pull of {} ended before the model was ready",
                model.runtime_name
            )));
        }

        let engine = LocalEngine {
            client: self.client.clone(),
            url: format!("{}/v1/chat/completions", self.base_url),
            model_id: model.id.to_string(),
            runtime_name: model.runtime_name,
        };
        Ok(Arc::new(LoggingEngine::new(Arc::new(engine), model.id)))
    }
}

/// Parse one pull line and relay its progress. Returns whether it reported success.
fn handle_pull_line(line: &[u8], progress: Progress<'_>) -> Result<bool, EngineError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }

    let status: PullStatus = serde_json::from_str(line)
        .map_err(|e| EngineError::malformed(format!("Invalid pull status: {e}")))?;
    if let Some(error) = status.error {
        return Err(EngineError::model_unavailable(error));
    }
    if let Some(text) = status.progress_text() {
        progress(&text);
    }
    Ok(status.is_success())
}

fn classify_status(status: StatusCode, body: &str) -> EngineError {
    let message = format!("HTTP {status}: {body}");
    if status == StatusCode::NOT_FOUND {
        EngineError::model_unavailable(message)
    } else if status.is_client_error() {
        EngineError::invalid_request(message)
    } else {
        EngineError::unknown(message)
    }
}

/// A model resident in the local runtime
struct LocalEngine {
    client: Client,
    url: String,
    model_id: String,
    runtime_name: &'static str,
}

#[async_trait]
impl InferenceEngine for LocalEngine {
    async fn generate(
        &self,
        model_id: &str,
        turns: &[ChatTurn],
    ) -> Result<CompletionResult, EngineError> {
        if model_id != self.model_id {
            tracing::warn!(
                requested = %model_id,
                loaded = %self.model_id,
                "Generation requested for a model this engine is not bound to"
            );
        }

        let response = self
            .client
            .post(&self.url)
            .json(&CompletionRequest {
                model: self.runtime_name,
                messages: turns,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| EngineError::malformed(format!("Invalid completion: {e}")))
    }
}
