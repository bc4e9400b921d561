//! Inference engine abstraction
//!
//! The engine is an opaque asynchronous capability: load a model by id,
//! then generate completions from a list of turns.

mod error;
mod local;
mod models;
mod types;

pub use error::{EngineError, EngineErrorKind};
pub use local::{EngineConfig, LocalEngineLoader};
pub use models::{all_models, find_model, ModelDef, DEFAULT_MODEL_ID};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Callback receiving free-text progress reports during a load
pub type Progress<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A loaded engine, bound to one model
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generate a completion for `turns`
    async fn generate(
        &self,
        model_id: &str,
        turns: &[ChatTurn],
    ) -> Result<CompletionResult, EngineError>;
}

/// Creates engines. Invoked once per load attempt.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(
        &self,
        model_id: &str,
        progress: Progress<'_>,
    ) -> Result<Arc<dyn InferenceEngine>, EngineError>;
}

/// Logging wrapper for engines
pub struct LoggingEngine {
    inner: Arc<dyn InferenceEngine>,
    model_id: String,
}

impl LoggingEngine {
    pub fn new(inner: Arc<dyn InferenceEngine>, model_id: impl Into<String>) -> Self {
        Self {
            inner,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl InferenceEngine for LoggingEngine {
    async fn generate(
        &self,
        model_id: &str,
        turns: &[ChatTurn],
    ) -> Result<CompletionResult, EngineError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(model_id, turns).await;
        let duration = start.elapsed();

        match &result {
            Ok(completion) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    turns = turns.len(),
                    choices = completion.choices.len(),
                    "Generation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Generation failed"
                );
            }
        }

        result
    }
}
