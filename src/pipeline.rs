//! Message pipeline: one user send through to one appended reply

use crate::conversation::{ConversationKey, ConversationStore, ConversationTurn};
use crate::engine::ChatTurn;
use crate::lifecycle::{EngineLease, ModelManager};
use crate::prompt::build_request;
use crate::runtime::Notifier;
use crate::session::SessionState;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Appended when the engine returns no usable text
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no response)";

/// Appended as the assistant turn when generation fails
pub const GENERATION_ERROR_REPLY: &str = "Something went wrong while generating a response.";

pub const THINKING_STATUS: &str = "Thinking...";
pub const GENERATION_ERROR_STATUS: &str = "Error during generation.";

/// Why a send was turned away before touching any history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum SendRejection {
    #[error("message is empty")]
    InvalidInput,
    #[error("model is not ready")]
    EngineNotReady,
    #[error("a reply is already being generated")]
    AlreadyGenerating,
}

/// What a send did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// User and assistant turns appended
    Replied { key: ConversationKey, reply: String },
    /// Generation failed; the fixed error turn was appended
    Failed { key: ConversationKey },
    /// The engine was replaced mid-generation; only the user turn remains
    Superseded { key: ConversationKey },
    Rejected(SendRejection),
}

/// Releases the generating flag on every exit path
struct GeneratingGuard {
    flag: Arc<AtomicBool>,
    notifier: Notifier,
}

impl GeneratingGuard {
    fn claim(flag: &Arc<AtomicBool>, notifier: &Notifier) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            flag: flag.clone(),
            notifier: notifier.clone(),
        })
    }
}

impl Drop for GeneratingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.notifier.typing(false);
    }
}

/// One accepted send, from the engine call to the appended reply.
///
/// Owns everything it touches so it can run detached from the caller.
struct Generation {
    store: Arc<ConversationStore>,
    models: Arc<ModelManager>,
    notifier: Notifier,
    lease: EngineLease,
    key: ConversationKey,
    turns: Vec<ChatTurn>,
    _guard: GeneratingGuard,
}

impl Generation {
    async fn run(self) -> SendOutcome {
        let Self {
            store,
            models,
            notifier,
            lease,
            key,
            turns,
            _guard,
        } = self;

        let result = lease.engine.generate(&lease.model_id, &turns).await;

        if !models.is_current(lease.epoch) {
            tracing::info!(
                key = %key,
                epoch = lease.epoch,
                "Discarding reply from replaced engine"
            );
            return SendOutcome::Superseded { key };
        }

        match result {
            Ok(completion) => {
                let reply = completion
                    .first_text()
                    .unwrap_or(EMPTY_REPLY_PLACEHOLDER)
                    .to_string();
                append_reply(&store, &notifier, &key, reply.clone());
                notifier.status(format!("Model: {}", lease.model_id));
                SendOutcome::Replied { key, reply }
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, kind = ?e.kind, "Generation failed");
                append_reply(&store, &notifier, &key, GENERATION_ERROR_REPLY.to_string());
                notifier.status(GENERATION_ERROR_STATUS);
                SendOutcome::Failed { key }
            }
        }
    }
}

fn append_reply(
    store: &ConversationStore,
    notifier: &Notifier,
    key: &ConversationKey,
    reply: String,
) {
    store.append(key, ConversationTurn::assistant(reply));
    notifier.history(key.clone(), store.history(key));
}

pub struct MessagePipeline {
    store: Arc<ConversationStore>,
    session: Arc<SessionState>,
    models: Arc<ModelManager>,
    notifier: Notifier,
    generating: Arc<AtomicBool>,
}

impl MessagePipeline {
    pub fn new(
        store: Arc<ConversationStore>,
        session: Arc<SessionState>,
        models: Arc<ModelManager>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            session,
            models,
            notifier,
            generating: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    /// Process one user message.
    ///
    /// The conversation key, character and persona are captured up front so
    /// a selection change during generation cannot redirect the reply. Once
    /// the user turn is appended the rest runs on its own task: dropping the
    /// returned future does not cancel the generation or its reply.
    pub async fn send(&self, raw: &str) -> SendOutcome {
        let text = raw.trim();
        if text.is_empty() {
            return SendOutcome::Rejected(SendRejection::InvalidInput);
        }

        let Some(lease) = self.models.lease() else {
            tracing::info!("Send rejected, model not ready");
            self.models.spawn_ensure_loaded();
            return SendOutcome::Rejected(SendRejection::EngineNotReady);
        };

        let Some(guard) = GeneratingGuard::claim(&self.generating, &self.notifier) else {
            tracing::debug!("Send dropped, generation in flight");
            return SendOutcome::Rejected(SendRejection::AlreadyGenerating);
        };

        let character = self.session.active_character();
        let persona = self.session.persona();
        let key = ConversationKey::for_character(character.as_ref());

        self.store.append(&key, ConversationTurn::user(text));
        self.notifier.history(key.clone(), self.store.history(&key));
        self.notifier.typing(true);
        self.notifier.status(THINKING_STATUS);

        let history = self.store.history(&key);
        let turns = build_request(character.as_ref(), persona.as_ref(), &history);
        tracing::debug!(
            key = %key,
            turns = turns.len(),
            model = %lease.model_id,
            "Requesting completion"
        );

        let generation = Generation {
            store: self.store.clone(),
            models: self.models.clone(),
            notifier: self.notifier.clone(),
            lease,
            key: key.clone(),
            turns,
            _guard: guard,
        };
        match tokio::spawn(generation.run()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Generation task aborted");
                SendOutcome::Failed { key }
            }
        }
    }
}
