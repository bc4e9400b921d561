//! Effects produced by lifecycle transitions

use super::ModelState;

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Drop the installed engine handle, if any
    DiscardHandle,

    /// Begin loading `model_id`; the result must be reported with `epoch`
    StartLoad { model_id: String, epoch: u64 },

    /// Install the engine produced by the load of `epoch`
    InstallHandle { epoch: u64 },

    /// Status text for the UI
    NotifyStatus { text: String },

    /// The state changed
    NotifyState { state: ModelState },
}

impl Effect {
    pub fn status(text: impl Into<String>) -> Self {
        Effect::NotifyStatus { text: text.into() }
    }

    pub fn loading_status(model_id: &str) -> Self {
        Self::status(format!("Loading {model_id}..."))
    }

    pub fn ready_status(model_id: &str) -> Self {
        Self::status(format!("Model ready — {model_id}"))
    }

    pub fn failed_status() -> Self {
        Self::status("Failed to load model.")
    }
}
