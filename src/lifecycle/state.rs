//! Lifecycle state types

use serde::{Deserialize, Serialize};

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelState {
    /// No engine, no load in flight
    #[default]
    Idle,

    /// Load in flight for `model_id`, tagged with its epoch
    Loading { model_id: String, epoch: u64 },

    /// Engine from `epoch` is installed and bound to `model_id`
    Ready { model_id: String, epoch: u64 },

    /// Last load failed; waits for an explicit retry
    Failed { model_id: String, reason: String },
}

impl ModelState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ModelState::Loading { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready { .. })
    }

    /// Model this state refers to, if any
    pub fn model_id(&self) -> Option<&str> {
        match self {
            ModelState::Idle => None,
            ModelState::Loading { model_id, .. }
            | ModelState::Ready { model_id, .. }
            | ModelState::Failed { model_id, .. } => Some(model_id),
        }
    }

    /// Short name used in logs and notifications
    pub fn name(&self) -> &'static str {
        match self {
            ModelState::Idle => "idle",
            ModelState::Loading { .. } => "loading",
            ModelState::Ready { .. } => "ready",
            ModelState::Failed { .. } => "failed",
        }
    }
}

/// Full input to a transition: the state plus the epoch counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: ModelState,
    /// Epoch of the most recently started load; only ever increases
    pub latest_epoch: u64,
}
