//! Events that drive the lifecycle

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    // Requests
    EnsureLoaded {
        selected_model: String,
    },
    Reload {
        model_id: String,
        force: bool,
    },

    // Load completions
    LoadSucceeded {
        epoch: u64,
    },
    LoadFailed {
        epoch: u64,
        reason: String,
    },
}
