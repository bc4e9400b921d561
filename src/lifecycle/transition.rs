//! Pure lifecycle transition function

use super::{Effect, LifecycleEvent, LifecycleSnapshot, ModelState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: ModelState,
    pub latest_epoch: u64,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    /// No state change and nothing to do
    fn unchanged(snapshot: &LifecycleSnapshot) -> Self {
        Self {
            new_state: snapshot.state.clone(),
            latest_epoch: snapshot.latest_epoch,
            effects: vec![],
        }
    }

    fn new(state: ModelState, latest_epoch: u64) -> Self {
        Self {
            new_state: state,
            latest_epoch,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// The snapshot to store after this transition
    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.new_state.clone(),
            latest_epoch: self.latest_epoch,
        }
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A load finished after a newer one was started; its result is dropped
    #[error("Load from epoch {epoch} superseded by epoch {latest}")]
    StaleEpoch { epoch: u64, latest: u64 },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same snapshot and event it always produces the same result,
/// with no I/O.
pub fn transition(
    snapshot: &LifecycleSnapshot,
    event: LifecycleEvent,
) -> Result<TransitionResult, TransitionError> {
    match (&snapshot.state, event) {
        // ============================================================
        // Load requests
        // ============================================================

        // A load is already in flight: absorb
        (ModelState::Loading { .. }, LifecycleEvent::EnsureLoaded { .. }) => {
            Ok(TransitionResult::unchanged(snapshot))
        }

        // Already serving the selected model
        (ModelState::Ready { model_id, .. }, LifecycleEvent::EnsureLoaded { selected_model })
            if *model_id == selected_model =>
        {
            Ok(TransitionResult::unchanged(snapshot))
        }

        // Idle, Failed, or Ready for a model that is no longer selected
        (_, LifecycleEvent::EnsureLoaded { selected_model }) => {
            Ok(start_load(snapshot, selected_model))
        }

        (_, LifecycleEvent::Reload { model_id, force: true }) => Ok(start_load(snapshot, model_id)),

        (_, LifecycleEvent::Reload {
            model_id,
            force: false,
        }) => transition(
            snapshot,
            LifecycleEvent::EnsureLoaded {
                selected_model: model_id,
            },
        ),

        // ============================================================
        // Load completions
        // ============================================================

        (ModelState::Loading { model_id, epoch }, LifecycleEvent::LoadSucceeded { epoch: done })
            if *epoch == done =>
        {
            let state = ModelState::Ready {
                model_id: model_id.clone(),
                epoch: done,
            };
            Ok(TransitionResult::new(state.clone(), snapshot.latest_epoch)
                .with_effect(Effect::InstallHandle { epoch: done })
                .with_effect(Effect::NotifyState { state })
                .with_effect(Effect::ready_status(model_id)))
        }

        (
            ModelState::Loading { model_id, epoch },
            LifecycleEvent::LoadFailed {
                epoch: done,
                reason,
            },
        ) if *epoch == done => {
            let state = ModelState::Failed {
                model_id: model_id.clone(),
                reason,
            };
            Ok(TransitionResult::new(state.clone(), snapshot.latest_epoch)
                .with_effect(Effect::NotifyState { state })
                .with_effect(Effect::failed_status()))
        }

        (_, LifecycleEvent::LoadSucceeded { epoch } | LifecycleEvent::LoadFailed { epoch, .. })
            if epoch != snapshot.latest_epoch =>
        {
            Err(TransitionError::StaleEpoch {
                epoch,
                latest: snapshot.latest_epoch,
            })
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} with event {event:?}"
        ))),
    }
}

/// Start a fresh epoch loading `model_id`, discarding any current handle first
fn start_load(snapshot: &LifecycleSnapshot, model_id: String) -> TransitionResult {
    let epoch = snapshot.latest_epoch + 1;
    let state = ModelState::Loading {
        model_id: model_id.clone(),
        epoch,
    };
    TransitionResult::new(state.clone(), epoch)
        .with_effect(Effect::DiscardHandle)
        .with_effect(Effect::NotifyState { state })
        .with_effect(Effect::loading_status(&model_id))
        .with_effect(Effect::StartLoad { model_id, epoch })
}
