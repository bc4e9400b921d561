//! Executes lifecycle effects and owns the engine handle

use super::{transition, Effect, LifecycleEvent, LifecycleSnapshot, ModelState, TransitionError};
use crate::engine::{EngineLoader, InferenceEngine};
use crate::runtime::Notifier;
use crate::session::SessionState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;

/// The installed engine and the epoch whose load produced it
struct Installed {
    epoch: u64,
    engine: Arc<dyn InferenceEngine>,
}

struct Inner {
    snapshot: LifecycleSnapshot,
    handle: Option<Installed>,
}

/// Short-lived access to the ready engine for a single generation call.
///
/// Callers must check [`ModelManager::is_current`] with `epoch` once the
/// call resolves; the engine may have been replaced in the meantime.
#[derive(Clone)]
pub struct EngineLease {
    pub epoch: u64,
    pub model_id: String,
    pub engine: Arc<dyn InferenceEngine>,
}

/// Model Lifecycle Manager
///
/// At most one load is in flight and at most one handle is installed. The
/// selected model id lives in [`SessionState`]; this type only reads it,
/// except for `reload` which is itself a selection action.
pub struct ModelManager {
    loader: Arc<dyn EngineLoader>,
    session: Arc<SessionState>,
    notifier: Notifier,
    inner: Mutex<Inner>,
}

impl ModelManager {
    pub fn new(
        loader: Arc<dyn EngineLoader>,
        session: Arc<SessionState>,
        notifier: Notifier,
    ) -> Self {
        Self {
            loader,
            session,
            notifier,
            inner: Mutex::new(Inner {
                snapshot: LifecycleSnapshot::default(),
                handle: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ModelState {
        self.lock().snapshot.state.clone()
    }

    /// Ready, bound to the selected model, with a handle installed
    pub fn is_ready(&self) -> bool {
        self.lease().is_some()
    }

    /// Model the engine is loading, serving or failed on; the selection when idle
    pub fn active_model_id(&self) -> String {
        self.state()
            .model_id()
            .map_or_else(|| self.session.selected_model(), str::to_string)
    }

    /// The ready engine, if it serves the selected model
    pub fn lease(&self) -> Option<EngineLease> {
        let selected = self.session.selected_model();
        let inner = self.lock();
        match (&inner.snapshot.state, &inner.handle) {
            (ModelState::Ready { model_id, epoch }, Some(installed))
                if *model_id == selected && installed.epoch == *epoch =>
            {
                Some(EngineLease {
                    epoch: *epoch,
                    model_id: model_id.clone(),
                    engine: installed.engine.clone(),
                })
            }
            _ => None,
        }
    }

    /// Whether the handle from `epoch` is still the installed one
    pub fn is_current(&self, epoch: u64) -> bool {
        self.lock()
            .handle
            .as_ref()
            .is_some_and(|installed| installed.epoch == epoch)
    }

    /// Load the selected model unless it is ready or a load is in flight
    pub async fn ensure_loaded(&self) -> ModelState {
        let selected_model = self.session.selected_model();
        self.handle(LifecycleEvent::EnsureLoaded { selected_model })
            .await
    }

    /// Select `model_id`, then load it. `force` starts a fresh load even when ready.
    pub async fn reload(&self, model_id: &str, force: bool) -> ModelState {
        let previous = self.session.select_model(model_id);
        if previous != model_id {
            tracing::info!(from = %previous, to = %model_id, "Model selection changed");
        }
        self.handle(LifecycleEvent::Reload {
            model_id: model_id.to_string(),
            force,
        })
        .await
    }

    /// Run [`Self::ensure_loaded`] without making the caller wait
    pub fn spawn_ensure_loaded(self: &Arc<Self>) -> JoinHandle<ModelState> {
        let this = self.clone();
        tokio::spawn(async move { this.ensure_loaded().await })
    }

    /// Run [`Self::reload`] without making the caller wait
    pub fn spawn_reload(self: &Arc<Self>, model_id: String, force: bool) -> JoinHandle<ModelState> {
        let this = self.clone();
        tokio::spawn(async move { this.reload(&model_id, force).await })
    }

    async fn handle(&self, event: LifecycleEvent) -> ModelState {
        let mut pending_load = None;
        for effect in self.dispatch(event, None) {
            match effect {
                Effect::StartLoad { model_id, epoch } => pending_load = Some((model_id, epoch)),
                other => self.notify(other),
            }
        }

        if let Some((model_id, epoch)) = pending_load {
            self.load(&model_id, epoch).await;
        }
        self.state()
    }

    async fn load(&self, model_id: &str, epoch: u64) {
        tracing::info!(model = %model_id, epoch, "Loading model");
        let start = Instant::now();

        let progress = |text: &str| {
            if self.lock().snapshot.latest_epoch == epoch {
                self.notifier.status(text);
            }
        };
        let result = self.loader.load(model_id, &progress).await;
        let duration_ms = start.elapsed().as_millis();

        let (event, engine) = match result {
            Ok(engine) => {
                tracing::info!(
                    model = %model_id,
                    epoch,
                    duration_ms = %duration_ms,
                    "Model loaded"
                );
                (LifecycleEvent::LoadSucceeded { epoch }, Some(engine))
            }
            Err(e) => {
                tracing::error!(
                    model = %model_id,
                    epoch,
                    duration_ms = %duration_ms,
                    error = %e,
                    kind = ?e.kind,
                    "Model load failed"
                );
                (
                    LifecycleEvent::LoadFailed {
                        epoch,
                        reason: e.message,
                    },
                    None,
                )
            }
        };

        for effect in self.dispatch(event, engine) {
            self.notify(effect);
        }
    }

    /// Apply a transition and the handle effects under the lock. Returns the
    /// effects that must run outside it.
    fn dispatch(
        &self,
        event: LifecycleEvent,
        mut loaded: Option<Arc<dyn InferenceEngine>>,
    ) -> Vec<Effect> {
        let mut inner = self.lock();
        let result = match transition(&inner.snapshot, event) {
            Ok(result) => result,
            Err(TransitionError::StaleEpoch { epoch, latest }) => {
                tracing::debug!(epoch, latest, "Discarding superseded load result");
                return vec![];
            }
            Err(e) => {
                tracing::warn!(error = %e, "Lifecycle event rejected");
                return vec![];
            }
        };

        tracing::debug!(
            from = inner.snapshot.state.name(),
            to = result.new_state.name(),
            epoch = result.latest_epoch,
            "Lifecycle transition"
        );
        inner.snapshot = result.snapshot();
        let mut deferred = Vec::new();
        for effect in result.effects {
            match effect {
                Effect::DiscardHandle => {
                    if let Some(old) = inner.handle.take() {
                        tracing::info!(epoch = old.epoch, "Discarded engine handle");
                    }
                }
                Effect::InstallHandle { epoch } => match loaded.take() {
                    Some(engine) => inner.handle = Some(Installed { epoch, engine }),
                    None => tracing::warn!(epoch, "No engine to install"),
                },
                other => deferred.push(other),
            }
        }
        deferred
    }

    fn notify(&self, effect: Effect) {
        match effect {
            Effect::NotifyStatus { text } => self.notifier.status(text),
            Effect::NotifyState { state } => self.notifier.model_state(state),
            other => tracing::warn!(effect = ?other, "Unexpected lifecycle effect"),
        }
    }
}
