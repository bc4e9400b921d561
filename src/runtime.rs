//! Chat runtime: wires the store, session, model manager and pipeline
//! together and fans state changes out to subscribers.

#[cfg(test)]
pub mod testing;

use crate::character::{
    Character, CharacterDraft, CharacterRoster, Persona, ProfileError, UserProfile,
};
use crate::conversation::{ConversationKey, ConversationStore, ConversationTurn};
use crate::engine::{all_models, find_model, EngineLoader, ModelDef};
use crate::lifecycle::{ModelManager, ModelState};
use crate::pipeline::{MessagePipeline, SendOutcome};
use crate::session::SessionState;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Events pushed to observers (the SSE stream in production)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Status {
        text: String,
    },
    Typing {
        active: bool,
    },
    History {
        key: ConversationKey,
        turns: Vec<ConversationTurn>,
    },
    ModelState {
        state: ModelState,
    },
}

/// Broadcast handle shared by every component that reports to the UI.
///
/// Sends never fail: with no subscribers the event is simply dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.emit(SessionEvent::Status { text: text.into() });
    }

    pub fn typing(&self, active: bool) {
        self.emit(SessionEvent::Typing { active });
    }

    pub fn history(&self, key: ConversationKey, turns: Vec<ConversationTurn>) {
        self.emit(SessionEvent::History { key, turns });
    }

    pub fn model_state(&self, state: ModelState) {
        self.emit(SessionEvent::ModelState { state });
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("Unknown character: {0}")]
    UnknownCharacter(Uuid),
    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

/// Everything a freshly connected client needs to render
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub key: ConversationKey,
    pub turns: Vec<ConversationTurn>,
    pub active_character: Option<Character>,
    pub selected_model: String,
    pub active_model: String,
    pub model_state: ModelState,
    pub ready: bool,
    pub generating: bool,
    pub bots_made: usize,
}

pub struct ChatRuntime {
    session: Arc<SessionState>,
    roster: CharacterRoster,
    store: Arc<ConversationStore>,
    models: Arc<ModelManager>,
    pipeline: MessagePipeline,
    notifier: Notifier,
}

impl ChatRuntime {
    pub fn new(loader: Arc<dyn EngineLoader>, default_model: &str) -> Self {
        let notifier = Notifier::new();
        let session = Arc::new(SessionState::new(default_model));
        let store = Arc::new(ConversationStore::new());
        let models = Arc::new(ModelManager::new(
            loader,
            session.clone(),
            notifier.clone(),
        ));
        let pipeline = MessagePipeline::new(
            store.clone(),
            session.clone(),
            models.clone(),
            notifier.clone(),
        );

        Self {
            session,
            roster: CharacterRoster::new(),
            store,
            models,
            pipeline,
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notifier.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let active_character = self.session.active_character();
        let key = ConversationKey::for_character(active_character.as_ref());
        SessionSnapshot {
            turns: self.store.history(&key),
            key,
            active_character,
            selected_model: self.session.selected_model(),
            active_model: self.active_model_id(),
            model_state: self.models.state(),
            ready: self.is_ready(),
            generating: self.is_generating(),
            bots_made: self.roster.count(),
        }
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    /// Create a character credited to the current user
    pub fn create_character(&self, draft: CharacterDraft) -> Result<Character, RuntimeError> {
        let profile = self.session.profile();
        Ok(self.roster.create(draft, profile.author())?)
    }

    pub fn characters(&self) -> Vec<Character> {
        self.roster.list()
    }

    pub fn character(&self, id: Uuid) -> Option<Character> {
        self.roster.get(id)
    }

    pub fn bots_made(&self) -> usize {
        self.roster.count()
    }

    pub fn active_character(&self) -> Option<Character> {
        self.session.active_character()
    }

    /// Make `id` the active character, or return to the global
    /// conversation with `None`. A character's greeting opens an empty
    /// conversation. Starts loading the model in the background.
    pub fn select_character(&self, id: Option<Uuid>) -> Result<Option<Character>, RuntimeError> {
        let character = match id {
            Some(id) => Some(
                self.roster
                    .get(id)
                    .ok_or(RuntimeError::UnknownCharacter(id))?,
            ),
            None => None,
        };

        let key = ConversationKey::for_character(character.as_ref());
        if let Some(greeting) = character.as_ref().and_then(|c| c.greeting.clone()) {
            self.store
                .append_if_empty(&key, ConversationTurn::assistant(greeting));
        }
        self.session.set_active_character(character.clone());
        tracing::info!(key = %key, "Active character changed");

        self.notifier.history(key.clone(), self.store.history(&key));
        self.models.spawn_ensure_loaded();
        Ok(character)
    }

    /// Current conversation for the active character
    pub fn history(&self) -> (ConversationKey, Vec<ConversationTurn>) {
        let key = ConversationKey::for_character(self.session.active_character().as_ref());
        let turns = self.store.history(&key);
        (key, turns)
    }

    // ------------------------------------------------------------------
    // Persona and profile
    // ------------------------------------------------------------------

    /// Save the persona; a blank name clears it
    pub fn save_persona(
        &self,
        name: &str,
        description: &str,
        avatar: Option<String>,
    ) -> Result<Option<Persona>, RuntimeError> {
        let persona = Persona::new(name, description, avatar)?;
        let persona = persona.is_defined().then_some(persona);
        self.session.set_persona(persona.clone());
        tracing::info!(defined = persona.is_some(), "Persona saved");
        Ok(persona)
    }

    pub fn persona(&self) -> Option<Persona> {
        self.session.persona()
    }

    pub fn save_profile(
        &self,
        username: &str,
        description: &str,
    ) -> Result<UserProfile, RuntimeError> {
        let profile = UserProfile::new(username, description)?;
        self.session.set_profile(profile.clone());
        tracing::info!(username = %profile.username, "Profile saved");
        Ok(profile)
    }

    pub fn profile(&self) -> UserProfile {
        self.session.profile()
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    pub fn models(&self) -> &'static [ModelDef] {
        all_models()
    }

    pub fn selected_model(&self) -> String {
        self.session.selected_model()
    }

    pub fn model_state(&self) -> ModelState {
        self.models.state()
    }

    pub fn is_ready(&self) -> bool {
        self.models.is_ready()
    }

    pub fn active_model_id(&self) -> String {
        self.models.active_model_id()
    }

    /// Change the selection only; the next send or ensure loads it
    pub fn select_model(&self, model_id: &str) -> Result<(), RuntimeError> {
        let model =
            find_model(model_id).ok_or_else(|| RuntimeError::UnknownModel(model_id.to_string()))?;
        let previous = self.session.select_model(model.id);
        tracing::info!(from = %previous, to = %model.id, "Model selected");
        Ok(())
    }

    /// Select `model_id` and start loading it in the background
    pub fn switch_model(&self, model_id: &str) -> Result<JoinHandle<ModelState>, RuntimeError> {
        let model =
            find_model(model_id).ok_or_else(|| RuntimeError::UnknownModel(model_id.to_string()))?;
        Ok(self.models.spawn_reload(model.id.to_string(), false))
    }

    /// Reload the selected model in the background
    pub fn reload_model(&self, force: bool) -> JoinHandle<ModelState> {
        self.models
            .spawn_reload(self.session.selected_model(), force)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send(&self, text: &str) -> SendOutcome {
        self.pipeline.send(text).await
    }

    pub fn is_generating(&self) -> bool {
        self.pipeline.is_generating()
    }
}
