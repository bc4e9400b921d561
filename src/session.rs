//! Session state shared by every surface
//!
//! Holds the process-wide selections: active character, persona, user
//! profile and the selected model id. Readers get owned snapshots so nothing
//! borrowed from here survives an `.await`.

use crate::character::{Character, Persona, UserProfile};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Selections {
    active_character: Option<Character>,
    persona: Option<Persona>,
    profile: UserProfile,
    selected_model: String,
}

#[derive(Debug)]
pub struct SessionState {
    inner: RwLock<Selections>,
}

impl SessionState {
    pub fn new(selected_model: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Selections {
                active_character: None,
                persona: None,
                profile: UserProfile::default(),
                selected_model: selected_model.into(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Selections> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Selections> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_character(&self) -> Option<Character> {
        self.read().active_character.clone()
    }

    pub fn set_active_character(&self, character: Option<Character>) {
        self.write().active_character = character;
    }

    pub fn persona(&self) -> Option<Persona> {
        self.read().persona.clone()
    }

    pub fn set_persona(&self, persona: Option<Persona>) {
        self.write().persona = persona;
    }

    pub fn profile(&self) -> UserProfile {
        self.read().profile.clone()
    }

    pub fn set_profile(&self, profile: UserProfile) {
        self.write().profile = profile;
    }

    /// The single authoritative model id
    pub fn selected_model(&self) -> String {
        self.read().selected_model.clone()
    }

    /// Returns the previously selected id
    pub fn select_model(&self, model_id: impl Into<String>) -> String {
        std::mem::replace(&mut self.write().selected_model, model_id.into())
    }
}
