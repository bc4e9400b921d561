//! Characters, the user's persona, and the user profile
//!
//! All three are created from user-entered drafts. Drafts are trimmed and
//! length-checked here so the rest of the core can treat the records as valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

pub const NAME_MAX_CHARS: usize = 20;
pub const DESCRIPTION_MAX_CHARS: usize = 750;
pub const NOTES_MAX_CHARS: usize = 300;
pub const USER_DESCRIPTION_MAX_CHARS: usize = 500;

/// Attribution used when the user has not set a username
pub const DEFAULT_AUTHOR: &str = "You";

/// Validation failures for user-entered records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ProfileError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ProfileError::TooLong { field, max, actual });
    }
    Ok(())
}

fn trimmed_option(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Character
// ============================================================================

/// Form input for the character creation workflow
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub greeting: Option<String>,
    /// Image reference (data URL or path), already read by the UI
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A user-authored persona the model roleplays as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Character {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub notes: String,
    pub greeting: Option<String>,
    pub author: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Character {
    /// Validate a draft and assign a fresh id
    pub fn create(draft: CharacterDraft, author: impl Into<String>) -> Result<Self, ProfileError> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(ProfileError::Required { field: "name" });
        }
        check_len("name", &name, NAME_MAX_CHARS)?;

        let description = draft.description.trim().to_string();
        check_len("description", &description, DESCRIPTION_MAX_CHARS)?;

        let notes = draft.notes.trim().to_string();
        check_len("notes", &notes, NOTES_MAX_CHARS)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description,
            notes,
            greeting: trimmed_option(draft.greeting),
            author: author.into(),
            avatar: trimmed_option(draft.avatar),
            created_at: Utc::now(),
        })
    }
}

/// Every character created during this process. Only grows.
#[derive(Debug, Default)]
pub struct CharacterRoster {
    characters: RwLock<Vec<Character>>,
}

impl CharacterRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        draft: CharacterDraft,
        author: impl Into<String>,
    ) -> Result<Character, ProfileError> {
        let character = Character::create(draft, author)?;
        self.characters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(character.clone());
        tracing::info!(id = %character.id, name = %character.name, "Character created");
        Ok(character)
    }

    pub fn get(&self, id: Uuid) -> Option<Character> {
        self.characters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Character> {
        self.characters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The "bots made" counter
    pub fn count(&self) -> usize {
        self.characters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ============================================================================
// Persona
// ============================================================================

/// The user's identity as presented to the model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Persona {
    pub fn new(
        name: &str,
        description: &str,
        avatar: Option<String>,
    ) -> Result<Self, ProfileError> {
        let name = name.trim().to_string();
        check_len("persona name", &name, NAME_MAX_CHARS)?;
        let description = description.trim().to_string();
        check_len("persona description", &description, DESCRIPTION_MAX_CHARS)?;
        Ok(Self {
            name,
            description,
            avatar: trimmed_option(avatar),
        })
    }

    /// A persona without a name counts as "not defined"
    pub fn is_defined(&self) -> bool {
        !self.name.is_empty()
    }
}

// ============================================================================
// User profile
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub description: String,
}

impl UserProfile {
    pub fn new(username: &str, description: &str) -> Result<Self, ProfileError> {
        let username = username.trim().to_string();
        check_len("username", &username, NAME_MAX_CHARS)?;
        let description = description.trim().to_string();
        check_len("user description", &description, USER_DESCRIPTION_MAX_CHARS)?;
        Ok(Self {
            username,
            description,
        })
    }

    /// Name credited on characters this user creates
    pub fn author(&self) -> &str {
        if self.username.is_empty() {
            DEFAULT_AUTHOR
        } else {
            &self.username
        }
    }

    pub fn greeting(&self) -> String {
        if self.username.is_empty() {
            "Hello there".to_string()
        } else {
            format!("Hello, {}", self.username)
        }
    }
}
