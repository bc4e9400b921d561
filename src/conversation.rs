//! Per-character conversation histories

use crate::character::Character;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Key used when no character is active
pub const GLOBAL_CONVERSATION_KEY: &str = "global";

/// Identifies one conversation: a character id, or the global key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn global() -> Self {
        Self(GLOBAL_CONVERSATION_KEY.to_string())
    }

    /// Total and deterministic: the character's id, else the global key
    pub fn for_character(character: Option<&Character>) -> Self {
        character.map_or_else(Self::global, |c| Self(c.id.to_string()))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Speaker of a stored turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Owns every conversation, keyed by [`ConversationKey`].
///
/// Conversations are created lazily on first access and live for the
/// process lifetime. Turns are only ever appended.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<ConversationKey, Vec<ConversationTurn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the conversation for `key`, creating it if absent
    pub fn history(&self, key: &ConversationKey) -> Vec<ConversationTurn> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Append to the end of the conversation; returns the new length
    pub fn append(&self, key: &ConversationKey, turn: ConversationTurn) -> usize {
        let mut conversations = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let history = conversations.entry(key.clone()).or_default();
        history.push(turn);
        history.len()
    }

    /// Append only if the conversation has no turns yet; true when appended
    pub fn append_if_empty(&self, key: &ConversationKey, turn: ConversationTurn) -> bool {
        let mut conversations = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let history = conversations.entry(key.clone()).or_default();
        if !history.is_empty() {
            return false;
        }
        history.push(turn);
        true
    }

    #[cfg(test)]
    pub fn len(&self, key: &ConversationKey) -> usize {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }
}
