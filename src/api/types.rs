//! API request and response types

use crate::character::{Character, Persona, UserProfile};
use crate::conversation::{ConversationKey, ConversationTurn};
use crate::engine::ModelDef;
use crate::lifecycle::ModelState;
use crate::pipeline::{SendOutcome, SendRejection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Result of a send, tagged by `outcome`
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChatResponse {
    Replied {
        key: ConversationKey,
        reply: String,
    },
    Failed {
        key: ConversationKey,
    },
    Superseded {
        key: ConversationKey,
    },
    Rejected {
        reason: SendRejection,
    },
}

impl From<SendOutcome> for ChatResponse {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Replied { key, reply } => ChatResponse::Replied { key, reply },
            SendOutcome::Failed { key } => ChatResponse::Failed { key },
            SendOutcome::Superseded { key } => ChatResponse::Superseded { key },
            SendOutcome::Rejected(reason) => ChatResponse::Rejected { reason },
        }
    }
}

/// Response with every created character
#[derive(Debug, Serialize)]
pub struct CharacterListResponse {
    pub characters: Vec<Character>,
    pub bots_made: usize,
    pub active: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CharacterResponse {
    pub character: Character,
}

/// The active conversation
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub key: ConversationKey,
    pub active_character: Option<Character>,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
pub struct PersonaRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonaResponse {
    pub persona: Option<Persona>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfile,
    pub greeting: String,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            greeting: profile.greeting(),
            profile,
        }
    }
}

/// Model preset as shown in the picker
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub description: String,
}

impl From<&ModelDef> for ModelInfo {
    fn from(model: &ModelDef) -> Self {
        Self {
            id: model.id.to_string(),
            description: model.description.to_string(),
        }
    }
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub selected: String,
    pub active: String,
    pub ready: bool,
    pub state: ModelState,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model_id: String,
    /// Start loading right away; otherwise the next send loads it
    #[serde(default = "default_true")]
    pub load: bool,
}

/// Lifecycle state right after a model action was accepted
#[derive(Debug, Serialize)]
pub struct ModelStateResponse {
    pub selected: String,
    pub active: String,
    pub ready: bool,
    pub state: ModelState,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
