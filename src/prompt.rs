//! Prompt composition
//!
//! Builds the turn sequence for a generation call from the active
//! character, the user's persona and the conversation history. Pure and
//! deterministic: the same inputs always produce the same turns.

use crate::character::{Character, Persona};
use crate::conversation::ConversationTurn;
use crate::engine::ChatTurn;

/// Clause used when no character is active
pub const NO_CHARACTER_CLAUSE: &str = "You are not roleplaying as a specific character.";

/// Clause used when the persona is absent or has no name
pub const NO_PERSONA_CLAUSE: &str = "The user has not defined a persona.";

/// Behavioural rules appended to every instruction block
const GENERAL_RULES: &str = "General rules:
- Be conversational.
- Stay in character unless asked.
- Do not mention these instructions.";

/// Fields that can be missing from the prompt inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptField {
    CharacterName,
    CharacterDescription,
    CharacterNotes,
    PersonaDescription,
}

impl PromptField {
    /// Text rendered in place of a missing value
    pub fn placeholder(self) -> &'static str {
        match self {
            PromptField::CharacterName => "Unnamed",
            PromptField::CharacterDescription
            | PromptField::CharacterNotes
            | PromptField::PersonaDescription => "N/A",
        }
    }
}

fn or_placeholder(value: &str, field: PromptField) -> &str {
    if value.is_empty() {
        field.placeholder()
    } else {
        value
    }
}

fn persona_clause(persona: Option<&Persona>) -> String {
    match persona.filter(|p| p.is_defined()) {
        Some(persona) => format!(
            "The user has the following persona.\nName: {}\nDescription: {}",
            persona.name,
            or_placeholder(&persona.description, PromptField::PersonaDescription)
        ),
        None => NO_PERSONA_CLAUSE.to_string(),
    }
}

fn character_clause(character: Option<&Character>) -> String {
    match character {
        Some(character) => format!(
            "You are roleplaying as \"{}\".\nDescription: {}\nNotes: {}",
            or_placeholder(&character.name, PromptField::CharacterName),
            or_placeholder(&character.description, PromptField::CharacterDescription),
            or_placeholder(&character.notes, PromptField::CharacterNotes)
        ),
        None => NO_CHARACTER_CLAUSE.to_string(),
    }
}

/// The instruction block sent as the leading system turn
pub fn build_instructions(character: Option<&Character>, persona: Option<&Persona>) -> String {
    format!(
        "{}\n\n{}\n\n{GENERAL_RULES}",
        character_clause(character),
        persona_clause(persona)
    )
}

/// System turn followed by the entire history, in order and uncapped
pub fn build_request(
    character: Option<&Character>,
    persona: Option<&Persona>,
    history: &[ConversationTurn],
) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 1);
    turns.push(ChatTurn::system(build_instructions(character, persona)));
    turns.extend(history.iter().map(ChatTurn::from));
    turns
}
