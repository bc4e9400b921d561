//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    CharacterListResponse, CharacterResponse, ChatRequest, ChatResponse, ConversationResponse,
    ErrorResponse, ModelInfo, ModelStateResponse, ModelsResponse, PersonaRequest,
    PersonaResponse, ProfileRequest, ProfileResponse, SelectModelRequest,
};
use super::AppState;
use crate::character::CharacterDraft;
use crate::runtime::RuntimeError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Characters
        .route(
            "/api/characters",
            get(list_characters).post(create_character),
        )
        .route("/api/characters/deselect", post(deselect_character))
        .route("/api/characters/:id", get(get_character))
        .route("/api/characters/:id/select", post(select_character))
        // Conversation
        .route("/api/conversation", get(get_conversation))
        .route("/api/chat", post(send_chat))
        // Persona and profile
        .route("/api/persona", get(get_persona).put(save_persona))
        .route("/api/profile", get(get_profile).put(save_profile))
        // Models
        .route("/api/models", get(list_models))
        .route("/api/models/select", post(select_model))
        .route("/api/models/reload", post(reload_model))
        // Notifications
        .route("/api/events", get(stream_events))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Characters
// ============================================================

async fn list_characters(State(state): State<AppState>) -> Json<CharacterListResponse> {
    let runtime = &state.runtime;
    Json(CharacterListResponse {
        characters: runtime.characters(),
        bots_made: runtime.bots_made(),
        active: runtime.active_character().map(|c| c.id),
    })
}

async fn create_character(
    State(state): State<AppState>,
    Json(draft): Json<CharacterDraft>,
) -> Result<(StatusCode, Json<CharacterResponse>), AppError> {
    let character = state.runtime.create_character(draft)?;
    Ok((StatusCode::CREATED, Json(CharacterResponse { character })))
}

async fn get_character(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CharacterResponse>, AppError> {
    let character = state
        .runtime
        .character(id)
        .ok_or(RuntimeError::UnknownCharacter(id))?;
    Ok(Json(CharacterResponse { character }))
}

async fn select_character(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, AppError> {
    state.runtime.select_character(Some(id))?;
    Ok(conversation(&state))
}

async fn deselect_character(
    State(state): State<AppState>,
) -> Result<Json<ConversationResponse>, AppError> {
    state.runtime.select_character(None)?;
    Ok(conversation(&state))
}

// ============================================================
// Conversation
// ============================================================

async fn get_conversation(State(state): State<AppState>) -> Json<ConversationResponse> {
    conversation(&state)
}

fn conversation(state: &AppState) -> Json<ConversationResponse> {
    let (key, turns) = state.runtime.history();
    Json(ConversationResponse {
        key,
        active_character: state.runtime.active_character(),
        turns,
    })
}

/// Waits for the reply; progress also streams over `/api/events`.
/// A client that disconnects early still gets its reply in the history.
async fn send_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    Json(state.runtime.send(&req.text).await.into())
}

// ============================================================
// Persona and profile
// ============================================================

async fn get_persona(State(state): State<AppState>) -> Json<PersonaResponse> {
    Json(PersonaResponse {
        persona: state.runtime.persona(),
    })
}

async fn save_persona(
    State(state): State<AppState>,
    Json(req): Json<PersonaRequest>,
) -> Result<Json<PersonaResponse>, AppError> {
    let persona = state
        .runtime
        .save_persona(&req.name, &req.description, req.avatar)?;
    Ok(Json(PersonaResponse { persona }))
}

async fn get_profile(State(state): State<AppState>) -> Json<ProfileResponse> {
    Json(state.runtime.profile().into())
}

async fn save_profile(
    State(state): State<AppState>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state
        .runtime
        .save_profile(&req.username, &req.description)?;
    Ok(Json(profile.into()))
}

// ============================================================
// Models
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let runtime = &state.runtime;
    Json(ModelsResponse {
        models: runtime.models().iter().map(ModelInfo::from).collect(),
        selected: runtime.selected_model(),
        active: runtime.active_model_id(),
        ready: runtime.is_ready(),
        state: runtime.model_state(),
    })
}

/// Loading continues in the background; watch `/api/events` for the result
async fn select_model(
    State(state): State<AppState>,
    Json(req): Json<SelectModelRequest>,
) -> Result<(StatusCode, Json<ModelStateResponse>), AppError> {
    if req.load {
        state.runtime.switch_model(&req.model_id)?;
    } else {
        state.runtime.select_model(&req.model_id)?;
    }
    Ok((StatusCode::ACCEPTED, model_state(&state)))
}

async fn reload_model(State(state): State<AppState>) -> (StatusCode, Json<ModelStateResponse>) {
    state.runtime.reload_model(true);
    (StatusCode::ACCEPTED, model_state(&state))
}

fn model_state(state: &AppState) -> Json<ModelStateResponse> {
    let runtime = &state.runtime;
    Json(ModelStateResponse {
        selected: runtime.selected_model(),
        active: runtime.active_model_id(),
        ready: runtime.is_ready(),
        state: runtime.model_state(),
    })
}

// ============================================================
// Notifications
// ============================================================

async fn stream_events(State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the snapshot so nothing falls between them
    let rx = state.runtime.subscribe();
    sse_stream(state.runtime.snapshot(), rx)
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("ember-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Profile(_) | RuntimeError::UnknownModel(_) => {
                AppError::BadRequest(e.to_string())
            }
            RuntimeError::UnknownCharacter(_) => AppError::NotFound(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
