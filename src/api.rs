//! Local HTTP API over the chat runtime

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::runtime::ChatRuntime;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ChatRuntime>,
}

impl AppState {
    pub fn new(runtime: Arc<ChatRuntime>) -> Self {
        Self { runtime }
    }
}
