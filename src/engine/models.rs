//! Selectable model presets

/// Preset selected when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "Llama-3-8B-Instruct-q4f16_1";

/// Model preset with metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDef {
    /// User-facing model id
    pub id: &'static str,
    /// Tag the local runtime knows this model by
    pub runtime_name: &'static str,
    /// Human-readable description
    pub description: &'static str,
}

/// All selectable presets
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "Llama-3-8B-Instruct-q4f16_1",
            runtime_name: "llama3:8b-instruct-q4_0",
            description: "Llama 3 8B Instruct (default, best quality)",
        },
        ModelDef {
            id: "Phi-3-mini-4k-instruct-q4f16_1",
            runtime_name: "phi3:3.8b-mini-4k-instruct-q4_0",
            description: "Phi-3 mini 4k Instruct (smaller, faster)",
        },
    ]
}

pub fn find_model(id: &str) -> Option<&'static ModelDef> {
    all_models().iter().find(|m| m.id == id)
}
