use crate::core::types::SessionId;
use thiserror::Error;

/// Failures that abort a pipeline invocation.
///
/// Linguistic problems (no match, ambiguity, missing slots) are never errors;
/// they come back as a `TurnResult`. Only infrastructure faults land here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Context store failure for session {session}: {source}")]
    Store {
        session: SessionId,
        #[source]
        source: StoreError,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating the intent catalog
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Duplicate intent name: {0}")]
    DuplicateIntent(String),

    #[error("Duplicate slot '{slot}' in intent {intent}")]
    DuplicateSlot { intent: String, slot: String },

    #[error("Invalid pattern '{pattern}' in intent {intent}: {message}")]
    InvalidPattern {
        intent: String,
        pattern: String,
        message: String,
    },

    #[error("Invalid weight {weight} for trigger '{trigger}' in intent {intent}")]
    InvalidWeight {
        intent: String,
        trigger: String,
        weight: f32,
    },

    #[error("Invalid default for slot '{slot}' in intent {intent}: {message}")]
    InvalidDefault {
        intent: String,
        slot: String,
        message: String,
    },

    #[error("Intent {0} declares no triggers")]
    NoTriggers(String),
}

/// Errors from a `ContextStore` backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors loading or validating `PipelineConfig`
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
