//! Core type definitions used throughout the codebase

use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wall-clock instant attached to every utterance
pub type Timestamp = DateTime<Utc>;

/// Opaque session identifier, the only key into dialogue state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random session id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One natural-language turn submitted to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Raw text as typed or transcribed
    pub text: String,
    pub session_id: SessionId,
    pub timestamp: Timestamp,
}

impl Utterance {
    pub fn new(text: impl Into<String>, session_id: impl Into<SessionId>, timestamp: Timestamp) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            timestamp,
        }
    }

    /// Utterance stamped with the current time
    pub fn now(text: impl Into<String>, session_id: impl Into<SessionId>) -> Self {
        Self::new(text, session_id, Utc::now())
    }
}
