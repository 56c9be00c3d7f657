//! Facility Intents - natural-language building commands
//!
//! Turns free-form operator utterances ("turn off lighting in room 204")
//! into validated, executable commands, asking for clarification when an
//! utterance is ambiguous or incomplete and remembering slot values across
//! the turns of a session.

pub mod command;
pub mod context;
pub mod core;
pub mod detect;
pub mod pipeline;
pub mod registry;
pub mod slots;

pub use crate::core::config::PipelineConfig;
pub use crate::core::error::{PipelineError, Result};
pub use crate::core::types::{SessionId, Utterance};
pub use crate::pipeline::{Pipeline, PipelineOutcome, TurnResult};
