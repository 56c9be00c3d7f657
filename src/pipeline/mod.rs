//! Per-utterance orchestration

pub mod orchestrator;

pub use orchestrator::{
    Clarification, Diagnostic, Pipeline, PipelineOutcome, PipelineState, TurnResult,
};
