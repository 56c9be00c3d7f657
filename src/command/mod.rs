//! Command synthesis
//!
//! Resolved intent + merged slots -> CommandTranslator -> Command
//! (ready payload or outstanding slots)

pub mod translator;

pub use translator::{
    Command, CommandPayload, CommandStatus, CommandTranslator, OutstandingSlot, SlotProblem,
};
