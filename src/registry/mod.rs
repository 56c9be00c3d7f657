//! Intent schema registry
//!
//! Schemas are declared in TOML, validated and compiled on load, and are
//! immutable afterwards.

pub mod catalog;
pub mod schema;

pub use catalog::{CompiledPattern, CompiledSlot, CompiledTrigger, IntentRegistry, RegisteredIntent};
pub use schema::{
    IntentFile, IntentSchema, PatternDef, SlotSpec, TriggerKind, TriggerRule, UnitConversion,
    ValueType,
};
