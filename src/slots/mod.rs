//! Slot extraction and normalization
//!
//! utterance + intent schema + carried values -> SlotMap

pub mod filler;
pub mod normalize;
pub mod value;

pub use filler::SlotFiller;
pub use normalize::{normalize, NormalizedValue};
pub use value::{SlotMap, SlotSource, SlotValue};
