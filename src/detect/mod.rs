//! Intent detection
//!
//! Turns an utterance into ranked intent candidates. The rule-based
//! `IntentDetector` is the default; anything implementing `IntentClassifier`
//! can replace it without touching later stages.

pub mod detector;

pub use detector::{Detection, IntentCandidate, IntentClassifier, IntentDetector, TriggerEvidence};
