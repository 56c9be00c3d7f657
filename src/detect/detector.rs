//! Rule-based intent detection
//!
//! Every trigger rule that fires adds its weight to the intent's score:
//!
//! confidence = min(1.0, sum(matched weights) / saturation)
//!
//! Adding evidence can only raise a score, never lower it. Candidates below
//! the confidence floor are dropped; a narrow lead of the best candidate
//! over the runner-up flags the detection as ambiguous.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::config::DetectionConfig;
use crate::registry::{IntentRegistry, RegisteredIntent, TriggerKind};

/// Which rule fired and on what text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvidence {
    pub kind: TriggerKind,
    /// The rule as written in the schema
    pub rule: String,
    pub weight: f32,
    /// Utterance text the rule matched
    pub matched: String,
}

/// An intent the utterance may express
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: String,
    /// Normalized score in [0, 1]
    pub confidence: f32,
    pub evidence: Vec<TriggerEvidence>,
    /// Required slots whose patterns match the utterance
    pub required_slots_matched: usize,
    pub registration_index: usize,
}

/// Ranked outcome of detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Candidates at or above the floor, best first
    pub candidates: Vec<IntentCandidate>,
    /// Top two candidates are closer than the ambiguity margin
    pub ambiguous: bool,
    /// Best candidate that scored below the floor, for diagnostics
    pub near_miss: Option<IntentCandidate>,
}

impl Detection {
    pub fn top(&self) -> Option<&IntentCandidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates offered to the user when the detection is ambiguous
    pub fn contenders(&self, margin: f32) -> Vec<&IntentCandidate> {
        let Some(top) = self.top() else {
            return Vec::new();
        };
        self.candidates
            .iter()
            .enumerate()
            .filter(|(i, c)| *i < 2 || within_margin(top.confidence, c.confidence, margin))
            .map(|(_, c)| c)
            .collect()
    }
}

/// Produces ranked intent candidates for an utterance
///
/// Implementations must be pure: same text and registry, same detection.
pub trait IntentClassifier: Send + Sync {
    fn detect(&self, text: &str, registry: &IntentRegistry) -> Detection;
}

/// Keyword, phrase and regex rule classifier
#[derive(Debug, Clone)]
pub struct IntentDetector {
    config: DetectionConfig,
}

impl IntentDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Score a single intent; None when no rule fires
    fn score(&self, text: &str, intent: &RegisteredIntent) -> Option<IntentCandidate> {
        let evidence: Vec<TriggerEvidence> = intent
            .triggers
            .iter()
            .filter_map(|trigger| {
                trigger.regex.find(text).map(|m| TriggerEvidence {
                    kind: trigger.rule.kind,
                    rule: trigger.rule.value.clone(),
                    weight: trigger.rule.weight,
                    matched: m.as_str().to_string(),
                })
            })
            .collect();

        if evidence.is_empty() {
            return None;
        }

        let total: f32 = evidence.iter().map(|e| e.weight).sum();
        let confidence = (total / intent.schema.saturation).min(1.0);

        Some(IntentCandidate {
            intent: intent.name().to_string(),
            confidence,
            evidence,
            required_slots_matched: intent.required_slots_matched(text),
            registration_index: intent.registration_index,
        })
    }
}

impl IntentClassifier for IntentDetector {
    fn detect(&self, text: &str, registry: &IntentRegistry) -> Detection {
        let mut scored: Vec<IntentCandidate> = registry
            .iter()
            .filter_map(|intent| self.score(text, intent))
            .collect();
        scored.sort_by(rank);

        let floor = self.config.min_confidence;
        let near_miss = scored.iter().find(|c| c.confidence < floor).cloned();
        let candidates: Vec<IntentCandidate> =
            scored.into_iter().filter(|c| c.confidence >= floor).collect();

        let ambiguous = match (candidates.first(), candidates.get(1)) {
            (Some(a), Some(b)) => {
                within_margin(a.confidence, b.confidence, self.config.ambiguity_margin)
            }
            _ => false,
        };

        tracing::debug!(
            candidates = candidates.len(),
            ambiguous,
            top = candidates.first().map(|c| c.intent.as_str()).unwrap_or("-"),
            "Intent detection finished"
        );

        Detection {
            candidates,
            ambiguous,
            near_miss,
        }
    }
}

/// Slack absorbing f32 rounding in summed weights
const MARGIN_EPSILON: f64 = 1e-5;

/// Lead of `top` over `other` is strictly smaller than `margin`
///
/// A lead equal to the margin (0.8 vs 0.7 at 0.1) is not ambiguous.
fn within_margin(top: f32, other: f32, margin: f32) -> bool {
    (f64::from(top) - f64::from(other)) < f64::from(margin) - MARGIN_EPSILON
}

/// Confidence descending, then more required slots matched, then load order
fn rank(a: &IntentCandidate, b: &IntentCandidate) -> Ordering {
    OrderedFloat(b.confidence)
        .cmp(&OrderedFloat(a.confidence))
        .then(b.required_slots_matched.cmp(&a.required_slots_matched))
        .then(a.registration_index.cmp(&b.registration_index))
}
