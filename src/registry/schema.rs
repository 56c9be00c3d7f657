//! Intent schema types for TOML deserialization.
//!
//! An intent file holds one or more `[[intent]]` tables. Each intent lists
//! the trigger rules that vote for it and the slots it expects:
//!
//! ```toml
//! [[intent]]
//! name = "SetLightingState"
//! confirmation = "Turning lighting {state} in room {room}"
//!
//! [[intent.triggers]]
//! kind = "keyword"
//! value = "lighting"
//! weight = 0.4
//!
//! [[intent.slots]]
//! name = "state"
//! required = true
//! patterns = ['\b(on|off)\b']
//! value = { type = "choice", options = ["on", "off"] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level shape of an intent file
#[derive(Debug, Clone, Deserialize)]
pub struct IntentFile {
    #[serde(default, rename = "intent")]
    pub intents: Vec<IntentSchema>,
}

/// Complete intent definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSchema {
    /// Unique intent name, also the command verb
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Rules whose weights add up to the intent's confidence
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
    /// Matched weight at which confidence reaches 1.0
    #[serde(default = "default_saturation")]
    pub saturation: f32,
    /// Expected parameters, in declaration order
    #[serde(default)]
    pub slots: Vec<SlotSpec>,
    /// Template with `{slot}` placeholders for the confirmation text
    #[serde(default)]
    pub confirmation: Option<String>,
}

fn default_saturation() -> f32 {
    1.0
}

impl IntentSchema {
    pub fn slot(&self, name: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn required_slots(&self) -> impl Iterator<Item = &SlotSpec> {
        self.slots.iter().filter(|s| s.required)
    }

    pub fn declares_slot(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }
}

/// How a trigger rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Single word, matched on word boundaries
    Keyword,
    /// Word sequence, any whitespace between words
    Phrase,
    /// Raw regular expression
    Pattern,
}

/// One weighted piece of evidence for an intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub kind: TriggerKind,
    pub value: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    0.5
}

/// Extraction pattern, optionally with its own confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternDef {
    Bare(String),
    Weighted { regex: String, confidence: f32 },
}

impl PatternDef {
    pub fn regex(&self) -> &str {
        match self {
            PatternDef::Bare(regex) => regex,
            PatternDef::Weighted { regex, .. } => regex,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            PatternDef::Bare(_) => 1.0,
            PatternDef::Weighted { confidence, .. } => *confidence,
        }
    }
}

/// Unit conversion into the quantity's canonical unit
///
/// `canonical = raw * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Declared type of a slot value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ValueType {
    /// Free text, whitespace collapsed
    Text,
    /// Lower-cased token of letters, digits, `-` and `_`
    Identifier,
    /// Whole number within a range
    Integer { min: i64, max: i64 },
    /// Number with optional unit, converted into `unit`
    Quantity {
        min: f64,
        max: f64,
        /// Canonical unit name reported in the command
        unit: String,
        /// Accepted unit spellings and their conversion
        #[serde(default)]
        units: BTreeMap<String, UnitConversion>,
    },
    /// One of a closed set, with synonyms
    Choice {
        options: Vec<String>,
        #[serde(default)]
        synonyms: BTreeMap<String, String>,
    },
}

impl Default for ValueType {
    fn default() -> Self {
        ValueType::Text
    }
}

/// Slot definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    #[serde(default, rename = "value")]
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    /// Raw default, normalized through `value_type` at load time
    #[serde(default)]
    pub default: Option<String>,
    /// Tried in order; first match wins
    #[serde(default)]
    pub patterns: Vec<PatternDef>,
    /// Question asked when the slot is missing
    #[serde(default)]
    pub prompt: Option<String>,
}

impl SlotSpec {
    /// Clarification question for this slot
    pub fn prompt_text(&self) -> String {
        self.prompt
            .clone()
            .unwrap_or_else(|| format!("Which {}?", self.name.replace('_', " ")))
    }
}
