//! Intent schema registry.
//!
//! `IntentRegistry` owns every known intent together with its compiled
//! trigger and slot regexes. It is filled once at startup (from TOML files or
//! strings) and then shared read-only behind an `Arc`.

use ahash::AHashMap;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};

use super::schema::{IntentFile, IntentSchema, SlotSpec, TriggerKind, TriggerRule};
use crate::core::error::RegistryError;
use crate::slots::normalize::{normalize, NormalizedValue};

/// A trigger rule with its regex ready to run
#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    pub rule: TriggerRule,
    pub regex: Regex,
}

/// Extraction pattern compiled case-insensitively
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub regex: Regex,
    pub confidence: f32,
}

/// Slot spec plus compiled patterns and normalized default
#[derive(Debug, Clone)]
pub struct CompiledSlot {
    pub spec: SlotSpec,
    pub patterns: Vec<CompiledPattern>,
    pub default: Option<NormalizedValue>,
}

/// Registered intent
#[derive(Debug, Clone)]
pub struct RegisteredIntent {
    pub schema: IntentSchema,
    /// Position in load order, used as the last ranking tie-breaker
    pub registration_index: usize,
    pub triggers: Vec<CompiledTrigger>,
    pub slots: Vec<CompiledSlot>,
}

impl RegisteredIntent {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn slot(&self, name: &str) -> Option<&CompiledSlot> {
        self.slots.iter().find(|s| s.spec.name == name)
    }

    /// Number of required slots with at least one pattern matching `text`
    pub fn required_slots_matched(&self, text: &str) -> usize {
        self.slots
            .iter()
            .filter(|s| s.spec.required)
            .filter(|s| s.patterns.iter().any(|p| p.regex.is_match(text)))
            .count()
    }
}

/// Catalog of known intents
#[derive(Debug, Default)]
pub struct IntentRegistry {
    intents: Vec<RegisteredIntent>,
    by_name: AHashMap<String, usize>,
}

impl IntentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, compile and register one schema
    pub fn register(&mut self, schema: IntentSchema) -> Result<usize, RegistryError> {
        if self.by_name.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateIntent(schema.name));
        }
        if schema.triggers.is_empty() {
            return Err(RegistryError::NoTriggers(schema.name));
        }
        if schema.saturation.is_nan() || schema.saturation <= 0.0 {
            return Err(RegistryError::InvalidWeight {
                intent: schema.name.clone(),
                trigger: "saturation".into(),
                weight: schema.saturation,
            });
        }

        let triggers = schema
            .triggers
            .iter()
            .map(|rule| compile_trigger(&schema.name, rule))
            .collect::<Result<Vec<_>, _>>()?;

        let mut slots: Vec<CompiledSlot> = Vec::with_capacity(schema.slots.len());
        for spec in &schema.slots {
            if slots.iter().any(|s| s.spec.name == spec.name) {
                return Err(RegistryError::DuplicateSlot {
                    intent: schema.name.clone(),
                    slot: spec.name.clone(),
                });
            }
            slots.push(compile_slot(&schema.name, spec)?);
        }

        let index = self.intents.len();
        self.by_name.insert(schema.name.clone(), index);
        self.intents.push(RegisteredIntent {
            schema,
            registration_index: index,
            triggers,
            slots,
        });
        Ok(index)
    }

    /// Register every `[[intent]]` in a TOML document
    pub fn load_str(&mut self, content: &str, origin: &str) -> Result<Vec<usize>, RegistryError> {
        let file: IntentFile = toml::from_str(content).map_err(|e| RegistryError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        file.intents
            .into_iter()
            .map(|schema| self.register(schema))
            .collect()
    }

    /// Load intents from a TOML file
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<usize>, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_str(&content, &path.display().to_string())
    }

    /// Load all .toml files under a directory, in sorted path order
    pub fn load_directory(&mut self, path: &Path) -> Result<Vec<usize>, RegistryError> {
        let mut files = Vec::new();
        collect_toml_files(path, &mut files)?;
        files.sort();

        let mut indices = Vec::new();
        for file in &files {
            indices.extend(self.load_file(file)?);
        }
        tracing::info!(
            "Loaded {} intents from {} files in {}",
            indices.len(),
            files.len(),
            path.display()
        );
        Ok(indices)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredIntent> {
        self.by_name.get(name).map(|&i| &self.intents[i])
    }

    pub fn schema(&self, name: &str) -> Option<&IntentSchema> {
        self.get(name).map(|i| &i.schema)
    }

    /// Intents in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredIntent> {
        self.intents.iter()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

fn collect_toml_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<(), RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    };
    for entry in std::fs::read_dir(path).map_err(io_err)? {
        let entry_path = entry.map_err(io_err)?.path();
        if entry_path.is_dir() {
            collect_toml_files(&entry_path, files)?;
        } else if entry_path.extension().map_or(false, |ext| ext == "toml") {
            files.push(entry_path);
        }
    }
    Ok(())
}

fn compile_trigger(intent: &str, rule: &TriggerRule) -> Result<CompiledTrigger, RegistryError> {
    if rule.weight.is_nan() || rule.weight <= 0.0 {
        return Err(RegistryError::InvalidWeight {
            intent: intent.to_string(),
            trigger: rule.value.clone(),
            weight: rule.weight,
        });
    }

    let pattern = match rule.kind {
        TriggerKind::Keyword => format!(r"\b{}\b", regex::escape(rule.value.trim())),
        TriggerKind::Phrase => {
            let words: Vec<String> = rule.value.split_whitespace().map(regex::escape).collect();
            format!(r"\b{}\b", words.join(r"\s+"))
        }
        TriggerKind::Pattern => rule.value.clone(),
    };

    Ok(CompiledTrigger {
        rule: rule.clone(),
        regex: build_regex(intent, &pattern)?,
    })
}

fn compile_slot(intent: &str, spec: &SlotSpec) -> Result<CompiledSlot, RegistryError> {
    let patterns = spec
        .patterns
        .iter()
        .map(|p| {
            Ok(CompiledPattern {
                source: p.regex().to_string(),
                regex: build_regex(intent, p.regex())?,
                confidence: p.confidence().clamp(0.0, 1.0),
            })
        })
        .collect::<Result<Vec<_>, RegistryError>>()?;

    let default = match &spec.default {
        Some(raw) => Some(normalize(&spec.value_type, raw).map_err(|message| {
            RegistryError::InvalidDefault {
                intent: intent.to_string(),
                slot: spec.name.clone(),
                message,
            }
        })?),
        None => None,
    };

    Ok(CompiledSlot {
        spec: spec.clone(),
        patterns,
        default,
    })
}

fn build_regex(intent: &str, pattern: &str) -> Result<Regex, RegistryError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| RegistryError::InvalidPattern {
            intent: intent.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HVAC: &str = r#"
[[intent]]
name = "QueryHvacStatus"

[[intent.triggers]]
kind = "keyword"
value = "hvac"
weight = 0.5

[[intent.triggers]]
kind = "phrase"
value = "show me"
weight = 0.3

[[intent.slots]]
name = "zone"
patterns = ['(\w+)\s+wing']
value = { type = "identifier" }
default = "Main"
"#;

    #[test]
    fn test_load_str_registers_in_order() {
        let mut registry = IntentRegistry::new();
        let ids = registry.load_str(HVAC, "inline").unwrap();
        assert_eq!(ids, vec![0]);
        assert_eq!(registry.len(), 1);

        let intent = registry.get("QueryHvacStatus").unwrap();
        assert_eq!(intent.registration_index, 0);
        assert_eq!(
            intent.slot("zone").unwrap().default,
            Some(NormalizedValue::Text("main".into()))
        );
    }

    #[test]
    fn test_phrase_trigger_tolerates_whitespace() {
        let mut registry = IntentRegistry::new();
        registry.load_str(HVAC, "inline").unwrap();
        let phrase = &registry.get("QueryHvacStatus").unwrap().triggers[1];
        assert!(phrase.regex.is_match("Show   me the status"));
        assert!(!phrase.regex.is_match("showme"));
    }

    #[test]
    fn test_keyword_trigger_is_word_bounded() {
        let mut registry = IntentRegistry::new();
        registry.load_str(HVAC, "inline").unwrap();
        let keyword = &registry.get("QueryHvacStatus").unwrap().triggers[0];
        assert!(keyword.regex.is_match("HVAC status"));
        assert!(!keyword.regex.is_match("hvacs"));
    }

    #[test]
    fn test_duplicate_intent_rejected() {
        let mut registry = IntentRegistry::new();
        registry.load_str(HVAC, "a").unwrap();
        let result = registry.load_str(HVAC, "b");
        assert!(matches!(result, Err(RegistryError::DuplicateIntent(name)) if name == "QueryHvacStatus"));
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let toml = r#"
[[intent]]
name = "Broken"
triggers = [{ kind = "keyword", value = "x" }]
slots = [{ name = "room" }, { name = "room" }]
"#;
        let result = IntentRegistry::new().load_str(toml, "inline");
        assert!(matches!(result, Err(RegistryError::DuplicateSlot { .. })));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let toml = r#"
[[intent]]
name = "Broken"
triggers = [{ kind = "pattern", value = "(unclosed" }]
"#;
        let result = IntentRegistry::new().load_str(toml, "inline");
        assert!(matches!(result, Err(RegistryError::InvalidPattern { .. })));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let toml = r#"
[[intent]]
name = "Broken"
triggers = [{ kind = "keyword", value = "x" }]
slots = [{ name = "floor", default = "lobby", value = { type = "integer", min = 0, max = 9 } }]
"#;
        let result = IntentRegistry::new().load_str(toml, "inline");
        assert!(matches!(result, Err(RegistryError::InvalidDefault { .. })));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let toml = r#"
[[intent]]
name = "Broken"
triggers = [{ kind = "keyword", value = "x", weight = 0.0 }]
"#;
        let result = IntentRegistry::new().load_str(toml, "inline");
        assert!(matches!(result, Err(RegistryError::InvalidWeight { .. })));
    }

    #[test]
    fn test_intent_without_triggers_rejected() {
        let toml = "[[intent]]\nname = \"Silent\"\n";
        let result = IntentRegistry::new().load_str(toml, "inline");
        assert!(matches!(result, Err(RegistryError::NoTriggers(_))));
    }
}
