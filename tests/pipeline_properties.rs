//! Property tests over the shipped catalog

use chrono::{TimeZone, Utc};
use facility_intents::command::CommandTranslator;
use facility_intents::context::InMemoryContextStore;
use facility_intents::core::config::{DetectionConfig, PipelineConfig};
use facility_intents::detect::{IntentClassifier, IntentDetector};
use facility_intents::pipeline::Pipeline;
use facility_intents::registry::IntentRegistry;
use facility_intents::slots::{NormalizedValue, SlotMap, SlotValue};
use facility_intents::Utterance;
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;

fn catalog() -> IntentRegistry {
    let mut registry = IntentRegistry::new();
    registry
        .load_directory(&Path::new(env!("CARGO_MANIFEST_DIR")).join("data/intents"))
        .expect("shipped catalog loads");
    registry
}

const WORDS: &[&str] = &[
    "turn", "off", "on", "lighting", "lights", "in", "room", "204", "set", "temperature",
    "to", "21", "degrees", "hvac", "mode", "cooling", "door", "lock", "unlock", "d-12",
    "status", "please", "the", "zone", "east", "wing", "2#4", "95",
];

fn arb_utterance() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 0..10).prop_map(|w| w.join(" "))
}

/// 0 = absent, 1 = valid, 2 = invalid
fn arb_slot_states() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..3, 8)
}

proptest! {
    #[test]
    fn ready_iff_every_required_slot_valid(states in arb_slot_states()) {
        let registry = catalog();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        for intent in registry.iter() {
            let mut slots = SlotMap::new();
            for (slot, state) in intent.slots.iter().zip(&states) {
                let name = &slot.spec.name;
                let value = match state {
                    1 => SlotValue::extracted(name, "x", 1.0, Ok(NormalizedValue::Text("x".into())), now),
                    2 => SlotValue::extracted(name, "?", 1.0, Err("bad".into()), now),
                    _ => continue,
                };
                slots.insert(name.clone(), value);
            }

            let all_required_valid = intent
                .slots
                .iter()
                .filter(|s| s.spec.required)
                .all(|s| slots.get(&s.spec.name).map_or(false, |v| v.is_filled()));

            let command = CommandTranslator::translate(intent, &slots);
            prop_assert_eq!(command.is_ready(), all_required_valid);
            if !command.is_ready() {
                let only_required = command
                    .outstanding()
                    .iter()
                    .all(|o| intent.slot(&o.slot).map_or(false, |s| s.spec.required));
                prop_assert!(only_required, "outstanding slot {:?} is optional", command.outstanding());
            }
        }
    }

    #[test]
    fn more_evidence_never_lowers_confidence(text in arb_utterance(), extra in prop::sample::select(WORDS)) {
        let registry = catalog();
        let detector = IntentDetector::new(DetectionConfig {
            min_confidence: 0.0,
            ambiguity_margin: 0.1,
        });
        let before = detector.detect(&text, &registry);
        let after = detector.detect(&format!("{} {}", text, extra), &registry);

        for candidate in &before.candidates {
            let later = after
                .candidates
                .iter()
                .find(|c| c.intent == candidate.intent)
                .map(|c| c.confidence);
            prop_assert!(later.map_or(false, |c| c >= candidate.confidence));
        }
    }

    #[test]
    fn any_text_reaches_a_terminal_state(text in ".{0,80}") {
        let pipeline = Pipeline::new(
            Arc::new(catalog()),
            Arc::new(InMemoryContextStore::new()),
            PipelineConfig::default(),
        );
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let outcome = pipeline.process(&Utterance::new(text, "prop", now)).unwrap();

        prop_assert!(outcome.states.last().map_or(false, |s| s.is_terminal()));
        prop_assert_eq!(outcome.states.last().copied(), Some(outcome.state()));
    }
}
