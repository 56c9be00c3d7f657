//! Slot filling - extracts parameters for a chosen intent

use std::time::Duration;

use super::normalize::normalize;
use super::value::{SlotMap, SlotValue};
use crate::core::types::Timestamp;
use crate::registry::{CompiledSlot, RegisteredIntent};

/// Extracts and normalizes slot values from an utterance
#[derive(Debug, Clone)]
pub struct SlotFiller {
    slot_staleness: Duration,
}

impl SlotFiller {
    pub fn new(slot_staleness: Duration) -> Self {
        Self { slot_staleness }
    }

    /// Fill the intent's slots from `text`
    ///
    /// `prior` holds the values the context manager allows this turn to
    /// inherit. Only optional slots fall back to it here; carrying required
    /// slots is the context manager's job during `resolve`.
    ///
    /// Slots without any value are absent from the returned map.
    pub fn fill(
        &self,
        text: &str,
        now: Timestamp,
        intent: &RegisteredIntent,
        prior: &SlotMap,
    ) -> SlotMap {
        let mut filled = SlotMap::new();

        for slot in &intent.slots {
            let name = &slot.spec.name;
            if let Some(value) = extract(slot, text, now) {
                filled.insert(name.clone(), value);
                continue;
            }
            if slot.spec.required {
                continue;
            }

            let carried = prior
                .get(name)
                .filter(|v| v.is_filled() && !v.is_stale(now, self.slot_staleness));
            if let Some(carried) = carried {
                filled.insert(name.clone(), carried.carried());
            } else if let Some(default) = &slot.default {
                filled.insert(name.clone(), SlotValue::from_default(name, default.clone(), now));
            }
        }

        tracing::debug!(
            intent = intent.name(),
            filled = filled.len(),
            declared = intent.slots.len(),
            "Slots filled"
        );
        filled
    }
}

/// First pattern that captures non-empty text wins
fn extract(slot: &CompiledSlot, text: &str, now: Timestamp) -> Option<SlotValue> {
    slot.patterns.iter().find_map(|pattern| {
        let captures = pattern.regex.captures(text)?;
        let raw = captures.get(1).or_else(|| captures.get(0))?.as_str().trim();
        if raw.is_empty() {
            return None;
        }
        Some(SlotValue::extracted(
            &slot.spec.name,
            raw,
            pattern.confidence,
            normalize(&slot.spec.value_type, raw),
            now,
        ))
    })
}
