//! Slot values as extracted, defaulted or carried over

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::normalize::NormalizedValue;
use crate::core::types::Timestamp;

/// Slot name -> value, ordered for deterministic output
pub type SlotMap = BTreeMap<String, SlotValue>;

/// Where a slot value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    /// Extracted from the current utterance
    Utterance,
    /// Inherited from an earlier turn of the same session
    CarriedOver,
    /// Schema default
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotValue {
    pub slot: String,
    /// Text as captured, before normalization
    pub raw: String,
    /// Present only when normalization succeeded
    pub normalized: Option<NormalizedValue>,
    pub valid: bool,
    /// Extraction confidence of the pattern that produced the value
    pub confidence: f32,
    pub source: SlotSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// When the value was first observed
    pub observed_at: Timestamp,
}

impl SlotValue {
    /// Value captured from the utterance, valid iff normalization succeeded
    pub fn extracted(
        slot: &str,
        raw: &str,
        confidence: f32,
        normalized: Result<NormalizedValue, String>,
        observed_at: Timestamp,
    ) -> Self {
        let (normalized, invalid_reason) = match normalized {
            Ok(value) => (Some(value), None),
            Err(reason) => (None, Some(reason)),
        };
        Self {
            slot: slot.to_string(),
            raw: raw.to_string(),
            valid: normalized.is_some(),
            normalized,
            confidence,
            source: SlotSource::Utterance,
            invalid_reason,
            observed_at,
        }
    }

    pub fn from_default(slot: &str, value: NormalizedValue, observed_at: Timestamp) -> Self {
        Self {
            slot: slot.to_string(),
            raw: value.to_string(),
            normalized: Some(value),
            valid: true,
            confidence: 1.0,
            source: SlotSource::Default,
            invalid_reason: None,
            observed_at,
        }
    }

    /// Same value re-labelled as inherited from an earlier turn
    pub fn carried(&self) -> Self {
        Self {
            source: SlotSource::CarriedOver,
            ..self.clone()
        }
    }

    /// Carried value put to use by a turn at `now`; its staleness restarts
    pub fn confirmed_at(&self, now: Timestamp) -> Self {
        Self {
            observed_at: now.max(self.observed_at),
            ..self.clone()
        }
    }

    /// Filled means present and valid
    pub fn is_filled(&self) -> bool {
        self.valid && self.normalized.is_some()
    }

    /// Older than `max_age` at `now`
    pub fn is_stale(&self, now: Timestamp, max_age: Duration) -> bool {
        match (now - self.observed_at).to_std() {
            Ok(age) => age > max_age,
            // Observed after `now`: clock skew between callers, not stale
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap()
    }

    #[test]
    fn test_invalid_extraction_keeps_raw_and_reason() {
        let value = SlotValue::extracted("room", "2#4", 1.0, Err("bad".into()), at(0));
        assert!(!value.is_filled());
        assert_eq!(value.raw, "2#4");
        assert_eq!(value.invalid_reason.as_deref(), Some("bad"));
    }

    #[test]
    fn test_carried_keeps_observation_time() {
        let value = SlotValue::extracted(
            "room",
            "204",
            1.0,
            Ok(NormalizedValue::Text("204".into())),
            at(0),
        );
        let carried = value.carried();
        assert_eq!(carried.source, SlotSource::CarriedOver);
        assert_eq!(carried.observed_at, at(0));
        assert!(carried.is_filled());
    }

    #[test]
    fn test_confirmed_value_restarts_staleness() {
        let value = SlotValue::extracted(
            "room",
            "204",
            1.0,
            Ok(NormalizedValue::Text("204".into())),
            at(0),
        );
        let ten_minutes = Duration::from_secs(600);
        let confirmed = value.carried().confirmed_at(at(8));
        assert_eq!(confirmed.observed_at, at(8));
        assert_eq!(confirmed.source, SlotSource::CarriedOver);
        assert!(value.is_stale(at(12), ten_minutes));
        assert!(!confirmed.is_stale(at(12), ten_minutes));
        assert_eq!(confirmed.confirmed_at(at(5)).observed_at, at(8));
    }

    #[test]
    fn test_staleness() {
        let value = SlotValue::from_default("zone", NormalizedValue::Text("main".into()), at(0));
        let ten_minutes = Duration::from_secs(600);
        assert!(!value.is_stale(at(10), ten_minutes));
        assert!(value.is_stale(at(11), ten_minutes));
        assert!(!value.is_stale(at(0) - chrono::Duration::minutes(5), ten_minutes));
    }
}
