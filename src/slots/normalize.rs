//! Slot value normalization
//!
//! Raw text captured by an extraction pattern is turned into a typed value
//! here: case folding, synonym resolution, number parsing and unit
//! conversion. A value that cannot be normalized makes its slot invalid.

use crate::registry::schema::{UnitConversion, ValueType};
use nom::character::complete::{i64 as signed_integer, multispace0};
use nom::combinator::{all_consuming, rest};
use nom::number::complete::double;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A slot value after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl NormalizedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            NormalizedValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Integer(v) => write!(f, "{}", v),
            NormalizedValue::Number(v) => write!(f, "{}", v),
            NormalizedValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Normalize `raw` according to `value_type`
///
/// The error string explains why the value was rejected and ends up in the
/// clarification prompt.
pub fn normalize(value_type: &ValueType, raw: &str) -> Result<NormalizedValue, String> {
    match value_type {
        ValueType::Text => {
            let text = collapse_whitespace(raw);
            if text.is_empty() {
                return Err("empty value".into());
            }
            Ok(NormalizedValue::Text(text))
        }
        ValueType::Identifier => normalize_identifier(raw),
        ValueType::Integer { min, max } => {
            let (_, value) =
                integer(raw).map_err(|_| format!("'{}' is not a whole number", raw.trim()))?;
            if value < *min || value > *max {
                return Err(format!("{} is outside {}..={}", value, min, max));
            }
            Ok(NormalizedValue::Integer(value))
        }
        ValueType::Quantity {
            min,
            max,
            unit,
            units,
        } => {
            let (_, (amount, unit_text)) =
                quantity(raw).map_err(|_| format!("'{}' is not a number", raw.trim()))?;
            if !amount.is_finite() {
                return Err(format!("'{}' is not a number", raw.trim()));
            }
            let conversion = resolve_unit(unit_text, unit, units)?;
            let value = round2(amount * conversion.scale + conversion.offset);
            if value < *min || value > *max {
                return Err(format!("{} {} is outside {}..={}", value, unit, min, max));
            }
            Ok(NormalizedValue::Number(value))
        }
        ValueType::Choice { options, synonyms } => {
            let folded = collapse_whitespace(raw).to_lowercase();
            if let Some(option) = options.iter().find(|o| o.to_lowercase() == folded) {
                return Ok(NormalizedValue::Text(option.clone()));
            }
            if let Some((_, target)) = synonyms.iter().find(|(k, _)| k.to_lowercase() == folded) {
                return Ok(NormalizedValue::Text(target.clone()));
            }
            Err(format!("expected one of: {}", options.join(", ")))
        }
    }
}

fn normalize_identifier(raw: &str) -> Result<NormalizedValue, String> {
    let folded = raw.trim().to_lowercase();
    if folded.is_empty() {
        return Err("empty identifier".into());
    }
    if let Some(bad) = folded
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!("unexpected character '{}' in identifier", bad));
    }
    Ok(NormalizedValue::Text(folded))
}

fn integer(input: &str) -> IResult<&str, i64> {
    all_consuming(delimited(multispace0, signed_integer, multispace0)).parse(input)
}

/// Number followed by whatever unit text remains
fn quantity(input: &str) -> IResult<&str, (f64, &str)> {
    (preceded(multispace0, double), rest)
        .map(|(amount, unit): (f64, &str)| (amount, unit.trim()))
        .parse(input)
}

fn resolve_unit(
    unit_text: &str,
    canonical: &str,
    units: &std::collections::BTreeMap<String, UnitConversion>,
) -> Result<UnitConversion, String> {
    let token = unit_token(unit_text);
    let identity = UnitConversion {
        scale: 1.0,
        offset: 0.0,
    };
    if token.is_empty() || token == canonical.to_lowercase() {
        return Ok(identity);
    }
    units
        .iter()
        .find(|(name, _)| name.to_lowercase() == token)
        .map(|(_, conversion)| *conversion)
        .ok_or_else(|| format!("unknown unit '{}'", unit_text))
}

/// "°F", "degrees f" and "F" all fold to "f"; a bare "degrees" folds to ""
fn unit_token(unit_text: &str) -> String {
    let folded = collapse_whitespace(&unit_text.to_lowercase().replace('°', ""));
    for prefix in ["degrees ", "degree ", "deg "] {
        if let Some(rest) = folded.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    match folded.as_str() {
        "degrees" | "degree" | "deg" => String::new(),
        _ => folded,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
