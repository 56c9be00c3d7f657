//! Command translation - converts resolved intent + slots into a Command

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::RegisteredIntent;
use crate::slots::{NormalizedValue, SlotMap};

/// Why a slot blocks (or was dropped from) the command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum SlotProblem {
    Missing,
    Invalid { raw: String, reason: String },
}

/// A slot the user still has to supply or correct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstandingSlot {
    pub slot: String,
    #[serde(flatten)]
    pub problem: SlotProblem,
    /// Question to put to the user
    pub prompt: String,
}

/// Executable form handed to the downstream executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub intent: String,
    pub slots: BTreeMap<String, NormalizedValue>,
    /// `<Intent> key=value ...` in slot declaration order
    pub command_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    Ready {
        payload: CommandPayload,
        confirmation: String,
    },
    Incomplete {
        outstanding: Vec<OutstandingSlot>,
    },
}

/// Result of translating one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub intent: String,
    /// Every valid slot value, required or not
    pub slots: BTreeMap<String, NormalizedValue>,
    pub status: CommandStatus,
    /// Optional slots left out because their value was invalid
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<OutstandingSlot>,
}

impl Command {
    /// Ready iff every required slot holds a valid value
    pub fn is_ready(&self) -> bool {
        matches!(self.status, CommandStatus::Ready { .. })
    }

    pub fn payload(&self) -> Option<&CommandPayload> {
        match &self.status {
            CommandStatus::Ready { payload, .. } => Some(payload),
            CommandStatus::Incomplete { .. } => None,
        }
    }

    pub fn outstanding(&self) -> &[OutstandingSlot] {
        match &self.status {
            CommandStatus::Ready { .. } => &[],
            CommandStatus::Incomplete { outstanding } => outstanding,
        }
    }
}

/// Validates merged slots against the schema and builds the Command
pub struct CommandTranslator;

impl CommandTranslator {
    pub fn translate(intent: &RegisteredIntent, slots: &SlotMap) -> Command {
        let mut values = BTreeMap::new();
        let mut ordered: Vec<(&str, &NormalizedValue)> = Vec::new();
        let mut outstanding = Vec::new();
        let mut dropped = Vec::new();

        for slot in &intent.slots {
            let spec = &slot.spec;
            match slots.get(&spec.name) {
                Some(value) if value.is_filled() => {
                    if let Some(normalized) = &value.normalized {
                        values.insert(spec.name.clone(), normalized.clone());
                        ordered.push((spec.name.as_str(), normalized));
                    }
                }
                Some(value) => {
                    let reason = value
                        .invalid_reason
                        .clone()
                        .unwrap_or_else(|| "invalid value".to_string());
                    let entry = OutstandingSlot {
                        slot: spec.name.clone(),
                        prompt: format!(
                            "'{}' is not a valid {} ({}). {}",
                            value.raw,
                            spec.name.replace('_', " "),
                            reason,
                            spec.prompt_text()
                        ),
                        problem: SlotProblem::Invalid {
                            raw: value.raw.clone(),
                            reason,
                        },
                    };
                    if spec.required {
                        outstanding.push(entry);
                    } else {
                        tracing::warn!(
                            intent = intent.name(),
                            slot = %spec.name,
                            raw = %value.raw,
                            "Dropping invalid optional slot"
                        );
                        dropped.push(entry);
                    }
                }
                None if spec.required => outstanding.push(OutstandingSlot {
                    slot: spec.name.clone(),
                    problem: SlotProblem::Missing,
                    prompt: spec.prompt_text(),
                }),
                None => {}
            }
        }

        let status = if outstanding.is_empty() {
            let command_line = render_command_line(intent.name(), &ordered);
            let confirmation = match &intent.schema.confirmation {
                Some(template) => render_template(template, &values),
                None => command_line.clone(),
            };
            CommandStatus::Ready {
                payload: CommandPayload {
                    intent: intent.name().to_string(),
                    slots: values.clone(),
                    command_line,
                },
                confirmation,
            }
        } else {
            CommandStatus::Incomplete { outstanding }
        };

        Command {
            intent: intent.name().to_string(),
            slots: values,
            status,
            dropped,
        }
    }
}

fn render_command_line(intent: &str, slots: &[(&str, &NormalizedValue)]) -> String {
    let mut line = intent.to_string();
    for (name, value) in slots {
        line.push(' ');
        line.push_str(name);
        line.push('=');
        line.push_str(&quote(&value.to_string()));
    }
    line
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '"' || c == '=') {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Replace `{slot}` placeholders; unknown or unfilled ones vanish
fn render_template(template: &str, values: &BTreeMap<String, NormalizedValue>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                if let Some(value) = values.get(&after[..close]) {
                    out.push_str(&value.to_string());
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
