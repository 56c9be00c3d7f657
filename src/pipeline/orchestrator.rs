//! Pipeline orchestrator - runs one utterance through every stage
//!
//! RECEIVED -> INTENT_RESOLVED -> CONTEXT_MERGED -> SLOTS_FILLED -> TRANSLATED
//! -> {READY, CLARIFICATION_NEEDED, REJECTED}
//!
//! Linguistic outcomes never fail the call. Only a context store failure
//! surfaces as `Err`.

use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{Command, CommandStatus, CommandTranslator, OutstandingSlot, SlotProblem};
use crate::context::{ContextManager, ContextStore, SessionContext};
use crate::core::config::PipelineConfig;
use crate::core::error::Result;
use crate::core::types::{SessionId, Timestamp, Utterance};
use crate::detect::{Detection, IntentCandidate, IntentClassifier, IntentDetector};
use crate::registry::IntentRegistry;
use crate::slots::{NormalizedValue, SlotFiller};

/// Stage reached while processing an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Received,
    IntentResolved,
    ContextMerged,
    SlotsFilled,
    Translated,
    Ready,
    ClarificationNeeded,
    Rejected,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Ready | PipelineState::ClarificationNeeded | PipelineState::Rejected
        )
    }
}

/// What the user has to clear up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clarification {
    /// Several intents scored within the ambiguity margin, best first
    AmbiguousIntent { candidates: Vec<IntentCandidate> },
    /// The resolved intent still lacks valid required slots
    MissingSlots {
        intent: String,
        slots: Vec<OutstandingSlot>,
    },
}

/// Terminal outcome of one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnResult {
    Ready {
        intent: String,
        slots: BTreeMap<String, NormalizedValue>,
        confirmation: String,
        command_line: String,
    },
    ClarificationNeeded {
        clarification: Clarification,
        prompt: String,
    },
    Rejected {
        reason: String,
    },
}

impl TurnResult {
    pub fn state(&self) -> PipelineState {
        match self {
            TurnResult::Ready { .. } => PipelineState::Ready,
            TurnResult::ClarificationNeeded { .. } => PipelineState::ClarificationNeeded,
            TurnResult::Rejected { .. } => PipelineState::Rejected,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TurnResult::Ready { .. })
    }

    /// Names of outstanding slots when clarification is about slots
    pub fn missing_slots(&self) -> Vec<&str> {
        match self {
            TurnResult::ClarificationNeeded {
                clarification: Clarification::MissingSlots { slots, .. },
                ..
            } => slots.iter().map(|s| s.slot.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Non-fatal findings reported alongside the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    NoIntentMatched {
        best: Option<String>,
        confidence: Option<f32>,
    },
    AmbiguousIntent {
        candidates: Vec<String>,
    },
    MissingRequiredSlot {
        intent: String,
        slot: String,
    },
    InvalidSlotValue {
        intent: String,
        slot: String,
        raw: String,
        reason: String,
        required: bool,
    },
    SessionExpired {
        session: SessionId,
    },
}

/// Everything a caller learns from one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub session_id: SessionId,
    pub result: TurnResult,
    /// States visited, in order, ending with a terminal one
    pub states: Vec<PipelineState>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineOutcome {
    pub fn state(&self) -> PipelineState {
        self.result.state()
    }
}

/// The NL-to-command pipeline
pub struct Pipeline {
    registry: Arc<IntentRegistry>,
    classifier: Box<dyn IntentClassifier>,
    filler: SlotFiller,
    context: ContextManager,
    config: PipelineConfig,
}

impl Pipeline {
    /// Build a pipeline around the rule-based detector
    pub fn new(
        registry: Arc<IntentRegistry>,
        store: Arc<dyn ContextStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            classifier: Box::new(IntentDetector::new(config.detection.clone())),
            filler: SlotFiller::new(config.context.slot_staleness()),
            context: ContextManager::new(store, config.context.clone()),
            registry,
            config,
        }
    }

    /// Load the catalog from `config.registry.intents_dir`
    pub fn from_config(config: PipelineConfig, store: Arc<dyn ContextStore>) -> Result<Self> {
        config.validate()?;
        let mut registry = IntentRegistry::new();
        registry.load_directory(&config.registry.intents_dir)?;
        Ok(Self::new(Arc::new(registry), store, config))
    }

    /// Swap in another classifier; downstream stages are unaffected
    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &Arc<IntentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Process one utterance
    pub fn process(&self, utterance: &Utterance) -> Result<PipelineOutcome> {
        let session_id = &utterance.session_id;
        self.context
            .with_session(session_id, || self.run_turn(utterance))
    }

    /// Process many utterances
    ///
    /// Sessions run in parallel; turns of one session run in input order.
    /// Results line up with the input.
    pub fn process_batch(&self, utterances: &[Utterance]) -> Vec<Result<PipelineOutcome>> {
        let mut order: Vec<SessionId> = Vec::new();
        let mut groups: AHashMap<SessionId, Vec<usize>> = AHashMap::new();
        for (index, utterance) in utterances.iter().enumerate() {
            groups
                .entry(utterance.session_id.clone())
                .or_insert_with(|| {
                    order.push(utterance.session_id.clone());
                    Vec::new()
                })
                .push(index);
        }

        let batches: Vec<Vec<usize>> = order
            .iter()
            .filter_map(|id| groups.remove(id))
            .collect();

        let processed: Vec<(usize, Result<PipelineOutcome>)> = batches
            .par_iter()
            .flat_map_iter(|indices| {
                indices
                    .iter()
                    .map(|&i| (i, self.process(&utterances[i])))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut slots: Vec<Option<Result<PipelineOutcome>>> =
            (0..utterances.len()).map(|_| None).collect();
        for (index, outcome) in processed {
            slots[index] = Some(outcome);
        }
        slots.into_iter().flatten().collect()
    }

    /// Forget a session; its next utterance starts empty
    pub fn reset(&self, session_id: &SessionId) -> Result<bool> {
        self.context.evict(session_id)
    }

    /// Evict every session idle past the timeout
    pub fn sweep_expired(&self, now: Timestamp) -> Result<Vec<SessionId>> {
        self.context.sweep_expired(now)
    }

    fn run_turn(&self, utterance: &Utterance) -> Result<PipelineOutcome> {
        let session_id = &utterance.session_id;
        let now = utterance.timestamp;
        let mut turn = Turn::new(session_id);

        let loaded = self.context.load(session_id, now)?;
        if loaded.expired {
            turn.diagnostics.push(Diagnostic::SessionExpired {
                session: session_id.clone(),
            });
        }

        let detection = self.classifier.detect(&utterance.text, &self.registry);

        let Some(top) = detection.top().filter(|_| !detection.ambiguous) else {
            let result = if detection.is_empty() {
                self.reject(&utterance.text, &detection, &mut turn)
            } else {
                self.ask_which_intent(&detection, &mut turn)
            };
            if !loaded.fresh {
                self.keep_alive(session_id, loaded.context, now)?;
            }
            return Ok(turn.finish(result));
        };

        let Some(intent) = self.registry.get(&top.intent) else {
            tracing::warn!(intent = %top.intent, "Classifier chose an unregistered intent");
            turn.diagnostics.push(Diagnostic::NoIntentMatched {
                best: Some(top.intent.clone()),
                confidence: Some(top.confidence),
            });
            let reason = format!("Intent {} is not registered", top.intent);
            if !loaded.fresh {
                self.keep_alive(session_id, loaded.context, now)?;
            }
            return Ok(turn.finish(TurnResult::Rejected { reason }));
        };
        turn.enter(PipelineState::IntentResolved);
        tracing::debug!(
            session = %session_id,
            intent = intent.name(),
            confidence = top.confidence,
            "Intent resolved"
        );

        let carried = self.context.carry_over(&loaded.context, intent, &self.registry);
        turn.enter(PipelineState::ContextMerged);

        let filled = self.filler.fill(&utterance.text, now, intent, &carried);
        let resolution = self
            .context
            .resolve(&loaded.context, intent, &carried, filled, now);
        turn.enter(PipelineState::SlotsFilled);

        self.context.persist(session_id, &resolution.context)?;

        let command = CommandTranslator::translate(intent, &resolution.slots);
        turn.enter(PipelineState::Translated);

        let result = self.conclude(command, &mut turn);
        Ok(turn.finish(result))
    }

    fn reject(&self, text: &str, detection: &Detection, turn: &mut Turn) -> TurnResult {
        let near_miss = detection.near_miss.as_ref();
        turn.diagnostics.push(Diagnostic::NoIntentMatched {
            best: near_miss.map(|c| c.intent.clone()),
            confidence: near_miss.map(|c| c.confidence),
        });

        let reason = match near_miss {
            Some(best) => format!(
                "No confident match for \"{}\" (best: {} at {:.2}, needs {:.2})",
                text, best.intent, best.confidence, self.config.detection.min_confidence
            ),
            None => format!("No intent matched \"{}\"", text),
        };
        TurnResult::Rejected { reason }
    }

    fn ask_which_intent(&self, detection: &Detection, turn: &mut Turn) -> TurnResult {
        let candidates: Vec<IntentCandidate> = detection
            .contenders(self.config.detection.ambiguity_margin)
            .into_iter()
            .cloned()
            .collect();
        let names: Vec<String> = candidates.iter().map(|c| c.intent.clone()).collect();
        tracing::debug!(candidates = ?names, "Ambiguous intent");

        let prompt = format!("Did you mean {}?", join_alternatives(&names));
        turn.diagnostics
            .push(Diagnostic::AmbiguousIntent { candidates: names });
        TurnResult::ClarificationNeeded {
            clarification: Clarification::AmbiguousIntent { candidates },
            prompt,
        }
    }

    fn conclude(&self, command: Command, turn: &mut Turn) -> TurnResult {
        for dropped in &command.dropped {
            if let SlotProblem::Invalid { raw, reason } = &dropped.problem {
                turn.diagnostics.push(Diagnostic::InvalidSlotValue {
                    intent: command.intent.clone(),
                    slot: dropped.slot.clone(),
                    raw: raw.clone(),
                    reason: reason.clone(),
                    required: false,
                });
            }
        }

        match command.status {
            CommandStatus::Ready {
                payload,
                confirmation,
            } => TurnResult::Ready {
                intent: payload.intent,
                slots: payload.slots,
                confirmation,
                command_line: payload.command_line,
            },
            CommandStatus::Incomplete { outstanding } => {
                for slot in &outstanding {
                    turn.diagnostics.push(match &slot.problem {
                        SlotProblem::Missing => Diagnostic::MissingRequiredSlot {
                            intent: command.intent.clone(),
                            slot: slot.slot.clone(),
                        },
                        SlotProblem::Invalid { raw, reason } => Diagnostic::InvalidSlotValue {
                            intent: command.intent.clone(),
                            slot: slot.slot.clone(),
                            raw: raw.clone(),
                            reason: reason.clone(),
                            required: true,
                        },
                    });
                }
                let prompt = outstanding
                    .iter()
                    .map(|s| s.prompt.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                TurnResult::ClarificationNeeded {
                    clarification: Clarification::MissingSlots {
                        intent: command.intent,
                        slots: outstanding,
                    },
                    prompt,
                }
            }
        }
    }

    /// Refresh last access of a session whose turn resolved no intent
    fn keep_alive(
        &self,
        session_id: &SessionId,
        mut context: SessionContext,
        now: Timestamp,
    ) -> Result<()> {
        context.touch(now);
        self.context.persist(session_id, &context)
    }
}

/// Bookkeeping for one turn in flight
struct Turn {
    session_id: SessionId,
    states: Vec<PipelineState>,
    diagnostics: Vec<Diagnostic>,
}

impl Turn {
    fn new(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.clone(),
            states: vec![PipelineState::Received],
            diagnostics: Vec::new(),
        }
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::trace!(session = %self.session_id, ?state, "State transition");
        self.states.push(state);
    }

    fn finish(mut self, result: TurnResult) -> PipelineOutcome {
        let state = result.state();
        self.enter(state);
        tracing::debug!(
            session = %self.session_id,
            ?state,
            diagnostics = self.diagnostics.len(),
            "Turn finished"
        );
        PipelineOutcome {
            session_id: self.session_id,
            result,
            states: self.states,
            diagnostics: self.diagnostics,
        }
    }
}

/// "A", "A or B", "A, B or C"
fn join_alternatives(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}
