//! Context manager - owns all access to session state
//!
//! Every read or write of a session goes through here. Turns of one session
//! are serialized by a per-session lock; different sessions never contend
//! beyond the brief lookup of their lock. A lock lives in the table only
//! while some turn holds or waits on it.

use ahash::AHashMap;
use std::sync::{Arc, Mutex};

use super::session::SessionContext;
use super::store::ContextStore;
use crate::core::config::{CarryOverScope, ContextConfig};
use crate::core::error::{PipelineError, Result, StoreError};
use crate::core::types::{SessionId, Timestamp};
use crate::registry::{IntentRegistry, RegisteredIntent};
use crate::slots::{normalize, SlotMap, SlotSource, SlotValue};

/// Session state at the start of a turn
#[derive(Debug, Clone)]
pub struct LoadedContext {
    pub context: SessionContext,
    /// The stored session had been idle too long and was dropped
    pub expired: bool,
    /// Nothing usable was stored; `context` is brand new
    pub fresh: bool,
}

/// Output of `resolve`
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Updated session state, ready to persist
    pub context: SessionContext,
    /// Slots the translator should see for this turn
    pub slots: SlotMap,
}

pub struct ContextManager {
    store: Arc<dyn ContextStore>,
    config: ContextConfig,
    locks: Mutex<AHashMap<SessionId, Arc<Mutex<()>>>>,
}

impl ContextManager {
    pub fn new(store: Arc<dyn ContextStore>, config: ContextConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(AHashMap::new()),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Run `f` while holding the session's lock
    pub fn with_session<R>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let lock = self.session_lock(session_id)?;
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(store_error(
                session_id,
                StoreError::Poisoned("session lock".into()),
            )),
        };
        self.release(session_id, lock);
        result
    }

    fn session_lock(&self, session_id: &SessionId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| store_error(session_id, StoreError::Poisoned("lock table".into())))?;
        Ok(locks.entry(session_id.clone()).or_default().clone())
    }

    /// Drop our handle and the table entry once nobody else holds it
    ///
    /// Handles are only cloned or dropped under the table lock, so a count
    /// of one means no turn is running or waiting on this session.
    fn release(&self, session_id: &SessionId, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        drop(lock);
        if locks
            .get(session_id)
            .map_or(false, |entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(session_id);
        }
    }

    /// Load the session, replacing an expired one with a fresh context
    pub fn load(&self, session_id: &SessionId, now: Timestamp) -> Result<LoadedContext> {
        let stored = self
            .store
            .load(session_id)
            .map_err(|e| store_error(session_id, e))?;

        match stored {
            Some(context) if !context.is_expired(now) => Ok(LoadedContext {
                context,
                expired: false,
                fresh: false,
            }),
            Some(context) => {
                tracing::warn!(
                    session = %session_id,
                    last_access = %context.last_access,
                    "Session expired, starting fresh"
                );
                self.store
                    .remove(session_id)
                    .map_err(|e| store_error(session_id, e))?;
                Ok(LoadedContext {
                    context: self.fresh_context(session_id, now),
                    expired: true,
                    fresh: true,
                })
            }
            None => Ok(LoadedContext {
                context: self.fresh_context(session_id, now),
                expired: false,
                fresh: true,
            }),
        }
    }

    fn fresh_context(&self, session_id: &SessionId, now: Timestamp) -> SessionContext {
        SessionContext::new(session_id.clone(), now, self.config.idle_timeout())
    }

    /// Values the current turn may inherit from the previous one
    ///
    /// Same intent as last turn: every stored value the intent declares.
    /// Different intent: only slots declared by both schemas, and only when
    /// the scope is `SharedSlots`. Every value is normalized again under the
    /// target slot's type; values that type rejects are not inherited.
    pub fn carry_over(
        &self,
        context: &SessionContext,
        intent: &RegisteredIntent,
        registry: &IntentRegistry,
    ) -> SlotMap {
        let Some(last_intent) = context.last_intent.as_deref() else {
            return SlotMap::new();
        };

        let shares = |name: &str| -> bool {
            if last_intent == intent.name() {
                return true;
            }
            match self.config.carry_over {
                CarryOverScope::SameIntent => false,
                CarryOverScope::SharedSlots => registry
                    .schema(last_intent)
                    .map_or(false, |prior| prior.declares_slot(name)),
            }
        };

        context
            .slots
            .iter()
            .filter(|(name, value)| value.is_filled() && shares(name))
            .filter_map(|(name, value)| {
                let slot = intent.slot(name)?;
                match normalize(&slot.spec.value_type, &value.raw) {
                    Ok(normalized) => Some((
                        name.clone(),
                        SlotValue {
                            normalized: Some(normalized),
                            ..value.clone()
                        },
                    )),
                    Err(reason) => {
                        tracing::debug!(
                            intent = intent.name(),
                            slot = %name,
                            raw = %value.raw,
                            %reason,
                            "Stored value does not fit slot, not carried"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Merge this turn's slots with carried values and update the session
    ///
    /// Unfilled slots inherit carried values. A new value replaces a carried
    /// one only when its extraction confidence reaches the overwrite floor.
    /// Invalid new values reach the translator but never the session, and
    /// neither do schema defaults. Carried values used by this turn are
    /// stored as observed now, so staleness counts from their last use.
    pub fn resolve(
        &self,
        context: &SessionContext,
        intent: &RegisteredIntent,
        carried: &SlotMap,
        new_slots: SlotMap,
        now: Timestamp,
    ) -> Resolution {
        let staleness = self.config.slot_staleness();
        let usable = |name: &str| {
            carried
                .get(name)
                .filter(|v| v.is_filled() && !v.is_stale(now, staleness))
        };

        let mut slots = new_slots;
        for spec in &intent.schema.slots {
            let name = spec.name.as_str();
            let Some(prior) = usable(name) else {
                continue;
            };
            let keep_carried = match slots.get(name) {
                None => true,
                Some(new) => {
                    new.source == SlotSource::Utterance
                        && new.is_filled()
                        && new.confidence < self.config.overwrite_confidence_floor
                }
            };
            if keep_carried {
                slots.insert(name.to_string(), prior.carried());
            }
        }

        let mut merged = context.clone();
        merged.last_intent = Some(intent.name().to_string());
        for (name, value) in &slots {
            if !value.is_filled() {
                continue;
            }
            match value.source {
                SlotSource::Default => {}
                SlotSource::CarriedOver => {
                    merged.slots.insert(name.clone(), value.confirmed_at(now));
                }
                SlotSource::Utterance => {
                    merged.slots.insert(name.clone(), value.clone());
                }
            }
        }
        merged.touch(now);
        merged.turns += 1;

        Resolution {
            context: merged,
            slots,
        }
    }

    pub fn persist(&self, session_id: &SessionId, context: &SessionContext) -> Result<()> {
        self.store
            .save(session_id, context)
            .map_err(|e| store_error(session_id, e))
    }

    /// Drop all state for a session; the next turn starts empty
    pub fn evict(&self, session_id: &SessionId) -> Result<bool> {
        let removed = self.with_session(session_id, || {
            self.store
                .remove(session_id)
                .map_err(|e| store_error(session_id, e))
        })?;
        if removed {
            tracing::info!(session = %session_id, "Session evicted");
        }
        Ok(removed)
    }

    /// Evict every stored session idle past its timeout
    pub fn sweep_expired(&self, now: Timestamp) -> Result<Vec<SessionId>> {
        let ids = self
            .store
            .session_ids()
            .map_err(|e| store_error(&SessionId::new("*"), e))?;

        let mut evicted = Vec::new();
        for id in ids {
            let expired = self.with_session(&id, || {
                let stored = self.store.load(&id).map_err(|e| store_error(&id, e))?;
                match stored {
                    Some(context) if context.is_expired(now) => {
                        self.store.remove(&id).map_err(|e| store_error(&id, e))
                    }
                    _ => Ok(false),
                }
            })?;
            if expired {
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Swept expired sessions");
        }
        Ok(evicted)
    }
}

fn store_error(session_id: &SessionId, source: StoreError) -> PipelineError {
    PipelineError::Store {
        session: session_id.clone(),
        source,
    }
}
