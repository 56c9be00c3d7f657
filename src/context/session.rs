//! Per-session dialogue state

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::types::{SessionId, Timestamp};
use crate::slots::SlotMap;

/// Dialogue state of one session
///
/// Holds at most one value per slot name; values are only ever written
/// through the context manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    /// Intent of the last turn that got past detection
    pub last_intent: Option<String>,
    /// Last known valid value per slot name
    pub slots: SlotMap,
    pub created_at: Timestamp,
    pub last_access: Timestamp,
    /// Expiry policy: evicted after this many idle seconds
    pub idle_timeout_secs: u64,
    /// Turns processed since creation
    pub turns: u64,
}

impl SessionContext {
    pub fn new(session_id: SessionId, now: Timestamp, idle_timeout: Duration) -> Self {
        Self {
            session_id,
            last_intent: None,
            slots: SlotMap::new(),
            created_at: now,
            last_access: now,
            idle_timeout_secs: idle_timeout.as_secs(),
            turns: 0,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Idle for longer than the timeout at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match (now - self.last_access).to_std() {
            Ok(idle) => idle > self.idle_timeout(),
            Err(_) => false,
        }
    }

    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_access {
            self.last_access = now;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_intent.is_none() && self.slots.is_empty()
    }
}
