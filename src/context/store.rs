//! Context persistence collaborators
//!
//! The pipeline only needs load/save/remove keyed by session id. Two
//! backends ship with the crate: an in-process map and a directory of JSON
//! files, one per session.

use ahash::AHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::session::SessionContext;
use crate::core::error::StoreError;
use crate::core::types::SessionId;

/// Read/write contract for session state
pub trait ContextStore: Send + Sync {
    fn load(&self, session_id: &SessionId) -> Result<Option<SessionContext>, StoreError>;

    fn save(&self, session_id: &SessionId, context: &SessionContext) -> Result<(), StoreError>;

    /// Returns whether anything was removed
    fn remove(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    /// Every session currently stored
    fn session_ids(&self) -> Result<Vec<SessionId>, StoreError>;
}

/// Session store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    sessions: RwLock<AHashMap<SessionId, SessionContext>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Poisoned("in-memory session map".into())
}

impl ContextStore for InMemoryContextStore {
    fn load(&self, session_id: &SessionId) -> Result<Option<SessionContext>, StoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn save(&self, session_id: &SessionId, context: &SessionContext) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session_id.clone(), context.clone());
        Ok(())
    }

    fn remove(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(session_id).is_some())
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut ids: Vec<SessionId> = sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One `<encoded id>.json` file per session under a directory
#[derive(Debug, Clone)]
pub struct JsonFileContextStore {
    dir: PathBuf,
}

impl JsonFileContextStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(session_id.as_str())))
    }
}

impl ContextStore for JsonFileContextStore {
    fn load(&self, session_id: &SessionId) -> Result<Option<SessionContext>, StoreError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, session_id: &SessionId, context: &SessionContext) -> Result<(), StoreError> {
        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(context)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(session_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(SessionId::new(decode_file_stem(stem)?));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Percent-encode everything but `[A-Za-z0-9_-]` so any id is a safe file name
fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_file_stem(stem: &str) -> Result<String, StoreError> {
    let bad = || StoreError::Backend(format!("Malformed session file name: {}", stem));
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3).ok_or_else(bad)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| bad())?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| bad())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn context(id: &str) -> SessionContext {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        SessionContext::new(SessionId::new(id), now, Duration::from_secs(60))
    }

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryContextStore::new();
        let id = SessionId::new("s1");
        assert!(store.load(&id).unwrap().is_none());

        store.save(&id, &context("s1")).unwrap();
        assert_eq!(store.load(&id).unwrap(), Some(context("s1")));
        assert_eq!(store.session_ids().unwrap(), vec![id.clone()]);

        assert!(store.remove(&id).unwrap());
        assert!(!store.remove(&id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_names_are_reversible() {
        let id = "ops/console 7:ä";
        let stem = encode_file_stem(id);
        assert!(stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '%' || c == '-' || c == '_'));
        assert_eq!(decode_file_stem(&stem).unwrap(), id);
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileContextStore::open(dir.path().join("sessions")).unwrap();
        let id = SessionId::new("desk/3");

        store.save(&id, &context("desk/3")).unwrap();
        assert_eq!(store.load(&id).unwrap(), Some(context("desk/3")));
        assert_eq!(store.session_ids().unwrap(), vec![id.clone()]);

        assert!(store.remove(&id).unwrap());
        assert!(store.load(&id).unwrap().is_none());
        assert!(store.session_ids().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileContextStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let result = store.load(&SessionId::new("bad"));
        assert!(matches!(result, Err(StoreError::Serde(_))));
    }
}
