//! The session registry: one mutex over every live connection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use pylon_core::SessionHandle;

use super::session::{Session, SessionSnapshot};

/// All live sessions, keyed by handle.
///
/// A single mutex covers every insert, remove, read, and traversal. In
/// particular the broadcast path traverses with the lock held for the whole
/// fan-out, so delivery serializes against concurrent opens and closes: a
/// session is either fully present for an event or fully absent. Closures
/// passed to [`SessionRegistry::for_each_locked`] must not block.
///
/// Invariant: a session is present here iff its connection is open and has
/// not completed close teardown, so `len()` always equals the number of
/// opened-but-not-yet-closed sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionHandle, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a session under its handle.
    pub fn insert(&self, session: Arc<Session>) {
        let handle = session.handle.clone();
        let _ = self.sessions.lock().insert(handle, session);
    }

    /// Remove a session by handle.
    pub fn remove(&self, handle: &SessionHandle) -> Option<Arc<Session>> {
        self.sessions.lock().remove(handle)
    }

    /// Look up a session by handle.
    pub fn get(&self, handle: &SessionHandle) -> Option<Arc<Session>> {
        self.sessions.lock().get(handle).cloned()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Owned snapshots of every live session.
    pub fn snapshot_all(&self) -> Vec<SessionSnapshot> {
        self.sessions.lock().values().map(|s| s.snapshot()).collect()
    }

    /// Run `f` over every session with the registry lock held throughout.
    pub fn for_each_locked(&self, mut f: impl FnMut(&Arc<Session>)) {
        let sessions = self.sessions.lock();
        for session in sessions.values() {
            f(session);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
