//! The branded handle newtype naming one connection.
//!
//! A handle is the primary key into the session registry. It is generated
//! when a connection is accepted, stays stable for the connection's lifetime,
//! and is never reused while that connection is open. Handles are UUID v7
//! (time-ordered) generated via [`uuid::Uuid::now_v7`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for one live connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Create a new random handle (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SessionHandle {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionHandle {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<SessionHandle> for String {
    fn from(handle: SessionHandle) -> Self {
        handle.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_handle_is_uuid_v7() {
        let handle = SessionHandle::new();
        let parsed = Uuid::parse_str(handle.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn handles_are_unique() {
        let a = SessionHandle::new();
        let b = SessionHandle::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_string() {
        let handle = SessionHandle::from_string("custom-handle".to_owned());
        assert_eq!(handle.as_str(), "custom-handle");
    }

    #[test]
    fn deref_to_str() {
        let handle = SessionHandle::from("hello");
        let s: &str = &handle;
        assert_eq!(s, "hello");
    }

    #[test]
    fn display() {
        let handle = SessionHandle::from("display-me");
        assert_eq!(format!("{handle}"), "display-me");
    }

    #[test]
    fn serde_is_transparent() {
        let handle = SessionHandle::from("serde-test");
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, "\"serde-test\"");
        let back: SessionHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, handle);
    }

    #[test]
    fn usable_as_map_key() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let handle = SessionHandle::from("same");
        let _ = set.insert(handle.clone());
        let _ = set.insert(handle.clone());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn default_creates_new() {
        let a = SessionHandle::default();
        let b = SessionHandle::default();
        assert_ne!(a, b, "default should create unique handles");
    }
}
