//! Session-scoped access grants for protected files.
//!
//! Authorisation policy lives outside the store. Callers decide that a session may see a file
//! and record that decision here; the store then serves the protected bytes to that session.

use crate::{AssetError, AssetResult};
use assets_types::NonEmptyText;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

/// Opaque identifier of the session grants are scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(NonEmptyText);

impl SessionId {
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidInput`] if `id` is blank.
    pub fn new(id: impl AsRef<str>) -> AssetResult<Self> {
        NonEmptyText::new(id)
            .map(Self)
            .map_err(|_| AssetError::InvalidInput("session id cannot be empty".into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session allow-list of protected file IDs.
pub trait GrantStore: Send + Sync + fmt::Debug {
    fn grant(&self, session: &SessionId, file_id: &str);

    fn revoke(&self, session: &SessionId, file_id: &str);

    fn is_granted(&self, session: &SessionId, file_id: &str) -> bool;

    /// Drop every grant held by `session`.
    fn clear(&self, session: &SessionId);
}

#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    sessions: RwLock<HashMap<SessionId, HashSet<String>>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GrantStore for InMemoryGrantStore {
    fn grant(&self, session: &SessionId, file_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session.clone())
            .or_default()
            .insert(file_id.to_owned());
    }

    fn revoke(&self, session: &SessionId, file_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(granted) = sessions.get_mut(session) {
            granted.remove(file_id);
            if granted.is_empty() {
                sessions.remove(session);
            }
        }
    }

    fn is_granted(&self, session: &SessionId, file_id: &str) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session)
            .is_some_and(|granted| granted.contains(file_id))
    }

    fn clear(&self, session: &SessionId) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session);
    }
}
