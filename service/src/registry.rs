//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Token-keyed registry of live sessions
//!
//! All operations run inside one short critical section, so capacity checks,
//! inserts, and re-keys are atomic with respect to each other. Enumeration
//! returns a copied snapshot; callers never iterate the map itself.

use crate::{Result, Session, SessionError, SessionToken};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Concurrency-safe map of token to session with a capacity limit
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionToken, Arc<Session>>>,
    capacity: usize,
}

impl SessionRegistry {
    /// Create an empty registry holding at most `capacity` sessions
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::with_capacity(capacity)),
            capacity,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionToken, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of sessions
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a session under its current token
    ///
    /// Fails with [`SessionError::CapacityExceeded`] when full and
    /// [`SessionError::DuplicateToken`] when the token is taken.
    pub fn add(&self, session: Arc<Session>) -> Result<()> {
        let token = session.token();
        let mut sessions = self.sessions();
        if sessions.len() >= self.capacity {
            return Err(SessionError::CapacityExceeded(self.capacity));
        }
        if sessions.contains_key(&token) {
            return Err(SessionError::DuplicateToken);
        }
        sessions.insert(token, session);
        Ok(())
    }

    /// Remove the session registered under `token`
    pub fn remove(&self, token: &SessionToken) -> Option<Arc<Session>> {
        self.sessions().remove(token)
    }

    /// Look up a session by token
    pub fn find_by_token(&self, token: &SessionToken) -> Option<Arc<Session>> {
        self.sessions().get(token).cloned()
    }

    /// Move a session from `old` to `new` in one step
    ///
    /// Other threads see the session under `old` or under `new`, never
    /// under neither and never under both.
    pub fn rekey(&self, old: &SessionToken, new: SessionToken) -> Result<()> {
        let mut sessions = self.sessions();
        if sessions.contains_key(&new) {
            return Err(SessionError::DuplicateToken);
        }
        let session = sessions
            .remove(old)
            .ok_or(SessionError::SessionNotFound(*old))?;
        sessions.insert(new, session);
        Ok(())
    }

    /// Point-in-time copy of all registered sessions
    pub fn list(&self) -> Vec<Arc<Session>> {
        let mut snapshot: Vec<_> = self.sessions().values().cloned().collect();
        snapshot.sort_by_key(|session| session.id());
        snapshot
    }

    /// Number of registered sessions
    pub fn count(&self) -> usize {
        self.sessions().len()
    }

    /// Whether no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Remove and return every registered session
    pub fn drain_all(&self) -> Vec<Arc<Session>> {
        let mut drained: Vec<_> = self.sessions().drain().map(|(_, session)| session).collect();
        drained.sort_by_key(|session| session.id());
        drained
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
