//! Session Store - keyed registry of live sessions with a per-owner index.

use crate::error::{Result, SessionError};
use crate::expiry::{self, ExpiryHandle, ExpiryHandler};
use crate::{monotonic_deadline, wall_clock_expiry, Session, SessionKind};
use chrono::Utc;
use karma_ids::{SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

struct Entry<P> {
    session: Session<P>,
    expiry: ExpiryHandle,
}

/// Shared state behind the store lock.
///
/// INVARIANT: `by_owner[u]` contains `id` iff `sessions[id].owner == u`, and no
/// owner maps to an empty set. `retired` and `sessions` never share an id.
pub(crate) struct StoreState<P> {
    sessions: HashMap<SessionId, Entry<P>>,
    by_owner: HashMap<UserId, HashSet<SessionId>>,
    /// Ids of every terminated session; none of them may be created again.
    retired: HashSet<SessionId>,
    next_generation: u64,
}

impl<P> StoreState<P> {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_owner: HashMap::new(),
            retired: HashSet::new(),
            next_generation: 0,
        }
    }

    /// The session `id`, but only if it is the same incarnation the caller scheduled.
    pub(crate) fn live(&self, id: &SessionId, generation: u64) -> Option<&Session<P>> {
        self.sessions
            .get(id)
            .map(|entry| &entry.session)
            .filter(|session| session.generation() == generation)
    }

    pub(crate) fn remove(&mut self, id: &SessionId, cancel_expiry: bool) -> Result<Session<P>> {
        let entry = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))?;
        self.retired.insert(id.clone());

        if cancel_expiry {
            entry.expiry.cancel();
            debug!(session_id = %id, "Expiry task was cancelled");
        }

        let owner = entry.session.owner;
        if let Some(owned) = self.by_owner.get_mut(&owner) {
            owned.remove(id);
            if owned.is_empty() {
                self.by_owner.remove(&owner);
            }
        }

        info!(session_id = %id, kind = %entry.session.kind, "Session was deleted");
        self.log_active_sessions();
        Ok(entry.session)
    }

    fn log_active_sessions(&self) {
        debug!(
            sessions = self.sessions.len(),
            owners = self.by_owner.len(),
            "Active sessions"
        );
    }
}

/// Registry of live sessions.
///
/// Cloning is cheap and shares the same registry. Obtain a [`SessionGuard`] via
/// [`SessionStore::lock`] to read or mutate; expiry tasks contend for the same lock.
pub struct SessionStore<P> {
    shared: Arc<Mutex<StoreState<P>>>,
}

impl<P> Clone for SessionStore<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> Default for SessionStore<P>
where
    P: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> SessionStore<P>
where
    P: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(StoreState::new())),
        }
    }

    /// Enter the store's mutual-exclusion domain.
    pub async fn lock(&self) -> SessionGuard<'_, P> {
        SessionGuard {
            state: self.shared.lock().await,
            shared: &self.shared,
        }
    }

    /// `now > session.expires_at`. No side effects.
    pub fn is_expired(session: &Session<P>) -> bool {
        session.is_expired()
    }

    /// Cancel every outstanding expiry task and drop all sessions.
    ///
    /// Returns the number of sessions that were still live.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.shared.lock().await;
        let count = state.sessions.len();
        let drained: Vec<_> = state.sessions.drain().collect();
        for (id, entry) in drained {
            entry.expiry.cancel();
            state.retired.insert(id);
        }
        state.by_owner.clear();
        if count > 0 {
            info!("Session store shut down with {} live sessions", count);
        }
        count
    }
}

/// Exclusive access to the session registry.
pub struct SessionGuard<'a, P> {
    state: MutexGuard<'a, StoreState<P>>,
    shared: &'a Arc<Mutex<StoreState<P>>>,
}

impl<'a, P> SessionGuard<'a, P>
where
    P: Send + Sync + 'static,
{
    /// Register a session and start its expiry timer.
    ///
    /// Fails with [`SessionError::DuplicateSession`] if `id` is live or has
    /// ever been deleted; the existing session is left untouched.
    pub fn create(
        &mut self,
        id: SessionId,
        kind: SessionKind,
        owner: UserId,
        ttl: Duration,
        payload: P,
        on_expire: Arc<dyn ExpiryHandler<P>>,
    ) -> Result<SessionId> {
        if self.state.sessions.contains_key(&id) || self.state.retired.contains(&id) {
            return Err(SessionError::DuplicateSession(id));
        }

        let generation = self.state.next_generation;
        self.state.next_generation += 1;

        let created_at = Utc::now();
        let deadline = monotonic_deadline(ttl);
        let session = Session {
            id: id.clone(),
            kind,
            owner,
            created_at,
            expires_at: wall_clock_expiry(created_at, ttl),
            deadline,
            payload,
            generation,
        };

        let expiry = expiry::schedule(
            Arc::downgrade(self.shared),
            id.clone(),
            generation,
            deadline,
            on_expire,
        );

        self.state
            .sessions
            .insert(id.clone(), Entry { session, expiry });
        self.state
            .by_owner
            .entry(owner)
            .or_default()
            .insert(id.clone());

        info!(
            session_id = %id,
            kind = %kind,
            owner = %owner,
            ttl_secs = ttl.as_secs(),
            "Session was created"
        );
        self.state.log_active_sessions();
        Ok(id)
    }

    /// Like [`create`](Self::create) with a freshly generated id.
    pub fn create_with_generated_id(
        &mut self,
        kind: SessionKind,
        owner: UserId,
        ttl: Duration,
        payload: P,
        on_expire: Arc<dyn ExpiryHandler<P>>,
    ) -> Result<SessionId> {
        self.create(SessionId::new(), kind, owner, ttl, payload, on_expire)
    }

    /// Look a session up. Expired-but-not-yet-collected sessions are still returned.
    pub fn get(&self, id: &SessionId) -> Result<&Session<P>> {
        self.state
            .sessions
            .get(id)
            .map(|entry| &entry.session)
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))
    }

    /// Remove a session from both indices and return it.
    ///
    /// `cancel_expiry = false` is reserved for the expiry task tearing itself down.
    pub fn delete(&mut self, id: &SessionId, cancel_expiry: bool) -> Result<Session<P>> {
        self.state.remove(id, cancel_expiry)
    }

    /// Whether `owner` has a live session, optionally of one kind only.
    pub fn has_session(&self, owner: UserId, kind: Option<SessionKind>) -> bool {
        let Some(owned) = self.state.by_owner.get(&owner) else {
            return false;
        };
        match kind {
            None => !owned.is_empty(),
            Some(kind) => owned.iter().any(|id| {
                self.state
                    .sessions
                    .get(id)
                    .is_some_and(|entry| entry.session.kind == kind)
            }),
        }
    }

    /// Ids of the sessions owned by `owner`, sorted.
    pub fn owned_by(&self, owner: UserId) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .state
            .by_owner
            .get(&owner)
            .map(|owned| owned.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.state.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.sessions.is_empty()
    }
}
