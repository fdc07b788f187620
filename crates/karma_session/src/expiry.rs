//! Expiry Scheduler - one cancellable timer task per session.

use crate::store::StoreState;
use crate::Session;
use async_trait::async_trait;
use karma_ids::SessionId;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Callback run exactly once when a session outlives its TTL.
///
/// Runs inside the store's lock, so implementations must not call back into
/// the same [`SessionStore`](crate::SessionStore). A returned error is logged;
/// the session is removed either way.
#[async_trait]
pub trait ExpiryHandler<P>: Send + Sync
where
    P: Send + Sync,
{
    async fn on_expire(&self, session: &Session<P>) -> anyhow::Result<()>;
}

/// Ownership token for a scheduled expiry task.
#[derive(Debug)]
pub struct ExpiryHandle {
    task: JoinHandle<()>,
}

impl ExpiryHandle {
    /// Stop the timer. A task blocked on the store lock never resumes.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

pub(crate) fn schedule<P>(
    state: Weak<Mutex<StoreState<P>>>,
    id: SessionId,
    generation: u64,
    deadline: Instant,
    handler: Arc<dyn ExpiryHandler<P>>,
) -> ExpiryHandle
where
    P: Send + Sync + 'static,
{
    debug!(session_id = %id, "Expiry task registered");
    let task = tokio::spawn(fire_at(state, id, generation, deadline, handler));
    ExpiryHandle { task }
}

async fn fire_at<P>(
    state: Weak<Mutex<StoreState<P>>>,
    id: SessionId,
    generation: u64,
    deadline: Instant,
    handler: Arc<dyn ExpiryHandler<P>>,
) where
    P: Send + Sync + 'static,
{
    tokio::time::sleep_until(deadline).await;

    let Some(shared) = state.upgrade() else {
        debug!(session_id = %id, "Session store dropped before expiry");
        return;
    };
    let mut state = shared.lock().await;

    let Some(session) = state.live(&id, generation) else {
        debug!(session_id = %id, "Session already gone, expiry is a no-op");
        return;
    };

    info!(session_id = %id, kind = %session.kind, "Executing expiry handler");
    if let Err(err) = handler.on_expire(session).await {
        error!(session_id = %id, "Error executing expiry handler: {:#}", err);
    }

    warn!(session_id = %id, "Expired session will be deleted");
    if let Err(err) = state.remove(&id, false) {
        warn!(session_id = %id, "Expired session vanished during cleanup: {}", err);
    }
}
