use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct ActiveSession {
    id: u64,
    token: CancellationToken,
}

/// Tracks the single generation allowed to be in flight.
///
/// Starting a new session cancels whichever one was active, so an abandoned
/// reveal loop stops at its next suspension point instead of reading its
/// stream to the end.
#[derive(Clone, Default)]
pub struct SessionManager {
    active: Arc<Mutex<Option<ActiveSession>>>,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct GenerationSession {
    id: u64,
    token: CancellationToken,
}

impl GenerationSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> GenerationSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        let previous = self.active.lock().replace(ActiveSession {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!(superseded = previous.id, session = id, "cancelling previous generation");
            previous.token.cancel();
        }

        GenerationSession { id, token }
    }

    /// Cancels the active session. Returns false when nothing was running.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock().take() {
            Some(active) => {
                debug!(session = active.id, "cancelling active generation");
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Releases the slot if `session` is still the active one.
    pub fn finish(&self, session: &GenerationSession) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id == session.id) {
            *active = None;
        }
    }

    pub fn active_id(&self) -> Option<u64> {
        self.active.lock().as_ref().map(|a| a.id)
    }
}
