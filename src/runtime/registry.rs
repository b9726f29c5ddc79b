use std::sync::{Arc, RwLock};

use crate::{ProctorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: String,
    pub attempt_id: String,
}

/// Records which session currently owns the proctoring surface. Runtimes that
/// share a registry cannot be in secure mode at the same time; runtimes with
/// separate registries never see each other.
#[derive(Default)]
pub struct ActiveSessionRegistry {
    inner: RwLock<Option<ActiveSession>>,
}

impl ActiveSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the surface. Re-claiming by the current owner refreshes the attempt.
    pub fn claim(&self, session_id: impl Into<String>, attempt_id: impl Into<String>) -> Result<()> {
        let session_id = session_id.into();
        let mut guard = self
            .inner
            .write()
            .map_err(|_| ProctorError::Poisoned("session registry"))?;
        if let Some(active) = guard.as_ref() {
            if active.session_id != session_id {
                return Err(ProctorError::SessionBusy(active.session_id.clone()));
            }
        }
        *guard = Some(ActiveSession {
            session_id,
            attempt_id: attempt_id.into(),
        });
        Ok(())
    }

    /// Release the surface. A non-owner release is a no-op.
    pub fn release(&self, session_id: &str) -> bool {
        if let Ok(mut guard) = self.inner.write() {
            if guard.as_ref().map(|e| e.session_id.as_str()) == Some(session_id) {
                *guard = None;
                return true;
            }
        }
        false
    }

    pub fn current(&self) -> Option<ActiveSession> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.current()
            .is_some_and(|active| active.session_id == session_id)
    }

    /// Fail unless `session_id` owns the surface.
    pub fn ensure_active(&self, session_id: &str) -> Result<()> {
        if self.is_active(session_id) {
            Ok(())
        } else {
            Err(ProctorError::SessionNotActive(session_id.to_string()))
        }
    }
}

pub type SharedSessionRegistry = Arc<ActiveSessionRegistry>;
