//! Session lifecycle audit hooks.
//!
//! Records capture a stage identifier plus structured details so callers can
//! log, buffer or ship the session's progression without touching the
//! dispatch loop.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::Value;

/// Lifecycle checkpoints emitted by `ProctorRuntime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAuditStage {
    RuntimeConstructed,
    MonitorRegistered,
    PhaseChanged,
    /// Listeners attached on entering Verification.
    SecureModeEntered,
    /// Listeners detached on leaving secure mode.
    SecureModeExited,
    ViolationRecorded,
    /// A required acquisition failed and Setup rolled back.
    SetupFailed,
    TerminationStarted,
    TerminationCompleted,
    RuntimeShutdown,
}

#[derive(Debug, Clone)]
pub struct SessionAuditEvent {
    pub timestamp: SystemTime,
    pub stage: SessionAuditStage,
    pub details: Vec<(String, Value)>,
}

impl SessionAuditEvent {
    fn new(stage: SessionAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

pub struct SessionAuditEventBuilder {
    event: SessionAuditEvent,
}

impl SessionAuditEventBuilder {
    pub fn new(stage: SessionAuditStage) -> Self {
        Self {
            event: SessionAuditEvent::new(stage),
        }
    }

    pub fn detail(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> SessionAuditEvent {
        self.event
    }
}

pub trait SessionAudit: Send + Sync {
    fn record(&self, event: SessionAuditEvent);
}

#[derive(Debug, Default)]
pub struct NullSessionAudit;

impl SessionAudit for NullSessionAudit {
    fn record(&self, _event: SessionAuditEvent) {}
}

/// Buffers every record. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionAudit {
    events: Arc<Mutex<Vec<SessionAuditEvent>>>,
}

impl MemorySessionAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionAuditEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<SessionAuditStage> {
        self.events().into_iter().map(|e| e.stage).collect()
    }

    pub fn count(&self, stage: SessionAuditStage) -> usize {
        self.events().iter().filter(|e| e.stage == stage).count()
    }
}

impl SessionAudit for MemorySessionAudit {
    fn record(&self, event: SessionAuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
