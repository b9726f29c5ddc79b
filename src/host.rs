//! Outbound collaborator: the page that houses the proctored session.

use std::fmt;

use serde::Serialize;

use crate::config::ExamConfig;
use crate::logging::now_ms;
use crate::violation::{SecurityViolation, Severity};

/// Why secure mode ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum ExitReason {
    /// A critical violation ended the session.
    Violation { violation: SecurityViolation },
    /// Terminated directly, e.g. by a proctor.
    Operator { message: String },
    /// The user backed out before the exam started.
    Cancelled,
    /// The exam finished normally.
    Completed,
}

impl ExitReason {
    pub fn operator(message: impl Into<String>) -> Self {
        ExitReason::Operator {
            message: message.into(),
        }
    }

    pub fn violation(&self) -> Option<&SecurityViolation> {
        match self {
            ExitReason::Violation { violation } => Some(violation),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Violation { violation } => write!(f, "{}", violation.description()),
            ExitReason::Operator { message } => write!(f, "terminated: {message}"),
            ExitReason::Cancelled => write!(f, "cancelled by user"),
            ExitReason::Completed => write!(f, "exam completed"),
        }
    }
}

/// Identity attached to every audit record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetadata {
    pub user_id: String,
    pub test_id: String,
    pub user_agent: String,
    pub referrer: String,
}

/// A violation paired with session identity, ready for an audit endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub metadata: SessionMetadata,
    pub violation: SecurityViolation,
    pub recorded_at_ms: u64,
}

impl AuditRecord {
    pub fn new(metadata: SessionMetadata, violation: SecurityViolation) -> Self {
        Self {
            metadata,
            violation,
            recorded_at_ms: now_ms() as u64,
        }
    }
}

/// Callbacks into the housing page.
pub trait SessionHost: Send {
    /// Every recorded violation, in detection order.
    fn report_violation(&mut self, description: &str, severity: Severity);

    /// Full audit record for persistence. Defaults to nothing.
    fn record_audit(&mut self, _record: &AuditRecord) {}

    /// Secure mode ended. Called at most once per session.
    fn exit_secure_mode(&mut self, reason: &ExitReason);

    /// Verification passed and the exam content may start.
    fn begin_exam(&mut self, _exam: &ExamConfig) {}

    /// A required resource could not be acquired; show the blocking message.
    fn setup_failed(&mut self, _violation: &SecurityViolation) {}
}

/// Host that ignores every callback.
#[derive(Debug, Default)]
pub struct NullHost;

impl SessionHost for NullHost {
    fn report_violation(&mut self, _description: &str, _severity: Severity) {}
    fn exit_secure_mode(&mut self, _reason: &ExitReason) {}
}
