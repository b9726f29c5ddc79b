//! Exam-entry phases and their transition table.
//!
//! `Agreement -> Setup -> Verification -> InExam`, with Setup able to fall
//! back to Agreement and every live phase able to close. Secure mode is
//! derived from the phase and never stored separately.

mod machine;

use std::fmt;

use serde::Serialize;

pub use machine::{PhaseChange, PhaseLifecycleEvent, PhaseStateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Agreement,
    Setup,
    Verification,
    InExam,
    /// The session left secure mode for good (terminated, cancelled or completed).
    Closed,
}

impl Phase {
    /// Monitoring listeners are attached exactly while this holds.
    pub fn is_secure(&self) -> bool {
        matches!(self, Phase::Verification | Phase::InExam)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Phase::Closed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Agreement => write!(f, "Agreement"),
            Phase::Setup => write!(f, "Setup"),
            Phase::Verification => write!(f, "Verification"),
            Phase::InExam => write!(f, "InExam"),
            Phase::Closed => write!(f, "Closed"),
        }
    }
}

/// What caused a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseTrigger {
    AgreementAccepted,
    SetupSucceeded,
    SetupFailed,
    ExamStarted,
    Terminated,
    Cancelled,
    Completed,
    Restarted,
}

impl PhaseTrigger {
    /// Target phase for this trigger when fired from `from`, if allowed.
    ///
    /// - `Agreement` + accepted -> `Setup`
    /// - `Setup` + succeeded -> `Verification`; + failed -> `Agreement`
    /// - `Verification` + exam started -> `InExam`
    /// - any live phase + terminated -> `Closed`
    /// - `Agreement` | `Setup` | `Verification` + cancelled -> `Closed`
    /// - `InExam` + completed -> `Closed`
    /// - `Closed` + restarted -> `Agreement`
    pub fn target_from(&self, from: Phase) -> Option<Phase> {
        match (from, self) {
            (Phase::Agreement, PhaseTrigger::AgreementAccepted) => Some(Phase::Setup),
            (Phase::Setup, PhaseTrigger::SetupSucceeded) => Some(Phase::Verification),
            (Phase::Setup, PhaseTrigger::SetupFailed) => Some(Phase::Agreement),
            (Phase::Verification, PhaseTrigger::ExamStarted) => Some(Phase::InExam),
            (Phase::Closed, PhaseTrigger::Restarted) => Some(Phase::Agreement),
            (Phase::Closed, _) => None,
            (_, PhaseTrigger::Terminated) => Some(Phase::Closed),
            (Phase::InExam, PhaseTrigger::Completed) => Some(Phase::Closed),
            (Phase::InExam, PhaseTrigger::Cancelled) => None,
            (_, PhaseTrigger::Cancelled) => Some(Phase::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PhaseTrigger::AgreementAccepted => "agreement-accepted",
            PhaseTrigger::SetupSucceeded => "setup-succeeded",
            PhaseTrigger::SetupFailed => "setup-failed",
            PhaseTrigger::ExamStarted => "exam-started",
            PhaseTrigger::Terminated => "terminated",
            PhaseTrigger::Cancelled => "cancelled",
            PhaseTrigger::Completed => "completed",
            PhaseTrigger::Restarted => "restarted",
        };
        f.write_str(label)
    }
}
