use serde_json::json;

use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::{ProctorError, Result};

use super::{Phase, PhaseTrigger};

/// Lifecycle notifications emitted around a phase change, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseLifecycleEvent {
    WillExit(Phase),
    DidExit(Phase),
    DidEnter(Phase),
    /// The derived secure-mode flag flipped on.
    SecureModeEntered,
    /// The derived secure-mode flag flipped off.
    SecureModeExited,
}

/// Record of one applied transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
    pub trigger: PhaseTrigger,
}

impl PhaseChange {
    pub fn entered_secure_mode(&self) -> bool {
        !self.from.is_secure() && self.to.is_secure()
    }

    pub fn exited_secure_mode(&self) -> bool {
        self.from.is_secure() && !self.to.is_secure()
    }

    pub fn lifecycle(&self) -> Vec<PhaseLifecycleEvent> {
        let mut events = vec![PhaseLifecycleEvent::WillExit(self.from)];
        if self.exited_secure_mode() {
            events.push(PhaseLifecycleEvent::SecureModeExited);
        }
        events.push(PhaseLifecycleEvent::DidExit(self.from));
        events.push(PhaseLifecycleEvent::DidEnter(self.to));
        if self.entered_secure_mode() {
            events.push(PhaseLifecycleEvent::SecureModeEntered);
        }
        events
    }
}

/// Holds the single active phase and validates every change against the table.
pub struct PhaseStateMachine {
    current: Phase,
    history: Vec<PhaseChange>,
    logger: Option<Logger>,
}

impl Default for PhaseStateMachine {
    fn default() -> Self {
        Self {
            current: Phase::Agreement,
            history: Vec::new(),
            logger: None,
        }
    }
}

impl PhaseStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn is_secure(&self) -> bool {
        self.current.is_secure()
    }

    pub fn history(&self) -> &[PhaseChange] {
        &self.history
    }

    pub fn can_fire(&self, trigger: PhaseTrigger) -> bool {
        trigger.target_from(self.current).is_some()
    }

    pub fn fire(&mut self, trigger: PhaseTrigger) -> Result<PhaseChange> {
        let from = self.current;
        let to = trigger
            .target_from(from)
            .ok_or_else(|| ProctorError::GuardFailed(format!("{trigger} is not valid in {from}")))?;
        self.apply(from, to, trigger)
    }

    /// Move to an explicit target, checking it against the trigger's table entry.
    pub fn transition_to(&mut self, to: Phase, trigger: PhaseTrigger) -> Result<PhaseChange> {
        let from = self.current;
        if trigger.target_from(from) != Some(to) {
            return Err(ProctorError::InvalidTransition { from, to });
        }
        self.apply(from, to, trigger)
    }

    fn apply(&mut self, from: Phase, to: Phase, trigger: PhaseTrigger) -> Result<PhaseChange> {
        let change = PhaseChange { from, to, trigger };
        self.current = to;
        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            "vigil::phase",
            "phase_changed",
            [
                json_kv("from", json!(from.to_string())),
                json_kv("to", json!(to.to_string())),
                json_kv("trigger", json!(trigger.to_string())),
                json_kv("secure", json!(to.is_secure())),
            ],
        );
        self.history.push(change.clone());
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_happy_path() {
        let mut machine = PhaseStateMachine::new();
        assert_eq!(machine.current(), Phase::Agreement);

        machine.fire(PhaseTrigger::AgreementAccepted).unwrap();
        let change = machine.fire(PhaseTrigger::SetupSucceeded).unwrap();
        assert!(change.entered_secure_mode());
        let change = machine.fire(PhaseTrigger::ExamStarted).unwrap();
        assert!(!change.entered_secure_mode());
        assert!(!change.exited_secure_mode());

        assert_eq!(machine.current(), Phase::InExam);
        assert!(machine.is_secure());
        assert_eq!(machine.history().len(), 3);
    }

    #[test]
    fn invalid_trigger_leaves_phase_untouched() {
        let mut machine = PhaseStateMachine::new();
        let err = machine.fire(PhaseTrigger::ExamStarted).unwrap_err();
        assert!(matches!(err, ProctorError::GuardFailed(_)));
        assert_eq!(machine.current(), Phase::Agreement);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn explicit_target_must_match_table() {
        let mut machine = PhaseStateMachine::new();
        let err = machine
            .transition_to(Phase::InExam, PhaseTrigger::AgreementAccepted)
            .unwrap_err();
        assert!(matches!(
            err,
            ProctorError::InvalidTransition {
                from: Phase::Agreement,
                to: Phase::InExam
            }
        ));
        machine
            .transition_to(Phase::Setup, PhaseTrigger::AgreementAccepted)
            .unwrap();
        assert_eq!(machine.current(), Phase::Setup);
    }

    #[test]
    fn lifecycle_brackets_secure_mode_flip() {
        let change = PhaseChange {
            from: Phase::Setup,
            to: Phase::Verification,
            trigger: PhaseTrigger::SetupSucceeded,
        };
        assert_eq!(
            change.lifecycle(),
            vec![
                PhaseLifecycleEvent::WillExit(Phase::Setup),
                PhaseLifecycleEvent::DidExit(Phase::Setup),
                PhaseLifecycleEvent::DidEnter(Phase::Verification),
                PhaseLifecycleEvent::SecureModeEntered,
            ]
        );

        let closing = PhaseChange {
            from: Phase::InExam,
            to: Phase::Closed,
            trigger: PhaseTrigger::Terminated,
        };
        assert_eq!(
            closing.lifecycle(),
            vec![
                PhaseLifecycleEvent::WillExit(Phase::InExam),
                PhaseLifecycleEvent::SecureModeExited,
                PhaseLifecycleEvent::DidExit(Phase::InExam),
                PhaseLifecycleEvent::DidEnter(Phase::Closed),
            ]
        );
    }

    #[test]
    fn failed_setup_returns_to_agreement_without_secure_mode() {
        let mut machine = PhaseStateMachine::new();
        machine.fire(PhaseTrigger::AgreementAccepted).unwrap();
        let change = machine.fire(PhaseTrigger::SetupFailed).unwrap();
        assert_eq!(change.to, Phase::Agreement);
        assert!(!change.entered_secure_mode());
        assert!(!change.exited_secure_mode());
    }
}
