//! Single authority for ending a secure session.
//!
//! Teardown order: cancel timers, detach listeners, release resources and
//! clear every readiness flag, then notify the host exactly once. A second request while teardown is running
//! or after it finished has no side effects.

use serde_json::json;

use crate::checks::SystemChecks;
use crate::host::{ExitReason, SessionHost};
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::monitor::SubscriptionTable;
use crate::resources::{ReleaseReport, ResourceLifecycleManager};
use crate::violation::{SecurityViolation, Severity};

use super::scheduler::Scheduler;

const TARGET: &str = "vigil::termination";

/// Decides which violations end the session. Kept apart from classification
/// so the severity table stays a pure lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalityPolicy {
    fatal: Severity,
}

impl Default for FatalityPolicy {
    fn default() -> Self {
        Self {
            fatal: Severity::Critical,
        }
    }
}

impl FatalityPolicy {
    pub fn is_fatal(&self, violation: &SecurityViolation) -> bool {
        violation.severity() == self.fatal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Idle,
    InProgress,
    Done,
}

/// Everything teardown touches, borrowed from the runtime for one call.
pub struct Teardown<'a> {
    pub scheduler: &'a mut Scheduler,
    pub subscriptions: &'a mut SubscriptionTable,
    pub resources: &'a mut ResourceLifecycleManager,
    pub checks: &'a mut SystemChecks,
    pub host: &'a mut dyn SessionHost,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub timers_cancelled: usize,
    pub listeners_detached: usize,
    pub release: ReleaseReport,
    pub exit_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    Completed(TeardownReport),
    /// Teardown already started or finished for this session.
    Ignored,
}

pub struct TerminationController {
    state: TerminationState,
    reason: Option<ExitReason>,
    logger: Option<Logger>,
}

impl Default for TerminationController {
    fn default() -> Self {
        Self {
            state: TerminationState::Idle,
            reason: None,
            logger: None,
        }
    }
}

impl TerminationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> TerminationState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state != TerminationState::Idle
    }

    /// Reason passed to the host, once teardown has run.
    pub fn reason(&self) -> Option<&ExitReason> {
        self.reason.as_ref()
    }

    /// Claim teardown for this session. Returns false if already claimed.
    pub fn begin(&mut self) -> bool {
        if self.state != TerminationState::Idle {
            emit(
                self.logger.as_ref(),
                LogLevel::Debug,
                TARGET,
                "termination_ignored",
                [json_kv("state", json!(format!("{:?}", self.state)))],
            );
            return false;
        }
        self.state = TerminationState::InProgress;
        true
    }

    /// Run teardown after a successful [`begin`](Self::begin). `reason` of
    /// `None` tears down silently without notifying the host.
    pub fn run(&mut self, parts: Teardown<'_>, reason: Option<ExitReason>) -> TerminationOutcome {
        if self.state != TerminationState::InProgress {
            return TerminationOutcome::Ignored;
        }

        let mut report = TeardownReport {
            timers_cancelled: parts.scheduler.cancel_all(),
            listeners_detached: parts.subscriptions.detach_all(),
            release: parts.resources.release(parts.checks),
            exit_sent: false,
        };
        parts.checks.clear();

        if let Some(reason) = reason {
            emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                TARGET,
                "secure_mode_exited",
                [json_kv("reason", json!(reason.to_string()))],
            );
            parts.host.exit_secure_mode(&reason);
            report.exit_sent = true;
            self.reason = Some(reason);
        }

        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            TARGET,
            "teardown_complete",
            [
                json_kv("timers_cancelled", json!(report.timers_cancelled)),
                json_kv("listeners_detached", json!(report.listeners_detached)),
                json_kv("streams_stopped", json!(report.release.streams_stopped)),
                json_kv("exit_sent", json!(report.exit_sent)),
            ],
        );

        self.state = TerminationState::Done;
        TerminationOutcome::Completed(report)
    }

    /// `begin` followed by `run`.
    pub fn terminate(&mut self, parts: Teardown<'_>, reason: ExitReason) -> TerminationOutcome {
        if !self.begin() {
            return TerminationOutcome::Ignored;
        }
        self.run(parts, Some(reason))
    }

    /// Arm the controller for a fresh session.
    pub fn reset(&mut self) {
        self.state = TerminationState::Idle;
        self.reason = None;
    }
}
