//! Environment signals and the monitors that react to them.
//!
//! Monitors are plugins in the runtime's dispatch loop. They never mutate
//! runtime state directly: they queue violations, readiness updates and timer
//! commands on a [`MonitorContext`], and the runtime applies the queue once
//! the monitor returns.

pub mod battery;
pub mod diagnostics;
pub mod heartbeat;
mod subscriptions;
pub mod violation;

use std::time::Duration;

use crossterm::event::KeyEvent;

use crate::checks::SystemChecks;
use crate::phase::Phase;
use crate::resources::{AcquireError, ResourceHandle, ResourceKind};
use crate::runtime::scheduler::TimerKey;
use crate::violation::SecurityViolation;
use crate::Result;

pub use battery::{BatteryMonitor, BatteryProbe, BatteryStatus, probe_battery};
pub use diagnostics::SignalLoggerMonitor;
pub use heartbeat::{HeartbeatMonitor, HeartbeatProbe, ProbeFailure, ProbeOutcome};
pub use subscriptions::{NullSignalSource, SignalSource, Subscription, SubscriptionTable};
pub use violation::ViolationMonitor;

/// Listener families a platform adapter can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Visibility,
    Focus,
    Keyboard,
    ContextMenu,
    MouseLeave,
    Fullscreen,
    Connectivity,
    Battery,
    Heartbeat,
}

impl SignalKind {
    pub const ALL: [SignalKind; 9] = [
        SignalKind::Visibility,
        SignalKind::Focus,
        SignalKind::Keyboard,
        SignalKind::ContextMenu,
        SignalKind::MouseLeave,
        SignalKind::Fullscreen,
        SignalKind::Connectivity,
        SignalKind::Battery,
        SignalKind::Heartbeat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Visibility => "visibility",
            SignalKind::Focus => "focus",
            SignalKind::Keyboard => "keyboard",
            SignalKind::ContextMenu => "context-menu",
            SignalKind::MouseLeave => "mouse-leave",
            SignalKind::Fullscreen => "fullscreen",
            SignalKind::Connectivity => "connectivity",
            SignalKind::Battery => "battery",
            SignalKind::Heartbeat => "heartbeat",
        }
    }
}

/// Everything the platform can report to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    Tick { elapsed: Duration },
    Visibility { hidden: bool },
    FocusLost,
    FocusGained,
    Key(KeyEvent),
    ContextMenu,
    PointerLeft,
    Fullscreen { active: bool },
    Connectivity { online: bool },
    Battery(BatteryStatus),
    /// Answer to a heartbeat probe that returned `Pending`.
    Heartbeat(std::result::Result<(), ProbeFailure>),
    /// Answer to an acquisition that returned `Pending`.
    Resolved {
        kind: ResourceKind,
        result: std::result::Result<ResourceHandle, AcquireError>,
    },
}

impl SignalEvent {
    /// Listener family this signal belongs to. Ticks and resolutions are
    /// delivered regardless of attachment.
    pub fn kind(&self) -> Option<SignalKind> {
        match self {
            SignalEvent::Tick { .. } | SignalEvent::Resolved { .. } => None,
            SignalEvent::Visibility { .. } => Some(SignalKind::Visibility),
            SignalEvent::FocusLost | SignalEvent::FocusGained => Some(SignalKind::Focus),
            SignalEvent::Key(_) => Some(SignalKind::Keyboard),
            SignalEvent::ContextMenu => Some(SignalKind::ContextMenu),
            SignalEvent::PointerLeft => Some(SignalKind::MouseLeave),
            SignalEvent::Fullscreen { .. } => Some(SignalKind::Fullscreen),
            SignalEvent::Connectivity { .. } => Some(SignalKind::Connectivity),
            SignalEvent::Battery(_) => Some(SignalKind::Battery),
            SignalEvent::Heartbeat(_) => Some(SignalKind::Heartbeat),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SignalEvent::Tick { .. } => "tick",
            SignalEvent::Visibility { .. } => "visibility",
            SignalEvent::FocusLost => "focus_lost",
            SignalEvent::FocusGained => "focus_gained",
            SignalEvent::Key(_) => "key",
            SignalEvent::ContextMenu => "context_menu",
            SignalEvent::PointerLeft => "pointer_left",
            SignalEvent::Fullscreen { .. } => "fullscreen",
            SignalEvent::Connectivity { .. } => "connectivity",
            SignalEvent::Battery(_) => "battery",
            SignalEvent::Heartbeat(_) => "heartbeat",
            SignalEvent::Resolved { .. } => "resolved",
        }
    }
}

/// Whether the platform's default action for a signal should be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFlow {
    Continue,
    Suppress,
}

/// Readiness flags a monitor may write. Camera, microphone, screen-share and
/// fullscreen acquisition belong to the resource manager and are absent here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckUpdate {
    NetworkStable(bool),
    BatteryLevel(bool),
    NoOtherApps(bool),
    /// The platform left fullscreen without the runtime asking.
    FullscreenLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Once(TimerKey, Duration),
    Every(TimerKey, Duration),
    Cancel(TimerKey),
}

/// Effects queued by a monitor during one callback.
#[derive(Debug, Default)]
pub struct MonitorOutcome {
    pub violations: Vec<SecurityViolation>,
    pub check_updates: Vec<CheckUpdate>,
    pub timers: Vec<TimerCommand>,
    /// Heartbeat results, `true` for success.
    pub heartbeats: Vec<bool>,
}

/// Read-only view of the session plus an effect queue.
pub struct MonitorContext<'a> {
    phase: Phase,
    checks: &'a SystemChecks,
    outcome: MonitorOutcome,
}

impl<'a> MonitorContext<'a> {
    pub(crate) fn new(phase: Phase, checks: &'a SystemChecks) -> Self {
        Self {
            phase,
            checks,
            outcome: MonitorOutcome::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn checks(&self) -> &SystemChecks {
        self.checks
    }

    /// Queue a violation. It is logged, reported and, if critical, terminates the session.
    pub fn raise(&mut self, violation: SecurityViolation) {
        self.outcome.violations.push(violation);
    }

    pub fn update_check(&mut self, update: CheckUpdate) {
        self.outcome.check_updates.push(update);
    }

    pub fn schedule_once(&mut self, key: TimerKey, after: Duration) {
        self.outcome.timers.push(TimerCommand::Once(key, after));
    }

    pub fn schedule_every(&mut self, key: TimerKey, every: Duration) {
        self.outcome.timers.push(TimerCommand::Every(key, every));
    }

    pub fn cancel_timer(&mut self, key: TimerKey) {
        self.outcome.timers.push(TimerCommand::Cancel(key));
    }

    pub fn record_heartbeat(&mut self, ok: bool) {
        self.outcome.heartbeats.push(ok);
    }

    pub(crate) fn into_outcome(self) -> MonitorOutcome {
        self.outcome
    }
}

/// Behaviour injection point for the runtime.
pub trait Monitor: Send {
    fn name(&self) -> &str {
        "vigil_monitor"
    }

    /// Listener families this monitor needs attached while in secure mode.
    fn subscriptions(&self) -> Vec<SignalKind> {
        Vec::new()
    }

    /// Setup began: reset per-session state and seed readiness flags.
    fn on_session_start(&mut self, _ctx: &mut MonitorContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_secure_enter(&mut self, _ctx: &mut MonitorContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_secure_exit(&mut self, _ctx: &mut MonitorContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_signal(
        &mut self,
        _ctx: &mut MonitorContext<'_>,
        _signal: &SignalEvent,
    ) -> Result<SignalFlow> {
        Ok(SignalFlow::Continue)
    }

    fn on_timer(&mut self, _ctx: &mut MonitorContext<'_>, _key: TimerKey) -> Result<()> {
        Ok(())
    }
}
