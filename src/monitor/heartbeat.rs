//! Liveness probing and online/offline tracking.
//!
//! This monitor is the only writer of `network_stable`. A failed probe demotes
//! the flag and raises a warning; going offline raises a critical
//! `network-loss`; coming back online restores the flag without touching
//! earlier violations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::Result;
use crate::config::DEFAULT_HEARTBEAT_INTERVAL;
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::runtime::scheduler::TimerKey;
use crate::violation::{SecurityViolation, ViolationKind};

use super::{CheckUpdate, Monitor, MonitorContext, SignalEvent, SignalFlow, SignalKind};

const TARGET: &str = "vigil::monitor.heartbeat";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum ProbeFailure {
    #[error("heartbeat timed out")]
    Timeout,
    #[error("heartbeat returned status {0}")]
    Status(u16),
    #[error("heartbeat transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready(std::result::Result<(), ProbeFailure>),
    /// The answer arrives later as a `SignalEvent::Heartbeat`.
    Pending,
}

/// Liveness endpoint of the backing service.
pub trait HeartbeatProbe: Send {
    fn probe(&mut self) -> ProbeOutcome;

    /// Platform connectivity at session start.
    fn is_online(&self) -> bool {
        true
    }
}

pub struct HeartbeatMonitor {
    probe: Box<dyn HeartbeatProbe>,
    interval: Duration,
    in_flight: bool,
    logger: Option<Logger>,
}

impl HeartbeatMonitor {
    pub fn new<P>(probe: P) -> Self
    where
        P: HeartbeatProbe + 'static,
    {
        Self {
            probe: Box::new(probe),
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            in_flight: false,
            logger: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn settle(&mut self, ctx: &mut MonitorContext<'_>, result: std::result::Result<(), ProbeFailure>) {
        self.in_flight = false;
        match result {
            Ok(()) => {
                ctx.record_heartbeat(true);
                ctx.update_check(CheckUpdate::NetworkStable(true));
            }
            Err(failure) => {
                emit(
                    self.logger.as_ref(),
                    LogLevel::Warn,
                    TARGET,
                    "heartbeat_failed",
                    [json_kv("error", json!(failure.to_string()))],
                );
                ctx.record_heartbeat(false);
                ctx.update_check(CheckUpdate::NetworkStable(false));
                ctx.raise(SecurityViolation::with_detail(
                    ViolationKind::NetworkUnstable,
                    failure.to_string(),
                ));
            }
        }
    }
}

impl Monitor for HeartbeatMonitor {
    fn name(&self) -> &str {
        "monitor.heartbeat"
    }

    fn subscriptions(&self) -> Vec<SignalKind> {
        vec![SignalKind::Connectivity, SignalKind::Heartbeat]
    }

    fn on_session_start(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.in_flight = false;
        ctx.update_check(CheckUpdate::NetworkStable(self.probe.is_online()));
        Ok(())
    }

    fn on_secure_enter(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        ctx.schedule_every(TimerKey::HEARTBEAT, self.interval);
        Ok(())
    }

    fn on_secure_exit(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.in_flight = false;
        ctx.cancel_timer(TimerKey::HEARTBEAT);
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut MonitorContext<'_>, key: TimerKey) -> Result<()> {
        if key != TimerKey::HEARTBEAT || !ctx.phase().is_secure() {
            return Ok(());
        }
        // An answer that missed a whole interval counts as a timeout.
        if self.in_flight {
            self.settle(ctx, Err(ProbeFailure::Timeout));
        }
        match self.probe.probe() {
            ProbeOutcome::Ready(result) => self.settle(ctx, result),
            ProbeOutcome::Pending => self.in_flight = true,
        }
        Ok(())
    }

    fn on_signal(
        &mut self,
        ctx: &mut MonitorContext<'_>,
        signal: &SignalEvent,
    ) -> Result<SignalFlow> {
        match signal {
            SignalEvent::Connectivity { online: false } => {
                ctx.update_check(CheckUpdate::NetworkStable(false));
                if ctx.phase().is_secure() {
                    ctx.raise(SecurityViolation::new(ViolationKind::NetworkLoss));
                }
            }
            SignalEvent::Connectivity { online: true } => {
                ctx.update_check(CheckUpdate::NetworkStable(true));
            }
            SignalEvent::Heartbeat(result) if self.in_flight => {
                self.settle(ctx, result.clone());
            }
            _ => {}
        }
        Ok(SignalFlow::Continue)
    }
}
