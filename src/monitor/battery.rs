//! Optional battery watcher.
//!
//! The platform battery API is feature-detected: [`probe_battery`] returns a
//! monitor only when a status can be read. A missing API leaves the
//! `battery_level` check at its default of true.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::Result;
use crate::config::DEFAULT_BATTERY_LOW_THRESHOLD;
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::violation::{SecurityViolation, ViolationKind};

use super::{CheckUpdate, Monitor, MonitorContext, SignalEvent, SignalFlow, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge fraction in `0.0..=1.0`.
    pub level: f32,
    pub charging: bool,
}

impl BatteryStatus {
    pub fn new(level: f32, charging: bool) -> Self {
        Self { level, charging }
    }

    pub fn is_low(&self, threshold: f32) -> bool {
        !self.charging && self.level < threshold
    }
}

/// Platform battery API. `None` means the API is absent.
pub trait BatteryProbe {
    fn status(&mut self) -> Option<BatteryStatus>;
}

impl<F> BatteryProbe for F
where
    F: FnMut() -> Option<BatteryStatus>,
{
    fn status(&mut self) -> Option<BatteryStatus> {
        self()
    }
}

/// Build a monitor if the platform exposes battery status.
pub fn probe_battery<P>(mut probe: P, threshold: f32) -> Option<BatteryMonitor>
where
    P: BatteryProbe,
{
    probe
        .status()
        .map(|status| BatteryMonitor::new(status).with_threshold(threshold))
}

/// Warns once per transition into low-and-unplugged. The warning re-arms
/// only after the condition clears.
pub struct BatteryMonitor {
    status: BatteryStatus,
    threshold: f32,
    warned: bool,
    logger: Option<Logger>,
}

impl BatteryMonitor {
    pub fn new(status: BatteryStatus) -> Self {
        Self {
            status,
            threshold: DEFAULT_BATTERY_LOW_THRESHOLD,
            warned: false,
            logger: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn status(&self) -> BatteryStatus {
        self.status
    }

    fn is_low(&self) -> bool {
        self.status.is_low(self.threshold)
    }

    fn warn_if_needed(&mut self, ctx: &mut MonitorContext<'_>) {
        if !self.is_low() {
            self.warned = false;
            return;
        }
        if self.warned || !ctx.phase().is_secure() {
            return;
        }
        self.warned = true;
        let percent = (self.status.level * 100.0).round() as u32;
        emit(
            self.logger.as_ref(),
            LogLevel::Warn,
            "vigil::monitor.battery",
            "battery_low",
            [
                json_kv("level", json!(self.status.level)),
                json_kv("charging", json!(self.status.charging)),
            ],
        );
        ctx.raise(SecurityViolation::with_detail(
            ViolationKind::BatteryLow,
            format!("{percent}% remaining"),
        ));
    }
}

impl Monitor for BatteryMonitor {
    fn name(&self) -> &str {
        "monitor.battery"
    }

    fn subscriptions(&self) -> Vec<SignalKind> {
        vec![SignalKind::Battery]
    }

    fn on_session_start(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.warned = false;
        ctx.update_check(CheckUpdate::BatteryLevel(!self.is_low()));
        Ok(())
    }

    fn on_secure_enter(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.warn_if_needed(ctx);
        Ok(())
    }

    fn on_signal(
        &mut self,
        ctx: &mut MonitorContext<'_>,
        signal: &SignalEvent,
    ) -> Result<SignalFlow> {
        if let SignalEvent::Battery(status) = signal {
            self.status = *status;
            ctx.update_check(CheckUpdate::BatteryLevel(!self.is_low()));
            self.warn_if_needed(ctx);
        }
        Ok(SignalFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::SystemChecks;
    use crate::monitor::MonitorOutcome;
    use crate::phase::Phase;

    fn feed(monitor: &mut BatteryMonitor, level: f32, charging: bool) -> MonitorOutcome {
        let checks = SystemChecks::default();
        let mut ctx = MonitorContext::new(Phase::InExam, &checks);
        monitor
            .on_signal(&mut ctx, &SignalEvent::Battery(BatteryStatus::new(level, charging)))
            .unwrap();
        ctx.into_outcome()
    }

    #[test]
    fn absent_api_yields_no_monitor() {
        assert!(probe_battery(|| None, 0.2).is_none());
        let monitor = probe_battery(|| Some(BatteryStatus::new(0.9, false)), 0.2);
        assert!(monitor.is_some());
    }

    #[test]
    fn warns_once_per_transition_into_low() {
        let mut monitor = BatteryMonitor::new(BatteryStatus::new(0.8, false));

        assert!(feed(&mut monitor, 0.5, false).violations.is_empty());
        let first = feed(&mut monitor, 0.19, false);
        assert_eq!(first.violations.len(), 1);
        assert_eq!(first.violations[0].kind(), ViolationKind::BatteryLow);
        assert!(feed(&mut monitor, 0.18, false).violations.is_empty());
        assert!(feed(&mut monitor, 0.15, false).violations.is_empty());

        // Plugging in clears the condition; unplugging again re-arms.
        assert!(feed(&mut monitor, 0.15, true).violations.is_empty());
        assert_eq!(feed(&mut monitor, 0.14, false).violations.len(), 1);
    }

    #[test]
    fn readiness_follows_every_change() {
        let mut monitor = BatteryMonitor::new(BatteryStatus::new(0.8, false));
        assert_eq!(
            feed(&mut monitor, 0.1, false).check_updates,
            vec![CheckUpdate::BatteryLevel(false)]
        );
        assert_eq!(
            feed(&mut monitor, 0.1, true).check_updates,
            vec![CheckUpdate::BatteryLevel(true)]
        );
    }

    #[test]
    fn already_low_at_secure_entry_warns_once() {
        let mut monitor = BatteryMonitor::new(BatteryStatus::new(0.05, false));
        let checks = SystemChecks::default();

        let mut ctx = MonitorContext::new(Phase::Setup, &checks);
        monitor.on_session_start(&mut ctx).unwrap();
        assert_eq!(
            ctx.into_outcome().check_updates,
            vec![CheckUpdate::BatteryLevel(false)]
        );

        let mut ctx = MonitorContext::new(Phase::Verification, &checks);
        monitor.on_secure_enter(&mut ctx).unwrap();
        assert_eq!(ctx.into_outcome().violations.len(), 1);

        assert!(feed(&mut monitor, 0.04, false).violations.is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let status = BatteryStatus::new(0.20, false);
        assert!(!status.is_low(0.20));
        assert!(BatteryStatus::new(0.199, false).is_low(0.20));
    }
}
