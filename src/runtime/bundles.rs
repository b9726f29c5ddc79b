use crate::config::ProctorConfig;
use crate::logging::{LogLevel, Logger};
use crate::monitor::{
    BatteryMonitor, HeartbeatMonitor, HeartbeatProbe, Monitor, SignalLoggerMonitor,
    ViolationMonitor,
};

/// Monitors plus the priority each is registered with.
#[derive(Default)]
pub struct MonitorBundle {
    entries: Vec<(i32, Box<dyn Monitor>)>,
}

impl MonitorBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_monitor<M>(mut self, monitor: M, priority: i32) -> Self
    where
        M: Monitor + 'static,
    {
        self.entries.push((priority, Box::new(monitor)));
        self
    }

    /// Add a feature-detected monitor when present.
    pub fn with_optional<M>(self, monitor: Option<M>, priority: i32) -> Self
    where
        M: Monitor + 'static,
    {
        match monitor {
            Some(monitor) => self.with_monitor(monitor, priority),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(i32, Box<dyn Monitor>)> {
        self.entries
    }
}

#[derive(Clone)]
pub struct DefaultBundleConfig {
    pub diagnostics_priority: i32,
    pub violation_priority: i32,
    pub heartbeat_priority: i32,
    pub battery_priority: i32,
    pub diagnostics: Option<DiagnosticsConfig>,
}

impl Default for DefaultBundleConfig {
    fn default() -> Self {
        Self {
            diagnostics_priority: -100,
            violation_priority: 0,
            heartbeat_priority: 10,
            battery_priority: 20,
            diagnostics: None,
        }
    }
}

#[derive(Clone)]
pub struct DiagnosticsConfig {
    pub logger: Logger,
    pub level: LogLevel,
    pub log_keys: bool,
    pub log_ticks: bool,
    pub log_timers: bool,
}

impl DiagnosticsConfig {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_keys: true,
            log_ticks: false,
            log_timers: false,
        }
    }

    fn build_monitor(&self) -> SignalLoggerMonitor {
        SignalLoggerMonitor::new(self.logger.clone())
            .with_level(self.level)
            .log_keys(self.log_keys)
            .log_ticks(self.log_ticks)
            .log_timers(self.log_timers)
    }
}

/// The standard monitor set: violation table, heartbeat, and battery when
/// the platform exposes one.
pub fn default_monitor_bundle<P>(
    config: &ProctorConfig,
    bundle_config: DefaultBundleConfig,
    heartbeat_probe: P,
    battery: Option<BatteryMonitor>,
) -> MonitorBundle
where
    P: HeartbeatProbe + 'static,
{
    let logger = config.logger.clone();
    let violation = ViolationMonitor::new(config.blocked_keys.clone()).with_logger(logger.clone());
    let heartbeat = HeartbeatMonitor::new(heartbeat_probe)
        .with_interval(config.heartbeat_interval)
        .with_logger(logger.clone());
    let battery = battery.map(|monitor| {
        monitor
            .with_threshold(config.battery_low_threshold)
            .with_logger(logger.clone())
    });

    let mut bundle = MonitorBundle::new()
        .with_monitor(violation, bundle_config.violation_priority)
        .with_monitor(heartbeat, bundle_config.heartbeat_priority)
        .with_optional(battery, bundle_config.battery_priority);

    if let Some(diagnostics) = bundle_config.diagnostics.as_ref() {
        bundle = bundle.with_monitor(
            diagnostics.build_monitor(),
            bundle_config.diagnostics_priority,
        );
    }

    bundle
}
