use serde_json::json;

use crate::Result;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::runtime::scheduler::TimerKey;

use super::{Monitor, MonitorContext, SignalEvent, SignalFlow};

/// Logs dispatched signals and secure-mode edges for debugging.
pub struct SignalLoggerMonitor {
    logger: Logger,
    level: LogLevel,
    log_keys: bool,
    log_ticks: bool,
    log_timers: bool,
}

impl SignalLoggerMonitor {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_keys: true,
            log_ticks: false,
            log_timers: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_keys(mut self, enabled: bool) -> Self {
        self.log_keys = enabled;
        self
    }

    pub fn log_ticks(mut self, enabled: bool) -> Self {
        self.log_ticks = enabled;
        self
    }

    pub fn log_timers(mut self, enabled: bool) -> Self {
        self.log_timers = enabled;
        self
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, "vigil::monitor.diagnostics", message, fields);
        let _ = self.logger.log_event(event);
    }
}

impl Monitor for SignalLoggerMonitor {
    fn name(&self) -> &str {
        "monitor.diagnostics"
    }

    fn on_session_start(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.emit(
            "session.start",
            [json_kv("phase", json!(ctx.phase().to_string()))],
        );
        Ok(())
    }

    fn on_secure_enter(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.emit(
            "secure.enter",
            [json_kv("phase", json!(ctx.phase().to_string()))],
        );
        Ok(())
    }

    fn on_secure_exit(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        self.emit(
            "secure.exit",
            [json_kv("phase", json!(ctx.phase().to_string()))],
        );
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut MonitorContext<'_>, key: TimerKey) -> Result<()> {
        if self.log_timers {
            self.emit("timer.fired", [json_kv("timer", json!(key.name()))]);
        }
        Ok(())
    }

    fn on_signal(
        &mut self,
        _ctx: &mut MonitorContext<'_>,
        signal: &SignalEvent,
    ) -> Result<SignalFlow> {
        match signal {
            SignalEvent::Key(key) if self.log_keys => {
                self.emit(
                    "signal.key",
                    [
                        json_kv("code", json!(format!("{:?}", key.code))),
                        json_kv("modifiers", json!(format!("{:?}", key.modifiers))),
                        json_kv("kind", json!(format!("{:?}", key.kind))),
                    ],
                );
            }
            SignalEvent::Key(_) => {}
            SignalEvent::Tick { elapsed } => {
                if self.log_ticks {
                    self.emit(
                        "signal.tick",
                        [json_kv("elapsed_ms", json!(elapsed.as_millis() as u64))],
                    );
                }
            }
            SignalEvent::Battery(status) => {
                self.emit(
                    "signal.battery",
                    [
                        json_kv("level", json!(status.level)),
                        json_kv("charging", json!(status.charging)),
                    ],
                );
            }
            SignalEvent::Resolved { kind, result } => {
                self.emit(
                    "signal.resolved",
                    [
                        json_kv("resource", json!(kind.name())),
                        json_kv("granted", json!(result.is_ok())),
                    ],
                );
            }
            other => {
                self.emit(&format!("signal.{}", other.describe()), std::iter::empty());
            }
        }
        Ok(SignalFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::SystemChecks;
    use crate::logging::MemorySink;
    use crate::phase::Phase;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::time::Duration;

    #[test]
    fn logs_signals_by_name_and_honours_toggles() {
        let sink = MemorySink::new();
        let mut monitor = SignalLoggerMonitor::new(Logger::new(sink.clone())).log_keys(false);
        let checks = SystemChecks::default();
        let mut ctx = MonitorContext::new(Phase::InExam, &checks);

        for signal in [
            SignalEvent::FocusLost,
            SignalEvent::Key(KeyEvent::new(KeyCode::F(12), KeyModifiers::NONE)),
            SignalEvent::Tick {
                elapsed: Duration::from_millis(16),
            },
            SignalEvent::Visibility { hidden: true },
        ] {
            assert_eq!(monitor.on_signal(&mut ctx, &signal).unwrap(), SignalFlow::Continue);
        }

        assert_eq!(
            sink.messages(),
            vec!["signal.focus_lost".to_string(), "signal.visibility".to_string()]
        );
    }

    #[test]
    fn secure_edges_are_logged() {
        let sink = MemorySink::new();
        let mut monitor = SignalLoggerMonitor::new(Logger::new(sink.clone()));
        let checks = SystemChecks::default();
        let mut ctx = MonitorContext::new(Phase::Verification, &checks);

        monitor.on_secure_enter(&mut ctx).unwrap();
        monitor.on_secure_exit(&mut ctx).unwrap();

        let events = sink.events();
        assert_eq!(events[0].message, "secure.enter");
        assert_eq!(events[1].message, "secure.exit");
        assert_eq!(events[0].target, "vigil::monitor.diagnostics");
    }
}
