use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Running counters for a proctoring runtime.
#[derive(Debug, Default, Clone)]
pub struct SessionMetrics {
    signals: u64,
    dropped_signals: u64,
    warnings: u64,
    criticals: u64,
    heartbeats_ok: u64,
    heartbeats_failed: u64,
    terminations: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_signal(&mut self) {
        self.signals = self.signals.saturating_add(1);
    }

    /// A signal arrived for a kind with no attached listener.
    pub fn record_dropped(&mut self) {
        self.dropped_signals = self.dropped_signals.saturating_add(1);
    }

    pub fn record_violation(&mut self, critical: bool) {
        if critical {
            self.criticals = self.criticals.saturating_add(1);
        } else {
            self.warnings = self.warnings.saturating_add(1);
        }
    }

    pub fn record_heartbeat(&mut self, ok: bool) {
        if ok {
            self.heartbeats_ok = self.heartbeats_ok.saturating_add(1);
        } else {
            self.heartbeats_failed = self.heartbeats_failed.saturating_add(1);
        }
    }

    pub fn record_termination(&mut self) {
        self.terminations = self.terminations.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            signals: self.signals,
            dropped_signals: self.dropped_signals,
            warnings: self.warnings,
            criticals: self.criticals,
            heartbeats_ok: self.heartbeats_ok,
            heartbeats_failed: self.heartbeats_failed,
            terminations: self.terminations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub signals: u64,
    pub dropped_signals: u64,
    pub warnings: u64,
    pub criticals: u64,
    pub heartbeats_ok: u64,
    pub heartbeats_failed: u64,
    pub terminations: u64,
}

impl MetricSnapshot {
    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("signals".to_string(), json!(self.signals));
        map.insert("dropped_signals".to_string(), json!(self.dropped_signals));
        map.insert("warnings".to_string(), json!(self.warnings));
        map.insert("criticals".to_string(), json!(self.criticals));
        map.insert("heartbeats_ok".to_string(), json!(self.heartbeats_ok));
        map.insert("heartbeats_failed".to_string(), json!(self.heartbeats_failed));
        map.insert("terminations".to_string(), json!(self.terminations));
        map
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "session_metrics", self.as_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_split_by_severity() {
        let mut metrics = SessionMetrics::new();
        metrics.record_violation(false);
        metrics.record_violation(false);
        metrics.record_violation(true);
        metrics.record_heartbeat(false);
        let snap = metrics.snapshot(Duration::from_millis(1500));
        assert_eq!(snap.warnings, 2);
        assert_eq!(snap.criticals, 1);
        assert_eq!(snap.heartbeats_failed, 1);
        assert_eq!(snap.uptime_ms, 1500);
    }

    #[test]
    fn snapshot_event_carries_fields() {
        let mut metrics = SessionMetrics::new();
        metrics.record_signal();
        let event = metrics.snapshot(Duration::ZERO).to_log_event("vigil::metrics");
        assert_eq!(event.message, "session_metrics");
        assert_eq!(event.field("signals"), Some(&json!(1)));
    }
}
