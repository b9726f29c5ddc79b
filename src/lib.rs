//! Secure-session monitor for proctored browser exams.
//!
//! A session walks Agreement -> Setup -> Verification -> InExam and ends in
//! Closed. Setup acquires the camera, fullscreen and (optionally) a screen
//! share; the secure phases attach platform listeners and classify what they
//! observe into violations. Critical violations tear the session down through
//! a single termination path.

pub mod checks;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod phase;
pub mod resources;
pub mod runtime;
pub mod violation;

#[cfg(test)]
pub(crate) mod testing;

pub use checks::SystemChecks;
pub use config::{ExamConfig, ProctorConfig};
pub use error::{ProctorError, Result};
pub use host::{AuditRecord, ExitReason, NullHost, SessionHost, SessionMetadata};
pub use logging::{FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, MemorySink};
pub use metrics::{MetricSnapshot, SessionMetrics};
pub use monitor::{
    BatteryMonitor, BatteryProbe, BatteryStatus, HeartbeatMonitor, HeartbeatProbe, Monitor,
    MonitorContext, ProbeFailure, ProbeOutcome, SignalEvent, SignalFlow, SignalKind,
    SignalLoggerMonitor, SignalSource, SubscriptionTable, ViolationMonitor, probe_battery,
};
pub use phase::{Phase, PhaseChange, PhaseStateMachine, PhaseTrigger};
pub use resources::{
    AcquireError, AcquireOutcome, Acquisition, FullscreenApi, MediaBackend, MediaConstraints,
    ResourceHandle, ResourceKind, ResourceLifecycleManager, SetupProgress,
};
pub use runtime::ProctorRuntime;
pub use runtime::audit::{
    MemorySessionAudit, NullSessionAudit, SessionAudit, SessionAuditEvent,
    SessionAuditEventBuilder, SessionAuditStage,
};
pub use runtime::bundles::{DefaultBundleConfig, DiagnosticsConfig, MonitorBundle, default_monitor_bundle};
pub use runtime::driver::socket::{
    JsonSignalStrategy, Outbox, OutboundFrame, SocketDriver, SocketDriverError, SocketStrategy,
};
pub use runtime::registry::{ActiveSession, ActiveSessionRegistry, SharedSessionRegistry};
pub use runtime::scheduler::{Scheduler, TimerKey};
pub use runtime::termination::{FatalityPolicy, TerminationOutcome, TerminationState};
pub use violation::keys::BlockedKeys;
pub use violation::{SecurityViolation, Severity, ViolationCounts, ViolationKind, ViolationLog};
