//! The proctoring coordinator.
//!
//! `ProctorRuntime` owns the phase machine, the resource manager, the
//! registered monitors, the violation log, the timer scheduler and the
//! termination controller. Everything runs on the caller's thread: platform
//! signals enter through [`ProctorRuntime::dispatch`], each monitor sees the
//! signal in priority order, and the effects it queued are applied before the
//! next monitor runs.

use std::sync::Arc;

use serde_json::json;

use crate::checks::SystemChecks;
use crate::config::{ExamConfig, ProctorConfig};
use crate::host::{AuditRecord, ExitReason, SessionHost, SessionMetadata};
use crate::logging::{LogLevel, emit, json_kv};
use crate::metrics::{MetricSnapshot, SessionMetrics};
use crate::monitor::{
    CheckUpdate, Monitor, MonitorContext, MonitorOutcome, SignalEvent, SignalFlow, SignalKind,
    SignalSource, SubscriptionTable, TimerCommand,
};
use crate::phase::{Phase, PhaseChange, PhaseStateMachine, PhaseTrigger};
use crate::resources::{Acquisition, MediaBackend, ResourceLifecycleManager, SetupProgress};
use crate::violation::{SecurityViolation, ViolationCounts, ViolationLog};
use crate::{ProctorError, Result};

pub mod audit;
pub mod bundles;
pub mod driver;
pub mod registry;
pub mod scheduler;
pub mod termination;

use audit::{NullSessionAudit, SessionAudit, SessionAuditEventBuilder, SessionAuditStage};
use bundles::MonitorBundle;
use registry::SharedSessionRegistry;
use scheduler::{Scheduler, TimerKey};
use termination::{
    FatalityPolicy, Teardown, TerminationController, TerminationOutcome, TerminationState,
};

const TARGET: &str = "vigil::runtime";

struct MonitorEntry {
    priority: i32,
    monitor: Box<dyn Monitor>,
}

pub struct ProctorRuntime {
    config: ProctorConfig,
    exam: ExamConfig,
    session_id: String,
    metadata: SessionMetadata,
    registry: Option<SharedSessionRegistry>,
    phase: PhaseStateMachine,
    checks: SystemChecks,
    log: ViolationLog,
    resources: ResourceLifecycleManager,
    monitors: Vec<MonitorEntry>,
    subscriptions: SubscriptionTable,
    scheduler: Scheduler,
    termination: TerminationController,
    fatality: FatalityPolicy,
    host: Box<dyn SessionHost>,
    audit: Arc<dyn SessionAudit>,
    metrics: SessionMetrics,
}

impl ProctorRuntime {
    pub fn new<B, H>(config: ProctorConfig, exam: ExamConfig, backend: B, host: H) -> Self
    where
        B: MediaBackend + 'static,
        H: SessionHost + 'static,
    {
        let logger = config.logger.clone();
        let resources = ResourceLifecycleManager::new(
            backend,
            config.camera.clone(),
            config.fullscreen_apis.clone(),
        )
        .with_logger(logger.clone());

        let runtime = Self {
            session_id: format!("session-{}", exam.attempt_id),
            exam,
            metadata: SessionMetadata::default(),
            registry: None,
            phase: PhaseStateMachine::new().with_logger(logger.clone()),
            checks: SystemChecks::default(),
            log: ViolationLog::new(),
            resources,
            monitors: Vec::new(),
            subscriptions: SubscriptionTable::default().with_logger(logger.clone()),
            scheduler: Scheduler::new(),
            termination: TerminationController::new().with_logger(logger),
            fatality: FatalityPolicy::default(),
            host: Box::new(host),
            audit: Arc::new(NullSessionAudit),
            metrics: SessionMetrics::new(),
            config,
        };
        runtime.log_runtime_event(
            LogLevel::Info,
            "runtime_constructed",
            [json_kv("session", json!(runtime.session_id))],
        );
        runtime
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Share an active-session registry with other runtimes.
    pub fn with_registry(mut self, registry: SharedSessionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_signal_source<S>(mut self, source: S) -> Self
    where
        S: SignalSource + 'static,
    {
        self.subscriptions.set_source(source);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn SessionAudit>) -> Self {
        self.audit = audit;
        self.audit_stage(SessionAuditStage::RuntimeConstructed, |b| {
            b.detail("session", json!(self.session_id));
        });
        self
    }

    pub fn with_fatality_policy(mut self, policy: FatalityPolicy) -> Self {
        self.fatality = policy;
        self
    }

    pub fn register_monitor<M>(&mut self, monitor: M) -> Result<()>
    where
        M: Monitor + 'static,
    {
        self.register_boxed(Box::new(monitor), 0)
    }

    /// Lower priorities see signals first. Equal priorities keep registration order.
    pub fn register_monitor_with_priority<M>(&mut self, monitor: M, priority: i32) -> Result<()>
    where
        M: Monitor + 'static,
    {
        self.register_boxed(Box::new(monitor), priority)
    }

    pub fn register_bundle(&mut self, bundle: MonitorBundle) -> Result<()> {
        for (priority, monitor) in bundle.into_entries() {
            self.register_boxed(monitor, priority)?;
        }
        Ok(())
    }

    /// A monitor joining a secure session is attached and entered at once.
    fn register_boxed(&mut self, monitor: Box<dyn Monitor>, priority: i32) -> Result<()> {
        let name = monitor.name().to_string();
        let secure = self.phase.is_secure();
        if secure {
            self.subscriptions.attach_all(monitor.subscriptions());
        }
        let position = self
            .monitors
            .iter()
            .position(|entry| entry.priority > priority)
            .unwrap_or(self.monitors.len());
        self.monitors.insert(position, MonitorEntry { priority, monitor });
        self.audit_stage(SessionAuditStage::MonitorRegistered, |b| {
            b.detail("monitor", json!(name)).detail("priority", json!(priority));
        });
        if secure {
            self.call_monitor(position, |monitor, ctx| monitor.on_secure_enter(ctx))?;
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase.current()
    }

    pub fn is_secure(&self) -> bool {
        self.phase.is_secure()
    }

    pub fn phase_history(&self) -> &[PhaseChange] {
        self.phase.history()
    }

    pub fn checks(&self) -> &SystemChecks {
        &self.checks
    }

    pub fn violations(&self) -> &ViolationLog {
        &self.log
    }

    /// Aggregate counter shown during the session.
    pub fn counts(&self) -> ViolationCounts {
        self.log.counts()
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    pub fn resources(&self) -> &ResourceLifecycleManager {
        &self.resources
    }

    pub fn termination_state(&self) -> TerminationState {
        self.termination.state()
    }

    pub fn exit_reason(&self) -> Option<&ExitReason> {
        self.termination.reason()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn exam(&self) -> &ExamConfig {
        &self.exam
    }

    pub fn monitor_names(&self) -> Vec<&str> {
        self.monitors.iter().map(|e| e.monitor.name()).collect()
    }

    pub fn metrics_snapshot(&self) -> MetricSnapshot {
        self.metrics.snapshot(self.scheduler.now())
    }

    /// Agreement -> Setup, then start acquiring resources. Returns the phase
    /// reached once every immediate answer has been processed.
    pub fn accept_agreement(&mut self, accepted: bool) -> Result<Phase> {
        if !accepted {
            return Err(ProctorError::AgreementNotAccepted);
        }
        if self.phase.current().is_closed() {
            self.transition(PhaseTrigger::Restarted)?;
        }
        if !self.phase.can_fire(PhaseTrigger::AgreementAccepted) {
            return Err(ProctorError::GuardFailed(format!(
                "cannot accept the agreement in {}",
                self.phase.current()
            )));
        }
        if let Some(registry) = self.registry.as_ref() {
            registry.claim(self.session_id.clone(), self.exam.attempt_id.clone())?;
        }

        self.transition(PhaseTrigger::AgreementAccepted)?;
        self.begin_setup()?;
        Ok(self.phase.current())
    }

    /// Verification -> InExam once camera and network are ready.
    pub fn confirm_start(&mut self) -> Result<Phase> {
        if self.phase.current() != Phase::Verification {
            return Err(ProctorError::GuardFailed(format!(
                "exam can only start from Verification, not {}",
                self.phase.current()
            )));
        }
        if !self.checks.ready_for_exam() {
            return Err(ProctorError::GuardFailed(format!(
                "system checks failing: {}",
                self.checks.missing_for_exam().join(", ")
            )));
        }
        self.transition(PhaseTrigger::ExamStarted)?;
        self.host.begin_exam(&self.exam);
        Ok(self.phase.current())
    }

    /// Deliver one platform signal. Returns `Suppress` when any monitor asked
    /// for the default action to be cancelled.
    pub fn dispatch(&mut self, signal: SignalEvent) -> Result<SignalFlow> {
        self.metrics.record_signal();

        if let Some(kind) = signal.kind() {
            if !self.subscriptions.is_attached(kind) {
                self.metrics.record_dropped();
                self.log_runtime_event(
                    LogLevel::Trace,
                    "signal_dropped",
                    [json_kv("signal", json!(signal.describe()))],
                );
                return Ok(SignalFlow::Continue);
            }
        }

        let flow = self.propagate(&signal)?;

        match &signal {
            SignalEvent::Tick { elapsed } => {
                for key in self.scheduler.advance(*elapsed) {
                    if self.phase.current().is_closed() {
                        break;
                    }
                    self.fire_timer(key)?;
                }
            }
            SignalEvent::Resolved { kind, result } => {
                let acquisition = self.resources.resolve(*kind, result.clone(), &mut self.checks);
                if !self.settle_acquisition(acquisition)? {
                    self.advance_setup()?;
                }
            }
            _ => {}
        }

        self.log_runtime_event(
            LogLevel::Debug,
            "signal_dispatched",
            [
                json_kv("signal", json!(signal.describe())),
                json_kv("suppressed", json!(flow == SignalFlow::Suppress)),
            ],
        );
        Ok(flow)
    }

    pub fn run_scripted<I>(&mut self, signals: I) -> Result<()>
    where
        I: IntoIterator<Item = SignalEvent>,
    {
        for signal in signals {
            self.dispatch(signal)?;
            if self.phase.current().is_closed() {
                break;
            }
        }
        Ok(())
    }

    /// Operator abort or any other direct termination.
    pub fn terminate(&mut self, reason: ExitReason) -> Result<TerminationOutcome> {
        self.terminate_with(PhaseTrigger::Terminated, Some(reason))
    }

    /// The user backs out before the exam starts.
    pub fn cancel(&mut self) -> Result<TerminationOutcome> {
        match self.phase.current() {
            Phase::InExam => Err(ProctorError::GuardFailed(
                "the exam has started; complete or terminate it instead".into(),
            )),
            Phase::Closed => Ok(TerminationOutcome::Ignored),
            _ => self.terminate_with(PhaseTrigger::Cancelled, Some(ExitReason::Cancelled)),
        }
    }

    /// Normal end of the exam.
    pub fn complete(&mut self) -> Result<TerminationOutcome> {
        match self.phase.current() {
            Phase::InExam => {
                self.terminate_with(PhaseTrigger::Completed, Some(ExitReason::Completed))
            }
            Phase::Closed => Ok(TerminationOutcome::Ignored),
            other => Err(ProctorError::GuardFailed(format!(
                "cannot complete an exam from {other}"
            ))),
        }
    }

    /// Unmount. Detaches and releases unconditionally without signalling the host.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.termination.begin() {
            self.close_phase(PhaseTrigger::Terminated)?;
            self.run_teardown(None);
        } else {
            self.scheduler.cancel_all();
            self.subscriptions.detach_all();
            self.resources.release(&mut self.checks);
            self.checks.clear();
        }
        self.audit_stage(SessionAuditStage::RuntimeShutdown, |b| {
            b.detail("uptime_ms", json!(self.scheduler.now().as_millis() as u64));
        });
        self.log_runtime_event(LogLevel::Info, "runtime_shutdown", std::iter::empty());
        Ok(())
    }

    fn terminate_with(
        &mut self,
        trigger: PhaseTrigger,
        reason: Option<ExitReason>,
    ) -> Result<TerminationOutcome> {
        if !self.termination.begin() {
            return Ok(TerminationOutcome::Ignored);
        }
        self.audit_stage(SessionAuditStage::TerminationStarted, |b| {
            b.detail("trigger", json!(trigger.to_string()));
        });
        self.close_phase(trigger)?;
        Ok(self.run_teardown(reason))
    }

    fn close_phase(&mut self, trigger: PhaseTrigger) -> Result<()> {
        if self.phase.current().is_closed() {
            return Ok(());
        }
        let trigger = if self.phase.can_fire(trigger) {
            trigger
        } else {
            PhaseTrigger::Terminated
        };
        let change = self.transition(trigger)?;
        if change.exited_secure_mode() {
            for idx in 0..self.monitors.len() {
                self.call_monitor(idx, |monitor, ctx| monitor.on_secure_exit(ctx))?;
            }
        }
        Ok(())
    }

    fn run_teardown(&mut self, reason: Option<ExitReason>) -> TerminationOutcome {
        let outcome = self.termination.run(
            Teardown {
                scheduler: &mut self.scheduler,
                subscriptions: &mut self.subscriptions,
                resources: &mut self.resources,
                checks: &mut self.checks,
                host: self.host.as_mut(),
            },
            reason,
        );
        if let TerminationOutcome::Completed(report) = &outcome {
            self.metrics.record_termination();
            self.release_registry();
            self.audit_stage(SessionAuditStage::SecureModeExited, |b| {
                b.detail("listeners_detached", json!(report.listeners_detached));
            });
            self.audit_stage(SessionAuditStage::TerminationCompleted, |b| {
                b.detail("exit_sent", json!(report.exit_sent))
                    .detail("streams_stopped", json!(report.release.streams_stopped));
            });
        }
        outcome
    }

    fn begin_setup(&mut self) -> Result<()> {
        self.log.clear();
        self.resources.reset(&mut self.checks);
        self.checks.clear();
        self.checks.battery_level = true;
        self.termination.reset();

        for idx in 0..self.monitors.len() {
            self.call_monitor(idx, |monitor, ctx| monitor.on_session_start(ctx))?;
        }

        if !self.config.setup_timeout.is_zero() {
            self.scheduler
                .schedule_once(TimerKey::SETUP_TIMEOUT, self.config.setup_timeout);
        }

        let camera = self.resources.acquire_camera(&mut self.checks);
        if self.settle_acquisition(camera)? {
            return Ok(());
        }
        let fullscreen = self.resources.acquire_fullscreen(&mut self.checks);
        if self.settle_acquisition(fullscreen)? {
            return Ok(());
        }
        let screen = self.resources.acquire_screen_share(&mut self.checks);
        if self.settle_acquisition(screen)? {
            return Ok(());
        }
        self.advance_setup()
    }

    /// Record a failed acquisition. Returns true when it aborted Setup.
    fn settle_acquisition(&mut self, acquisition: Acquisition) -> Result<bool> {
        match acquisition {
            Acquisition::Failed {
                kind, violation, ..
            } => {
                self.record_violation(violation.clone())?;
                if kind.is_required() && self.phase.current() == Phase::Setup {
                    self.fail_setup(violation)?;
                    return Ok(true);
                }
            }
            Acquisition::Stale(kind) => {
                self.log_runtime_event(
                    LogLevel::Debug,
                    "stale_resolution",
                    [json_kv("resource", json!(kind.name()))],
                );
            }
            Acquisition::Granted(_) | Acquisition::Pending(_) => {}
        }
        Ok(false)
    }

    fn advance_setup(&mut self) -> Result<()> {
        if self.phase.current() != Phase::Setup {
            return Ok(());
        }
        match self.resources.progress() {
            SetupProgress::Ready => self.enter_verification(),
            SetupProgress::Failed => {
                let violation = self
                    .log
                    .entries()
                    .iter()
                    .rev()
                    .find(|v| v.is_critical())
                    .cloned();
                match violation {
                    Some(violation) => self.fail_setup(violation),
                    None => Ok(()),
                }
            }
            SetupProgress::Pending | SetupProgress::Idle => Ok(()),
        }
    }

    fn enter_verification(&mut self) -> Result<()> {
        self.scheduler.cancel(TimerKey::SETUP_TIMEOUT);
        self.transition(PhaseTrigger::SetupSucceeded)?;

        let kinds: Vec<SignalKind> = self
            .monitors
            .iter()
            .flat_map(|entry| entry.monitor.subscriptions())
            .collect();
        let attached = self.subscriptions.attach_all(kinds);
        self.scheduler
            .schedule_every(TimerKey::METRICS, self.config.metrics_interval);
        self.audit_stage(SessionAuditStage::SecureModeEntered, |b| {
            b.detail("listeners_attached", json!(attached));
        });

        for idx in 0..self.monitors.len() {
            self.call_monitor(idx, |monitor, ctx| monitor.on_secure_enter(ctx))?;
            if !self.phase.is_secure() {
                break;
            }
        }
        Ok(())
    }

    fn fail_setup(&mut self, violation: SecurityViolation) -> Result<()> {
        self.scheduler.cancel_all();
        self.resources.release(&mut self.checks);
        self.checks.clear();
        self.transition(PhaseTrigger::SetupFailed)?;
        self.release_registry();
        self.host.setup_failed(&violation);
        self.audit_stage(SessionAuditStage::SetupFailed, |b| {
            b.detail("violation", json!(violation.kind().id()));
        });
        Ok(())
    }

    fn fire_timer(&mut self, key: TimerKey) -> Result<()> {
        if key == TimerKey::SETUP_TIMEOUT {
            return self.expire_setup();
        }
        if key == TimerKey::METRICS {
            self.emit_metrics();
        }
        for idx in 0..self.monitors.len() {
            self.call_monitor(idx, |monitor, ctx| monitor.on_timer(ctx, key))?;
            if self.phase.current().is_closed() {
                break;
            }
        }
        Ok(())
    }

    fn expire_setup(&mut self) -> Result<()> {
        if self.phase.current() != Phase::Setup {
            return Ok(());
        }
        self.log_runtime_event(LogLevel::Warn, "setup_timed_out", std::iter::empty());
        let mut fatal = None;
        for acquisition in self.resources.expire_pending() {
            if let Acquisition::Failed {
                kind, violation, ..
            } = acquisition
            {
                self.record_violation(violation.clone())?;
                if kind.is_required() && fatal.is_none() {
                    fatal = Some(violation);
                }
            }
        }
        match fatal {
            Some(violation) => self.fail_setup(violation),
            None => self.advance_setup(),
        }
    }

    fn propagate(&mut self, signal: &SignalEvent) -> Result<SignalFlow> {
        let mut flow = SignalFlow::Continue;
        for idx in 0..self.monitors.len() {
            if self.phase.current().is_closed() && signal.kind().is_some() {
                break;
            }
            if self.call_monitor(idx, |monitor, ctx| monitor.on_signal(ctx, signal))?
                == SignalFlow::Suppress
            {
                flow = SignalFlow::Suppress;
            }
        }
        Ok(flow)
    }

    fn call_monitor<T>(
        &mut self,
        idx: usize,
        f: impl FnOnce(&mut dyn Monitor, &mut MonitorContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let checks = self.checks;
        let mut ctx = MonitorContext::new(self.phase.current(), &checks);
        let value = f(self.monitors[idx].monitor.as_mut(), &mut ctx)?;
        let outcome = ctx.into_outcome();
        self.apply_outcome(outcome)?;
        Ok(value)
    }

    fn apply_outcome(&mut self, outcome: MonitorOutcome) -> Result<()> {
        for command in outcome.timers {
            match command {
                TimerCommand::Once(key, after) => self.scheduler.schedule_once(key, after),
                TimerCommand::Every(key, every) => self.scheduler.schedule_every(key, every),
                TimerCommand::Cancel(key) => {
                    self.scheduler.cancel(key);
                }
            }
        }
        let closed = self.phase.current().is_closed();
        for update in outcome.check_updates.into_iter().filter(|_| !closed) {
            match update {
                CheckUpdate::NetworkStable(value) => self.checks.network_stable = value,
                CheckUpdate::BatteryLevel(value) => self.checks.battery_level = value,
                CheckUpdate::NoOtherApps(value) => self.checks.no_other_apps = value,
                CheckUpdate::FullscreenLost => self.resources.note_fullscreen_lost(&mut self.checks),
            }
        }
        for ok in outcome.heartbeats {
            self.metrics.record_heartbeat(ok);
        }
        for violation in outcome.violations {
            if self.phase.current().is_closed() {
                break;
            }
            self.record_violation(violation)?;
        }
        Ok(())
    }

    /// Append to the log, report to the host and terminate if fatal.
    fn record_violation(&mut self, violation: SecurityViolation) -> Result<()> {
        let critical = violation.is_critical();
        self.log.push(violation.clone());
        self.metrics.record_violation(critical);
        self.host
            .report_violation(violation.description(), violation.severity());
        self.host
            .record_audit(&AuditRecord::new(self.metadata.clone(), violation.clone()));

        self.log_runtime_event(
            if critical { LogLevel::Error } else { LogLevel::Warn },
            "violation_recorded",
            [
                json_kv("type", json!(violation.kind().id())),
                json_kv("severity", json!(violation.severity().to_string())),
                json_kv("description", json!(violation.description())),
                json_kv("phase", json!(self.phase.current().to_string())),
            ],
        );
        self.audit_stage(SessionAuditStage::ViolationRecorded, |b| {
            b.detail("type", json!(violation.kind().id()))
                .detail("severity", json!(violation.severity().to_string()));
        });

        if self.phase.is_secure() && self.fatality.is_fatal(&violation) {
            self.terminate_with(
                PhaseTrigger::Terminated,
                Some(ExitReason::Violation { violation }),
            )?;
        }
        Ok(())
    }

    fn transition(&mut self, trigger: PhaseTrigger) -> Result<PhaseChange> {
        let change = self.phase.fire(trigger)?;
        self.audit_stage(SessionAuditStage::PhaseChanged, |b| {
            b.detail("from", json!(change.from.to_string()))
                .detail("to", json!(change.to.to_string()))
                .detail("trigger", json!(trigger.to_string()));
        });
        Ok(change)
    }

    fn release_registry(&mut self) {
        if let Some(registry) = self.registry.as_ref() {
            registry.release(&self.session_id);
        }
    }

    fn emit_metrics(&self) {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = self.metrics_snapshot().to_log_event("vigil::metrics");
            let _ = logger.log_event(event);
        }
    }

    fn audit_stage(&self, stage: SessionAuditStage, fill: impl FnOnce(&mut SessionAuditEventBuilder)) {
        let mut builder = SessionAuditEventBuilder::new(stage);
        fill(&mut builder);
        self.audit.record(builder.finish());
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        emit(self.config.logger.as_ref(), level, TARGET, message, fields);
    }
}
