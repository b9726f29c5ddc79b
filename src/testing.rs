//! In-memory fakes shared by the unit tests. Clones share state so a test can
//! hand one copy to the runtime and inspect the other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ExamConfig;
use crate::host::{AuditRecord, ExitReason, SessionHost};
use crate::monitor::{HeartbeatProbe, ProbeOutcome, SignalKind, SignalSource};
use crate::resources::{
    AcquireOutcome, FullscreenApi, MediaBackend, MediaConstraints, ResourceHandle,
};
use crate::violation::{SecurityViolation, Severity};

fn lock<T>(inner: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct MediaLog {
    pub user_media_constraints: Vec<MediaConstraints>,
    pub display_requests: usize,
    pub fullscreen_requests: Vec<FullscreenApi>,
    pub fullscreen_exits: Vec<FullscreenApi>,
    pub previews: Vec<ResourceHandle>,
    pub stopped: Vec<ResourceHandle>,
}

#[derive(Default)]
struct MediaState {
    camera: Option<AcquireOutcome>,
    display: Option<AcquireOutcome>,
    fullscreen: HashMap<FullscreenApi, AcquireOutcome>,
    is_fullscreen: bool,
    next_id: usize,
    log: MediaLog,
}

impl MediaState {
    fn grant(&mut self, prefix: &str) -> AcquireOutcome {
        self.next_id += 1;
        AcquireOutcome::Ready(Ok(ResourceHandle::new(format!("{prefix}-{}", self.next_id))))
    }
}

/// Scripted media backend. Anything not scripted is granted at once.
#[derive(Clone, Default)]
pub struct FakeMedia {
    inner: Arc<Mutex<MediaState>>,
}

impl FakeMedia {
    pub fn granting() -> Self {
        Self::default()
    }

    pub fn camera(self, outcome: AcquireOutcome) -> Self {
        lock(&self.inner).camera = Some(outcome);
        self
    }

    pub fn display(self, outcome: AcquireOutcome) -> Self {
        lock(&self.inner).display = Some(outcome);
        self
    }

    pub fn fullscreen_api(self, api: FullscreenApi, outcome: AcquireOutcome) -> Self {
        lock(&self.inner).fullscreen.insert(api, outcome);
        self
    }

    pub fn set_fullscreen(&self, active: bool) {
        lock(&self.inner).is_fullscreen = active;
    }

    pub fn snapshot(&self) -> MediaLog {
        lock(&self.inner).log.clone()
    }
}

impl MediaBackend for FakeMedia {
    fn request_user_media(&mut self, constraints: &MediaConstraints) -> AcquireOutcome {
        let mut state = lock(&self.inner);
        state.log.user_media_constraints.push(constraints.clone());
        match state.camera.clone() {
            Some(outcome) => outcome,
            None => state.grant("camera"),
        }
    }

    fn request_display_media(&mut self) -> AcquireOutcome {
        let mut state = lock(&self.inner);
        state.log.display_requests += 1;
        match state.display.clone() {
            Some(outcome) => outcome,
            None => state.grant("screen"),
        }
    }

    fn request_fullscreen(&mut self, api: FullscreenApi) -> AcquireOutcome {
        let mut state = lock(&self.inner);
        state.log.fullscreen_requests.push(api);
        let outcome = match state.fullscreen.get(&api).cloned() {
            Some(outcome) => outcome,
            None => state.grant("fullscreen"),
        };
        if matches!(outcome, AcquireOutcome::Ready(Ok(_))) {
            state.is_fullscreen = true;
        }
        outcome
    }

    fn bind_preview(&mut self, stream: &ResourceHandle) {
        lock(&self.inner).log.previews.push(stream.clone());
    }

    fn stop_tracks(&mut self, stream: &ResourceHandle) {
        lock(&self.inner).log.stopped.push(stream.clone());
    }

    fn exit_fullscreen(&mut self, api: FullscreenApi) {
        let mut state = lock(&self.inner);
        state.is_fullscreen = false;
        state.log.fullscreen_exits.push(api);
    }

    fn is_fullscreen(&self) -> bool {
        lock(&self.inner).is_fullscreen
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostLog {
    pub reports: Vec<(String, Severity)>,
    pub audits: Vec<AuditRecord>,
    pub exits: Vec<ExitReason>,
    pub begun: Vec<ExamConfig>,
    pub setup_failures: Vec<SecurityViolation>,
}

#[derive(Clone, Default)]
pub struct RecordingHost {
    inner: Arc<Mutex<HostLog>>,
}

impl RecordingHost {
    pub fn snapshot(&self) -> HostLog {
        lock(&self.inner).clone()
    }
}

impl SessionHost for RecordingHost {
    fn report_violation(&mut self, description: &str, severity: Severity) {
        lock(&self.inner)
            .reports
            .push((description.to_string(), severity));
    }

    fn record_audit(&mut self, record: &AuditRecord) {
        lock(&self.inner).audits.push(record.clone());
    }

    fn exit_secure_mode(&mut self, reason: &ExitReason) {
        lock(&self.inner).exits.push(reason.clone());
    }

    fn begin_exam(&mut self, exam: &ExamConfig) {
        lock(&self.inner).begun.push(exam.clone());
    }

    fn setup_failed(&mut self, violation: &SecurityViolation) {
        lock(&self.inner).setup_failures.push(violation.clone());
    }
}

struct ProbeState {
    online: bool,
    queued: VecDeque<ProbeOutcome>,
    calls: usize,
}

/// Heartbeat probe that answers from a queue, then succeeds.
#[derive(Clone)]
pub struct FakeProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl FakeProbe {
    fn with_online(online: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProbeState {
                online,
                queued: VecDeque::new(),
                calls: 0,
            })),
        }
    }

    pub fn healthy() -> Self {
        Self::with_online(true)
    }

    pub fn offline() -> Self {
        Self::with_online(false)
    }

    pub fn push(&self, outcome: ProbeOutcome) {
        lock(&self.inner).queued.push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        lock(&self.inner).calls
    }
}

impl HeartbeatProbe for FakeProbe {
    fn probe(&mut self) -> ProbeOutcome {
        let mut state = lock(&self.inner);
        state.calls += 1;
        state
            .queued
            .pop_front()
            .unwrap_or(ProbeOutcome::Ready(Ok(())))
    }

    fn is_online(&self) -> bool {
        lock(&self.inner).online
    }
}

#[derive(Default)]
struct SignalLog {
    attached: Vec<SignalKind>,
    detached: Vec<SignalKind>,
}

#[derive(Clone, Default)]
pub struct RecordingSignals {
    inner: Arc<Mutex<SignalLog>>,
}

impl RecordingSignals {
    pub fn attached(&self) -> Vec<SignalKind> {
        lock(&self.inner).attached.clone()
    }

    pub fn detached(&self) -> Vec<SignalKind> {
        lock(&self.inner).detached.clone()
    }
}

impl SignalSource for RecordingSignals {
    fn attach(&mut self, kind: SignalKind) {
        lock(&self.inner).attached.push(kind);
    }

    fn detach(&mut self, kind: SignalKind) {
        lock(&self.inner).detached.push(kind);
    }
}
