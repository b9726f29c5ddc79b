//! Ownership of the monitored resources: the camera+microphone stream, the
//! optional screen-share stream and the fullscreen lock.
//!
//! Requests go through a [`MediaBackend`]. A backend answers either at once
//! (`AcquireOutcome::Ready`) or later through
//! [`ResourceLifecycleManager::resolve`] when the platform prompt settles.
//! Nothing here returns a crate error: failures become
//! [`Acquisition::Failed`] carrying the violation to record.

mod backend;

use std::collections::HashMap;

use serde_json::json;

use crate::checks::SystemChecks;
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::violation::{SecurityViolation, ViolationKind};

pub use backend::{
    AcquireError, AcquireOutcome, FullscreenApi, MediaBackend, MediaConstraints, ResourceHandle,
};

const TARGET: &str = "vigil::resources";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Camera,
    ScreenShare,
    Fullscreen,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Camera => "camera",
            ResourceKind::ScreenShare => "screen-share",
            ResourceKind::Fullscreen => "fullscreen",
        }
    }

    /// Whether failure of this resource aborts Setup.
    pub fn is_required(&self) -> bool {
        !matches!(self, ResourceKind::ScreenShare)
    }

    fn failure_kind(&self) -> ViolationKind {
        match self {
            ResourceKind::Camera => ViolationKind::CameraDenied,
            ResourceKind::ScreenShare => ViolationKind::ScreenShareOptional,
            ResourceKind::Fullscreen => ViolationKind::FullscreenDenied,
        }
    }
}

/// A resource held by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredResource {
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
    pub active: bool,
    fullscreen_api: Option<FullscreenApi>,
}

/// Result of a single acquisition step.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Granted(ResourceKind),
    Pending(ResourceKind),
    Failed {
        kind: ResourceKind,
        error: AcquireError,
        violation: SecurityViolation,
    },
    /// A resolution arrived for a request that is no longer wanted.
    Stale(ResourceKind),
}

impl Acquisition {
    pub fn is_fatal_to_setup(&self) -> bool {
        matches!(self, Acquisition::Failed { kind, .. } if kind.is_required())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RequestState {
    Pending,
    Granted,
    Failed,
}

/// Aggregate state of the Setup acquisitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupProgress {
    /// Nothing has been requested yet.
    Idle,
    /// At least one request is still waiting on the platform.
    Pending,
    /// Camera and fullscreen are held; screen share has settled either way.
    Ready,
    /// A required resource failed.
    Failed,
}

/// Work performed by one [`ResourceLifecycleManager::release`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub streams_stopped: usize,
    pub fullscreen_exited: bool,
    pub pending_cancelled: usize,
}

impl ReleaseReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

pub struct ResourceLifecycleManager {
    backend: Box<dyn MediaBackend>,
    constraints: MediaConstraints,
    fullscreen_apis: Vec<FullscreenApi>,
    fullscreen_cursor: usize,
    requests: HashMap<ResourceKind, RequestState>,
    resources: Vec<MonitoredResource>,
    logger: Option<Logger>,
}

impl ResourceLifecycleManager {
    pub fn new<B>(backend: B, constraints: MediaConstraints, fullscreen_apis: Vec<FullscreenApi>) -> Self
    where
        B: MediaBackend + 'static,
    {
        Self {
            backend: Box::new(backend),
            constraints,
            fullscreen_apis,
            fullscreen_cursor: 0,
            requests: HashMap::new(),
            resources: Vec::new(),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Request combined audio+video capture with the configured low-resolution constraints.
    pub fn acquire_camera(&mut self, checks: &mut SystemChecks) -> Acquisition {
        self.requests.insert(ResourceKind::Camera, RequestState::Pending);
        let outcome = self.backend.request_user_media(&self.constraints);
        self.settle(ResourceKind::Camera, outcome, checks)
    }

    /// Request screen capture. Failure only ever yields a warning.
    pub fn acquire_screen_share(&mut self, checks: &mut SystemChecks) -> Acquisition {
        self.requests
            .insert(ResourceKind::ScreenShare, RequestState::Pending);
        let outcome = self.backend.request_display_media();
        self.settle(ResourceKind::ScreenShare, outcome, checks)
    }

    /// Request fullscreen, walking the configured entry points until one is supported.
    pub fn acquire_fullscreen(&mut self, checks: &mut SystemChecks) -> Acquisition {
        self.requests
            .insert(ResourceKind::Fullscreen, RequestState::Pending);
        self.fullscreen_cursor = 0;
        self.try_fullscreen_from_cursor(checks)
    }

    fn try_fullscreen_from_cursor(&mut self, checks: &mut SystemChecks) -> Acquisition {
        while let Some(api) = self.fullscreen_apis.get(self.fullscreen_cursor).copied() {
            match self.backend.request_fullscreen(api) {
                AcquireOutcome::Ready(Err(AcquireError::Unsupported)) => {
                    emit(
                        self.logger.as_ref(),
                        LogLevel::Debug,
                        TARGET,
                        "fullscreen_api_unsupported",
                        [json_kv("api", json!(api.name()))],
                    );
                    self.fullscreen_cursor += 1;
                }
                other => return self.settle(ResourceKind::Fullscreen, other, checks),
            }
        }
        self.fail(ResourceKind::Fullscreen, AcquireError::Unsupported)
    }

    /// Deliver the answer to a request that previously returned `Pending`.
    pub fn resolve(
        &mut self,
        kind: ResourceKind,
        result: Result<ResourceHandle, AcquireError>,
        checks: &mut SystemChecks,
    ) -> Acquisition {
        if self.requests.get(&kind) != Some(&RequestState::Pending) {
            if let Ok(handle) = &result {
                self.discard_late(kind, handle);
            }
            return Acquisition::Stale(kind);
        }

        if kind == ResourceKind::Fullscreen && result == Err(AcquireError::Unsupported) {
            self.fullscreen_cursor += 1;
            return self.try_fullscreen_from_cursor(checks);
        }

        self.settle(kind, AcquireOutcome::Ready(result), checks)
    }

    fn settle(
        &mut self,
        kind: ResourceKind,
        outcome: AcquireOutcome,
        checks: &mut SystemChecks,
    ) -> Acquisition {
        match outcome {
            AcquireOutcome::Pending => {
                emit(
                    self.logger.as_ref(),
                    LogLevel::Debug,
                    TARGET,
                    "acquisition_pending",
                    [json_kv("resource", json!(kind.name()))],
                );
                Acquisition::Pending(kind)
            }
            AcquireOutcome::Ready(Ok(handle)) => {
                self.hold(kind, handle, checks);
                Acquisition::Granted(kind)
            }
            AcquireOutcome::Ready(Err(error)) => self.fail(kind, error),
        }
    }

    fn hold(&mut self, kind: ResourceKind, handle: ResourceHandle, checks: &mut SystemChecks) {
        let fullscreen_api = if kind == ResourceKind::Fullscreen {
            self.fullscreen_apis.get(self.fullscreen_cursor).copied()
        } else {
            None
        };

        match kind {
            ResourceKind::Camera => {
                self.backend.bind_preview(&handle);
                checks.camera = true;
                checks.microphone = self.constraints.audio;
            }
            ResourceKind::ScreenShare => checks.screen_share = true,
            ResourceKind::Fullscreen => checks.fullscreen = true,
        }

        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            TARGET,
            "resource_acquired",
            [
                json_kv("resource", json!(kind.name())),
                json_kv("handle", json!(handle.as_str())),
            ],
        );

        self.requests.insert(kind, RequestState::Granted);
        self.resources.push(MonitoredResource {
            kind,
            handle,
            active: true,
            fullscreen_api,
        });
    }

    fn fail(&mut self, kind: ResourceKind, error: AcquireError) -> Acquisition {
        self.requests.insert(kind, RequestState::Failed);
        let violation = SecurityViolation::with_detail(kind.failure_kind(), error.to_string());
        emit(
            self.logger.as_ref(),
            if kind.is_required() {
                LogLevel::Error
            } else {
                LogLevel::Warn
            },
            TARGET,
            "acquisition_failed",
            [
                json_kv("resource", json!(kind.name())),
                json_kv("error", json!(error.to_string())),
            ],
        );
        Acquisition::Failed {
            kind,
            error,
            violation,
        }
    }

    fn discard_late(&mut self, kind: ResourceKind, handle: &ResourceHandle) {
        match kind {
            ResourceKind::Fullscreen => {
                if self.backend.is_fullscreen() {
                    let api = self
                        .fullscreen_apis
                        .get(self.fullscreen_cursor)
                        .copied()
                        .unwrap_or(FullscreenApi::Standard);
                    self.backend.exit_fullscreen(api);
                }
            }
            _ => self.backend.stop_tracks(handle),
        }
        emit(
            self.logger.as_ref(),
            LogLevel::Warn,
            TARGET,
            "late_resource_discarded",
            [json_kv("resource", json!(kind.name()))],
        );
    }

    /// Fail every request still waiting on the platform.
    pub fn expire_pending(&mut self) -> Vec<Acquisition> {
        let mut pending: Vec<ResourceKind> = self
            .requests
            .iter()
            .filter(|(_, state)| **state == RequestState::Pending)
            .map(|(kind, _)| *kind)
            .collect();
        pending.sort();
        pending
            .into_iter()
            .map(|kind| self.fail(kind, AcquireError::TimedOut))
            .collect()
    }

    pub fn progress(&self) -> SetupProgress {
        if self.requests.is_empty() {
            return SetupProgress::Idle;
        }
        let state = |kind| self.requests.get(&kind);
        let required = [ResourceKind::Camera, ResourceKind::Fullscreen];
        if required
            .iter()
            .any(|kind| state(*kind) == Some(&RequestState::Failed))
        {
            return SetupProgress::Failed;
        }
        if self
            .requests
            .values()
            .any(|state| *state == RequestState::Pending)
        {
            return SetupProgress::Pending;
        }
        if required
            .iter()
            .all(|kind| state(*kind) == Some(&RequestState::Granted))
        {
            SetupProgress::Ready
        } else {
            SetupProgress::Pending
        }
    }

    pub fn is_held(&self, kind: ResourceKind) -> bool {
        self.resources.iter().any(|r| r.kind == kind && r.active)
    }

    pub fn resources(&self) -> &[MonitoredResource] {
        &self.resources
    }

    /// Record that the platform left fullscreen on its own. The lock is gone,
    /// so release must not try to exit it again.
    pub fn note_fullscreen_lost(&mut self, checks: &mut SystemChecks) {
        checks.fullscreen = false;
    }

    /// Stop every held stream, leave fullscreen if still engaged, and cancel
    /// outstanding requests. Safe to call any number of times from any phase.
    pub fn release(&mut self, checks: &mut SystemChecks) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        for resource in self.resources.iter_mut().filter(|r| r.active) {
            match resource.kind {
                ResourceKind::Camera | ResourceKind::ScreenShare => {
                    self.backend.stop_tracks(&resource.handle);
                    report.streams_stopped += 1;
                }
                ResourceKind::Fullscreen => {
                    if self.backend.is_fullscreen() {
                        let api = resource.fullscreen_api.unwrap_or(FullscreenApi::Standard);
                        self.backend.exit_fullscreen(api);
                        report.fullscreen_exited = true;
                    }
                }
            }
            resource.active = false;
        }

        let before = self.requests.len();
        self.requests
            .retain(|_, state| *state != RequestState::Pending);
        report.pending_cancelled = before - self.requests.len();

        checks.camera = false;
        checks.microphone = false;
        checks.screen_share = false;
        checks.fullscreen = false;

        if !report.is_noop() {
            emit(
                self.logger.as_ref(),
                LogLevel::Info,
                TARGET,
                "resources_released",
                [
                    json_kv("streams_stopped", json!(report.streams_stopped)),
                    json_kv("fullscreen_exited", json!(report.fullscreen_exited)),
                    json_kv("pending_cancelled", json!(report.pending_cancelled)),
                ],
            );
        }

        report
    }

    /// Forget released resources and request bookkeeping before a new Setup.
    pub fn reset(&mut self, checks: &mut SystemChecks) {
        self.release(checks);
        self.resources.clear();
        self.requests.clear();
        self.fullscreen_cursor = 0;
    }
}

#[cfg(test)]
mod tests;
