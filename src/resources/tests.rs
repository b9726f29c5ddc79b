use super::*;
use crate::testing::FakeMedia;

fn manager(media: &FakeMedia) -> ResourceLifecycleManager {
    ResourceLifecycleManager::new(
        media.clone(),
        MediaConstraints::default(),
        FullscreenApi::ALL.to_vec(),
    )
}

#[test]
fn camera_grant_marks_camera_and_microphone() {
    let media = FakeMedia::granting();
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    let outcome = resources.acquire_camera(&mut checks);

    assert_eq!(outcome, Acquisition::Granted(ResourceKind::Camera));
    assert!(checks.camera);
    assert!(checks.microphone);
    assert!(resources.is_held(ResourceKind::Camera));
    let log = media.snapshot();
    assert_eq!(log.previews.len(), 1);
    assert_eq!(log.user_media_constraints, vec![MediaConstraints::default()]);
}

#[test]
fn camera_denial_is_critical_and_fatal_to_setup() {
    let media = FakeMedia::granting().camera(AcquireOutcome::Ready(Err(AcquireError::Denied)));
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    let outcome = resources.acquire_camera(&mut checks);

    assert!(outcome.is_fatal_to_setup());
    match outcome {
        Acquisition::Failed { violation, .. } => {
            assert_eq!(violation.kind(), ViolationKind::CameraDenied);
            assert!(violation.is_critical());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!checks.camera);
    assert_eq!(resources.progress(), SetupProgress::Failed);
}

#[test]
fn screen_share_denial_is_a_warning_only() {
    let media = FakeMedia::granting().display(AcquireOutcome::Ready(Err(AcquireError::Unsupported)));
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    resources.acquire_camera(&mut checks);
    resources.acquire_fullscreen(&mut checks);
    let outcome = resources.acquire_screen_share(&mut checks);

    assert!(!outcome.is_fatal_to_setup());
    match &outcome {
        Acquisition::Failed { violation, .. } => {
            assert_eq!(violation.kind(), ViolationKind::ScreenShareOptional);
            assert!(!violation.is_critical());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(resources.progress(), SetupProgress::Ready);
    assert!(!checks.screen_share);
}

#[test]
fn fullscreen_falls_back_through_vendor_entry_points() {
    let media = FakeMedia::granting()
        .fullscreen_api(FullscreenApi::Standard, AcquireOutcome::Ready(Err(AcquireError::Unsupported)))
        .fullscreen_api(FullscreenApi::Webkit, AcquireOutcome::Ready(Err(AcquireError::Unsupported)));
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    let outcome = resources.acquire_fullscreen(&mut checks);

    assert_eq!(outcome, Acquisition::Granted(ResourceKind::Fullscreen));
    assert!(checks.fullscreen);
    assert_eq!(
        media.snapshot().fullscreen_requests,
        vec![FullscreenApi::Standard, FullscreenApi::Webkit, FullscreenApi::Moz]
    );

    resources.release(&mut checks);
    assert_eq!(media.snapshot().fullscreen_exits, vec![FullscreenApi::Moz]);
}

#[test]
fn fullscreen_fails_when_no_entry_point_is_supported() {
    let unsupported = || AcquireOutcome::Ready(Err(AcquireError::Unsupported));
    let mut media = FakeMedia::granting();
    for api in FullscreenApi::ALL {
        media = media.fullscreen_api(api, unsupported());
    }
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    match resources.acquire_fullscreen(&mut checks) {
        Acquisition::Failed { violation, error, .. } => {
            assert_eq!(violation.kind(), ViolationKind::FullscreenDenied);
            assert_eq!(error, AcquireError::Unsupported);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn fullscreen_denial_does_not_try_other_entry_points() {
    let media = FakeMedia::granting()
        .fullscreen_api(FullscreenApi::Standard, AcquireOutcome::Ready(Err(AcquireError::Denied)));
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    assert!(resources.acquire_fullscreen(&mut checks).is_fatal_to_setup());
    assert_eq!(media.snapshot().fullscreen_requests, vec![FullscreenApi::Standard]);
}

#[test]
fn pending_requests_resolve_later() {
    let media = FakeMedia::granting().camera(AcquireOutcome::Pending);
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    assert_eq!(
        resources.acquire_camera(&mut checks),
        Acquisition::Pending(ResourceKind::Camera)
    );
    resources.acquire_fullscreen(&mut checks);
    assert_eq!(resources.progress(), SetupProgress::Pending);
    assert!(!checks.camera);

    let outcome = resources.resolve(
        ResourceKind::Camera,
        Ok(ResourceHandle::new("stream-late")),
        &mut checks,
    );
    assert_eq!(outcome, Acquisition::Granted(ResourceKind::Camera));
    assert!(checks.camera);
    assert_eq!(resources.progress(), SetupProgress::Ready);
}

#[test]
fn expire_pending_fails_outstanding_requests() {
    let media = FakeMedia::granting()
        .camera(AcquireOutcome::Pending)
        .display(AcquireOutcome::Pending);
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();
    resources.acquire_camera(&mut checks);
    resources.acquire_fullscreen(&mut checks);
    resources.acquire_screen_share(&mut checks);

    let expired = resources.expire_pending();

    let kinds: Vec<_> = expired
        .iter()
        .map(|a| match a {
            Acquisition::Failed { violation, error, .. } => {
                assert_eq!(*error, AcquireError::TimedOut);
                violation.kind()
            }
            other => panic!("expected failure, got {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![ViolationKind::CameraDenied, ViolationKind::ScreenShareOptional]
    );
    assert_eq!(resources.progress(), SetupProgress::Failed);
}

#[test]
fn late_grant_after_release_is_stopped_immediately() {
    let media = FakeMedia::granting().camera(AcquireOutcome::Pending);
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();
    resources.acquire_camera(&mut checks);

    let report = resources.release(&mut checks);
    assert_eq!(report.pending_cancelled, 1);

    let handle = ResourceHandle::new("stream-too-late");
    let outcome = resources.resolve(ResourceKind::Camera, Ok(handle.clone()), &mut checks);

    assert_eq!(outcome, Acquisition::Stale(ResourceKind::Camera));
    assert!(!checks.camera);
    assert_eq!(media.snapshot().stopped, vec![handle]);
}

#[test]
fn release_is_idempotent_and_clears_flags() {
    let media = FakeMedia::granting();
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();
    resources.acquire_camera(&mut checks);
    resources.acquire_fullscreen(&mut checks);
    resources.acquire_screen_share(&mut checks);

    let first = resources.release(&mut checks);
    let second = resources.release(&mut checks);

    assert_eq!(first.streams_stopped, 2);
    assert!(first.fullscreen_exited);
    assert!(second.is_noop());
    assert!(!checks.any_set());
    let log = media.snapshot();
    assert_eq!(log.stopped.len(), 2);
    assert_eq!(log.fullscreen_exits.len(), 1);
    assert!(resources.resources().iter().all(|r| !r.active));
}

#[test]
fn release_without_any_acquisition_is_noop() {
    let media = FakeMedia::granting();
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();

    assert!(resources.release(&mut checks).is_noop());
    assert!(resources.release(&mut checks).is_noop());
    assert!(!checks.any_set());
    assert_eq!(resources.progress(), SetupProgress::Idle);
}

#[test]
fn release_skips_exit_when_fullscreen_already_left() {
    let media = FakeMedia::granting();
    let mut resources = manager(&media);
    let mut checks = SystemChecks::default();
    resources.acquire_fullscreen(&mut checks);

    media.set_fullscreen(false);
    resources.note_fullscreen_lost(&mut checks);
    let report = resources.release(&mut checks);

    assert!(!report.fullscreen_exited);
    assert!(media.snapshot().fullscreen_exits.is_empty());
}
