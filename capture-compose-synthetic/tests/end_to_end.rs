//! Full sessions against the synthetic backend: real worker threads, real
//! tone and pattern sources, real container output.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use capture_compose_core::storage::metadata::{read_metadata, verify_payload};
use capture_compose_core::{
    Artifact, CaptureConfig, CaptureEngine, CaptureError, EngineOptions, RecordingSession, Resolution,
    SessionEvents, SessionState, TrackKind, TrackOrigin,
};
use capture_compose_synthetic::{
    summarize, DeviceKind, DeviceProfile, FileExporter, FrameEncoder, PermissionState, Permissions,
    SyntheticDevices, CONTAINER_MIME,
};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Outcome {
    media: Mutex<Vec<(TrackOrigin, Option<TrackOrigin>)>>,
    chunks: Mutex<usize>,
    artifact: Mutex<Option<Artifact>>,
    errors: Mutex<Vec<CaptureError>>,
}

impl SessionEvents for Outcome {
    fn on_media(&self, tracks: &capture_compose_core::UnifiedTrackSet) {
        self.media
            .lock()
            .push((tracks.video().origin(), tracks.audio().map(|a| a.origin())));
    }

    fn on_data(&self, _chunk: &[u8]) {
        *self.chunks.lock() += 1;
    }

    fn on_stop(&self, artifact: &Artifact) {
        *self.artifact.lock() = Some(artifact.clone());
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }
}

fn profile() -> DeviceProfile {
    DeviceProfile {
        display_resolution: Resolution::new(160, 90),
        ..Default::default()
    }
}

fn options() -> EngineOptions {
    EngineOptions {
        mime_type: CONTAINER_MIME.into(),
        timeslice_ms: Some(50),
        camera_width: 64,
        camera_height: 48,
        ..Default::default()
    }
}

fn engine(devices: Arc<SyntheticDevices>) -> CaptureEngine {
    CaptureEngine::new(devices, Arc::new(FrameEncoder::new()), options()).unwrap()
}

fn record(session: &RecordingSession, millis: u64) {
    thread::sleep(Duration::from_millis(millis));
    assert!(session.state().is_active(), "session left recording: {}", session.state());
}

fn finish(session: &RecordingSession, outcome: &Outcome) -> Artifact {
    session.stop();
    assert!(session.wait_for_completion(WAIT));
    assert_eq!(session.state(), SessionState::Stopped);
    outcome.artifact.lock().take().expect("no artifact delivered")
}

fn eventually(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

#[test]
fn display_session_produces_a_playable_container() {
    let devices = Arc::new(SyntheticDevices::new(profile()));
    let outcome = Arc::new(Outcome::default());
    let session = engine(devices.clone())
        .create_session(CaptureConfig::default(), outcome.clone())
        .unwrap();

    session.start();
    record(&session, 400);
    let artifact = finish(&session, &outcome);

    assert_eq!(
        outcome.media.lock().as_slice(),
        &[(TrackOrigin::Display, Some(TrackOrigin::Display))]
    );
    assert_eq!(artifact.mime_type, CONTAINER_MIME);
    assert_eq!(artifact.chunk_count, *outcome.chunks.lock());
    assert!(artifact.chunk_count >= 2);

    let summary = summarize(&artifact.payload).unwrap();
    assert_eq!(summary.header.resolution, Resolution::new(160, 90));
    assert_eq!(summary.header.channels, 2);
    assert!(summary.video_frames > 0);
    assert!(summary.audio_frames > 0);
    assert_eq!(summary.silent_records, 0);

    assert!(devices.granted_tracks() > 0);
    assert_eq!(devices.released_tracks(), devices.granted_tracks());
    assert!(devices.live_tracks().is_empty());
}

#[test]
fn combined_session_composites_and_mixes() {
    let devices = Arc::new(SyntheticDevices::new(profile()));
    let outcome = Arc::new(Outcome::default());
    let config = CaptureConfig {
        use_camera: true,
        ..Default::default()
    };
    let session = engine(devices.clone()).create_session(config, outcome.clone()).unwrap();

    let tracks = session.tracks().unwrap();
    assert_eq!(tracks.video().origin(), TrackOrigin::Composite);
    assert_eq!(tracks.audio().map(|a| a.origin()), Some(TrackOrigin::Mix));

    session.start();
    record(&session, 400);
    let artifact = finish(&session, &outcome);

    let kinds: Vec<_> = artifact.tracks.iter().map(|t| (t.kind, t.origin)).collect();
    assert_eq!(
        kinds,
        vec![
            (TrackKind::Video, TrackOrigin::Composite),
            (TrackKind::Audio, TrackOrigin::Mix)
        ]
    );
    let summary = summarize(&artifact.payload).unwrap();
    assert_eq!(summary.header.resolution, Resolution::new(160, 90));
    assert_eq!(summary.header.sample_rate, 48000);
    assert!(session.diagnostics().compositor_ticks > 0);
    assert!(session.diagnostics().mixed_frames > 0);
    // display video + audio, camera video + microphone
    assert_eq!(devices.granted_tracks(), 4);
    assert_eq!(devices.released_tracks(), 4);
}

#[test]
fn muting_writes_silent_audio() {
    let devices = Arc::new(SyntheticDevices::new(profile()));
    let outcome = Arc::new(Outcome::default());
    let config = CaptureConfig {
        use_camera: true,
        ..Default::default()
    };
    let session = engine(devices).create_session(config, outcome.clone()).unwrap();

    session.start();
    record(&session, 200);
    session.mute();
    assert!(session.is_muted());
    record(&session, 400);
    session.unmute();
    record(&session, 200);
    let artifact = finish(&session, &outcome);

    let summary = summarize(&artifact.payload).unwrap();
    assert!(summary.silent_records > 0);
    assert!(summary.silent_records < summary.audio_records);
}

fn record_combined(mute_window: bool) -> Artifact {
    let outcome = Arc::new(Outcome::default());
    let config = CaptureConfig {
        use_camera: true,
        ..Default::default()
    };
    let session = engine(Arc::new(SyntheticDevices::new(profile())))
        .create_session(config, outcome.clone())
        .unwrap();

    session.start();
    record(&session, 200);
    if mute_window {
        session.mute();
    }
    record(&session, 200);
    if mute_window {
        session.unmute();
    }
    record(&session, 200);
    finish(&session, &outcome)
}

#[test]
fn muting_leaves_the_duration_unchanged() {
    let plain = record_combined(false);
    let muted = record_combined(true);

    assert!(
        (plain.duration_secs - muted.duration_secs).abs() < 0.15,
        "durations {} and {}",
        plain.duration_secs,
        muted.duration_secs
    );
    assert!(muted.duration_secs > 0.45, "duration {}", muted.duration_secs);

    let plain_summary = summarize(&plain.payload).unwrap();
    let muted_summary = summarize(&muted.payload).unwrap();
    assert!(muted_summary.silent_records > 0);
    assert!(
        (plain_summary.duration_secs - muted_summary.duration_secs).abs() < 0.15,
        "container durations {} and {}",
        plain_summary.duration_secs,
        muted_summary.duration_secs
    );
}

#[test]
fn pausing_shortens_the_recorded_duration() {
    let outcome = Arc::new(Outcome::default());
    let session = engine(Arc::new(SyntheticDevices::new(profile())))
        .create_session(CaptureConfig::default(), outcome.clone())
        .unwrap();

    session.start();
    record(&session, 200);
    session.pause();
    thread::sleep(Duration::from_millis(500));
    session.resume();
    record(&session, 200);
    let artifact = finish(&session, &outcome);

    assert!(artifact.duration_secs < 0.65, "duration {}", artifact.duration_secs);
    let summary = summarize(&artifact.payload).unwrap();
    assert!(summary.duration_secs < 0.65, "container duration {}", summary.duration_secs);
}

#[test]
fn denied_display_fails_acquisition_without_events() {
    let devices = Arc::new(SyntheticDevices::new(profile()).with_permissions(Permissions {
        display: PermissionState::Denied,
        ..Permissions::all_granted()
    }));
    let outcome = Arc::new(Outcome::default());

    let result = engine(devices.clone()).create_session(CaptureConfig::default(), outcome.clone());

    assert_eq!(result.unwrap_err(), CaptureError::PermissionDenied);
    assert!(outcome.media.lock().is_empty());
    assert!(outcome.errors.lock().is_empty());
    assert_eq!(devices.granted_tracks(), 0);
}

#[test]
fn camera_denied_after_display_granted_releases_the_display() {
    let devices = Arc::new(SyntheticDevices::new(profile()).with_permissions(Permissions {
        camera: PermissionState::Denied,
        ..Permissions::all_granted()
    }));
    let config = CaptureConfig {
        use_camera: true,
        ..Default::default()
    };

    let result = engine(devices.clone()).create_session(config, Arc::new(Outcome::default()));

    assert_eq!(result.unwrap_err(), CaptureError::PermissionDenied);
    assert_eq!(devices.released_tracks(), devices.granted_tracks());
    assert!(devices.live_tracks().is_empty());
}

#[test]
fn losing_the_display_ends_the_session() {
    let devices = Arc::new(SyntheticDevices::new(profile()));
    let outcome = Arc::new(Outcome::default());
    let session = engine(devices.clone())
        .create_session(CaptureConfig::default(), outcome.clone())
        .unwrap();

    session.start();
    record(&session, 150);
    assert_eq!(devices.disconnect(DeviceKind::Display), 1);

    assert!(session.wait_for_completion(WAIT));
    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(outcome.errors.lock().as_slice(), &[CaptureError::DeviceUnavailable]);
    assert!(outcome.artifact.lock().is_none());
    assert!(devices.live_tracks().is_empty());
}

#[test]
fn abandoned_request_releases_its_devices() {
    let devices = Arc::new(SyntheticDevices::new(profile()));
    let engine = engine(devices.clone());

    let pending = engine
        .request_session(CaptureConfig::default(), Arc::new(Outcome::default()))
        .unwrap();
    drop(pending);

    assert!(eventually(|| !engine.is_acquiring()));
    assert!(eventually(|| devices.granted_tracks() > 0
        && devices.released_tracks() == devices.granted_tracks()));
}

#[test]
fn exported_artifact_verifies_against_its_sidecar() {
    let outcome = Arc::new(Outcome::default());
    let session = engine(Arc::new(SyntheticDevices::new(profile())))
        .create_session(CaptureConfig::default(), outcome.clone())
        .unwrap();
    session.start();
    record(&session, 200);
    let artifact = finish(&session, &outcome);

    let dir = std::env::temp_dir().join(format!("capture_compose_e2e_{}", uuid::Uuid::new_v4()));
    let exporter = FileExporter::new(&dir);
    artifact.export(&exporter, "session.ccf").unwrap();

    let path = dir.join("session.ccf");
    let metadata = read_metadata(&path).unwrap();
    assert_eq!(metadata.checksum, artifact.checksum);
    assert!(verify_payload(&path, &metadata).unwrap());
    summarize(&std::fs::read(&path).unwrap()).unwrap();

    std::fs::remove_dir_all(&dir).ok();
}
