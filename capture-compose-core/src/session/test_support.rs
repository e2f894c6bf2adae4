//! In-crate doubles for session tests: scripted devices, a scripted
//! encoder, and an event log that tests can block on.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::artifact::Artifact;
use crate::models::error::CaptureError;
use crate::models::track::{
    AudioFormat, MediaTrack, Resolution, TrackKind, TrackOrigin, TrackSet, UnifiedTrackSet, VideoFrame,
};
use crate::traits::encoder::{
    EncoderEvent, EncoderEventCallback, EncoderOptions, EncodingSession, MediaEncoder,
};
use crate::traits::media_devices::{CameraRequest, DisplayRequest, MediaDevices};
use crate::traits::session_events::SessionEvents;
use crate::traits::track_source::{AudioSource, VideoSource};

pub const UNSUPPORTED_TYPE: &str = "video/unsupported";

struct MockVideo {
    resolution: Resolution,
    rgba: [u8; 4],
    released: Arc<AtomicUsize>,
}

impl VideoSource for MockVideo {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        Some(VideoFrame::solid(self.resolution, self.rgba))
    }

    fn stop(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockAudio {
    format: AudioFormat,
    value: f32,
    released: Arc<AtomicUsize>,
}

impl AudioSource for MockAudio {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&self, max_frames: usize) -> Vec<f32> {
        vec![self.value; max_frames * self.format.channels as usize]
    }

    fn stop(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted platform devices that count grants and releases.
pub struct MockDevices {
    display_resolution: Mutex<Resolution>,
    grant_display_audio: AtomicBool,
    display_error: Mutex<Option<CaptureError>>,
    camera_error: Mutex<Option<CaptureError>>,
    display_requests: AtomicUsize,
    camera_requests: AtomicUsize,
    granted: AtomicUsize,
    released: Arc<AtomicUsize>,
    tracks: Mutex<Vec<Arc<MediaTrack>>>,
}

impl MockDevices {
    pub fn new() -> Self {
        Self {
            display_resolution: Mutex::new(Resolution::new(1280, 720)),
            grant_display_audio: AtomicBool::new(true),
            display_error: Mutex::new(None),
            camera_error: Mutex::new(None),
            display_requests: AtomicUsize::new(0),
            camera_requests: AtomicUsize::new(0),
            granted: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            tracks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_display_resolution(self, resolution: Resolution) -> Self {
        *self.display_resolution.lock() = resolution;
        self
    }

    /// The user shares a surface but unticks its audio.
    pub fn withhold_display_audio(&self) {
        self.grant_display_audio.store(false, Ordering::SeqCst);
    }

    pub fn deny_display(&self) {
        *self.display_error.lock() = Some(CaptureError::PermissionDenied);
    }

    pub fn fail_camera(&self, error: CaptureError) {
        *self.camera_error.lock() = Some(error);
    }

    pub fn display_requests(&self) -> usize {
        self.display_requests.load(Ordering::SeqCst)
    }

    pub fn camera_requests(&self) -> usize {
        self.camera_requests.load(Ordering::SeqCst)
    }

    pub fn granted_tracks(&self) -> usize {
        self.granted.load(Ordering::SeqCst)
    }

    pub fn released_tracks(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn track(&self, origin: TrackOrigin, kind: TrackKind) -> Option<Arc<MediaTrack>> {
        self.tracks
            .lock()
            .iter()
            .find(|t| t.origin() == origin && t.kind() == kind)
            .cloned()
    }

    fn video(&self, origin: TrackOrigin, resolution: Resolution, rgba: [u8; 4]) -> Arc<MediaTrack> {
        let track = MediaTrack::video(
            origin,
            format!("{:?} video", origin),
            MockVideo {
                resolution,
                rgba,
                released: Arc::clone(&self.released),
            },
        );
        self.register(track)
    }

    fn audio(&self, origin: TrackOrigin, format: AudioFormat, value: f32) -> Arc<MediaTrack> {
        let track = MediaTrack::audio(
            origin,
            format!("{:?} audio", origin),
            MockAudio {
                format,
                value,
                released: Arc::clone(&self.released),
            },
        );
        self.register(track)
    }

    fn register(&self, track: Arc<MediaTrack>) -> Arc<MediaTrack> {
        self.granted.fetch_add(1, Ordering::SeqCst);
        self.tracks.lock().push(Arc::clone(&track));
        track
    }
}

impl MediaDevices for MockDevices {
    fn request_display(&self, request: &DisplayRequest) -> Result<TrackSet, CaptureError> {
        self.display_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.display_error.lock().clone() {
            return Err(err);
        }
        let resolution = *self.display_resolution.lock();
        let video = self.video(TrackOrigin::Display, resolution, [200, 0, 0, 255]);
        let audio = (request.audio && self.grant_display_audio.load(Ordering::SeqCst))
            .then(|| self.audio(TrackOrigin::Display, AudioFormat::stereo(48000.0), 0.25));
        Ok(TrackSet::new(Some(video), audio))
    }

    fn request_camera(&self, request: &CameraRequest) -> Result<TrackSet, CaptureError> {
        self.camera_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.camera_error.lock().clone() {
            return Err(err);
        }
        let video = self.video(TrackOrigin::Camera, request.resolution, [0, 200, 0, 255]);
        let audio = request
            .audio
            .then(|| self.audio(TrackOrigin::Camera, AudioFormat::new(48000.0, 1), 0.5));
        Ok(TrackSet::new(Some(video), audio))
    }
}

#[derive(Default)]
struct MockEncoderState {
    callback: Mutex<Option<EncoderEventCallback>>,
    opened_with: Mutex<Option<UnifiedTrackSet>>,
    opened: AtomicUsize,
    fail_next_start: AtomicBool,
    fail_next_pause: AtomicBool,
    fail_next_stop: AtomicBool,
    final_chunk: Mutex<Vec<u8>>,
}

/// Encoder whose events are scripted by the test. Lifecycle events are
/// emitted synchronously from inside the control calls.
#[derive(Clone, Default)]
pub struct MockEncoder {
    state: Arc<MockEncoderState>,
}

impl MockEncoder {
    pub fn new() -> Self {
        let encoder = Self::default();
        *encoder.state.final_chunk.lock() = b"tail".to_vec();
        encoder
    }

    pub fn emit(&self, event: EncoderEvent) {
        let callback = self.state.callback.lock().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    pub fn emit_data(&self, bytes: &[u8]) {
        self.emit(EncoderEvent::Data(bytes.to_vec()));
    }

    pub fn opened_tracks(&self) -> Option<UnifiedTrackSet> {
        self.state.opened_with.lock().clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn fail_next_start(&self) {
        self.state.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_pause(&self) {
        self.state.fail_next_pause.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_stop(&self) {
        self.state.fail_next_stop.store(true, Ordering::SeqCst);
    }
}

impl MediaEncoder for MockEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type != UNSUPPORTED_TYPE
    }

    fn open(
        &self,
        tracks: &UnifiedTrackSet,
        _options: &EncoderOptions,
        events: EncoderEventCallback,
    ) -> Result<Box<dyn EncodingSession>, CaptureError> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        *self.state.opened_with.lock() = Some(tracks.clone());
        *self.state.callback.lock() = Some(Arc::clone(&events));
        Ok(Box::new(MockEncodingSession {
            state: Arc::clone(&self.state),
            events,
        }))
    }
}

struct MockEncodingSession {
    state: Arc<MockEncoderState>,
    events: EncoderEventCallback,
}

impl EncodingSession for MockEncodingSession {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.state.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::EncodingFailure("start refused".into()));
        }
        (self.events)(EncoderEvent::Started);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        if self.state.fail_next_pause.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::EncodingFailure("pause refused".into()));
        }
        (self.events)(EncoderEvent::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        (self.events)(EncoderEvent::Resumed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if self.state.fail_next_stop.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::EncodingFailure("stop refused".into()));
        }
        let tail = self.state.final_chunk.lock().clone();
        (self.events)(EncoderEvent::Data(tail));
        (self.events)(EncoderEvent::Stopped);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Media {
        video: TrackOrigin,
        audio: Option<TrackOrigin>,
    },
    Start,
    Pause,
    Resume,
    Data(Vec<u8>),
    Stop(Artifact),
    Error(CaptureError),
}

/// Collects session events and lets tests wait for them.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Recorded>>,
    changed: Condvar,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn data(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Data(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Stop(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// Block until `pred` holds for the recorded events or the timeout passes.
    pub fn wait_until(&self, timeout: Duration, pred: impl Fn(&[Recorded]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !pred(&events) {
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return pred(&events);
            }
        }
        true
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
        self.changed.notify_all();
    }
}

impl SessionEvents for EventLog {
    fn on_media(&self, tracks: &UnifiedTrackSet) {
        self.push(Recorded::Media {
            video: tracks.video().origin(),
            audio: tracks.audio().map(|t| t.origin()),
        });
    }

    fn on_start(&self) {
        self.push(Recorded::Start);
    }

    fn on_pause(&self) {
        self.push(Recorded::Pause);
    }

    fn on_resume(&self) {
        self.push(Recorded::Resume);
    }

    fn on_data(&self, chunk: &[u8]) {
        self.push(Recorded::Data(chunk.to_vec()));
    }

    fn on_stop(&self, artifact: &Artifact) {
        self.push(Recorded::Stop(artifact.clone()));
    }

    fn on_error(&self, error: &CaptureError) {
        self.push(Recorded::Error(error.clone()));
    }
}
