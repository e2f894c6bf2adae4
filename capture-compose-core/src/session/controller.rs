use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use super::acquirer::{AcquiredSources, SourceAcquirer};
use super::dispatch::{self, SessionEvent};
use crate::models::artifact::{Artifact, ArtifactTrack, ChunkSequence};
use crate::models::config::{CaptureConfig, CaptureMode, EngineOptions};
use crate::models::diagnostics::SessionDiagnostics;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::models::track::{MediaTrack, UnifiedTrackSet};
use crate::processing::audio_mixer::{AudioLevels, AudioMixer, MixedAudio};
use crate::processing::frame_compositor::{CompositorSettings, FrameCompositor};
use crate::traits::encoder::{
    EncoderEvent, EncoderEventCallback, EncoderOptions, EncodingSession, MediaEncoder,
};
use crate::traits::media_devices::MediaDevices;
use crate::traits::session_events::SessionEvents;

/// Active recording time, excluding pauses.
#[derive(Debug, Default, Clone, Copy)]
struct RecordingClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl RecordingClock {
    fn start(&mut self, now: Instant) {
        self.started = Some(now);
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
    }

    fn pause(&mut self, now: Instant) {
        self.paused_at.get_or_insert(now);
    }

    fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
    }
}

/// Everything built on top of the raw sources for one session.
struct Pipeline {
    sources: AcquiredSources,
    compositor: Option<FrameCompositor>,
    mixed: Option<MixedAudio>,
    /// Raw audio tracks feeding the unified audio track; mute acts on these.
    mix_inputs: Vec<Arc<MediaTrack>>,
    unified: UnifiedTrackSet,
}

impl Pipeline {
    /// Unify the raw sources. On failure every raw track is released.
    fn build(
        config: &CaptureConfig,
        options: &EngineOptions,
        sources: AcquiredSources,
    ) -> Result<Self, CaptureError> {
        let mut compositor = None;
        let video = match sources.mode {
            CaptureMode::DisplayOnly => sources.display_video().cloned(),
            CaptureMode::CameraOnly => sources.camera_video().cloned(),
            CaptureMode::Combined => match (sources.display_video(), sources.camera_video()) {
                (Some(display), Some(camera)) => {
                    let started = FrameCompositor::start(
                        Arc::clone(display),
                        Arc::clone(camera),
                        CompositorSettings::from(options),
                    );
                    match started {
                        Ok(running) => {
                            let track = Arc::clone(running.track());
                            compositor = Some(running);
                            Some(track)
                        }
                        Err(e) => {
                            sources.release();
                            return Err(e);
                        }
                    }
                }
                _ => None,
            },
        };
        let Some(video) = video else {
            sources.release();
            return Err(CaptureError::DeviceUnavailable);
        };

        let mix_inputs =
            AudioMixer::select_inputs(config, sources.display_audio(), sources.camera_audio());
        let mixed = AudioMixer::new(options.sample_rate).mix(&mix_inputs);
        let unified = UnifiedTrackSet::new(video, mixed.as_ref().map(|m| Arc::clone(m.track())));

        Ok(Self {
            sources,
            compositor,
            mixed,
            mix_inputs,
            unified,
        })
    }

    fn artifact_tracks(&self) -> Vec<ArtifactTrack> {
        self.unified
            .tracks()
            .map(|t| ArtifactTrack {
                kind: t.kind(),
                origin: t.origin(),
                label: t.label().to_string(),
            })
            .collect()
    }

    /// Stop the synthetic producers, then every raw and unified track.
    /// Returns how many raw tracks this call released.
    fn release(&self) -> usize {
        if let Some(compositor) = &self.compositor {
            compositor.stop();
        }
        if let Some(MixedAudio::Mixed { track, .. }) = &self.mixed {
            track.stop();
        }
        let released = self.sources.release();
        for track in self.unified.tracks() {
            track.stop();
        }
        released
    }
}

struct Inner {
    state: SessionState,
    pipeline: Option<Pipeline>,
    chunks: ChunkSequence,
    clock: RecordingClock,
    diagnostics: SessionDiagnostics,
    muted: bool,
    /// Terminal handlers ran and every track is released.
    finished: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            pipeline: None,
            chunks: ChunkSequence::new(),
            clock: RecordingClock::default(),
            diagnostics: SessionDiagnostics::default(),
            muted: false,
            finished: false,
        }
    }

    /// Move `from -> to` if the session is still in `from`.
    fn advance(&mut self, from: SessionState, to: SessionState) -> bool {
        if self.state != from {
            return false;
        }
        let now = Instant::now();
        match (from, to) {
            (SessionState::Ready, SessionState::Recording) => self.clock.start(now),
            (SessionState::Recording, SessionState::Paused) => self.clock.pause(now),
            (SessionState::Paused, SessionState::Recording) => self.clock.resume(now),
            _ => {}
        }
        log::debug!("Session state {} -> {}", from, to);
        self.state = to;
        true
    }

    fn refresh_diagnostics(&mut self) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        if let Some(compositor) = &pipeline.compositor {
            self.diagnostics.compositor_ticks = compositor.ticks();
        }
        if let Some(graph) = pipeline.mixed.as_ref().and_then(|m| m.graph()) {
            self.diagnostics.mixed_frames = graph.mixed_frames();
        }
    }
}

struct Shared {
    config: CaptureConfig,
    options: EngineOptions,
    encoders: Arc<dyn MediaEncoder>,
    handlers: Arc<dyn SessionEvents>,
    inner: Mutex<Inner>,
    completed: Condvar,
    /// Held for the whole of each control call. When nested, lock this
    /// before `inner`.
    encoder: Mutex<Option<Box<dyn EncodingSession>>>,
    events: Sender<SessionEvent>,
    /// Events queued before dispatch begins wait here.
    queue: Mutex<Option<Receiver<SessionEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Current state if `valid` accepts it; otherwise log and return `None`.
    fn check(&self, operation: &'static str, valid: fn(&SessionState) -> bool) -> Option<SessionState> {
        let state = self.state();
        if valid(&state) {
            Some(state)
        } else {
            log::warn!("Ignoring control call: {}", CaptureError::invalid_transition(operation, state));
            None
        }
    }

    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.inner.lock().advance(from, to)
    }

    fn control_failed(&self, operation: &str, error: CaptureError) {
        log::error!("{} failed: {}", operation, error);
        let _ = self.events.send(SessionEvent::ControlFailed(error));
    }

    fn assemble(&self, devices: &dyn MediaDevices) -> Result<Pipeline, CaptureError> {
        let mime_type = &self.options.mime_type;
        if !self.encoders.is_type_supported(mime_type) {
            return Err(CaptureError::EncodingFailure(format!(
                "media type '{}' is not supported by the encoder",
                mime_type
            )));
        }
        let sources = SourceAcquirer::new(&self.config, &self.options).acquire(devices)?;
        Pipeline::build(&self.config, &self.options, sources)
    }

    /// Report platform-ended raw tracks as device failures.
    fn watch(&self, tracks: &[Arc<MediaTrack>]) {
        for track in tracks {
            let events = self.events.clone();
            track.on_ended(Box::new(move |ended: &MediaTrack| {
                let _ = events.send(SessionEvent::DeviceLost {
                    label: ended.label().to_string(),
                });
            }));
        }
    }

    fn open_encoder(&self, tracks: &UnifiedTrackSet) -> Result<Box<dyn EncodingSession>, CaptureError> {
        let events = self.events.clone();
        let callback: EncoderEventCallback = Arc::new(move |event: EncoderEvent| {
            let _ = events.send(SessionEvent::Encoder(event));
        });
        let options = EncoderOptions {
            mime_type: self.options.mime_type.clone(),
            timeslice_ms: self.options.timeslice_ms,
            frame_rate: self.options.frame_rate,
        };
        self.encoders.open(tracks, &options, callback)
    }

    fn handle(&self, event: SessionEvent) -> ControlFlow<()> {
        match event {
            SessionEvent::Media(tracks) => {
                if self.is_live() {
                    self.handlers.on_media(&tracks);
                }
            }
            SessionEvent::Encoder(EncoderEvent::Started) => {
                if self.is_live() {
                    self.handlers.on_start();
                }
            }
            SessionEvent::Encoder(EncoderEvent::Paused) => {
                if self.is_live() {
                    self.handlers.on_pause();
                }
            }
            SessionEvent::Encoder(EncoderEvent::Resumed) => {
                if self.is_live() {
                    self.handlers.on_resume();
                }
            }
            SessionEvent::Encoder(EncoderEvent::Data(chunk)) => self.accept_chunk(chunk),
            SessionEvent::Encoder(EncoderEvent::Stopped) => {
                self.finish();
                return ControlFlow::Break(());
            }
            SessionEvent::Encoder(EncoderEvent::Error(error)) => {
                self.fail(error);
                return ControlFlow::Break(());
            }
            SessionEvent::DeviceLost { label } => {
                log::error!("Lost capture device '{}'", label);
                self.fail(CaptureError::DeviceUnavailable);
                return ControlFlow::Break(());
            }
            SessionEvent::ControlFailed(error) => {
                if self.is_live() {
                    self.handlers.on_error(&error);
                }
            }
            SessionEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn accept_chunk(&self, chunk: Vec<u8>) {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                inner.diagnostics.late_chunks_dropped += 1;
                return;
            }
            if chunk.is_empty() {
                inner.diagnostics.empty_chunks_dropped += 1;
                return;
            }
            inner.diagnostics.chunks_received += 1;
            inner.diagnostics.bytes_received += chunk.len() as u64;
            inner.chunks.push(chunk.clone());
        }
        self.handlers.on_data(&chunk);
    }

    /// The encoder flushed its last chunk: build the artifact, notify, release.
    fn finish(&self) {
        let (chunks, duration, tracks, pipeline) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.refresh_diagnostics();
            let duration = inner.clock.elapsed(Instant::now());
            let pipeline = inner.pipeline.take();
            let tracks = pipeline
                .as_ref()
                .map(Pipeline::artifact_tracks)
                .unwrap_or_default();
            let chunks = std::mem::take(&mut inner.chunks);
            inner.state = SessionState::Stopped;
            (chunks, duration, tracks, pipeline)
        };
        drop(self.encoder.lock().take());

        let artifact = Artifact::from_chunks(
            chunks,
            &self.options.mime_type,
            duration.as_secs_f64(),
            tracks,
        );
        log::info!(
            "Recording stopped: {} bytes in {} chunks, {:.2}s",
            artifact.size(),
            artifact.chunk_count,
            artifact.duration_secs
        );
        self.handlers.on_stop(&artifact);
        self.teardown(pipeline);
    }

    fn fail(&self, error: CaptureError) {
        let pipeline = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.refresh_diagnostics();
            log::debug!("Session state {} -> {}", inner.state, SessionState::Errored);
            inner.state = SessionState::Errored;
            inner.pipeline.take()
        };
        drop(self.encoder.lock().take());

        log::error!("Recording session failed: {}", error);
        self.handlers.on_error(&error);
        self.teardown(pipeline);
    }

    /// Dropped without reaching a terminal state: release silently.
    fn discard(&self) {
        let pipeline = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                None
            } else {
                log::info!("Discarding session while {}", inner.state);
                inner.state = SessionState::Stopped;
                inner.pipeline.take()
            }
        };
        if pipeline.is_some() {
            drop(self.encoder.lock().take());
            self.teardown(pipeline);
        }

        let _ = self.events.send(SessionEvent::Shutdown);
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn teardown(&self, pipeline: Option<Pipeline>) {
        if let Some(pipeline) = pipeline {
            let released = pipeline.release();
            log::info!("Released {} capture track(s)", released);
        }
        self.inner.lock().finished = true;
        self.completed.notify_all();
    }
}

struct DiscardGuard {
    shared: Arc<Shared>,
}

impl Drop for DiscardGuard {
    fn drop(&mut self) {
        self.shared.discard();
    }
}

/// Handle to one recording session.
///
/// Control calls are fire-and-forget: outcomes arrive through the session's
/// [`SessionEvents`] handlers on a dedicated event thread. A call made in the
/// wrong state is logged and ignored. A control call the encoder rejects is
/// reported through `on_error` and leaves the state unchanged, so it may be
/// retried. Asynchronous encoder errors and lost devices are terminal.
///
/// Clones share the session. Dropping the last clone before the session
/// finishes releases every track without emitting further events.
#[derive(Clone)]
pub struct RecordingSession {
    shared: Arc<Shared>,
    _guard: Arc<DiscardGuard>,
}

impl RecordingSession {
    /// Acquire and unify the sources for `config`. Returns once `Ready`;
    /// `on_media` is the first event delivered.
    pub(crate) fn acquire(
        config: CaptureConfig,
        options: EngineOptions,
        devices: &dyn MediaDevices,
        encoders: Arc<dyn MediaEncoder>,
        handlers: Arc<dyn SessionEvents>,
    ) -> Result<Self, CaptureError> {
        let session = Self::acquire_undelivered(config, options, devices, encoders, handlers)?;
        session.begin_dispatch()?;
        Ok(session)
    }

    /// Like [`RecordingSession::acquire`], but events stay queued until
    /// [`RecordingSession::begin_dispatch`]. A session dropped before then
    /// never reaches its handlers.
    pub(crate) fn acquire_undelivered(
        config: CaptureConfig,
        options: EngineOptions,
        devices: &dyn MediaDevices,
        encoders: Arc<dyn MediaEncoder>,
        handlers: Arc<dyn SessionEvents>,
    ) -> Result<Self, CaptureError> {
        let (events, queue) = crossbeam_channel::unbounded();
        let session = Self::with_shared(Shared {
            config,
            options,
            encoders,
            handlers,
            inner: Mutex::new(Inner::new()),
            completed: Condvar::new(),
            encoder: Mutex::new(None),
            events,
            queue: Mutex::new(Some(queue)),
            dispatcher: Mutex::new(None),
        });
        let shared = Arc::clone(&session.shared);
        shared.advance(SessionState::Idle, SessionState::Acquiring);
        log::info!("Acquiring sources for {:?} capture", config.mode());

        let pipeline = match shared.assemble(devices) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Source acquisition failed: {}", e);
                shared.inner.lock().state = SessionState::Errored;
                return Err(e);
            }
        };
        let unified = pipeline.unified.clone();
        let raw: Vec<Arc<MediaTrack>> = pipeline.sources.tracks().cloned().collect();
        {
            let mut inner = shared.inner.lock();
            inner.pipeline = Some(pipeline);
            inner.advance(SessionState::Acquiring, SessionState::Ready);
        }

        let _ = shared.events.send(SessionEvent::Media(unified.clone()));
        shared.watch(&raw);

        log::info!(
            "Session ready: video {} from {:?}, audio {}",
            unified
                .video()
                .resolution()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            unified.video().origin(),
            unified
                .audio()
                .map(|a| format!("{:?}", a.origin()))
                .unwrap_or_else(|| "none".into())
        );
        Ok(session)
    }

    /// Start delivering queued events to the handlers. Idempotent.
    pub(crate) fn begin_dispatch(&self) -> Result<(), CaptureError> {
        let Some(queue) = self.shared.queue.lock().take() else {
            return Ok(());
        };
        let worker = Arc::clone(&self.shared);
        let handle = dispatch::spawn("session-events", queue, move |event| worker.handle(event))?;
        *self.shared.dispatcher.lock() = Some(handle);
        Ok(())
    }

    fn with_shared(shared: Shared) -> Self {
        let shared = Arc::new(shared);
        Self {
            _guard: Arc::new(DiscardGuard {
                shared: Arc::clone(&shared),
            }),
            shared,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn config(&self) -> CaptureConfig {
        self.shared.config
    }

    pub fn mode(&self) -> CaptureMode {
        self.shared.config.mode()
    }

    /// The unified feed, until the session releases it.
    pub fn tracks(&self) -> Option<UnifiedTrackSet> {
        self.shared
            .inner
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.unified.clone())
    }

    pub fn is_muted(&self) -> bool {
        self.shared.inner.lock().muted
    }

    /// Active recording time so far, excluding pauses.
    pub fn duration(&self) -> Duration {
        self.shared.inner.lock().clock.elapsed(Instant::now())
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let mut inner = self.shared.inner.lock();
        inner.refresh_diagnostics();
        inner.diagnostics.clone()
    }

    /// Levels of the last mixed block. `None` unless two sources are mixed.
    pub fn audio_levels(&self) -> Option<AudioLevels> {
        let inner = self.shared.inner.lock();
        let graph = inner.pipeline.as_ref()?.mixed.as_ref()?.graph()?;
        Some(graph.levels())
    }

    /// Open the encoder over the unified feed and start it. Valid in `Ready`.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut encoder = shared.encoder.lock();
        if shared.check("start", SessionState::can_start).is_none() {
            return;
        }
        let Some(tracks) = self.tracks() else {
            return;
        };

        let started = shared.open_encoder(&tracks).and_then(|mut session| {
            session.start()?;
            Ok(session)
        });
        match started {
            Ok(session) => {
                *encoder = Some(session);
                if shared.advance(SessionState::Ready, SessionState::Recording) {
                    log::info!("Recording started ({})", shared.options.mime_type);
                }
            }
            Err(e) => shared.control_failed("start", e),
        }
    }

    /// Suspend encoding. Valid in `Recording`.
    pub fn pause(&self) {
        let shared = &self.shared;
        let mut encoder = shared.encoder.lock();
        if shared.check("pause", SessionState::can_pause).is_none() {
            return;
        }
        let Some(session) = encoder.as_mut() else {
            return;
        };
        match session.pause() {
            Ok(()) => {
                shared.advance(SessionState::Recording, SessionState::Paused);
            }
            Err(e) => shared.control_failed("pause", e),
        }
    }

    /// Continue encoding. Valid in `Paused`.
    pub fn resume(&self) {
        let shared = &self.shared;
        let mut encoder = shared.encoder.lock();
        if shared.check("resume", SessionState::can_resume).is_none() {
            return;
        }
        let Some(session) = encoder.as_mut() else {
            return;
        };
        match session.resume() {
            Ok(()) => {
                shared.advance(SessionState::Paused, SessionState::Recording);
            }
            Err(e) => shared.control_failed("resume", e),
        }
    }

    /// Ask the encoder to flush and stop. `on_stop` follows once the last
    /// chunk has arrived; tracks are released after it. Valid in
    /// `Recording` or `Paused`.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut encoder = shared.encoder.lock();
        let Some(previous) = shared.check("stop", SessionState::can_stop) else {
            return;
        };
        let Some(session) = encoder.as_mut() else {
            return;
        };
        shared.advance(previous, SessionState::Stopping);
        if let Err(e) = session.stop() {
            shared.advance(SessionState::Stopping, previous);
            shared.control_failed("stop", e);
        }
    }

    /// Silence the audio sources. Valid in `Recording` or `Paused`.
    pub fn mute(&self) {
        self.set_muted(true);
    }

    pub fn unmute(&self) {
        self.set_muted(false);
    }

    fn set_muted(&self, muted: bool) {
        let operation = if muted { "mute" } else { "unmute" };
        let mut inner = self.shared.inner.lock();
        if !inner.state.is_active() {
            log::warn!(
                "Ignoring control call: {}",
                CaptureError::invalid_transition(operation, inner.state)
            );
            return;
        }
        let Some(pipeline) = &inner.pipeline else {
            return;
        };
        for track in &pipeline.mix_inputs {
            track.set_enabled(!muted);
        }
        let count = pipeline.mix_inputs.len();
        inner.muted = muted;
        log::info!("{} {} audio source(s)", if muted { "Muted" } else { "Unmuted" }, count);
    }

    /// Block until the session has stopped or failed and every track is
    /// released. Returns `false` on timeout. Must not be called from an
    /// event handler.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while !inner.finished {
            if self.shared.completed.wait_until(&mut inner, deadline).timed_out() {
                return inner.finished;
            }
        }
        true
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::track::{Resolution, TrackKind, TrackOrigin};
    use crate::session::test_support::{EventLog, MockDevices, MockEncoder, Recorded, UNSUPPORTED_TYPE};

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        session: RecordingSession,
        devices: Arc<MockDevices>,
        encoder: MockEncoder,
        log: Arc<EventLog>,
    }

    fn open(config: CaptureConfig) -> Fixture {
        let devices = Arc::new(MockDevices::new());
        let encoder = MockEncoder::new();
        let log = EventLog::new();
        let session = RecordingSession::acquire(
            config,
            EngineOptions::default(),
            devices.as_ref(),
            Arc::new(encoder.clone()),
            log.clone(),
        )
        .unwrap();
        Fixture {
            session,
            devices,
            encoder,
            log,
        }
    }

    fn display_config() -> CaptureConfig {
        CaptureConfig {
            use_camera: false,
            use_microphone: true,
            use_system_audio: true,
            use_watermark: false,
            camera_only: false,
        }
    }

    fn combined_config() -> CaptureConfig {
        CaptureConfig {
            use_camera: true,
            ..display_config()
        }
    }

    fn wait_for(log: &EventLog, event: Recorded) {
        assert!(
            log.wait_until(WAIT, |events| events.contains(&event)),
            "timed out waiting for {:?}",
            event
        );
    }

    #[test]
    fn display_session_records_and_releases_everything() {
        let f = open(display_config());
        assert_eq!(f.session.state(), SessionState::Ready);

        f.session.start();
        f.encoder.emit_data(b"one");
        f.encoder.emit_data(b"two");
        f.session.stop();
        assert!(f.session.wait_for_completion(WAIT));

        let events = f.log.events();
        assert_eq!(
            events[..5],
            [
                Recorded::Media {
                    video: TrackOrigin::Display,
                    audio: Some(TrackOrigin::Display),
                },
                Recorded::Start,
                Recorded::Data(b"one".to_vec()),
                Recorded::Data(b"two".to_vec()),
                Recorded::Data(b"tail".to_vec()),
            ]
        );
        let artifacts = f.log.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert!(matches!(events.last(), Some(Recorded::Stop(_))));

        let artifact = &artifacts[0];
        assert_eq!(artifact.payload, b"onetwotail");
        assert_eq!(artifact.mime_type, "video/webm");
        assert_eq!(artifact.chunk_count, 3);
        assert_eq!(f.session.state(), SessionState::Stopped);
        assert_eq!(f.devices.granted_tracks(), 2);
        assert_eq!(f.devices.released_tracks(), 2);
        assert!(f.session.tracks().is_none());
    }

    #[test]
    fn data_events_reconstruct_the_artifact() {
        let f = open(display_config());
        f.session.start();
        for chunk in [&b"\x1aE\xdf\xa3"[..], b"cluster-1", b"", b"cluster-2"] {
            f.encoder.emit_data(chunk);
        }
        f.session.stop();
        assert!(f.session.wait_for_completion(WAIT));

        let streamed: Vec<u8> = f.log.data().concat();
        assert_eq!(f.log.artifacts()[0].payload, streamed);
        assert_eq!(f.session.diagnostics().empty_chunks_dropped, 1);
        assert_eq!(f.session.diagnostics().chunks_received, 4);
    }

    #[test]
    fn combined_session_encodes_composite_and_mix() {
        let f = open(combined_config());
        f.session.start();

        let opened = f.encoder.opened_tracks().unwrap();
        assert_eq!(opened.video_track_count(), 1);
        assert_eq!(opened.audio_track_count(), 1);
        assert_eq!(opened.video().origin(), TrackOrigin::Composite);
        assert_eq!(opened.video().resolution(), Some(Resolution::new(1280, 720)));
        assert_eq!(opened.audio().unwrap().origin(), TrackOrigin::Mix);
        assert_eq!(f.devices.granted_tracks(), 4);
        wait_for(
            &f.log,
            Recorded::Media {
                video: TrackOrigin::Composite,
                audio: Some(TrackOrigin::Mix),
            },
        );

        f.session.stop();
        assert!(f.session.wait_for_completion(WAIT));
        assert_eq!(f.devices.released_tracks(), 4);
        assert!(opened.video().is_released());
        assert!(opened.audio().unwrap().is_released());
        assert!(f.session.diagnostics().compositor_ticks >= 1);
    }

    #[test]
    fn no_audio_when_nothing_is_enabled() {
        let f = open(CaptureConfig {
            use_microphone: false,
            use_system_audio: false,
            ..display_config()
        });

        let tracks = f.session.tracks().unwrap();
        assert_eq!(tracks.video_track_count(), 1);
        assert_eq!(tracks.audio_track_count(), 0);
        assert!(f.session.audio_levels().is_none());
    }

    #[test]
    fn every_config_yields_one_video_and_at_most_one_audio() {
        for bits in 0u8..16 {
            let config = CaptureConfig {
                use_camera: bits & 1 != 0,
                use_microphone: bits & 2 != 0,
                use_system_audio: bits & 4 != 0,
                use_watermark: false,
                camera_only: bits & 8 != 0,
            };
            let expect_audio = match config.mode() {
                CaptureMode::DisplayOnly | CaptureMode::CameraOnly => config.use_microphone,
                CaptureMode::Combined => config.use_microphone || config.use_system_audio,
            };

            let f = open(config);
            let tracks = f.session.tracks().unwrap();

            assert_eq!(tracks.video_track_count(), 1, "{:?}", config);
            assert!(tracks.audio_track_count() <= 1, "{:?}", config);
            assert_eq!(tracks.audio().is_some(), expect_audio, "{:?}", config);
            drop(f);
        }
    }

    #[test]
    fn camera_only_uses_camera_directly() {
        let f = open(CaptureConfig {
            camera_only: true,
            ..combined_config()
        });

        let tracks = f.session.tracks().unwrap();
        assert_eq!(f.session.mode(), CaptureMode::CameraOnly);
        assert_eq!(tracks.video().origin(), TrackOrigin::Camera);
        assert_eq!(tracks.audio().unwrap().origin(), TrackOrigin::Camera);
        assert_eq!(f.devices.display_requests(), 0);
    }

    #[test]
    fn start_before_ready_is_ignored() {
        let encoder = MockEncoder::new();
        let log = EventLog::new();
        let (events, _queue) = crossbeam_channel::unbounded();
        let session = RecordingSession::with_shared(Shared {
            config: display_config(),
            options: EngineOptions::default(),
            encoders: Arc::new(encoder.clone()),
            handlers: log.clone(),
            inner: Mutex::new(Inner::new()),
            completed: Condvar::new(),
            encoder: Mutex::new(None),
            events,
            queue: Mutex::new(None),
            dispatcher: Mutex::new(None),
        });

        session.start();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(encoder.sessions_opened(), 0);
        assert!(log.events().is_empty());
    }

    #[test]
    fn stop_twice_emits_one_stop_and_releases_once() {
        let f = open(combined_config());
        f.session.start();
        f.session.stop();
        f.session.stop();
        assert!(f.session.wait_for_completion(WAIT));
        f.session.stop();

        assert_eq!(f.log.artifacts().len(), 1);
        assert_eq!(f.devices.released_tracks(), f.devices.granted_tracks());
    }

    #[test]
    fn pause_and_resume_are_reported_in_order() {
        let f = open(display_config());
        f.session.start();
        f.session.pause();
        assert_eq!(f.session.state(), SessionState::Paused);
        f.session.pause();
        f.session.resume();
        assert_eq!(f.session.state(), SessionState::Recording);

        wait_for(&f.log, Recorded::Resume);
        let events = f.log.events();
        assert_eq!(events[1..], [Recorded::Start, Recorded::Pause, Recorded::Resume]);
    }

    #[test]
    fn mute_silences_sources_without_touching_encoding() {
        let f = open(display_config());
        f.session.mute();
        assert!(!f.session.is_muted(), "mute outside recording is ignored");

        f.session.start();
        let audio = Arc::clone(f.session.tracks().unwrap().audio().unwrap());
        assert!(audio.read_audio(4).iter().all(|s| *s != 0.0));

        f.session.mute();
        assert!(f.session.is_muted());
        assert_eq!(f.session.state(), SessionState::Recording);
        let muted = audio.read_audio(4);
        assert_eq!(muted.len(), 8);
        assert!(muted.iter().all(|s| *s == 0.0));

        f.session.unmute();
        assert!(!f.session.is_muted());
        assert!(audio.read_audio(4).iter().all(|s| *s != 0.0));
        assert_eq!(f.session.state(), SessionState::Recording);
    }

    #[test]
    fn mute_in_combined_mode_silences_the_mix() {
        let f = open(combined_config());
        f.session.start();
        let mixed = Arc::clone(f.session.tracks().unwrap().audio().unwrap());

        f.session.mute();
        let block = mixed.read_audio(256);
        assert!(!block.is_empty());
        assert!(block.iter().all(|s| *s == 0.0));
        assert!(f
            .devices
            .track(TrackOrigin::Camera, TrackKind::Audio)
            .is_some_and(|t| !t.is_enabled()));
    }

    #[test]
    fn rejected_control_call_is_reported_and_retryable() {
        let f = open(display_config());
        f.encoder.fail_next_start();

        f.session.start();
        wait_for(
            &f.log,
            Recorded::Error(CaptureError::EncodingFailure("start refused".into())),
        );
        assert_eq!(f.session.state(), SessionState::Ready);

        f.session.start();
        assert_eq!(f.session.state(), SessionState::Recording);
        wait_for(&f.log, Recorded::Start);

        f.encoder.fail_next_stop();
        f.session.stop();
        assert_eq!(f.session.state(), SessionState::Recording);
        f.session.stop();
        assert!(f.session.wait_for_completion(WAIT));
        assert_eq!(f.log.artifacts().len(), 1);
    }

    #[test]
    fn encoder_error_is_terminal() {
        let f = open(display_config());
        f.session.start();
        f.encoder
            .emit(EncoderEvent::Error(CaptureError::EncodingFailure("disk full".into())));
        assert!(f.session.wait_for_completion(WAIT));

        assert_eq!(f.session.state(), SessionState::Errored);
        assert_eq!(f.log.errors().len(), 1);
        assert_eq!(f.devices.released_tracks(), 2);

        f.session.stop();
        f.session.start();
        f.session.mute();
        assert!(f.log.artifacts().is_empty());
        assert_eq!(f.log.errors().len(), 1);
    }

    #[test]
    fn lost_device_fails_the_session() {
        let f = open(combined_config());
        f.session.start();

        f.devices
            .track(TrackOrigin::Display, TrackKind::Video)
            .unwrap()
            .end();
        assert!(f.session.wait_for_completion(WAIT));

        assert_eq!(f.session.state(), SessionState::Errored);
        assert_eq!(f.log.errors(), vec![CaptureError::DeviceUnavailable]);
        assert_eq!(f.devices.released_tracks(), 4);
        assert!(f.log.artifacts().is_empty());
    }

    #[test]
    fn unsupported_media_type_fails_before_acquiring() {
        let devices = MockDevices::new();
        let options = EngineOptions {
            mime_type: UNSUPPORTED_TYPE.into(),
            ..Default::default()
        };

        let result = RecordingSession::acquire(
            display_config(),
            options,
            &devices,
            Arc::new(MockEncoder::new()),
            EventLog::new(),
        );

        assert!(matches!(result, Err(CaptureError::EncodingFailure(_))));
        assert_eq!(devices.granted_tracks(), 0);
    }

    #[test]
    fn dropping_the_session_releases_tracks() {
        let f = open(combined_config());
        f.session.start();
        let clone = f.session.clone();
        drop(f.session);
        assert_eq!(f.devices.released_tracks(), 0);

        drop(clone);
        assert_eq!(f.devices.released_tracks(), 4);
        assert!(f.log.artifacts().is_empty());
    }

    #[test]
    fn duration_excludes_pauses() {
        let f = open(display_config());
        f.session.start();
        thread::sleep(Duration::from_millis(20));
        f.session.pause();
        let at_pause = f.session.duration();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(f.session.duration(), at_pause);

        f.session.stop();
        assert!(f.session.wait_for_completion(WAIT));
        let artifact = &f.log.artifacts()[0];
        assert!(artifact.duration_secs >= 0.02);
        assert!(artifact.duration_secs < at_pause.as_secs_f64() + 0.001);
    }

    #[test]
    fn clock_accumulates_pauses() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::default();
        clock.start(t0);
        clock.pause(t0 + Duration::from_secs(2));
        clock.resume(t0 + Duration::from_secs(5));

        assert_eq!(clock.elapsed(t0 + Duration::from_secs(6)), Duration::from_secs(3));
        clock.pause(t0 + Duration::from_secs(7));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(60)), Duration::from_secs(4));
    }
}
