//! Incremental encoder writing the [`crate::container`] format.
//!
//! A worker samples the unified track set once per frame interval while
//! recording and appends video and audio records to a pending buffer. The
//! buffer is emitted as a data chunk every timeslice, and whatever remains
//! is flushed on stop just before `Stopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use capture_compose_core::{
    CaptureError, EncoderEvent, EncoderEventCallback, EncoderOptions, EncodingSession, MediaEncoder,
    Resolution, UnifiedTrackSet,
};

use crate::container::{self, StreamHeader, CONTAINER_MIME};

/// Encoder backend for the synthetic device set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl MediaEncoder for FrameEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case(CONTAINER_MIME)
    }

    fn open(
        &self,
        tracks: &UnifiedTrackSet,
        options: &EncoderOptions,
        events: EncoderEventCallback,
    ) -> Result<Box<dyn EncodingSession>, CaptureError> {
        if !self.is_type_supported(&options.mime_type) {
            return Err(CaptureError::EncodingFailure(format!(
                "unsupported mime type '{}'",
                options.mime_type
            )));
        }
        if options.frame_rate == 0 {
            return Err(CaptureError::EncodingFailure("frame rate must be positive".into()));
        }
        log::debug!(
            "Opening frame encoder: {} video, {} audio, timeslice {:?}",
            tracks.video_track_count(),
            tracks.audio_track_count(),
            options.timeslice_ms
        );
        Ok(Box::new(FrameSession {
            shared: Arc::new(SessionShared {
                tracks: tracks.clone(),
                options: options.clone(),
                events,
                writer: Mutex::new(Writer::default()),
                running: AtomicBool::new(false),
            }),
            worker: None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
}

#[derive(Default)]
struct Writer {
    phase: Phase,
    pending: Vec<u8>,
    recorded: Duration,
    segment_start: Option<Instant>,
    last_flush: Option<Instant>,
}

impl Writer {
    fn elapsed(&self) -> Duration {
        self.recorded + self.segment_start.map(|s| s.elapsed()).unwrap_or_default()
    }
}

struct SessionShared {
    tracks: UnifiedTrackSet,
    options: EncoderOptions,
    events: EncoderEventCallback,
    writer: Mutex<Writer>,
    running: AtomicBool,
}

impl SessionShared {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.options.frame_rate.max(1) as f64)
    }

    /// Enough frames to drain a real-time source several ticks over.
    fn audio_budget(&self) -> usize {
        self.tracks
            .audio()
            .and_then(|t| t.audio_format())
            .map(|f| (f.sample_rate * self.frame_interval().as_secs_f64() * 4.0).ceil() as usize)
            .unwrap_or(0)
    }

    fn drain_audio(&self) {
        if let Some(audio) = self.tracks.audio() {
            let _ = audio.read_audio(self.audio_budget());
        }
    }

    fn header(&self) -> StreamHeader {
        let format = self.tracks.audio().and_then(|t| t.audio_format());
        StreamHeader {
            resolution: self
                .tracks
                .video()
                .resolution()
                .unwrap_or_else(|| Resolution::new(0, 0)),
            frame_rate: self.options.frame_rate,
            sample_rate: format.map(|f| f.sample_rate.round() as u32).unwrap_or(0),
            channels: format.map(|f| f.channels).unwrap_or(0),
        }
    }

    fn tick(&self) {
        let mut writer = self.writer.lock();
        match writer.phase {
            Phase::Recording => {}
            Phase::Paused => {
                self.drain_audio();
                return;
            }
            Phase::Idle | Phase::Stopped => return,
        }

        let timestamp_us = writer.elapsed().as_micros() as u64;
        if let Some(frame) = self.tracks.video().frame() {
            container::write_video(&mut writer.pending, timestamp_us, &frame);
        }
        if let Some(audio) = self.tracks.audio() {
            let channels = audio.audio_format().map(|f| f.channels).unwrap_or(0);
            let samples = audio.read_audio(self.audio_budget());
            if !samples.is_empty() {
                container::write_audio(&mut writer.pending, timestamp_us, channels, &samples);
            }
        }

        let Some(slice) = self.options.timeslice_ms.map(Duration::from_millis) else {
            return;
        };
        let due = writer.last_flush.map(|t| t.elapsed() >= slice).unwrap_or(true);
        if due && !writer.pending.is_empty() {
            let chunk = std::mem::take(&mut writer.pending);
            writer.last_flush = Some(Instant::now());
            (self.events)(EncoderEvent::Data(chunk));
        }
    }
}

/// One encoding run over a unified track set.
pub struct FrameSession {
    shared: Arc<SessionShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl FrameSession {
    fn halt_worker(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn rejected(operation: &str, phase: Phase) -> CaptureError {
    CaptureError::EncodingFailure(format!("cannot {} encoder while {:?}", operation, phase))
}

impl EncodingSession for FrameSession {
    fn start(&mut self) -> Result<(), CaptureError> {
        {
            let mut writer = self.shared.writer.lock();
            if writer.phase != Phase::Idle {
                return Err(rejected("start", writer.phase));
            }
            let header = self.shared.header();
            container::write_header(&mut writer.pending, &header);
            self.shared.drain_audio();
            writer.phase = Phase::Recording;
            writer.segment_start = Some(Instant::now());
            writer.last_flush = Some(Instant::now());
            (self.shared.events)(EncoderEvent::Started);
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let interval = shared.frame_interval();
        let handle = thread::Builder::new()
            .name("frame-encoder".into())
            .spawn(move || {
                log::debug!("Frame encoder worker started");
                while shared.running.load(Ordering::SeqCst) {
                    let tick_start = Instant::now();
                    shared.tick();
                    if let Some(rest) = interval.checked_sub(tick_start.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                log::debug!("Frame encoder worker exited");
            })
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                CaptureError::EncodingFailure(format!("failed to spawn encoder thread: {}", e))
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        let mut writer = self.shared.writer.lock();
        if writer.phase != Phase::Recording {
            return Err(rejected("pause", writer.phase));
        }
        writer.recorded = writer.elapsed();
        writer.segment_start = None;
        writer.phase = Phase::Paused;
        (self.shared.events)(EncoderEvent::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        let mut writer = self.shared.writer.lock();
        if writer.phase != Phase::Paused {
            return Err(rejected("resume", writer.phase));
        }
        self.shared.drain_audio();
        writer.segment_start = Some(Instant::now());
        writer.phase = Phase::Recording;
        (self.shared.events)(EncoderEvent::Resumed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let phase = self.shared.writer.lock().phase;
        if !matches!(phase, Phase::Recording | Phase::Paused) {
            return Err(rejected("stop", phase));
        }
        self.halt_worker();

        let mut writer = self.shared.writer.lock();
        writer.recorded = writer.elapsed();
        writer.segment_start = None;
        writer.phase = Phase::Stopped;
        let tail = std::mem::take(&mut writer.pending);
        if !tail.is_empty() {
            (self.shared.events)(EncoderEvent::Data(tail));
        }
        (self.shared.events)(EncoderEvent::Stopped);
        log::debug!("Frame encoder stopped after {:?}", writer.recorded);
        Ok(())
    }
}

impl Drop for FrameSession {
    fn drop(&mut self) {
        self.halt_worker();
    }
}
