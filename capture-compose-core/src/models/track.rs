use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::traits::track_source::{AudioSource, VideoSource};

/// Pixel dimensions of a video source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One RGBA8 video frame, row-major, tightly packed.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub resolution: Resolution,
    pub pixels: Arc<[u8]>,
}

impl VideoFrame {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap a pixel buffer. Returns `None` if its length does not match the resolution.
    pub fn new(resolution: Resolution, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != resolution.pixel_count() * Self::BYTES_PER_PIXEL {
            return None;
        }
        Some(Self {
            resolution,
            pixels: pixels.into(),
        })
    }

    /// A frame filled with one colour.
    pub fn solid(resolution: Resolution, rgba: [u8; 4]) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(resolution.pixel_count() * Self::BYTES_PER_PIXEL)
            .collect();
        Self {
            resolution,
            pixels: pixels.into(),
        }
    }

    /// What a disabled video track shows.
    pub fn black(resolution: Resolution) -> Self {
        Self::solid(resolution, [0, 0, 0, 255])
    }

    /// Whether the pixel buffer matches the resolution. Frames built from
    /// the public fields rather than [`VideoFrame::new`] may not.
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.resolution.pixel_count() * Self::BYTES_PER_PIXEL
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = (y as usize * self.width() as usize + x as usize) * Self::BYTES_PER_PIXEL;
        let px = self.pixels.get(idx..idx + Self::BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Sample rate and channel layout of interleaved f32 audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: f64,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: f64, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn stereo(sample_rate: f64) -> Self {
        Self::new(sample_rate, 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Where a track's media comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOrigin {
    /// Display surface (screen, window or tab) and its audio.
    Display,
    /// Personal camera and its microphone.
    Camera,
    /// Synthetic video produced by the frame compositor.
    Composite,
    /// Synthetic audio produced by the audio mixer.
    Mix,
}

impl TrackOrigin {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Composite | Self::Mix)
    }
}

enum Source {
    Video(Box<dyn VideoSource>),
    Audio(Box<dyn AudioSource>),
}

/// Listener invoked when the platform ends a track on its own.
pub type TrackEndedListener = Box<dyn Fn(&MediaTrack) + Send + Sync + 'static>;

/// A single live or synthetic stream of video frames or audio samples.
///
/// Tracks are shared (`Arc`) between the component that reads them and the
/// session that owns them. Release is idempotent: the backing source is
/// stopped exactly once no matter how many callers invoke [`MediaTrack::stop`].
pub struct MediaTrack {
    id: String,
    label: String,
    origin: TrackOrigin,
    source: Source,
    enabled: AtomicBool,
    released: AtomicBool,
    ended: AtomicBool,
    ended_listeners: Mutex<Vec<TrackEndedListener>>,
}

impl MediaTrack {
    pub fn video(
        origin: TrackOrigin,
        label: impl Into<String>,
        source: impl VideoSource + 'static,
    ) -> Arc<Self> {
        Arc::new(Self::with_source(origin, label.into(), Source::Video(Box::new(source))))
    }

    pub fn audio(
        origin: TrackOrigin,
        label: impl Into<String>,
        source: impl AudioSource + 'static,
    ) -> Arc<Self> {
        Arc::new(Self::with_source(origin, label.into(), Source::Audio(Box::new(source))))
    }

    fn with_source(origin: TrackOrigin, label: String, source: Source) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label,
            origin,
            source,
            enabled: AtomicBool::new(true),
            released: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            ended_listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn kind(&self) -> TrackKind {
        match self.source {
            Source::Video(_) => TrackKind::Video,
            Source::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// A disabled track keeps flowing but carries silence (audio) or black (video).
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        !self.is_released() && !self.has_ended()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match &self.source {
            Source::Video(v) => Some(v.resolution()),
            Source::Audio(_) => None,
        }
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        match &self.source {
            Source::Audio(a) => Some(a.format()),
            Source::Video(_) => None,
        }
    }

    /// Current frame of a video track. `None` for audio tracks, dead tracks
    /// and frames whose buffer does not match their resolution.
    pub fn frame(&self) -> Option<VideoFrame> {
        let Source::Video(source) = &self.source else {
            return None;
        };
        if !self.is_live() {
            return None;
        }
        if !self.is_enabled() {
            return Some(VideoFrame::black(source.resolution()));
        }
        let frame = source.latest_frame()?;
        if !frame.is_well_formed() {
            log::debug!("Dropping malformed {} frame from '{}'", frame.resolution, self.label);
            return None;
        }
        Some(frame)
    }

    /// Drain up to `max_frames` interleaved frames from an audio track.
    ///
    /// A muted track still drains its source so that time keeps advancing,
    /// but every returned sample is zero.
    pub fn read_audio(&self, max_frames: usize) -> Vec<f32> {
        let Source::Audio(source) = &self.source else {
            return Vec::new();
        };
        if !self.is_live() {
            return Vec::new();
        }
        let mut samples = source.read(max_frames);
        if !self.is_enabled() {
            samples.iter_mut().for_each(|s| *s = 0.0);
        }
        samples
    }

    /// Release the backing device. Returns `true` only for the call that
    /// actually released it.
    pub fn stop(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        match &self.source {
            Source::Video(v) => v.stop(),
            Source::Audio(a) => a.stop(),
        }
        self.ended_listeners.lock().clear();
        log::debug!("Released {:?} track '{}' ({})", self.origin, self.label, self.id);
        true
    }

    /// Called by platform backends when the device goes away on its own.
    ///
    /// Notifies ended listeners once. Has no effect on a released track.
    pub fn end(&self) {
        let listeners = {
            let mut listeners = self.ended_listeners.lock();
            if self.is_released() || self.ended.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *listeners)
        };
        log::warn!("{:?} track '{}' ended by the platform", self.origin, self.label);
        for listener in &listeners {
            listener(self);
        }
    }

    /// Register for platform end. Runs `listener` at once if the track has
    /// already ended.
    pub fn on_ended(&self, listener: TrackEndedListener) {
        {
            let mut listeners = self.ended_listeners.lock();
            if !self.has_ended() {
                listeners.push(listener);
                return;
            }
        }
        listener(self);
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("origin", &self.origin)
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .field("released", &self.is_released())
            .field("ended", &self.has_ended())
            .finish()
    }
}

/// Zero-or-one video track plus zero-or-one audio track from one source.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    pub video: Option<Arc<MediaTrack>>,
    pub audio: Option<Arc<MediaTrack>>,
}

impl TrackSet {
    pub fn new(video: Option<Arc<MediaTrack>>, audio: Option<Arc<MediaTrack>>) -> Self {
        Self { video, audio }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.video.iter().chain(self.audio.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }

    /// Release every track. Returns how many were released by this call.
    pub fn stop_all(&self) -> usize {
        self.tracks().filter(|t| t.stop()).count()
    }
}

/// The single video + optional audio pair handed to the encoder.
#[derive(Debug, Clone)]
pub struct UnifiedTrackSet {
    video: Arc<MediaTrack>,
    audio: Option<Arc<MediaTrack>>,
}

impl UnifiedTrackSet {
    pub fn new(video: Arc<MediaTrack>, audio: Option<Arc<MediaTrack>>) -> Self {
        Self { video, audio }
    }

    pub fn video(&self) -> &Arc<MediaTrack> {
        &self.video
    }

    pub fn audio(&self) -> Option<&Arc<MediaTrack>> {
        self.audio.as_ref()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        std::iter::once(&self.video).chain(self.audio.iter())
    }

    pub fn video_track_count(&self) -> usize {
        self.tracks().filter(|t| t.kind() == TrackKind::Video).count()
    }

    pub fn audio_track_count(&self) -> usize {
        self.tracks().filter(|t| t.kind() == TrackKind::Audio).count()
    }
}
