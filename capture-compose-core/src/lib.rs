//! # capture-compose-core
//!
//! Platform-agnostic capture-and-compose recording engine.
//!
//! Acquires a display surface and/or a camera, fuses them into one video
//! track and one audio track, drives an incremental encoder over the result
//! and hands back a single artifact. Platform backends implement
//! `MediaDevices`, `MediaEncoder` and `ArtifactExporter` and plug into
//! `CaptureEngine`.
//!
//! ## Architecture
//!
//! ```text
//! capture-compose-core (this crate)
//! ├── traits/       ← MediaDevices, VideoSource, AudioSource, MediaEncoder, SessionEvents, ArtifactExporter
//! ├── models/       ← CaptureConfig, EngineOptions, MediaTrack, Artifact, SessionState, CaptureError
//! ├── processing/   ← FrameCompositor, AudioMixer, RingBuffer
//! ├── session/      ← SourceAcquirer, RecordingSession, CaptureEngine
//! └── storage/      ← metadata sidecar
//! ```
//!
//! Data flow:
//!
//! ```text
//! [display] ─┬──────────────→ [FrameCompositor] ─→ video ─┐
//! [camera]  ─┘ (combined)                                  ├→ [MediaEncoder] → chunks → Artifact
//! [display audio] ─┬─→ [AudioMixer] ─────────→ audio ─────┘
//! [microphone]    ─┘
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::artifact::{Artifact, ArtifactMetadata, ArtifactTrack, ChunkSequence};
pub use models::config::{CaptureConfig, CaptureMode, EngineOptions};
pub use models::diagnostics::SessionDiagnostics;
pub use models::error::CaptureError;
pub use models::state::SessionState;
pub use models::track::{
    AudioFormat, MediaTrack, Resolution, TrackKind, TrackOrigin, TrackSet, UnifiedTrackSet, VideoFrame,
};
pub use processing::audio_mixer::{AudioLevels, AudioMixGraph, AudioMixer, MixedAudio};
pub use processing::frame_compositor::{overlay_geometry, CompositorSettings, FrameCompositor, OverlayRect};
pub use processing::ring_buffer::RingBuffer;
pub use session::acquirer::{AcquiredSources, SourceAcquirer};
pub use session::controller::RecordingSession;
pub use session::engine::{CaptureEngine, PendingSession};
pub use traits::encoder::{EncoderEvent, EncoderEventCallback, EncoderOptions, EncodingSession, MediaEncoder};
pub use traits::exporter::ArtifactExporter;
pub use traits::media_devices::{CameraRequest, DisplayRequest, MediaDevices};
pub use traits::session_events::{NoopEvents, SessionEvents};
pub use traits::track_source::{AudioSource, VideoSource};
