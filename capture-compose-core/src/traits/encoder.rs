use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::track::UnifiedTrackSet;

/// Lifecycle and data notifications from an encoding session.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    Started,
    Paused,
    Resumed,
    /// A fragment of encoded output, in emission order.
    Data(Vec<u8>),
    /// The session flushed its last chunk and will emit nothing further.
    Stopped,
    Error(CaptureError),
}

/// Callback the encoder uses to report events.
///
/// May be invoked from any thread, including from inside the control call
/// that caused the event. It never blocks.
pub type EncoderEventCallback = Arc<dyn Fn(EncoderEvent) + Send + Sync + 'static>;

/// Options passed to the encoder when a session is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    pub mime_type: String,
    /// Emit a data chunk roughly this often while recording.
    pub timeslice_ms: Option<u64>,
    pub frame_rate: u32,
}

/// Factory for incremental encoding sessions over a unified track set.
pub trait MediaEncoder: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Prepare a session. Nothing is encoded until `start` is called.
    fn open(
        &self,
        tracks: &UnifiedTrackSet,
        options: &EncoderOptions,
        events: EncoderEventCallback,
    ) -> Result<Box<dyn EncodingSession>, CaptureError>;
}

/// A single incremental encoding run.
///
/// Control calls report success of the *request*; the matching
/// `EncoderEvent` follows through the callback. Dropping a session must stop
/// it without emitting further events.
pub trait EncodingSession: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    fn pause(&mut self) -> Result<(), CaptureError>;

    fn resume(&mut self) -> Result<(), CaptureError>;

    /// Flush the final chunk, then emit `Stopped`.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
