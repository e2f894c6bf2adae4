use crate::models::artifact::Artifact;
use crate::models::error::CaptureError;
use crate::models::track::UnifiedTrackSet;

/// Observer for recording session notifications.
///
/// Every method has an empty default so hosts implement only what they
/// need. Calls arrive on the session's event thread, one at a time, in the
/// order the underlying events occurred. Handlers may call back into the
/// session (for example `stop` from `on_data`).
pub trait SessionEvents: Send + Sync {
    /// The unified feed is ready for preview. Delivered before anything else.
    fn on_media(&self, _tracks: &UnifiedTrackSet) {}

    fn on_start(&self) {}

    fn on_pause(&self) {}

    fn on_resume(&self) {}

    /// A non-empty encoded chunk was appended to the session's chunk sequence.
    fn on_data(&self, _chunk: &[u8]) {}

    /// Recording finished. Last event of a successful session.
    fn on_stop(&self, _artifact: &Artifact) {}

    fn on_error(&self, _error: &CaptureError) {}
}

/// Handler set that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}
