use std::ops::ControlFlow;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::models::error::CaptureError;
use crate::models::track::UnifiedTrackSet;
use crate::traits::encoder::EncoderEvent;

/// Everything that reaches a session's event thread.
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    /// The unified feed is assembled. Always queued first.
    Media(UnifiedTrackSet),
    Encoder(EncoderEvent),
    /// The platform ended a raw track on its own.
    DeviceLost { label: String },
    /// A control call failed; reported without changing state.
    ControlFailed(CaptureError),
    Shutdown,
}

/// Spawn the thread that drains `queue` in order.
///
/// `handle` runs once per event and never concurrently with itself. The
/// thread exits when `handle` breaks or every sender is gone.
pub(crate) fn spawn<F>(
    name: &str,
    queue: Receiver<SessionEvent>,
    mut handle: F,
) -> Result<JoinHandle<()>, CaptureError>
where
    F: FnMut(SessionEvent) -> ControlFlow<()> + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let mut delivered = 0u64;
            for event in queue.iter() {
                delivered += 1;
                if handle(event).is_break() {
                    break;
                }
            }
            log::debug!("Event dispatcher exiting after {} events", delivered);
        })
        .map_err(|e| CaptureError::Unknown(format!("failed to spawn event thread: {}", e)))
}
