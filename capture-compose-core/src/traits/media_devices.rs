use crate::models::error::CaptureError;
use crate::models::track::{Resolution, TrackSet};

/// Parameters for a display-surface capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRequest {
    /// Ask for the surface's audio. The user may still decline it at the
    /// platform prompt, in which case the returned set has no audio track.
    pub audio: bool,
}

/// Parameters for a personal-camera capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub resolution: Resolution,
    /// Also open the microphone.
    pub audio: bool,
}

/// Platform access to capturable devices.
///
/// Implemented by platform backends (browser bridge, OS capture APIs, the
/// synthetic backend). Each request may block for as long as the platform
/// needs, including waiting on a user permission prompt. A granted set is
/// live immediately: capture starts at acquisition, not at record time.
pub trait MediaDevices: Send + Sync {
    /// Ask the user to pick a display surface. Video is always requested.
    ///
    /// Fails with `PermissionDenied` if the user declines, or
    /// `DeviceUnavailable` if nothing can be captured.
    fn request_display(&self, request: &DisplayRequest) -> Result<TrackSet, CaptureError>;

    /// Open the personal camera (and optionally the microphone).
    fn request_camera(&self, request: &CameraRequest) -> Result<TrackSet, CaptureError>;
}
