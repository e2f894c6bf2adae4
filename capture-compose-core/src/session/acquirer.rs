use std::sync::Arc;

use crate::models::config::{CaptureConfig, CaptureMode, EngineOptions};
use crate::models::error::CaptureError;
use crate::models::track::{MediaTrack, Resolution, TrackKind, TrackSet};
use crate::traits::media_devices::{CameraRequest, DisplayRequest, MediaDevices};

/// Raw track sets granted by the platform for one session.
#[derive(Debug, Clone)]
pub struct AcquiredSources {
    pub mode: CaptureMode,
    pub display: Option<TrackSet>,
    pub camera: Option<TrackSet>,
}

impl AcquiredSources {
    pub fn display_video(&self) -> Option<&Arc<MediaTrack>> {
        self.display.as_ref().and_then(|s| s.video.as_ref())
    }

    pub fn display_audio(&self) -> Option<&Arc<MediaTrack>> {
        self.display.as_ref().and_then(|s| s.audio.as_ref())
    }

    pub fn camera_video(&self) -> Option<&Arc<MediaTrack>> {
        self.camera.as_ref().and_then(|s| s.video.as_ref())
    }

    pub fn camera_audio(&self) -> Option<&Arc<MediaTrack>> {
        self.camera.as_ref().and_then(|s| s.audio.as_ref())
    }

    /// Every raw track, display first.
    pub fn tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.display
            .iter()
            .chain(self.camera.iter())
            .flat_map(|set| set.tracks())
    }

    /// Release every raw track. Returns how many were released by this call.
    pub fn release(&self) -> usize {
        self.display.iter().chain(self.camera.iter()).map(|s| s.stop_all()).sum()
    }
}

/// Obtains the raw inputs a session needs. The capture mode is resolved
/// once, at construction.
#[derive(Debug, Clone)]
pub struct SourceAcquirer {
    mode: CaptureMode,
    display_request: Option<DisplayRequest>,
    camera_request: Option<CameraRequest>,
}

impl SourceAcquirer {
    pub fn new(config: &CaptureConfig, options: &EngineOptions) -> Self {
        let mode = config.mode();
        let camera_resolution = Resolution::new(options.camera_width, options.camera_height);
        let (display_request, camera_request) = match mode {
            CaptureMode::DisplayOnly => (
                Some(DisplayRequest {
                    audio: config.use_microphone,
                }),
                None,
            ),
            CaptureMode::CameraOnly => (
                None,
                Some(CameraRequest {
                    resolution: camera_resolution,
                    audio: config.use_microphone,
                }),
            ),
            CaptureMode::Combined => (
                Some(DisplayRequest {
                    audio: config.use_system_audio,
                }),
                Some(CameraRequest {
                    resolution: camera_resolution,
                    audio: config.use_microphone,
                }),
            ),
        };
        Self {
            mode,
            display_request,
            camera_request,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn display_request(&self) -> Option<DisplayRequest> {
        self.display_request
    }

    pub fn camera_request(&self) -> Option<CameraRequest> {
        self.camera_request
    }

    /// Request every source for the mode.
    ///
    /// Capture is live as soon as this returns. On failure nothing stays
    /// acquired: sets granted before the failing request are released.
    pub fn acquire(&self, devices: &dyn MediaDevices) -> Result<AcquiredSources, CaptureError> {
        let display = match &self.display_request {
            Some(request) => {
                log::info!("Requesting display surface (audio: {})", request.audio);
                let set = devices.request_display(request)?;
                Some(require_video(set, "display")?)
            }
            None => None,
        };

        let camera = match &self.camera_request {
            Some(request) => {
                log::info!(
                    "Requesting camera at {} (microphone: {})",
                    request.resolution,
                    request.audio
                );
                let granted = devices
                    .request_camera(request)
                    .and_then(|set| require_video(set, "camera"));
                match granted {
                    Ok(set) => Some(set),
                    Err(e) => {
                        if let Some(display) = &display {
                            let released = display.stop_all();
                            log::warn!(
                                "Camera request failed ({}), released {} display track(s)",
                                e,
                                released
                            );
                        }
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(AcquiredSources {
            mode: self.mode,
            display,
            camera,
        })
    }
}

/// A granted set must carry a video track of the right kind.
fn require_video(set: TrackSet, what: &str) -> Result<TrackSet, CaptureError> {
    let video_ok = set
        .video
        .as_ref()
        .is_some_and(|t| t.kind() == TrackKind::Video);
    let audio_ok = set.audio.as_ref().is_none_or(|t| t.kind() == TrackKind::Audio);
    if video_ok && audio_ok {
        return Ok(set);
    }
    log::error!("Platform granted a {} set without a usable video track", what);
    set.stop_all();
    Err(CaptureError::DeviceUnavailable)
}
