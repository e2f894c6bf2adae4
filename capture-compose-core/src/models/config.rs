use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// What the caller asked to record. Fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Overlay the personal camera onto the display capture.
    pub use_camera: bool,

    /// Capture microphone audio. In display-only mode this gates the audio
    /// requested alongside the display surface.
    pub use_microphone: bool,

    /// Capture the display surface's own audio when the camera is in use.
    pub use_system_audio: bool,

    /// Carried for the host; the engine does not draw a watermark.
    pub use_watermark: bool,

    /// With `use_camera`, record the camera alone instead of compositing.
    pub camera_only: bool,
}

impl CaptureConfig {
    pub fn mode(&self) -> CaptureMode {
        match (self.use_camera, self.camera_only) {
            (false, _) => CaptureMode::DisplayOnly,
            (true, false) => CaptureMode::Combined,
            (true, true) => CaptureMode::CameraOnly,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            use_camera: false,
            use_microphone: true,
            use_system_audio: true,
            use_watermark: false,
            camera_only: false,
        }
    }
}

/// Which sources a session acquires, resolved once from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    DisplayOnly,
    CameraOnly,
    Combined,
}

impl CaptureMode {
    pub fn wants_display(&self) -> bool {
        matches!(self, Self::DisplayOnly | Self::Combined)
    }

    pub fn wants_camera(&self) -> bool {
        matches!(self, Self::CameraOnly | Self::Combined)
    }
}

/// Engine tunables shared by every session an engine creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Output frame rate of the composited video track (default: 30).
    pub frame_rate: u32,

    /// Camera preview resolution requested from the platform (default: 640x480).
    pub camera_width: u32,
    pub camera_height: u32,

    /// Camera overlay width is the composite width divided by this (default: 8).
    pub overlay_divisor: u32,

    /// Distance of the overlay from the bottom and right edges (default: 20).
    pub overlay_margin: u32,

    /// Media type requested from the encoder and declared on the artifact.
    pub mime_type: String,

    /// Interval between encoder data chunks in milliseconds (None = one chunk at stop).
    pub timeslice_ms: Option<u64>,

    /// Sample rate of the mixed audio track in Hz (default: 48000).
    pub sample_rate: f64,
}

impl EngineOptions {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(1..=240).contains(&self.frame_rate) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported frame rate: {}",
                self.frame_rate
            )));
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "camera resolution must be non-zero".into(),
            ));
        }
        if self.overlay_divisor == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "overlay divisor must be positive".into(),
            ));
        }
        if self.mime_type.trim().is_empty() {
            return Err(CaptureError::ConfigurationFailed("mime type must not be empty".into()));
        }
        if self.timeslice_ms == Some(0) {
            return Err(CaptureError::ConfigurationFailed(
                "timeslice must be positive".into(),
            ));
        }
        if self.sample_rate <= 0.0 {
            return Err(CaptureError::ConfigurationFailed("sample rate must be positive".into()));
        }
        Ok(())
    }

    /// Parse options from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid engine options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Interval between compositor ticks.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            camera_width: 640,
            camera_height: 480,
            overlay_divisor: 8,
            overlay_margin: 20,
            mime_type: "video/webm".into(),
            timeslice_ms: Some(1000),
            sample_rate: 48000.0,
        }
    }
}
