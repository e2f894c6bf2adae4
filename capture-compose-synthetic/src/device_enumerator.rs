//! Enumeration of the devices the synthetic backend exposes.
//!
//! Mirrors what a host would show in a device picker: one display surface,
//! one camera, one microphone, and the display's own audio when the user
//! shares it. Devices marked unavailable are not listed.

use std::fmt;

use crate::devices::DeviceProfile;
use crate::permissions::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Display,
    DisplayAudio,
    Camera,
    Microphone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_default: bool,
    /// Human-readable format, e.g. `1280x720 @ 30fps` or `48000 Hz x 2`.
    pub format: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14} {:<24} {}", format!("{:?}", self.kind), self.name, self.format)?;
        if self.is_default {
            f.write_str(" (default)")?;
        }
        Ok(())
    }
}

/// Lists synthetic devices for a given profile and permission set.
pub struct DeviceEnumerator<'a> {
    profile: &'a DeviceProfile,
    permissions: Permissions,
}

impl<'a> DeviceEnumerator<'a> {
    pub fn new(profile: &'a DeviceProfile, permissions: Permissions) -> Self {
        Self {
            profile,
            permissions,
        }
    }

    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        [
            DeviceKind::Display,
            DeviceKind::DisplayAudio,
            DeviceKind::Camera,
            DeviceKind::Microphone,
        ]
        .into_iter()
        .filter_map(|kind| self.default_device(kind))
        .collect()
    }

    /// The device a request of `kind` would open, if one is present.
    pub fn default_device(&self, kind: DeviceKind) -> Option<DeviceInfo> {
        let profile = self.profile;
        let (present, id, name, format) = match kind {
            DeviceKind::Display => (
                self.permissions.display.is_present(),
                "display-0",
                "Synthetic Display",
                format!("{} @ {}fps", profile.display_resolution, profile.frame_rate),
            ),
            DeviceKind::DisplayAudio => (
                self.permissions.display.is_present() && self.permissions.share_display_audio,
                "display-0-audio",
                "Synthetic Display Audio",
                format!(
                    "{} Hz x {}",
                    profile.display_audio.sample_rate, profile.display_audio.channels
                ),
            ),
            DeviceKind::Camera => (
                self.permissions.camera.is_present(),
                "camera-0",
                "Synthetic Camera",
                format!("any resolution @ {}fps", profile.frame_rate),
            ),
            DeviceKind::Microphone => (
                self.permissions.microphone.is_present(),
                "microphone-0",
                "Synthetic Microphone",
                format!(
                    "{} Hz x {}",
                    profile.microphone.sample_rate, profile.microphone.channels
                ),
            ),
        };
        present.then(|| DeviceInfo {
            id: id.into(),
            name: name.into(),
            kind,
            is_default: true,
            format,
        })
    }
}
