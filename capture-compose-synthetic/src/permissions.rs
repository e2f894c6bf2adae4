//! Simulated platform permission prompts.
//!
//! Each synthetic device answers requests according to a fixed
//! [`PermissionState`], so hosts and tests can exercise the refusal paths a
//! real permission prompt would produce.

use std::fmt;
use std::str::FromStr;

use capture_compose_core::CaptureError;

/// How the simulated user answers a capture prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    Granted,
    /// The user declined the prompt.
    Denied,
    /// No such device is attached.
    Unavailable,
}

impl PermissionState {
    pub fn check(self) -> Result<(), CaptureError> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied => Err(CaptureError::PermissionDenied),
            Self::Unavailable => Err(CaptureError::DeviceUnavailable),
        }
    }

    pub fn is_present(self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Unavailable => "unavailable",
        })
    }
}

impl FromStr for PermissionState {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(CaptureError::ConfigurationFailed(format!(
                "unknown permission state '{}'",
                other
            ))),
        }
    }
}

/// Answers for every prompt the synthetic backend can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub display: PermissionState,
    pub camera: PermissionState,
    pub microphone: PermissionState,
    /// Whether the user ticks "share audio" when picking a surface.
    pub share_display_audio: bool,
}

impl Permissions {
    pub fn all_granted() -> Self {
        Self {
            share_display_audio: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_map_to_capture_errors() {
        assert!(PermissionState::Granted.check().is_ok());
        assert_eq!(PermissionState::Denied.check(), Err(CaptureError::PermissionDenied));
        assert_eq!(
            PermissionState::Unavailable.check(),
            Err(CaptureError::DeviceUnavailable)
        );
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Denied".parse::<PermissionState>().unwrap(), PermissionState::Denied);
        assert_eq!(
            "unavailable".parse::<PermissionState>().unwrap(),
            PermissionState::Unavailable
        );
        assert!("maybe".parse::<PermissionState>().is_err());
    }

    #[test]
    fn all_granted_shares_display_audio() {
        let permissions = Permissions::all_granted();
        assert!(permissions.share_display_audio);
        assert_eq!(permissions.camera, PermissionState::Granted);
    }
}
