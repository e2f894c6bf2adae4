use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use capture_compose_core::{
    AudioFormat, AudioSource, CameraRequest, CaptureError, DisplayRequest, MediaDevices, MediaTrack,
    Resolution, TrackKind, TrackOrigin, TrackSet, VideoFrame, VideoSource,
};

use crate::device_enumerator::{DeviceEnumerator, DeviceKind};
use crate::pattern::TestPatternSource;
use crate::permissions::Permissions;
use crate::tone::ToneSource;

const DISPLAY_BACKGROUND: [u8; 4] = [20, 40, 120, 255];
const CAMERA_BACKGROUND: [u8; 4] = [30, 160, 60, 255];

/// What the synthetic hardware looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub display_resolution: Resolution,
    pub frame_rate: u32,
    pub display_audio: AudioFormat,
    pub microphone: AudioFormat,
    pub display_tone_hz: f64,
    pub microphone_tone_hz: f64,
    pub amplitude: f32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            display_resolution: Resolution::new(1280, 720),
            frame_rate: 30,
            display_audio: AudioFormat::stereo(48000.0),
            microphone: AudioFormat::new(44100.0, 1),
            display_tone_hz: 440.0,
            microphone_tone_hz: 660.0,
            amplitude: 0.25,
        }
    }
}

/// Counts releases of the wrapped source.
struct Released<S> {
    inner: S,
    counter: Arc<AtomicUsize>,
}

impl<S: VideoSource> VideoSource for Released<S> {
    fn resolution(&self) -> Resolution {
        self.inner.resolution()
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.inner.latest_frame()
    }

    fn stop(&self) {
        self.inner.stop();
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl<S: AudioSource> AudioSource for Released<S> {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn read(&self, max_frames: usize) -> Vec<f32> {
        self.inner.read(max_frames)
    }

    fn stop(&self) {
        self.inner.stop();
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Software media devices: a test-pattern display and camera with sine-tone
/// audio, answering permission prompts from a fixed [`Permissions`] set.
pub struct SyntheticDevices {
    profile: DeviceProfile,
    permissions: Mutex<Permissions>,
    granted: AtomicUsize,
    released: Arc<AtomicUsize>,
    tracks: Mutex<Vec<Arc<MediaTrack>>>,
}

impl SyntheticDevices {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            permissions: Mutex::new(Permissions::all_granted()),
            granted: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            tracks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_permissions(self, permissions: Permissions) -> Self {
        *self.permissions.lock() = permissions;
        self
    }

    pub fn set_permissions(&self, permissions: Permissions) {
        *self.permissions.lock() = permissions;
    }

    pub fn permissions(&self) -> Permissions {
        *self.permissions.lock()
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Tracks granted so far.
    pub fn granted_tracks(&self) -> usize {
        self.granted.load(Ordering::SeqCst)
    }

    /// Tracks whose device has been released.
    pub fn released_tracks(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Granted tracks that still hold their device.
    pub fn live_tracks(&self) -> Vec<Arc<MediaTrack>> {
        self.tracks
            .lock()
            .iter()
            .filter(|t| !t.is_released())
            .cloned()
            .collect()
    }

    /// Simulate the device going away (sharing stopped, camera unplugged).
    /// Returns how many live tracks were ended.
    pub fn disconnect(&self, kind: DeviceKind) -> usize {
        let (origin, track_kind) = match kind {
            DeviceKind::Display => (TrackOrigin::Display, TrackKind::Video),
            DeviceKind::DisplayAudio => (TrackOrigin::Display, TrackKind::Audio),
            DeviceKind::Camera => (TrackOrigin::Camera, TrackKind::Video),
            DeviceKind::Microphone => (TrackOrigin::Camera, TrackKind::Audio),
        };
        let ended: Vec<_> = self
            .live_tracks()
            .into_iter()
            .filter(|t| t.origin() == origin && t.kind() == track_kind && !t.has_ended())
            .collect();
        log::info!("Disconnecting {:?} ({} live track(s))", kind, ended.len());
        for track in &ended {
            track.end();
        }
        ended.len()
    }

    fn label(&self, kind: DeviceKind) -> String {
        DeviceEnumerator::new(&self.profile, self.permissions())
            .default_device(kind)
            .map(|d| d.name)
            .unwrap_or_else(|| format!("{:?}", kind))
    }

    fn video_track(&self, origin: TrackOrigin, kind: DeviceKind, source: TestPatternSource) -> Arc<MediaTrack> {
        let track = MediaTrack::video(
            origin,
            self.label(kind),
            Released {
                inner: source,
                counter: Arc::clone(&self.released),
            },
        );
        self.register(track)
    }

    fn audio_track(
        &self,
        origin: TrackOrigin,
        kind: DeviceKind,
        format: AudioFormat,
        frequency: f64,
    ) -> Result<Arc<MediaTrack>, CaptureError> {
        let source = ToneSource::start(format, frequency, self.profile.amplitude)?;
        let track = MediaTrack::audio(
            origin,
            self.label(kind),
            Released {
                inner: source,
                counter: Arc::clone(&self.released),
            },
        );
        Ok(self.register(track))
    }

    fn register(&self, track: Arc<MediaTrack>) -> Arc<MediaTrack> {
        self.granted.fetch_add(1, Ordering::SeqCst);
        self.tracks.lock().push(Arc::clone(&track));
        track
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new(DeviceProfile::default())
    }
}

impl MediaDevices for SyntheticDevices {
    fn request_display(&self, request: &DisplayRequest) -> Result<TrackSet, CaptureError> {
        let permissions = self.permissions();
        permissions.display.check()?;

        let video = self.video_track(
            TrackOrigin::Display,
            DeviceKind::Display,
            TestPatternSource::new(
                self.profile.display_resolution,
                DISPLAY_BACKGROUND,
                self.profile.frame_rate,
            ),
        );
        let audio = if request.audio && permissions.share_display_audio {
            let track = self.audio_track(
                TrackOrigin::Display,
                DeviceKind::DisplayAudio,
                self.profile.display_audio,
                self.profile.display_tone_hz,
            );
            match track {
                Ok(track) => Some(track),
                Err(e) => {
                    video.stop();
                    return Err(e);
                }
            }
        } else {
            None
        };
        log::info!(
            "Granted display {} (audio: {})",
            self.profile.display_resolution,
            audio.is_some()
        );
        Ok(TrackSet::new(Some(video), audio))
    }

    fn request_camera(&self, request: &CameraRequest) -> Result<TrackSet, CaptureError> {
        let permissions = self.permissions();
        permissions.camera.check()?;
        if request.audio {
            permissions.microphone.check()?;
        }

        let video = self.video_track(
            TrackOrigin::Camera,
            DeviceKind::Camera,
            TestPatternSource::new(request.resolution, CAMERA_BACKGROUND, self.profile.frame_rate),
        );
        let audio = if request.audio {
            let track = self.audio_track(
                TrackOrigin::Camera,
                DeviceKind::Microphone,
                self.profile.microphone,
                self.profile.microphone_tone_hz,
            );
            match track {
                Ok(track) => Some(track),
                Err(e) => {
                    video.stop();
                    return Err(e);
                }
            }
        } else {
            None
        };
        log::info!(
            "Granted camera {} (microphone: {})",
            request.resolution,
            audio.is_some()
        );
        Ok(TrackSet::new(Some(video), audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionState;

    fn small() -> DeviceProfile {
        DeviceProfile {
            display_resolution: Resolution::new(64, 36),
            ..Default::default()
        }
    }

    #[test]
    fn display_request_honours_audio_flag_and_share_choice() {
        let devices = SyntheticDevices::new(small());

        let with_audio = devices.request_display(&DisplayRequest { audio: true }).unwrap();
        assert!(with_audio.audio.is_some());

        let without = devices.request_display(&DisplayRequest { audio: false }).unwrap();
        assert!(without.audio.is_none());

        devices.set_permissions(Permissions {
            share_display_audio: false,
            ..Permissions::all_granted()
        });
        let declined = devices.request_display(&DisplayRequest { audio: true }).unwrap();
        assert!(declined.audio.is_none());
        assert_eq!(devices.granted_tracks(), 4);
    }

    #[test]
    fn camera_uses_requested_resolution_and_microphone() {
        let devices = SyntheticDevices::new(small());
        let set = devices
            .request_camera(&CameraRequest {
                resolution: Resolution::new(640, 480),
                audio: true,
            })
            .unwrap();

        let video = set.video.unwrap();
        assert_eq!(video.resolution(), Some(Resolution::new(640, 480)));
        assert_eq!(video.label(), "Synthetic Camera");
        let audio = set.audio.unwrap();
        assert_eq!(audio.audio_format(), Some(AudioFormat::new(44100.0, 1)));
        assert_eq!(audio.label(), "Synthetic Microphone");
    }

    #[test]
    fn refusals_grant_nothing() {
        let devices = SyntheticDevices::new(small()).with_permissions(Permissions {
            display: PermissionState::Denied,
            microphone: PermissionState::Unavailable,
            ..Permissions::all_granted()
        });

        assert_eq!(
            devices.request_display(&DisplayRequest { audio: true }).unwrap_err(),
            CaptureError::PermissionDenied
        );
        let camera = devices.request_camera(&CameraRequest {
            resolution: Resolution::new(64, 48),
            audio: true,
        });
        assert_eq!(camera.unwrap_err(), CaptureError::DeviceUnavailable);
        assert_eq!(devices.granted_tracks(), 0);
    }

    #[test]
    fn release_is_counted_once_per_track() {
        let devices = SyntheticDevices::new(small());
        let set = devices.request_display(&DisplayRequest { audio: true }).unwrap();

        assert_eq!(set.stop_all(), 2);
        assert_eq!(set.stop_all(), 0);
        assert_eq!(devices.released_tracks(), 2);
        assert!(devices.live_tracks().is_empty());
    }

    #[test]
    fn disconnect_ends_matching_tracks() {
        let devices = SyntheticDevices::new(small());
        let set = devices.request_display(&DisplayRequest { audio: true }).unwrap();

        assert_eq!(devices.disconnect(DeviceKind::Display), 1);
        assert!(set.video.as_ref().unwrap().has_ended());
        assert!(!set.audio.as_ref().unwrap().has_ended());
        assert_eq!(devices.disconnect(DeviceKind::Display), 0);
    }
}
