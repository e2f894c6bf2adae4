use crate::models::track::{AudioFormat, Resolution, VideoFrame};

/// A live producer of video frames: a display surface, a camera, or the
/// compositor's frame buffer.
///
/// Implementations must be cheap to poll; consumers call `latest_frame`
/// once per tick from their own thread.
pub trait VideoSource: Send + Sync {
    /// Native resolution of the frames this source produces.
    fn resolution(&self) -> Resolution;

    /// The most recent frame, or `None` if nothing has been produced yet.
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Release the underlying device. Called at most once by `MediaTrack`.
    fn stop(&self);
}

/// A live producer of audio samples.
pub trait AudioSource: Send + Sync {
    /// Sample rate and channel count of the samples returned by `read`.
    fn format(&self) -> AudioFormat;

    /// Drain up to `max_frames` frames of interleaved f32 samples.
    ///
    /// Returns fewer frames (possibly none) if fewer are buffered.
    fn read(&self, max_frames: usize) -> Vec<f32>;

    /// Release the underlying device. Called at most once by `MediaTrack`.
    fn stop(&self);
}
