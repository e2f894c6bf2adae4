//! Generated video for the synthetic display and camera.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use capture_compose_core::{Resolution, VideoFrame, VideoSource};

/// A solid background crossed by a white bar that advances one step per
/// frame, so consecutive frames differ and motion is visible.
pub struct TestPatternSource {
    resolution: Resolution,
    background: [u8; 4],
    frame_interval: Duration,
    started: Instant,
    cached: Mutex<Option<(u64, VideoFrame)>>,
    frames_generated: AtomicU64,
    stopped: AtomicBool,
}

impl TestPatternSource {
    pub fn new(resolution: Resolution, background: [u8; 4], frame_rate: u32) -> Self {
        Self {
            resolution,
            background,
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            started: Instant::now(),
            cached: Mutex::new(None),
            frames_generated: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn frames_generated(&self) -> u64 {
        self.frames_generated.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn frame_index(&self) -> u64 {
        (self.started.elapsed().as_secs_f64() / self.frame_interval.as_secs_f64()) as u64
    }
}

impl VideoSource for TestPatternSource {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        if self.is_stopped() || self.resolution.is_empty() {
            return None;
        }
        let index = self.frame_index();
        let mut cached = self.cached.lock();
        if let Some((cached_index, frame)) = cached.as_ref() {
            if *cached_index == index {
                return Some(frame.clone());
            }
        }
        let frame = render_pattern(self.resolution, self.background, index);
        self.frames_generated.fetch_add(1, Ordering::SeqCst);
        *cached = Some((index, frame.clone()));
        Some(frame)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cached.lock().take();
    }
}

/// Draw frame `index` of the pattern.
pub fn render_pattern(resolution: Resolution, background: [u8; 4], index: u64) -> VideoFrame {
    let width = resolution.width as usize;
    let bar_width = (width / 16).max(1);
    let bar_x = (index as usize * bar_width) % width;

    let mut row = Vec::with_capacity(width * VideoFrame::BYTES_PER_PIXEL);
    for x in 0..width {
        if (bar_x..bar_x + bar_width).contains(&x) {
            row.extend_from_slice(&[255, 255, 255, 255]);
        } else {
            row.extend_from_slice(&background);
        }
    }

    let mut pixels = Vec::with_capacity(resolution.pixel_count() * VideoFrame::BYTES_PER_PIXEL);
    for _ in 0..resolution.height {
        pixels.extend_from_slice(&row);
    }
    VideoFrame::new(resolution, pixels).unwrap_or_else(|| VideoFrame::black(resolution))
}
