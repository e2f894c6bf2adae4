//! Real-time picture-in-picture compositing of a camera over a display.
//!
//! A worker thread redraws a private frame buffer once per tick: the display
//! frame fills the buffer, then the camera frame is drawn scaled to one
//! eighth of the buffer width in the bottom-right corner. Each finished
//! buffer is published as the current frame of a synthetic video track.
//!
//! The worker lives exactly as long as the synthetic track: releasing the
//! track (or dropping the compositor) stops and joins it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::EngineOptions;
use crate::models::error::CaptureError;
use crate::models::track::{MediaTrack, Resolution, TrackKind, TrackOrigin, VideoFrame};
use crate::traits::track_source::VideoSource;

const BPP: usize = VideoFrame::BYTES_PER_PIXEL;

/// Tick rate and overlay placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorSettings {
    pub frame_rate: u32,
    pub overlay_divisor: u32,
    pub overlay_margin: u32,
}

impl CompositorSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self::from(&EngineOptions::default())
    }
}

impl From<&EngineOptions> for CompositorSettings {
    fn from(options: &EngineOptions) -> Self {
        Self {
            frame_rate: options.frame_rate,
            overlay_divisor: options.overlay_divisor,
            overlay_margin: options.overlay_margin,
        }
    }
}

/// Where the camera lands on the composite, in buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Camera overlay geometry for a buffer of `canvas` size.
///
/// Width is `canvas.width / divisor`, height keeps the camera's aspect
/// ratio, and the rectangle sits `margin` units from the right and bottom
/// edges.
pub fn overlay_geometry(canvas: Resolution, camera: Resolution, divisor: u32, margin: u32) -> OverlayRect {
    let width = canvas.width as f64 / divisor.max(1) as f64;
    let height = if camera.width == 0 {
        0.0
    } else {
        width * camera.height as f64 / camera.width as f64
    };
    OverlayRect {
        x: canvas.width as f64 - width - margin as f64,
        y: canvas.height as f64 - height - margin as f64,
        width,
        height,
    }
}

/// The compositor's drawing surface. Single writer, no history.
#[derive(Debug, Clone)]
pub struct CompositeFrameBuffer {
    resolution: Resolution,
    pixels: Vec<u8>,
}

impl CompositeFrameBuffer {
    /// A black buffer of the given size.
    pub fn new(resolution: Resolution) -> Self {
        let frame = VideoFrame::black(resolution);
        Self {
            resolution,
            pixels: frame.pixels.to_vec(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Draw `frame` stretched over the whole buffer.
    /// Frames whose buffer does not match their resolution are skipped.
    pub fn draw_fill(&mut self, frame: &VideoFrame) {
        if !frame.is_well_formed() {
            return;
        }
        if frame.resolution == self.resolution {
            self.pixels.copy_from_slice(&frame.pixels);
            return;
        }
        let full = OverlayRect {
            x: 0.0,
            y: 0.0,
            width: self.resolution.width as f64,
            height: self.resolution.height as f64,
        };
        self.draw_scaled(frame, &full);
    }

    /// Draw `frame` nearest-neighbour scaled into `rect`, clipped to the buffer.
    pub fn draw_scaled(&mut self, frame: &VideoFrame, rect: &OverlayRect) {
        let src_w = frame.width() as i64;
        let src_h = frame.height() as i64;
        let dst_w = rect.width.round() as i64;
        let dst_h = rect.height.round() as i64;
        if src_w == 0 || src_h == 0 || dst_w <= 0 || dst_h <= 0 || !frame.is_well_formed() {
            return;
        }

        let x0 = rect.x.round() as i64;
        let y0 = rect.y.round() as i64;
        let canvas_w = self.resolution.width as i64;
        let canvas_h = self.resolution.height as i64;

        for dy in 0..dst_h {
            let ty = y0 + dy;
            if ty < 0 || ty >= canvas_h {
                continue;
            }
            let sy = (dy * src_h / dst_h).min(src_h - 1);
            for dx in 0..dst_w {
                let tx = x0 + dx;
                if tx < 0 || tx >= canvas_w {
                    continue;
                }
                let sx = (dx * src_w / dst_w).min(src_w - 1);
                let src = ((sy * src_w + sx) as usize) * BPP;
                let dst = ((ty * canvas_w + tx) as usize) * BPP;
                self.pixels[dst..dst + BPP].copy_from_slice(&frame.pixels[src..src + BPP]);
            }
        }
    }

    pub fn to_frame(&self) -> VideoFrame {
        VideoFrame {
            resolution: self.resolution,
            pixels: self.pixels.as_slice().into(),
        }
    }
}

/// One compositing step: display underneath, camera overlay on top.
///
/// A source with no frame yet leaves the previous content in place.
pub fn draw_tick(
    buffer: &mut CompositeFrameBuffer,
    display: &MediaTrack,
    camera: &MediaTrack,
    settings: &CompositorSettings,
) {
    if let Some(frame) = display.frame() {
        buffer.draw_fill(&frame);
    }
    if let Some(cam) = camera.frame() {
        let rect = overlay_geometry(
            buffer.resolution(),
            cam.resolution,
            settings.overlay_divisor,
            settings.overlay_margin,
        );
        buffer.draw_scaled(&cam, &rect);
    }
}

struct CompositorShared {
    resolution: Resolution,
    latest: Mutex<Option<VideoFrame>>,
    running: AtomicBool,
    ticks: AtomicU64,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CompositorShared {
    fn halt(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        log::debug!(
            "Frame compositor stopped after {} ticks",
            self.ticks.load(Ordering::SeqCst)
        );
    }
}

/// Video source side of the compositor.
struct CompositeVideoSource {
    shared: Arc<CompositorShared>,
}

impl VideoSource for CompositeVideoSource {
    fn resolution(&self) -> Resolution {
        self.shared.resolution
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.shared.latest.lock().clone()
    }

    fn stop(&self) {
        self.shared.halt();
    }
}

/// Running camera-over-display compositor.
pub struct FrameCompositor {
    shared: Arc<CompositorShared>,
    track: Arc<MediaTrack>,
    settings: CompositorSettings,
}

impl FrameCompositor {
    /// Start compositing `camera` over `display`.
    ///
    /// The buffer takes the display's reported resolution. The first frame is
    /// drawn before this returns so the synthetic track is immediately usable.
    pub fn start(
        display: Arc<MediaTrack>,
        camera: Arc<MediaTrack>,
        settings: CompositorSettings,
    ) -> Result<Self, CaptureError> {
        if display.kind() != TrackKind::Video || camera.kind() != TrackKind::Video {
            return Err(CaptureError::DeviceUnavailable);
        }
        let resolution = display
            .resolution()
            .filter(|r| !r.is_empty())
            .ok_or(CaptureError::DeviceUnavailable)?;

        let mut buffer = CompositeFrameBuffer::new(resolution);
        draw_tick(&mut buffer, &display, &camera, &settings);

        let shared = Arc::new(CompositorShared {
            resolution,
            latest: Mutex::new(Some(buffer.to_frame())),
            running: AtomicBool::new(true),
            ticks: AtomicU64::new(1),
            worker: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let interval = settings.frame_interval();
        let handle = thread::Builder::new()
            .name("frame-compositor".into())
            .spawn(move || {
                let mut next_tick = Instant::now() + interval;
                while worker_shared.running.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now < next_tick {
                        thread::sleep(next_tick - now);
                        continue;
                    }
                    next_tick += interval;
                    if next_tick < now {
                        // Fell behind; skip missed ticks instead of bursting.
                        next_tick = now + interval;
                    }

                    draw_tick(&mut buffer, &display, &camera, &settings);
                    *worker_shared.latest.lock() = Some(buffer.to_frame());
                    worker_shared.ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn compositor thread: {}", e)))?;
        *shared.worker.lock() = Some(handle);

        log::info!(
            "Frame compositor started at {} ({} fps, overlay 1/{})",
            resolution,
            settings.frame_rate,
            settings.overlay_divisor
        );

        let track = MediaTrack::video(
            TrackOrigin::Composite,
            "composite",
            CompositeVideoSource {
                shared: Arc::clone(&shared),
            },
        );

        Ok(Self {
            shared,
            track,
            settings,
        })
    }

    /// The synthetic video track carrying the composited frames.
    pub fn track(&self) -> &Arc<MediaTrack> {
        &self.track
    }

    pub fn resolution(&self) -> Resolution {
        self.shared.resolution
    }

    pub fn settings(&self) -> CompositorSettings {
        self.settings
    }

    /// Frames drawn so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stop the draw loop and release the synthetic track. Idempotent.
    pub fn stop(&self) {
        self.track.stop();
        self.shared.halt();
    }
}

impl Drop for FrameCompositor {
    fn drop(&mut self) {
        self.stop();
    }
}
