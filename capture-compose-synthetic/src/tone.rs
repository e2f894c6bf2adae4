//! Generated audio for the synthetic microphone and display audio.
//!
//! A capture thread produces a sine tone in real time, the way a device
//! callback would, into a ring buffer that `read` drains.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use capture_compose_core::{AudioFormat, AudioSource, CaptureError, RingBuffer};

/// Seconds of audio kept when nobody drains the source.
const BUFFER_SECS: f64 = 2.0;
const CAPTURE_INTERVAL: Duration = Duration::from_millis(10);

pub struct ToneSource {
    format: AudioFormat,
    frequency: f64,
    buffer: Arc<Mutex<RingBuffer>>,
    produced: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ToneSource {
    /// Start producing a `frequency` Hz tone at `amplitude` (0.0–1.0).
    pub fn start(format: AudioFormat, frequency: f64, amplitude: f32) -> Result<Self, CaptureError> {
        if format.channels == 0 || format.sample_rate <= 0.0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "invalid tone format: {} Hz x {}",
                format.sample_rate, format.channels
            )));
        }

        let capacity = (format.sample_rate * BUFFER_SECS) as usize;
        let buffer = Arc::new(Mutex::new(RingBuffer::new(capacity, format.channels)));
        let produced = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let buffer = Arc::clone(&buffer);
            let produced = Arc::clone(&produced);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("synthetic-tone".into())
                .spawn(move || {
                    let started = Instant::now();
                    while running.load(Ordering::SeqCst) {
                        thread::sleep(CAPTURE_INTERVAL);
                        let target = (started.elapsed().as_secs_f64() * format.sample_rate) as u64;
                        let from = produced.load(Ordering::SeqCst);
                        if target <= from {
                            continue;
                        }
                        let block = render_tone(format, frequency, amplitude, from, target - from);
                        buffer.lock().write(&block);
                        produced.store(target, Ordering::SeqCst);
                    }
                })
                .map_err(|e| CaptureError::Unknown(format!("failed to spawn tone thread: {}", e)))?
        };

        log::debug!(
            "Tone source started: {} Hz at {} Hz x {}",
            frequency,
            format.sample_rate,
            format.channels
        );
        Ok(Self {
            format,
            frequency,
            buffer,
            produced,
            running,
            capture_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Frames produced since start, drained or not.
    pub fn frames_produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl AudioSource for ToneSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&self, max_frames: usize) -> Vec<f32> {
        self.buffer.lock().read_frames(max_frames)
    }

    fn stop(&self) {
        self.halt();
        self.buffer.lock().clear();
    }
}

impl Drop for ToneSource {
    fn drop(&mut self) {
        self.halt();
    }
}

/// `frames` interleaved frames of a sine tone starting at frame `from`.
/// Every channel carries the same signal.
pub fn render_tone(format: AudioFormat, frequency: f64, amplitude: f32, from: u64, frames: u64) -> Vec<f32> {
    let channels = format.channels as usize;
    let mut out = Vec::with_capacity(frames as usize * channels);
    for i in from..from + frames {
        let t = i as f64 / format.sample_rate;
        let sample = amplitude * (TAU * frequency * t).sin() as f32;
        out.extend(std::iter::repeat(sample).take(channels));
    }
    out
}
