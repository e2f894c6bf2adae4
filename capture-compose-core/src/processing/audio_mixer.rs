//! Multi-source audio summation.
//!
//! One enabled source is passed through untouched. Two sources are connected
//! to an [`AudioMixGraph`] whose output is exposed as a new synthetic track:
//!
//! ```text
//! [display audio] → resample → [RingBuffer] ─┐
//!                                             ├→ sum → clamp → [mixed track]
//! [camera audio]  → resample → [RingBuffer] ─┘
//! ```
//!
//! The first input drives timing: each render drains as many frames as it
//! has buffered, and the other inputs contribute up to that many, padded
//! with silence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::{CaptureConfig, CaptureMode};
use crate::models::track::{AudioFormat, MediaTrack, TrackKind, TrackOrigin};
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::track_source::AudioSource;

/// Seconds of audio each input may buffer before the oldest frames drop.
const INPUT_BUFFER_SECS: f64 = 2.0;

/// RMS and peak of the most recently mixed block (0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevels {
    pub rms: f32,
    pub peak: f32,
}

/// Result of [`AudioMixer::mix`].
#[derive(Debug, Clone)]
pub enum MixedAudio {
    /// A single source, used as-is.
    Passthrough(Arc<MediaTrack>),
    /// Several sources summed through a mix graph.
    Mixed {
        track: Arc<MediaTrack>,
        graph: Arc<AudioMixGraph>,
    },
}

impl MixedAudio {
    pub fn track(&self) -> &Arc<MediaTrack> {
        match self {
            Self::Passthrough(track) | Self::Mixed { track, .. } => track,
        }
    }

    pub fn graph(&self) -> Option<&Arc<AudioMixGraph>> {
        match self {
            Self::Passthrough(_) => None,
            Self::Mixed { graph, .. } => Some(graph),
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, Self::Mixed { .. })
    }
}

/// Builds the session's single audio track from its enabled sources.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    pub target_sample_rate: f64,
}

impl AudioMixer {
    pub fn new(target_sample_rate: f64) -> Self {
        Self { target_sample_rate }
    }

    /// Pick the audio tracks that feed the mix.
    ///
    /// A source is connected only if its config flag is on and the platform
    /// actually granted it an audio track. Display audio comes first.
    pub fn select_inputs(
        config: &CaptureConfig,
        display_audio: Option<&Arc<MediaTrack>>,
        camera_audio: Option<&Arc<MediaTrack>>,
    ) -> Vec<Arc<MediaTrack>> {
        let (display_enabled, camera_enabled) = match config.mode() {
            CaptureMode::DisplayOnly => (config.use_microphone, false),
            CaptureMode::Combined => (config.use_system_audio, config.use_microphone),
            CaptureMode::CameraOnly => (false, config.use_microphone),
        };

        let mut inputs = Vec::with_capacity(2);
        if display_enabled {
            inputs.extend(display_audio.cloned());
        }
        if camera_enabled {
            inputs.extend(camera_audio.cloned());
        }
        inputs.retain(|t| t.kind() == TrackKind::Audio);
        inputs
    }

    /// Zero sources yield no audio, one is passed through, more are mixed.
    pub fn mix(&self, sources: &[Arc<MediaTrack>]) -> Option<MixedAudio> {
        match sources {
            [] => None,
            [single] => {
                log::debug!("Single audio source '{}', no mixing", single.label());
                Some(MixedAudio::Passthrough(Arc::clone(single)))
            }
            many => {
                let graph = Arc::new(AudioMixGraph::new(many, self.target_sample_rate));
                let label = many
                    .iter()
                    .map(|t| t.label())
                    .collect::<Vec<_>>()
                    .join(" + ");
                log::info!("Mixing {} audio sources: {}", many.len(), label);
                let track = MediaTrack::audio(
                    TrackOrigin::Mix,
                    format!("mix({})", label),
                    MixedAudioSource {
                        graph: Arc::clone(&graph),
                    },
                );
                Some(MixedAudio::Mixed { track, graph })
            }
        }
    }
}

struct MixInput {
    track: Arc<MediaTrack>,
    buffer: RingBuffer,
}

/// A set of input audio tracks feeding one stereo output.
///
/// Input tracks are only read, never released; the owning session releases
/// them. Tearing the graph down disconnects every input.
pub struct AudioMixGraph {
    output: AudioFormat,
    inputs: Mutex<Vec<MixInput>>,
    levels: Mutex<AudioLevels>,
    mixed_frames: AtomicU64,
    torn_down: AtomicBool,
}

impl AudioMixGraph {
    fn new(sources: &[Arc<MediaTrack>], sample_rate: f64) -> Self {
        let capacity = (sample_rate * INPUT_BUFFER_SECS) as usize;
        let inputs = sources
            .iter()
            .map(|track| MixInput {
                track: Arc::clone(track),
                buffer: RingBuffer::new(capacity, 2),
            })
            .collect();
        Self {
            output: AudioFormat::stereo(sample_rate),
            inputs: Mutex::new(inputs),
            levels: Mutex::new(AudioLevels::default()),
            mixed_frames: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output
    }

    pub fn input_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Ids of the connected input tracks, in connection order.
    pub fn input_ids(&self) -> Vec<String> {
        self.inputs.lock().iter().map(|i| i.track.id().to_string()).collect()
    }

    pub fn levels(&self) -> AudioLevels {
        *self.levels.lock()
    }

    /// Total stereo frames produced so far.
    pub fn mixed_frames(&self) -> u64 {
        self.mixed_frames.load(Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Pull from every input and produce up to `max_frames` mixed stereo frames.
    pub fn render(&self, max_frames: usize) -> Vec<f32> {
        if self.is_torn_down() || max_frames == 0 {
            return Vec::new();
        }

        let mut inputs = self.inputs.lock();
        for input in inputs.iter_mut() {
            let Some(format) = input.track.audio_format() else {
                continue;
            };
            let wanted = source_frames_for(max_frames, format.sample_rate, self.output.sample_rate);
            let raw = input.track.read_audio(wanted);
            if raw.is_empty() {
                continue;
            }
            let stereo = to_stereo(&raw, format.channels);
            let resampled = resample_stereo(&stereo, format.sample_rate, self.output.sample_rate);
            input.buffer.write(&resampled);
        }

        let Some(primary) = inputs.first() else {
            return Vec::new();
        };
        let frames = primary.buffer.frames().min(max_frames);
        if frames == 0 {
            return Vec::new();
        }

        let mut mixed = vec![0.0f32; frames * 2];
        for input in inputs.iter_mut() {
            let block = input.buffer.read_frames(frames);
            sum_into(&mut mixed, &block);
        }
        drop(inputs);

        for sample in mixed.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        *self.levels.lock() = AudioLevels {
            rms: rms_level(&mixed),
            peak: peak_level(&mixed),
        };
        self.mixed_frames.fetch_add(frames as u64, Ordering::SeqCst);
        mixed
    }

    /// Disconnect every input. Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let inputs = std::mem::take(&mut *self.inputs.lock());
        log::debug!("Audio mix graph torn down ({} inputs disconnected)", inputs.len());
    }
}

impl std::fmt::Debug for AudioMixGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixGraph")
            .field("output", &self.output)
            .field("inputs", &self.input_count())
            .field("mixed_frames", &self.mixed_frames())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// Output side of a mix graph, exposed as an audio track.
struct MixedAudioSource {
    graph: Arc<AudioMixGraph>,
}

impl AudioSource for MixedAudioSource {
    fn format(&self) -> AudioFormat {
        self.graph.output_format()
    }

    fn read(&self, max_frames: usize) -> Vec<f32> {
        self.graph.render(max_frames)
    }

    fn stop(&self) {
        self.graph.teardown();
    }
}

fn source_frames_for(output_frames: usize, source_rate: f64, output_rate: f64) -> usize {
    if source_rate <= 0.0 || output_rate <= 0.0 {
        return output_frames;
    }
    (output_frames as f64 * source_rate / output_rate).ceil() as usize
}

/// Convert interleaved audio of any channel count to interleaved stereo.
///
/// Mono is copied to both sides; more than two channels are averaged down
/// to mono first.
pub fn to_stereo(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples[..samples.len() - samples.len() % 2].to_vec(),
        n => samples
            .chunks_exact(n as usize)
            .flat_map(|frame| {
                let avg = frame.iter().sum::<f32>() / n as f32;
                [avg, avg]
            })
            .collect(),
    }
}

/// Linear interpolation resampling for interleaved stereo audio.
///
/// Returns input unchanged if the rates match.
pub fn resample_stereo(samples: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
    if (source_rate - target_rate).abs() < 0.01 || samples.is_empty() || source_rate <= 0.0 {
        return samples.to_vec();
    }

    let frame_count = samples.len() / 2;
    let ratio = target_rate / source_rate;
    let output_frames = (frame_count as f64 * ratio) as usize;
    let mut output = vec![0.0f32; output_frames * 2];
    for i in 0..output_frames {
        let source_index = i as f64 / ratio;
        let index = source_index as usize;
        let fraction = (source_index - index as f64) as f32;

        for ch in 0..2usize {
            if index + 1 < frame_count {
                output[i * 2 + ch] = samples[index * 2 + ch] * (1.0 - fraction)
                    + samples[(index + 1) * 2 + ch] * fraction;
            } else if index < frame_count {
                output[i * 2 + ch] = samples[index * 2 + ch];
            }
        }
    }
    output
}

/// Add `block` into `mix` sample by sample. A shorter block is silence-padded.
pub fn sum_into(mix: &mut [f32], block: &[f32]) {
    for (out, sample) in mix.iter_mut().zip(block) {
        *out += sample;
    }
}

pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}
