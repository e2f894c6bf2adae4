//! `application/x-capture-frames`: a minimal record-oriented container.
//!
//! The synthetic encoder has no real codec behind it, so instead of
//! pretending to produce WebM it writes every tick as a self-describing
//! record. Chunks split at arbitrary byte offsets; concatenating them in
//! order yields a parseable stream.
//!
//! Every record is framed the same way:
//! ```text
//! [0]      tag: b'H' header, b'V' video, b'A' audio
//! [1-4]    payload length (u32 LE)
//! [5..]    payload
//! ```
//!
//! Payloads (all integers little-endian):
//! ```text
//! H  "CCF1" | width u32 | height u32 | fps u32 | sample_rate u32 | channels u16
//! V  timestamp_us u64 | width u32 | height u32 | RGBA8 thumbnail
//! A  timestamp_us u64 | channels u16 | i16 samples, interleaved
//! ```
//!
//! Video records carry a nearest-neighbour thumbnail at most
//! [`THUMBNAIL_WIDTH`] pixels wide, not the full frame.

use capture_compose_core::{CaptureError, Resolution, VideoFrame};

pub const CONTAINER_MIME: &str = "application/x-capture-frames";

pub const MAGIC: &[u8; 4] = b"CCF1";

pub const THUMBNAIL_WIDTH: u32 = 64;

const TAG_HEADER: u8 = b'H';
const TAG_VIDEO: u8 = b'V';
const TAG_AUDIO: u8 = b'A';
const FRAME_HEADER_SIZE: usize = 5;

/// Stream parameters written once at the start of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub resolution: Resolution,
    pub frame_rate: u32,
    pub sample_rate: u32,
    /// Zero when the recording has no audio track.
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Header(StreamHeader),
    Video {
        timestamp_us: u64,
        thumbnail: VideoFrame,
    },
    Audio {
        timestamp_us: u64,
        channels: u16,
        samples: Vec<i16>,
    },
}

fn write_record(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

pub fn write_header(out: &mut Vec<u8>, header: &StreamHeader) {
    let mut payload = Vec::with_capacity(22);
    payload.extend_from_slice(MAGIC);
    payload.extend_from_slice(&header.resolution.width.to_le_bytes());
    payload.extend_from_slice(&header.resolution.height.to_le_bytes());
    payload.extend_from_slice(&header.frame_rate.to_le_bytes());
    payload.extend_from_slice(&header.sample_rate.to_le_bytes());
    payload.extend_from_slice(&header.channels.to_le_bytes());
    write_record(out, TAG_HEADER, &payload);
}

pub fn write_video(out: &mut Vec<u8>, timestamp_us: u64, frame: &VideoFrame) {
    let thumbnail = thumbnail(frame);
    let mut payload = Vec::with_capacity(16 + thumbnail.pixels.len());
    payload.extend_from_slice(&timestamp_us.to_le_bytes());
    payload.extend_from_slice(&thumbnail.width().to_le_bytes());
    payload.extend_from_slice(&thumbnail.height().to_le_bytes());
    payload.extend_from_slice(&thumbnail.pixels);
    write_record(out, TAG_VIDEO, &payload);
}

/// Write interleaved f32 samples as 16-bit PCM.
pub fn write_audio(out: &mut Vec<u8>, timestamp_us: u64, channels: u16, samples: &[f32]) {
    let mut payload = Vec::with_capacity(10 + samples.len() * 2);
    payload.extend_from_slice(&timestamp_us.to_le_bytes());
    payload.extend_from_slice(&channels.to_le_bytes());
    for &s in samples {
        let pcm = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        payload.extend_from_slice(&pcm.to_le_bytes());
    }
    write_record(out, TAG_AUDIO, &payload);
}

/// Nearest-neighbour downscale to at most [`THUMBNAIL_WIDTH`] pixels wide.
pub fn thumbnail(frame: &VideoFrame) -> VideoFrame {
    let src = frame.resolution;
    if src.width <= THUMBNAIL_WIDTH {
        return frame.clone();
    }
    let width = THUMBNAIL_WIDTH;
    let height = ((src.height as u64 * width as u64) / src.width as u64).max(1) as u32;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * VideoFrame::BYTES_PER_PIXEL);
    for y in 0..height {
        let sy = (y as u64 * src.height as u64 / height as u64) as u32;
        for x in 0..width {
            let sx = (x as u64 * src.width as u64 / width as u64) as u32;
            pixels.extend_from_slice(&frame.pixel(sx, sy).unwrap_or([0, 0, 0, 255]));
        }
    }
    VideoFrame {
        resolution: Resolution::new(width, height),
        pixels: pixels.into(),
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CaptureError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len()).ok_or_else(|| {
            CaptureError::EncodingFailure(format!("truncated record at byte {}", self.pos))
        })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16, CaptureError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CaptureError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CaptureError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    fn is_done(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// Parse a complete stream. Fails on truncation, unknown tags, or a stream
/// that does not open with a header record.
pub fn parse(data: &[u8]) -> Result<Vec<Record>, CaptureError> {
    let mut cursor = Cursor { data, pos: 0 };
    let mut records = Vec::new();
    while !cursor.is_done() {
        let tag = cursor.take(1)?[0];
        let len = cursor.u32()? as usize;
        let mut payload = Cursor {
            data: cursor.take(len)?,
            pos: 0,
        };
        let record = match tag {
            TAG_HEADER => {
                if payload.take(4)? != MAGIC {
                    return Err(CaptureError::EncodingFailure("bad container magic".into()));
                }
                Record::Header(StreamHeader {
                    resolution: Resolution::new(payload.u32()?, payload.u32()?),
                    frame_rate: payload.u32()?,
                    sample_rate: payload.u32()?,
                    channels: payload.u16()?,
                })
            }
            TAG_VIDEO => {
                let timestamp_us = payload.u64()?;
                let resolution = Resolution::new(payload.u32()?, payload.u32()?);
                let pixels = payload.take(len.saturating_sub(16))?.to_vec();
                let thumbnail = VideoFrame::new(resolution, pixels).ok_or_else(|| {
                    CaptureError::EncodingFailure(format!(
                        "video record size does not match {}",
                        resolution
                    ))
                })?;
                Record::Video {
                    timestamp_us,
                    thumbnail,
                }
            }
            TAG_AUDIO => {
                let timestamp_us = payload.u64()?;
                let channels = payload.u16()?;
                let samples = payload
                    .take(len.saturating_sub(10))?
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
                Record::Audio {
                    timestamp_us,
                    channels,
                    samples,
                }
            }
            other => {
                return Err(CaptureError::EncodingFailure(format!(
                    "unknown record tag 0x{:02x}",
                    other
                )))
            }
        };
        if records.is_empty() && !matches!(record, Record::Header(_)) {
            return Err(CaptureError::EncodingFailure(
                "stream does not start with a header".into(),
            ));
        }
        records.push(record);
    }
    if cursor.pos != data.len() || records.is_empty() {
        return Err(CaptureError::EncodingFailure("empty stream".into()));
    }
    Ok(records)
}

/// What a parsed recording contains.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub header: StreamHeader,
    pub video_frames: usize,
    /// Interleaved audio frames (samples / channels) across all records.
    pub audio_frames: usize,
    pub audio_records: usize,
    /// Audio records whose samples are all zero.
    pub silent_records: usize,
    /// Timestamp of the last record, in seconds.
    pub duration_secs: f64,
}

pub fn summarize(data: &[u8]) -> Result<ContainerSummary, CaptureError> {
    let records = parse(data)?;
    let Some(Record::Header(header)) = records.first() else {
        return Err(CaptureError::EncodingFailure("missing header".into()));
    };
    let mut summary = ContainerSummary {
        header: *header,
        video_frames: 0,
        audio_frames: 0,
        audio_records: 0,
        silent_records: 0,
        duration_secs: 0.0,
    };
    let mut last_us = 0u64;
    for record in &records[1..] {
        match record {
            Record::Header(_) => {
                return Err(CaptureError::EncodingFailure("duplicate header".into()));
            }
            Record::Video { timestamp_us, .. } => {
                summary.video_frames += 1;
                last_us = last_us.max(*timestamp_us);
            }
            Record::Audio {
                timestamp_us,
                channels,
                samples,
            } => {
                summary.audio_records += 1;
                summary.audio_frames += samples.len() / (*channels).max(1) as usize;
                if samples.iter().all(|&s| s == 0) {
                    summary.silent_records += 1;
                }
                last_us = last_us.max(*timestamp_us);
            }
        }
    }
    summary.duration_secs = last_us as f64 / 1_000_000.0;
    Ok(summary)
}
