/// Circular buffer of interleaved audio frames.
///
/// Sits between an audio track and the mix graph so that inputs delivering
/// at different rates can be drained in equal-length blocks. Wrap in a
/// `parking_lot::Mutex` for cross-thread access.
///
/// Overflow behavior: drops the oldest frames.
#[derive(Debug)]
pub struct RingBuffer {
    samples: Vec<f32>,
    channels: usize,
    capacity_frames: usize,
    write_frame: usize,
    read_frame: usize,
    available_frames: usize,
}

impl RingBuffer {
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        let capacity_frames = capacity_frames.max(1);
        Self {
            samples: vec![0.0; capacity_frames * channels],
            channels,
            capacity_frames,
            write_frame: 0,
            read_frame: 0,
            available_frames: 0,
        }
    }

    /// Append interleaved samples. A trailing partial frame is ignored.
    ///
    /// If more frames arrive than fit, only the newest `capacity` frames are kept.
    pub fn write(&mut self, interleaved: &[f32]) {
        let mut frames = interleaved.len() / self.channels;
        if frames == 0 {
            return;
        }

        let mut data = &interleaved[..frames * self.channels];
        if frames > self.capacity_frames {
            let skip = frames - self.capacity_frames;
            data = &data[skip * self.channels..];
            frames = self.capacity_frames;
        }

        let overflow = (self.available_frames + frames).saturating_sub(self.capacity_frames);
        if overflow > 0 {
            self.read_frame = (self.read_frame + overflow) % self.capacity_frames;
            self.available_frames -= overflow;
        }

        for frame in data.chunks_exact(self.channels) {
            let start = self.write_frame * self.channels;
            self.samples[start..start + self.channels].copy_from_slice(frame);
            self.write_frame = (self.write_frame + 1) % self.capacity_frames;
        }
        self.available_frames += frames;
    }

    /// Remove and return up to `count` frames, interleaved.
    pub fn read_frames(&mut self, count: usize) -> Vec<f32> {
        let to_read = count.min(self.available_frames);
        let mut out = Vec::with_capacity(to_read * self.channels);
        for i in 0..to_read {
            let start = ((self.read_frame + i) % self.capacity_frames) * self.channels;
            out.extend_from_slice(&self.samples[start..start + self.channels]);
        }
        self.read_frame = (self.read_frame + to_read) % self.capacity_frames;
        self.available_frames -= to_read;
        out
    }

    /// Frames currently buffered.
    pub fn frames(&self) -> usize {
        self.available_frames
    }

    pub fn is_empty(&self) -> bool {
        self.available_frames == 0
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn clear(&mut self) {
        self.write_frame = 0;
        self.read_frame = 0;
        self.available_frames = 0;
    }
}
