use serde::Serialize;

/// Counters for debugging a recording session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionDiagnostics {
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub empty_chunks_dropped: u64,
    /// Chunks the encoder emitted after the session reached a terminal state.
    pub late_chunks_dropped: u64,
    pub compositor_ticks: u64,
    pub mixed_frames: u64,
}
