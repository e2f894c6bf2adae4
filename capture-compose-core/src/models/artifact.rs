use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::CaptureError;
use super::track::{TrackKind, TrackOrigin};
use crate::traits::exporter::ArtifactExporter;

/// Ordered, append-only list of encoded chunks for one session.
#[derive(Debug, Default, Clone)]
pub struct ChunkSequence {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl ChunkSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are dropped; returns whether it was kept.
    pub fn push(&mut self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Concatenate every chunk in emission order, consuming the sequence.
    pub fn concat(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks {
            payload.extend_from_slice(&chunk);
        }
        payload
    }
}

/// A track that fed the encoder, as recorded in artifact metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTrack {
    pub kind: TrackKind,
    pub origin: TrackOrigin,
    pub label: String,
}

/// The finished recording: every chunk concatenated, tagged with its media type.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub payload: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f64,
    pub chunk_count: usize,
    pub checksum: String,
    pub created_at: String,
    pub tracks: Vec<ArtifactTrack>,
}

impl Artifact {
    pub fn from_chunks(
        chunks: ChunkSequence,
        mime_type: &str,
        duration_secs: f64,
        tracks: Vec<ArtifactTrack>,
    ) -> Self {
        let chunk_count = chunks.len();
        let payload = chunks.concat();
        let checksum = sha256_hex(&payload);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            mime_type: mime_type.to_string(),
            duration_secs,
            chunk_count,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
            tracks,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            id: self.id.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.payload.len() as u64,
            duration_secs: self.duration_secs,
            chunk_count: self.chunk_count,
            checksum: self.checksum.clone(),
            created_at: self.created_at.clone(),
            tracks: self.tracks.clone(),
        }
    }

    /// Hand the artifact to an exporter under a caller-chosen file name.
    pub fn export(&self, exporter: &dyn ArtifactExporter, file_name: &str) -> Result<(), CaptureError> {
        if file_name.trim().is_empty() {
            return Err(CaptureError::StorageError("file name must not be empty".into()));
        }
        exporter.save(self, file_name)
    }
}

/// Serializable summary of an artifact, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub id: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub chunk_count: usize,
    pub checksum: String,
    pub created_at: String,
    pub tracks: Vec<ArtifactTrack>,
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data).iter().map(|b| format!("{:02x}", b)).collect()
}
