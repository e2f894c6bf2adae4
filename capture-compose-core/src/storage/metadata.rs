use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::artifact::ArtifactMetadata;
use crate::models::error::CaptureError;

/// Path of the JSON sidecar that accompanies `payload_path`.
///
/// `capture.webm` becomes `capture.webm.metadata.json`.
pub fn sidecar_path(payload_path: &Path) -> PathBuf {
    let mut name = payload_path.as_os_str().to_os_string();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write artifact metadata as a JSON sidecar next to the payload file.
pub fn write_metadata(metadata: &ArtifactMetadata, payload_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = sidecar_path(payload_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&path, json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

/// Read artifact metadata from the sidecar next to `payload_path`.
pub fn read_metadata(payload_path: &Path) -> Result<ArtifactMetadata, CaptureError> {
    let path = sidecar_path(payload_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))
}

/// Hash a payload file and compare it against its recorded metadata.
pub fn verify_payload(payload_path: &Path, metadata: &ArtifactMetadata) -> Result<bool, CaptureError> {
    let mut file = File::open(payload_path)
        .map_err(|e| CaptureError::StorageError(format!("failed to open payload: {}", e)))?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| CaptureError::StorageError(format!("failed to read payload: {}", e)))?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }
    let checksum: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();
    Ok(size == metadata.size_bytes && checksum == metadata.checksum)
}
