use std::fs;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;

use capture_compose_core::storage::metadata::write_metadata;
use capture_compose_core::{Artifact, ArtifactExporter, CaptureError};

/// Saves artifacts into a directory, each with a JSON metadata sidecar.
#[derive(Debug)]
pub struct FileExporter {
    directory: PathBuf,
    saved: Mutex<Vec<PathBuf>>,
}

impl FileExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Payload paths written so far, oldest first.
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().clone()
    }

    fn target(&self, file_name: &str) -> Result<PathBuf, CaptureError> {
        let name = Path::new(file_name);
        let mut components = name.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.directory.join(name)),
            _ => Err(CaptureError::StorageError(format!(
                "'{}' is not a plain file name",
                file_name
            ))),
        }
    }
}

impl ArtifactExporter for FileExporter {
    fn save(&self, artifact: &Artifact, file_name: &str) -> Result<(), CaptureError> {
        let path = self.target(file_name)?;
        fs::create_dir_all(&self.directory).map_err(|e| {
            CaptureError::StorageError(format!(
                "failed to create {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        fs::write(&path, &artifact.payload).map_err(|e| {
            CaptureError::StorageError(format!("failed to write {}: {}", path.display(), e))
        })?;
        let sidecar = write_metadata(&artifact.metadata(), &path)?;
        log::info!(
            "Saved {} ({} bytes, {}) with metadata {}",
            path.display(),
            artifact.size(),
            artifact.mime_type,
            sidecar.display()
        );
        self.saved.lock().push(path);
        Ok(())
    }
}
