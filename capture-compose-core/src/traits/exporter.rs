use crate::models::artifact::Artifact;
use crate::models::error::CaptureError;

/// Receives finished artifacts and saves them somewhere.
///
/// The engine never persists recordings itself; hosts plug in a download
/// trigger, a file writer, or an uploader here.
pub trait ArtifactExporter: Send + Sync {
    fn save(&self, artifact: &Artifact, file_name: &str) -> Result<(), CaptureError>;
}
