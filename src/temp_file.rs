use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::fs;

use crate::errors::ConversionError;

/// A local file owned for the duration of one conversion.
///
/// The file is removed by [`TempFile::remove`] or, failing that, on drop.
pub struct TempFile {
    path: PathBuf,
    removed: bool,
}

impl TempFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. A file that was never created counts as removed.
    pub async fn remove(mut self) -> Result<(), ConversionError> {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConversionError::TempFileIo(e)),
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.removed || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove temporary file {}: {}", self.path.display(), e);
        }
    }
}
