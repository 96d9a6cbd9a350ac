//! Scoped temporary file holding one upload

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

const TEMP_PREFIX: &str = "tonemill-";

/// Uniquely named file in the temp directory, owned by one request
///
/// The file is removed by [`TempResource::release`] or, failing that, when
/// the value is dropped. Release is idempotent and a file already removed by
/// someone else counts as released.
#[derive(Debug)]
pub struct TempResource {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl TempResource {
    /// Create the file, write `content` and close the handle
    ///
    /// The name keeps the upload's extension so decoders can use it as a
    /// format hint. On write failure the partial file is removed before the
    /// error is returned.
    pub fn acquire(dir: &Path, extension: &str, content: &[u8]) -> io::Result<Self> {
        let suffix = format!(".{}", extension);
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix)
            .tempfile_in(dir)?;
        file.write_all(content)?;
        file.flush()?;

        let temp = file.into_temp_path();
        let path = temp.to_path_buf();
        debug!(path = %path.display(), bytes = content.len(), "Temporary upload written");

        Ok(Self {
            path,
            temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.temp.is_none()
    }

    /// Remove the file
    ///
    /// Removal errors are logged, never raised: the response has already been
    /// decided by the time this runs.
    pub fn release(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };
        match temp.close() {
            Ok(()) => debug!(path = %self.path.display(), "Temporary upload removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Temporary upload already gone")
            }
            Err(e) => warn!(
                path = %self.path.display(),
                "Failed to remove temporary upload: {}",
                e
            ),
        }
    }
}

impl Drop for TempResource {
    fn drop(&mut self) {
        self.release();
    }
}
