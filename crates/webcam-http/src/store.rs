use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use webcam_capture::{EncodedFrame, Error, Result};

/// Destination for single captured frames.
pub trait FrameStore: Send + Sync {
    /// Write `frame` under `name`, replacing any earlier capture of that name.
    fn persist(&self, name: &str, frame: &EncodedFrame) -> Result<PathBuf>;
}

/// Stores captures as files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Capture names are plain file names; no directories, no traversal.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Config(format!("invalid capture file name: {name:?}")));
    }
    Ok(())
}

impl FrameStore for DirectoryStore {
    fn persist(&self, name: &str, frame: &EncodedFrame) -> Result<PathBuf> {
        validate_name(name)?;
        let path = self.root.join(name);
        let tmp = self.root.join(format!(".{name}.tmp"));
        fs::write(&tmp, &frame.data)
            .map_err(|e| Error::Io(format!("writing {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::Io(format!("renaming to {}: {e}", path.display())))?;
        info!(
            "Captured {}x{} frame to {}",
            frame.width,
            frame.height,
            path.display()
        );
        Ok(path)
    }
}
