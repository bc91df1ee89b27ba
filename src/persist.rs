//! Temp-file-then-rename publishing
//!
//! Every artifact a run produces goes through `StagedFile`: bytes land in a
//! hidden sibling file, are fsynced, and only replace the target on
//! `commit()`. A staged file that is dropped without commit is removed, so an
//! aborted run leaves the previous artifacts byte-for-byte intact.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, TickerError};

fn persist_err(path: &Path, source: std::io::Error) -> TickerError {
    TickerError::Persist {
        path: path.to_path_buf(),
        source,
    }
}

/// Bytes written next to their final location, waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    temp: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `bytes` to a temp sibling of `target`.
    pub fn stage(target: impl AsRef<Path>, bytes: &[u8]) -> Result<Self> {
        let target = target.as_ref().to_path_buf();

        if target.is_dir() {
            return Err(persist_err(
                &target,
                std::io::Error::new(std::io::ErrorKind::Other, "target is a directory"),
            ));
        }

        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| persist_err(&parent, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                persist_err(
                    &target,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing file name"),
                )
            })?;
        let temp = parent.join(format!(".{}.tmp", file_name));

        // From here on a failure must not leave the temp file behind
        let staged = StagedFile {
            target,
            temp,
            committed: false,
        };
        {
            let mut file = File::create(&staged.temp).map_err(|e| persist_err(&staged.temp, e))?;
            file.write_all(bytes)
                .map_err(|e| persist_err(&staged.temp, e))?;
            file.sync_all().map_err(|e| persist_err(&staged.temp, e))?;
        }

        debug!("Staged {} ({} bytes)", staged.target.display(), bytes.len());
        Ok(staged)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replace the target with the staged bytes.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp, &self.target).map_err(|e| persist_err(&self.target, e))?;
        self.committed = true;
        debug!("Published {}", self.target.display());
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Stage and immediately commit a single file.
pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    StagedFile::stage(path, bytes)?.commit()
}
