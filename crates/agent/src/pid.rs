//! Single-instance PID lock.
//!
//! On startup the agent writes its PID to the configured path and takes an
//! `fs2` exclusive lock on the file.  If another agent already holds the
//! lock, startup fails immediately.  The link releases the lock (and
//! removes the file) once during teardown through [`ExternalResources`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tl_link::ExternalResources;

/// Held PID file.  The lock lives as long as the open handle.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    file: Option<File>,
}

impl PidLock {
    /// Write the current PID to `path` and acquire an exclusive lock.
    ///
    /// # Errors
    ///
    /// * Another process already holds the lock.
    /// * Filesystem I/O failure.
    pub fn acquire(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Not truncated on open: a failed lock must leave the holder's PID intact.
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("opening PID file {}: {e}", path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "another tvlink agent is running (PID file {} is locked)",
                path.display()
            )
        })?;

        let pid = std::process::id();
        file.set_len(0)?;
        {
            let mut f = &file;
            writeln!(f, "{pid}")?;
            f.flush()?;
        }

        tracing::info!(path = %path.display(), pid, "PID file written");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl ExternalResources for PidLock {
    fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
        } else {
            tracing::info!(path = %self.path.display(), "PID file removed");
        }
        let _ = FileExt::unlock(&file);
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}
