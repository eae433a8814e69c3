//! Host-wide capture-sink lease.
//!
//! Concurrent recorders on one host would fight over the default sink and
//! each other's stream migrations. The lease does not prevent that setup, it
//! makes it loud: a second recorder logs a warning and carries on.

use fs2::FileExt;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

pub struct SinkLease {
    file: File,
}

impl SinkLease {
    /// Take the lease file, non-blocking. `None` means the lease is held by
    /// another process or could not be created; both are logged, neither is
    /// fatal.
    pub fn acquire(path: &Path) -> Option<SinkLease> {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Could not create lease directory {:?}: {}", parent, err);
                return None;
            }
        }

        let file = match std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
        {
            Ok(file) => file,
            Err(err) => {
                warn!("Could not open sink lease {:?}: {}", path, err);
                return None;
            }
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired capture sink lease at {:?}", path);
                Some(SinkLease { file })
            }
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                warn!(
                    "Capture sink lease {:?} is held by another recorder; \
                     sharing one sink between recorders is unsupported",
                    path
                );
                None
            }
            Err(err) => {
                warn!("Could not lock sink lease {:?}: {}", path, err);
                None
            }
        }
    }
}

impl Drop for SinkLease {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            debug!("Failed to release sink lease: {err:?}");
        }
    }
}
