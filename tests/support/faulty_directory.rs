//! Filesystem-backed `Directory` wrapper with targeted fault injection.
//!
//! Important: this file lives under `tests/support/` so it is **not** compiled
//! as a standalone integration test target.

use chunklog::storage::{Directory, FsDirectory};
use std::io;
use std::sync::{Arc, Mutex};

/// Fault-injection configuration for checkpoint/segment operations.
#[derive(Default)]
pub struct FaultConfig {
    /// Fail truncate-creates of checkpoint files (`ckpt.*`).
    pub fail_checkpoint_create: bool,
    /// Fail truncate-creates of log segments (`logs.*`), i.e. rotation.
    pub fail_segment_create: bool,
    /// Fail opening append handles for log segments.
    pub fail_segment_append: bool,
    /// Fail hard-linking the latest-checkpoint alias.
    pub fail_hard_link: bool,
    /// Count of create calls attempted against checkpoint paths.
    pub checkpoint_create_calls: usize,
}

/// A filesystem-backed `Directory` wrapper with targeted fault injection.
pub struct FaultyDirectory {
    inner: FsDirectory,
    cfg: Arc<Mutex<FaultConfig>>,
}

impl FaultyDirectory {
    /// Wrap an existing `FsDirectory`.
    pub fn new(inner: FsDirectory) -> Self {
        Self {
            inner,
            cfg: Arc::new(Mutex::new(FaultConfig::default())),
        }
    }

    /// Access the shared fault config (for toggling failpoints and reading counters).
    pub fn cfg(&self) -> Arc<Mutex<FaultConfig>> {
        self.cfg.clone()
    }

    fn is_checkpoint_path(path: &str) -> bool {
        path.starts_with("ckpt.")
    }

    fn is_segment_path(path: &str) -> bool {
        path.starts_with("logs.")
    }
}

impl Directory for FaultyDirectory {
    fn create_file(&self, path: &str) -> chunklog::DurabilityResult<Box<dyn io::Write + Send>> {
        let mut cfg = self.cfg.lock().unwrap();
        if Self::is_checkpoint_path(path) {
            cfg.checkpoint_create_calls += 1;
            if cfg.fail_checkpoint_create {
                return Err(
                    io::Error::new(io::ErrorKind::Other, "injected checkpoint create failure")
                        .into(),
                );
            }
        }
        if cfg.fail_segment_create && Self::is_segment_path(path) {
            return Err(
                io::Error::new(io::ErrorKind::Other, "injected segment create failure").into(),
            );
        }
        drop(cfg);
        self.inner.create_file(path)
    }

    fn open_file(&self, path: &str) -> chunklog::DurabilityResult<Box<dyn io::Read>> {
        self.inner.open_file(path)
    }

    fn append_file(&self, path: &str) -> chunklog::DurabilityResult<Box<dyn io::Write + Send>> {
        let cfg = self.cfg.lock().unwrap();
        if cfg.fail_segment_append && Self::is_segment_path(path) {
            return Err(
                io::Error::new(io::ErrorKind::Other, "injected segment append failure").into(),
            );
        }
        drop(cfg);
        self.inner.append_file(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn delete(&self, path: &str) -> chunklog::DurabilityResult<()> {
        self.inner.delete(path)
    }

    fn hard_link(&self, target: &str, link: &str) -> chunklog::DurabilityResult<()> {
        let cfg = self.cfg.lock().unwrap();
        if cfg.fail_hard_link {
            return Err(io::Error::new(io::ErrorKind::Other, "injected link failure").into());
        }
        drop(cfg);
        self.inner.hard_link(target, link)
    }

    fn list_dir(&self, path: &str) -> chunklog::DurabilityResult<Vec<String>> {
        self.inner.list_dir(path)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> chunklog::DurabilityResult<()> {
        self.inner.atomic_write(path, data)
    }

    fn file_path(&self, path: &str) -> Option<std::path::PathBuf> {
        self.inner.file_path(path)
    }
}
