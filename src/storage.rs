//! Storage abstraction for the log directory.
//!
//! Vocabulary note:
//! - `flush()` is a visibility boundary (userspace to OS), not a stable-storage
//!   guarantee.
//! - Stable-storage durability (survives power loss after reporting success)
//!   requires explicit `fsync`/`sync_all` barriers and sometimes parent
//!   directory sync; see [`sync_file`] and [`sync_parent_dir`].
//!
//! The latest-checkpoint alias is maintained with [`Directory::hard_link`],
//! so backends must support linking a second name to an existing file.

use crate::error::{DurabilityError, DurabilityResult};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Attempt to `fsync`/`sync_all` the file at `path`.
///
/// Requires a backend that exposes `file_path()`; for backends that do not map
/// to the OS filesystem this returns `NotSupported`. This does **not** sync
/// the parent directory; if you rely on file creation or linking being durable
/// across power loss, also call [`sync_parent_dir`].
pub fn sync_file<D: Directory + ?Sized>(dir: &D, path: &str) -> DurabilityResult<()> {
    let Some(p) = dir.file_path(path) else {
        return Err(DurabilityError::NotSupported(
            "sync_file requires Directory::file_path()".into(),
        ));
    };
    let f = std::fs::OpenOptions::new().read(true).open(&p)?;
    f.sync_all()?;
    Ok(())
}

/// Attempt to `fsync`/`sync_all` the parent directory of `path`.
///
/// This is the commonly-missed step needed to make *names* durable: durable
/// file creation and durable hard links. Requires `Directory::file_path()`.
pub fn sync_parent_dir<D: Directory + ?Sized>(dir: &D, path: &str) -> DurabilityResult<()> {
    let Some(p) = dir.file_path(path) else {
        return Err(DurabilityError::NotSupported(
            "sync_parent_dir requires Directory::file_path()".into(),
        ));
    };
    let Some(parent) = p.parent() else {
        return Err(DurabilityError::Format(format!(
            "path has no parent directory: {p:?}"
        )));
    };
    let f = std::fs::File::open(parent)?;
    f.sync_all()?;
    Ok(())
}

/// Trait for directory-like storage backends rooted at the log directory.
pub trait Directory: Send + Sync {
    /// Create a new file for writing (truncating if it exists).
    fn create_file(&self, path: &str) -> DurabilityResult<Box<dyn Write + Send>>;
    /// Open an existing file for reading.
    fn open_file(&self, path: &str) -> DurabilityResult<Box<dyn Read>>;
    /// Open a file for appending (creating it if missing).
    fn append_file(&self, path: &str) -> DurabilityResult<Box<dyn Write + Send>>;
    /// Return whether a path exists.
    fn exists(&self, path: &str) -> bool;
    /// Delete a file; missing files are not an error.
    fn delete(&self, path: &str) -> DurabilityResult<()>;
    /// Create an additional name `link` for the existing file `target`.
    ///
    /// `link` must not already exist; callers delete the old name first.
    fn hard_link(&self, target: &str, link: &str) -> DurabilityResult<()>;
    /// List entries in a directory (`""` for the root).
    fn list_dir(&self, path: &str) -> DurabilityResult<Vec<String>>;
    /// Atomically write bytes to a path.
    fn atomic_write(&self, path: &str, data: &[u8]) -> DurabilityResult<()>;
    /// Optional filesystem path for backends that support it.
    fn file_path(&self, path: &str) -> Option<PathBuf>;
}

/// Filesystem-backed `Directory` rooted at a local path.
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Create (or open) a filesystem directory backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> DurabilityResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, path: &str) -> DurabilityResult<Box<dyn Write + Send>> {
        let full_path = self.resolve_path(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Box::new(std::fs::File::create(full_path)?))
    }

    fn open_file(&self, path: &str) -> DurabilityResult<Box<dyn Read>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Err(DurabilityError::MissingPath(full_path));
        }
        Ok(Box::new(std::fs::File::open(full_path)?))
    }

    fn append_file(&self, path: &str) -> DurabilityResult<Box<dyn Write + Send>> {
        let full_path = self.resolve_path(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(full_path)?;
        Ok(Box::new(file))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).exists()
    }

    fn delete(&self, path: &str) -> DurabilityResult<()> {
        let full_path = self.resolve_path(path);
        if full_path.exists() {
            std::fs::remove_file(full_path)?;
        }
        Ok(())
    }

    fn hard_link(&self, target: &str, link: &str) -> DurabilityResult<()> {
        std::fs::hard_link(self.resolve_path(target), self.resolve_path(link))?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> DurabilityResult<Vec<String>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(full_path)?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            out.push(entry.file_name().to_string_lossy().to_string());
        }
        out.sort();
        Ok(out)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> DurabilityResult<()> {
        let temp_path = format!("{path}.tmp");
        let full_temp_path = self.resolve_path(&temp_path);
        if let Some(parent) = full_temp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut temp_file = std::fs::File::create(&full_temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;

        let full_path = self.resolve_path(path);
        std::fs::rename(&full_temp_path, &full_path)?;

        if let Some(parent) = full_path.parent() {
            if let Ok(parent_file) = std::fs::File::open(parent) {
                let _ = parent_file.sync_all();
            }
        }
        Ok(())
    }

    fn file_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve_path(path))
    }
}

/// In-memory `Directory` used for tests.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    files: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>>,
}

impl MemoryDirectory {
    /// Create an empty in-memory directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_failed() -> DurabilityError {
        DurabilityError::LockFailed {
            resource: "memory directory".to_string(),
            reason: "lock poisoned".to_string(),
        }
    }
}

impl Directory for MemoryDirectory {
    fn create_file(&self, path: &str) -> DurabilityResult<Box<dyn Write + Send>> {
        // Overwrite semantics: clear the file eagerly, then append in-place.
        self.files
            .write()
            .map_err(|_| Self::lock_failed())?
            .insert(path.to_string(), Vec::new());

        Ok(Box::new(MemoryInPlaceWriter {
            files: self.files.clone(),
            path: path.to_string(),
        }))
    }

    fn open_file(&self, path: &str) -> DurabilityResult<Box<dyn Read>> {
        let files = self.files.read().map_err(|_| Self::lock_failed())?;
        let data = files
            .get(path)
            .ok_or_else(|| DurabilityError::NotFound(path.to_string()))?
            .clone();
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    fn append_file(&self, path: &str) -> DurabilityResult<Box<dyn Write + Send>> {
        {
            let mut files = self.files.write().map_err(|_| Self::lock_failed())?;
            files.entry(path.to_string()).or_insert_with(Vec::new);
        }
        Ok(Box::new(MemoryInPlaceWriter {
            files: self.files.clone(),
            path: path.to_string(),
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|f| f.contains_key(path))
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> DurabilityResult<()> {
        self.files
            .write()
            .map_err(|_| Self::lock_failed())?
            .remove(path);
        Ok(())
    }

    fn hard_link(&self, target: &str, link: &str) -> DurabilityResult<()> {
        // Checkpoint files are write-once after publication, so a byte copy is
        // observationally equivalent to a second name for the same inode.
        let mut files = self.files.write().map_err(|_| Self::lock_failed())?;
        let data = files
            .get(target)
            .ok_or_else(|| DurabilityError::NotFound(target.to_string()))?
            .clone();
        if files.contains_key(link) {
            return Err(DurabilityError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("link name already exists: {link}"),
            )));
        }
        files.insert(link.to_string(), data);
        Ok(())
    }

    fn list_dir(&self, path: &str) -> DurabilityResult<Vec<String>> {
        let files = self.files.read().map_err(|_| Self::lock_failed())?;
        let prefix = if path.is_empty() {
            "".to_string()
        } else {
            format!("{path}/")
        };
        let mut result: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| k.strip_prefix(&prefix).unwrap_or(k).to_string())
            .collect();
        result.sort();
        Ok(result)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> DurabilityResult<()> {
        let mut files = self.files.write().map_err(|_| Self::lock_failed())?;
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn file_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

struct MemoryInPlaceWriter {
    files: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>>,
    path: String,
}

impl Write for MemoryInPlaceWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut files = self
            .files
            .write()
            .map_err(|_| std::io::Error::other("lock poisoned"))?;
        let entry = files.entry(self.path.clone()).or_insert_with(Vec::new);
        entry.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
