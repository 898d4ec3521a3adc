use crate::{Draft, Error};
use anyhow::Context;
use fs2::FileExt;
use std::fs;
use std::path::Path;

/// Zero-byte sentinel file in the catalog root, used for the advisory
/// lock: shared by readers, exclusive during mutation.
pub const LOCK_SENTINEL: &str = ".catalog.lock";

/// An acquired advisory lock over a catalog directory. The lock is held
/// for the lifetime of this value and released on drop.
#[derive(Debug)]
pub struct CatalogLock {
    file: fs::File,
}

impl CatalogLock {
    /// Take the writer (exclusive) lock, without blocking. Contention is
    /// a typed error, so callers can distinguish it from I/O failure.
    pub fn exclusive(root: &Path) -> anyhow::Result<Self> {
        let file = Self::sentinel(root)?;
        file.try_lock_exclusive().map_err(|detail| Error::LockContended {
            path: root.join(LOCK_SENTINEL).display().to_string(),
            detail: detail.into(),
        })?;
        Ok(Self { file })
    }

    /// Take the reader (shared) lock, without blocking.
    pub fn shared(root: &Path) -> anyhow::Result<Self> {
        let file = Self::sentinel(root)?;
        file.try_lock_shared().map_err(|detail| Error::LockContended {
            path: root.join(LOCK_SENTINEL).display().to_string(),
            detail: detail.into(),
        })?;
        Ok(Self { file })
    }

    fn sentinel(root: &Path) -> anyhow::Result<fs::File> {
        let path = root.join(LOCK_SENTINEL);
        fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock sentinel {}", path.display()))
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Persist |draft| as the declarative catalog at |root|: the canonical
/// rendering is written to a temporary sibling directory, which is then
/// swapped into place. The exclusive advisory lock is held throughout.
pub fn persist(draft: &Draft, root: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(root)
        .with_context(|| format!("failed to create catalog directory {}", root.display()))?;
    let _lock = CatalogLock::exclusive(root)?;

    let parent = root.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".catalog.staging.")
        .tempdir_in(parent)
        .context("failed to create staging directory")?;

    sources::write_catalog_to_dir(&draft.catalog, staging.path())?;
    fs::write(staging.path().join(LOCK_SENTINEL), b"")?;

    // Swap the staged directory into place. The previous catalog moves
    // aside first so the destination name is free for a plain rename.
    let backup = parent.join(format!(".catalog.previous.{}", std::process::id()));
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }
    fs::rename(root, &backup)
        .with_context(|| format!("failed to move {} aside", root.display()))?;

    let staged = staging.into_path();
    if let Err(err) = fs::rename(&staged, root) {
        // Restore the previous catalog before surfacing the failure.
        let _ = fs::rename(&backup, root);
        let _ = fs::remove_dir_all(&staged);
        return Err(err).with_context(|| format!("failed to move staged catalog into {}", root.display()));
    }
    fs::remove_dir_all(&backup)?;

    tracing::info!(root = %root.display(), "persisted catalog");
    Ok(())
}
