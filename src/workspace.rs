//! The transient clone directory and index directory of the repository
//! currently being analyzed.
//!
//! A [`Workspace`] is a plain value: both pipelines receive it explicitly
//! instead of reaching for fixed global paths. [`Workspace::prepare`] is the
//! only operation with side effects and it is destructive: whatever was
//! analyzed before is gone afterwards.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::WorkspaceConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    clone_dir: PathBuf,
    index_dir: PathBuf,
}

impl Workspace {
    pub fn new(clone_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            clone_dir: clone_dir.into(),
            index_dir: index_dir.into(),
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(&config.clone_dir, &config.index_dir)
    }

    pub fn clone_dir(&self) -> &Path {
        &self.clone_dir
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Delete any previous clone and index, then recreate both directories
    /// empty.
    ///
    /// Safe to call when neither directory exists. Read-only entries (git
    /// marks pack files read-only) are made writable and removed; any other
    /// failure is returned.
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.clone_dir, &self.index_dir] {
            force_remove_dir_all(dir)?;
        }
        for dir in [&self.clone_dir, &self.index_dir] {
            std::fs::create_dir_all(dir)?;
        }
        tracing::debug!(
            clone_dir = %self.clone_dir.display(),
            index_dir = %self.index_dir.display(),
            "workspace prepared"
        );
        Ok(())
    }
}

/// `remove_dir_all` that retries once after making the whole tree writable
/// when the first attempt hits a permission error.
pub fn force_remove_dir_all(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "permission denied, forcing write access");
            make_tree_writable(path)?;
            std::fs::remove_dir_all(path)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn make_tree_writable(root: &Path) -> io::Result<()> {
    // Parents first so their children become reachable.
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.path_is_symlink() {
            continue;
        }
        make_writable(entry.path())?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o700);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    std::fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace_in(tmp: &TempDir) -> Workspace {
        Workspace::new(tmp.path().join("temp_repo"), tmp.path().join("index"))
    }

    #[test]
    fn prepare_without_prior_state() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_in(&tmp);
        ws.prepare().unwrap();
        assert!(ws.clone_dir().is_dir());
        assert!(ws.index_dir().is_dir());
        assert_eq!(fs::read_dir(ws.clone_dir()).unwrap().count(), 0);
    }

    #[test]
    fn prepare_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_in(&tmp);
        ws.prepare().unwrap();
        ws.prepare().unwrap();
        assert!(ws.index_dir().is_dir());
    }

    #[test]
    fn prepare_wipes_previous_contents() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace_in(&tmp);
        ws.prepare().unwrap();
        fs::create_dir_all(ws.clone_dir().join("src")).unwrap();
        fs::write(ws.clone_dir().join("src/main.py"), "print(1)").unwrap();
        fs::write(ws.index_dir().join("index.sqlite"), b"stale").unwrap();

        ws.prepare().unwrap();
        assert_eq!(fs::read_dir(ws.clone_dir()).unwrap().count(), 0);
        assert_eq!(fs::read_dir(ws.index_dir()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn prepare_removes_read_only_entries() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let ws = workspace_in(&tmp);
        ws.prepare().unwrap();

        let objects = ws.clone_dir().join(".git/objects/pack");
        fs::create_dir_all(&objects).unwrap();
        let pack = objects.join("pack-1.pack");
        fs::write(&pack, b"PACK").unwrap();
        fs::set_permissions(&pack, fs::Permissions::from_mode(0o444)).unwrap();
        fs::set_permissions(&objects, fs::Permissions::from_mode(0o555)).unwrap();

        ws.prepare().unwrap();
        assert!(!pack.exists());
        assert_eq!(fs::read_dir(ws.clone_dir()).unwrap().count(), 0);
    }

    #[test]
    fn force_remove_missing_path_is_ok() {
        let tmp = TempDir::new().unwrap();
        force_remove_dir_all(&tmp.path().join("never-created")).unwrap();
    }
}
