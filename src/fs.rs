//! Filesystem access for the planning record.
//!
//! Every component reads and writes through [`PlanFs`] rather than calling `std::fs`
//! directly, so the whole engine can run against [`MemFs`] in unit tests. [`DiskFs`] is the
//! production implementation.
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use crate::error::PlanError;

/// A single directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

pub trait PlanFs: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, PlanError>;
    /// Write `content`, creating missing parent directories.
    fn write(&self, path: &Path, content: &str) -> Result<(), PlanError>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Entries of `path` sorted by name. A missing directory lists as empty.
    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, PlanError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), PlanError>;
    fn remove_dir_all(&self, path: &Path) -> Result<(), PlanError>;
    fn remove_file(&self, path: &Path) -> Result<(), PlanError>;
    /// Rename a file or a whole directory tree. Fails if `to` already exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), PlanError>;
    /// Every regular file below `root`, sorted.
    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>, PlanError>;

    fn is_file(&self, path: &Path) -> bool {
        self.exists(path) && !self.is_dir(path)
    }

    fn read_opt(&self, path: &Path) -> Option<String> {
        match self.read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::debug!("Could not read {:?}: {}", path, e);
                None
            }
        }
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), PlanError> {
        let content = self.read_to_string(from)?;
        self.write(to, &content)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl PlanFs for DiskFs {
    fn read_to_string(&self, path: &Path) -> Result<String, PlanError> {
        tracing::debug!("Reading {:?}", path);
        Ok(fs::read_to_string(path)?)
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), PlanError> {
        tracing::debug!("Writing {:?} ({} bytes)", path, content.len());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(fs::write(path, content)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, PlanError> {
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), PlanError> {
        Ok(fs::create_dir_all(path)?)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), PlanError> {
        tracing::debug!("Removing directory {:?}", path);
        Ok(fs::remove_dir_all(path)?)
    }

    fn remove_file(&self, path: &Path) -> Result<(), PlanError> {
        Ok(fs::remove_file(path)?)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), PlanError> {
        if to.exists() {
            return Err(PlanError::Io(format!(
                "rename target {} already exists",
                to.display()
            )));
        }
        tracing::debug!("Renaming {:?} -> {:?}", from, to);
        Ok(fs::rename(from, to)?)
    }

    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>, PlanError> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// In-memory filesystem. Directories are tracked explicitly; writing a file creates its
/// ancestors.
#[derive(Debug, Default)]
pub struct MemFs {
    inner: RwLock<MemTree>,
}

#[derive(Debug, Default)]
struct MemTree {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
}

impl MemTree {
    fn add_ancestors(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file currently stored, for assertions in tests.
    pub fn files(&self) -> Vec<PathBuf> {
        self.inner.read().files.keys().cloned().collect()
    }
}

impl PlanFs for MemFs {
    fn read_to_string(&self, path: &Path) -> Result<String, PlanError> {
        self.inner
            .read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| PlanError::NotFound(format!("{} does not exist", path.display())))
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), PlanError> {
        let mut tree = self.inner.write();
        if tree.dirs.contains(path) {
            return Err(PlanError::Io(format!("{} is a directory", path.display())));
        }
        tree.add_ancestors(path);
        tree.files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let tree = self.inner.read();
        tree.files.contains_key(path) || tree.dirs.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.read().dirs.contains(path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, PlanError> {
        let tree = self.inner.read();
        let mut entries = BTreeSet::new();
        for dir in tree.dirs.iter().filter(|d| d.parent() == Some(path)) {
            if let Some(name) = dir.file_name() {
                entries.insert(DirEntryInfo {
                    name: name.to_string_lossy().to_string(),
                    is_dir: true,
                });
            }
        }
        for file in tree.files.keys().filter(|f| f.parent() == Some(path)) {
            if let Some(name) = file.file_name() {
                entries.insert(DirEntryInfo {
                    name: name.to_string_lossy().to_string(),
                    is_dir: false,
                });
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), PlanError> {
        let mut tree = self.inner.write();
        if tree.files.contains_key(path) {
            return Err(PlanError::Io(format!("{} is a file", path.display())));
        }
        tree.add_ancestors(path);
        tree.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), PlanError> {
        let mut tree = self.inner.write();
        if !tree.dirs.contains(path) {
            return Err(PlanError::NotFound(format!("{} does not exist", path.display())));
        }
        tree.dirs.retain(|d| !d.starts_with(path));
        tree.files.retain(|f, _| !f.starts_with(path));
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), PlanError> {
        self.inner
            .write()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| PlanError::NotFound(format!("{} does not exist", path.display())))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), PlanError> {
        let mut tree = self.inner.write();
        if tree.files.contains_key(to) || tree.dirs.contains(to) {
            return Err(PlanError::Io(format!(
                "rename target {} already exists",
                to.display()
            )));
        }
        if let Some(content) = tree.files.remove(from) {
            tree.add_ancestors(to);
            tree.files.insert(to.to_path_buf(), content);
            return Ok(());
        }
        if !tree.dirs.contains(from) {
            return Err(PlanError::NotFound(format!("{} does not exist", from.display())));
        }
        let moved_dirs: Vec<PathBuf> = tree
            .dirs
            .iter()
            .filter(|d| d.starts_with(from))
            .cloned()
            .collect();
        for dir in moved_dirs {
            tree.dirs.remove(&dir);
            let suffix = dir.strip_prefix(from)?.to_path_buf();
            tree.dirs.insert(to.join(suffix));
        }
        let moved_files: Vec<PathBuf> = tree
            .files
            .keys()
            .filter(|f| f.starts_with(from))
            .cloned()
            .collect();
        for file in moved_files {
            if let Some(content) = tree.files.remove(&file) {
                let suffix = file.strip_prefix(from)?.to_path_buf();
                tree.files.insert(to.join(suffix), content);
            }
        }
        tree.add_ancestors(to);
        Ok(())
    }

    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>, PlanError> {
        Ok(self
            .inner
            .read()
            .files
            .keys()
            .filter(|f| f.starts_with(root))
            .cloned()
            .collect())
    }
}
