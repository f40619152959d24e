// SPDX-License-Identifier: Apache-2.0

//! The external cooperative-exclusion lock consulted before every MSR or
//! PCI read/write.

use std::path::{Path, PathBuf};

/// A source of "is access currently refused?" answers.
///
/// Behind a trait so the dispatcher can be driven by a fixed value in
/// tests without touching the filesystem.
pub trait LockCheck {
    /// Returns `true` if access is currently refused.
    fn is_locked(&self) -> bool;
}

/// The production realization: the lock is held exactly when a configured
/// path exists on disk.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Watches `path` for existence.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path this lock watches.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockCheck for LockFile {
    fn is_locked(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_path_is_unlocked() {
        let lock = LockFile::new("/nonexistent/hwregd.lock");
        assert!(!lock.is_locked());
    }

    #[test]
    fn present_path_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hwregd.lock");
        std::fs::write(&path, b"").unwrap();
        let lock = LockFile::new(path);
        assert!(lock.is_locked());
    }
}
