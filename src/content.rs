// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Byte access for manifest paths. The package reader owns the actual
//! storage; the analysis pipeline only ever sees this trait.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Provides the raw bytes behind a manifest path.
pub trait ContentSource: Sync {
    /// Read the full contents of the file at the given manifest path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read; the pipeline converts
    /// this into a degraded, extraction-failed record for that path.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Optional `file(1)`-style type description for the path, when the
    /// package reader has one (e.g. from the package header). Used as a
    /// classification fallback for unreadable files.
    fn description(&self, _path: &Path) -> Option<String> {
        None
    }

    /// Real filesystem location of the file, when it has one. External
    /// tooling (the linkage resolver) can only run against real paths.
    fn real_path(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// Content source over a package extracted to a directory tree. Manifest
/// paths are absolute within the package and joined onto the root.
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match path.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(path),
        }
    }
}

impl ContentSource for FsContentSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn real_path(&self, path: &Path) -> Option<PathBuf> {
        Some(self.resolve(path))
    }
}

/// In-memory content source, for embedding package payloads directly.
#[derive(Default)]
pub struct MemoryContentSource {
    files: HashMap<PathBuf, Vec<u8>>,
    descriptions: HashMap<PathBuf, String>,
}

impl MemoryContentSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn insert_description(&mut self, path: impl Into<PathBuf>, description: impl Into<String>) {
        self.descriptions.insert(path.into(), description.into());
    }
}

impl ContentSource for MemoryContentSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display())))
    }

    fn description(&self, path: &Path) -> Option<String> {
        self.descriptions.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fs_source_joins_absolute_manifest_paths() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("usr/bin");
        fs::create_dir_all(&nested).unwrap();
        let mut file = fs::File::create(nested.join("tool")).unwrap();
        file.write_all(b"payload").unwrap();

        let source = FsContentSource::new(dir.path());
        let bytes = source.read(Path::new("/usr/bin/tool")).unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn test_fs_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsContentSource::new(dir.path());
        assert!(source.read(Path::new("/does/not/exist")).is_err());
    }

    #[test]
    fn test_memory_source_roundtrip() {
        let mut source = MemoryContentSource::new();
        source.insert("/usr/lib64/libfoo.so.1", b"\x7fELF".to_vec());
        assert_eq!(
            source.read(Path::new("/usr/lib64/libfoo.so.1")).unwrap(),
            b"\x7fELF"
        );
        assert!(source.read(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_memory_source_description() {
        let mut source = MemoryContentSource::new();
        source.insert_description("/usr/bin/tool", "ELF 64-bit LSB executable");
        assert_eq!(
            source.description(Path::new("/usr/bin/tool")).as_deref(),
            Some("ELF 64-bit LSB executable")
        );
        assert_eq!(source.description(Path::new("/other")), None);
    }
}
