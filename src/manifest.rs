// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Package file manifest and package metadata as supplied by the package reader.

use path_clean::PathClean;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for manifest operations.
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Errors raised while building the manifest or package metadata.
///
/// These are fatal for the whole package: a malformed manifest aborts the
/// run instead of degrading into per-file findings.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Duplicate manifest path: {path:?}")]
    DuplicatePath { path: PathBuf },
    #[error("Manifest path is not absolute: {path:?}")]
    RelativePath { path: PathBuf },
    #[error("Package metadata is missing a required field: {field}")]
    MissingMetadata { field: &'static str },
}

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;
const S_IFREG: u32 = 0o100_000;

/// One entry of a package's file manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Full `st_mode` bits, including the file-type nibble.
    pub mode: u32,
    pub owner: String,
    pub group: String,
    /// Normalized symlink target; `None` for anything that is not a symlink.
    pub link_target: Option<PathBuf>,
    pub size: u64,
}

impl FileEntry {
    /// Create a regular-file entry with default ownership.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            mode: S_IFREG | 0o644,
            owner: "root".to_string(),
            group: "root".to_string(),
            link_target: None,
            size,
        }
    }

    /// Create a directory entry.
    #[must_use]
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: S_IFDIR | 0o755,
            owner: "root".to_string(),
            group: "root".to_string(),
            link_target: None,
            size: 0,
        }
    }

    /// Create a symlink entry. Relative targets are resolved against the
    /// symlink's parent directory and normalized, so lookups against other
    /// manifest paths compare cleanly.
    #[must_use]
    pub fn symlink(path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let target = target.into();
        let resolved = if target.is_absolute() {
            target
        } else {
            path.parent()
                .unwrap_or_else(|| Path::new("/"))
                .join(&target)
        };
        Self {
            path,
            mode: S_IFLNK | 0o777,
            owner: "root".to_string(),
            group: "root".to_string(),
            link_target: Some(resolved.clean()),
            size: 0,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.link_target.is_some()
    }
}

/// Package-level metadata needed by the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMeta {
    name: String,
    arch: String,
    source_rpm: Option<String>,
    is_source: bool,
    installed: bool,
}

impl PackageMeta {
    /// Create metadata for a binary package.
    ///
    /// # Errors
    /// Returns an error if the name or architecture is empty.
    pub fn new(name: impl Into<String>, arch: impl Into<String>) -> ManifestResult<Self> {
        let name = name.into();
        let arch = arch.into();
        if name.is_empty() {
            return Err(ManifestError::MissingMetadata { field: "name" });
        }
        if arch.is_empty() {
            return Err(ManifestError::MissingMetadata { field: "arch" });
        }
        Ok(Self {
            name,
            arch,
            source_rpm: None,
            is_source: false,
            installed: false,
        })
    }

    #[must_use]
    pub fn with_source_rpm(mut self, source_rpm: impl Into<String>) -> Self {
        self.source_rpm = Some(source_rpm.into());
        self
    }

    /// Mark this package as a source package. Source packages skip binary
    /// analysis entirely.
    #[must_use]
    pub fn source(mut self) -> Self {
        self.is_source = true;
        self
    }

    /// Mark this package as installed (as opposed to freshly extracted).
    /// Only installed packages are eligible for linkage resolution.
    #[must_use]
    pub fn installed(mut self) -> Self {
        self.installed = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    #[must_use]
    pub fn is_noarch(&self) -> bool {
        self.arch == "noarch"
    }

    #[must_use]
    pub fn is_source(&self) -> bool {
        self.is_source
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// True when this package was built from a source package with a
    /// different base name, i.e. it is one sub-package of a multi-package
    /// build. Such packages legitimately may contain no binaries.
    #[must_use]
    pub fn is_split_package(&self) -> bool {
        let Some(source_rpm) = self.source_rpm.as_deref() else {
            return false;
        };
        match source_base_name(source_rpm) {
            Some(base) => base != self.name,
            None => false,
        }
    }
}

/// Base name of a source package file name: everything before the first
/// `-<digit>` boundary (`foo-1.2-3.src.rpm` -> `foo`).
fn source_base_name(source_rpm: &str) -> Option<&str> {
    let bytes = source_rpm.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'-' && bytes[i + 1].is_ascii_digit() {
            return Some(&source_rpm[..i]);
        }
    }
    None
}

/// Ordered file manifest of one package.
///
/// Entries keep their supplied order (rule evaluation is deterministic in
/// manifest order) with a hash index for path lookups.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<FileEntry>,
    index: HashMap<PathBuf, usize>,
}

impl Manifest {
    /// Build a manifest from entries in package order.
    ///
    /// # Errors
    /// Returns an error on duplicate or non-absolute paths.
    pub fn new(entries: Vec<FileEntry>) -> ManifestResult<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if !entry.path.is_absolute() {
                return Err(ManifestError::RelativePath {
                    path: entry.path.clone(),
                });
            }
            if index.insert(entry.path.clone(), i).is_some() {
                return Err(ManifestError::DuplicatePath {
                    path: entry.path.clone(),
                });
            }
        }
        Ok(Self { entries, index })
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Iterate entries in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
