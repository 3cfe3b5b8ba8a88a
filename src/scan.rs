// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Per-package analysis pipeline: classify and extract every candidate file
//! in parallel, enrich installed binaries through the linkage resolver, then
//! run the policy engine once, sequentially, in manifest order.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::binary::{classify_description, has_non_binary_extension, BinaryInfo, LinkageResolver};
use crate::config::CheckConfig;
use crate::content::ContentSource;
use crate::finding::Finding;
use crate::manifest::{FileEntry, Manifest, PackageMeta};
use crate::policy::{is_versioned_shlib_path, PolicyEngine};

/// Analyze one binary package and return its findings in manifest order.
///
/// Source packages skip analysis entirely. The linkage resolver, when given,
/// is only consulted for installed packages.
///
/// # Errors
/// Returns an error only for a malformed manifest; everything per-file is
/// converted into findings instead.
pub fn scan_package(
    entries: Vec<FileEntry>,
    meta: &PackageMeta,
    content: &dyn ContentSource,
    resolver: Option<&dyn LinkageResolver>,
    config: &CheckConfig,
) -> Result<Vec<Finding>> {
    let manifest = Manifest::new(entries).context("malformed package manifest")?;

    if meta.is_source() {
        debug!(package = meta.name(), "skipping source package");
        return Ok(Vec::new());
    }

    // Extraction and resolution are independent per file; the fold into
    // package state happens afterwards, single-threaded, in manifest order.
    let entries: Vec<&FileEntry> = manifest.iter().collect();
    let binaries: Vec<(PathBuf, BinaryInfo)> = entries
        .into_par_iter()
        .filter_map(|entry| analyze_entry(entry, meta, content, resolver))
        .collect();

    let engine = PolicyEngine::new(config);
    Ok(engine.evaluate(&manifest, meta, &binaries, content))
}

/// Classify and extract a single manifest entry. Returns `None` for entries
/// that are not candidate binaries.
fn analyze_entry(
    entry: &FileEntry,
    meta: &PackageMeta,
    content: &dyn ContentSource,
    resolver: Option<&dyn LinkageResolver>,
) -> Option<(PathBuf, BinaryInfo)> {
    if entry.is_dir() || entry.is_symlink() || has_non_binary_extension(&entry.path) {
        return None;
    }
    let path = &entry.path;

    let bytes = match content.read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            // Without bytes the only classification left is the package
            // reader's description; a claimed binary we cannot read is a
            // degraded candidate, anything else is skipped.
            let class = content
                .description(path)
                .map(|d| classify_description(&d))
                .filter(|c| c.is_binary());
            return match class {
                Some(class) => Some((
                    path.clone(),
                    BinaryInfo::failed(
                        class,
                        crate::binary::BinaryKind::NotBinary,
                        path,
                        format!("read failed: {e}"),
                    ),
                )),
                None => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    None
                }
            };
        }
    };

    let mut info = BinaryInfo::extract(path, &bytes, is_versioned_shlib_path(path));
    if !info.class.is_binary() {
        return None;
    }

    if meta.is_installed()
        && info.kind.is_elf()
        && !info.is_debug
        && info.extraction_failed.is_none()
    {
        if let Some(resolver) = resolver {
            if let Some(real_path) = content.real_path(path) {
                match resolver.resolve(&real_path) {
                    Ok(report) => {
                        info.undefined_symbols = report.undefined_symbols;
                        info.unused_dependencies = report.unused_dependencies;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "linkage resolution failed");
                        info.resolution_failed = true;
                    }
                }
            }
        }
    }

    Some((path.clone(), info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentSource;
    use crate::finding::codes;

    /// Minimal valid 64-bit little-endian ELF header.
    fn minimal_elf(e_type: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2;
        bytes[5] = 1;
        bytes[6] = 1;
        bytes[16..18].copy_from_slice(&e_type.to_le_bytes());
        bytes[18..20].copy_from_slice(&62u16.to_le_bytes());
        bytes[20..24].copy_from_slice(&1u32.to_le_bytes());
        bytes[52..54].copy_from_slice(&64u16.to_le_bytes());
        bytes[54..56].copy_from_slice(&56u16.to_le_bytes());
        bytes[58..60].copy_from_slice(&64u16.to_le_bytes());
        bytes
    }

    fn meta(name: &str, arch: &str) -> PackageMeta {
        PackageMeta::new(name, arch).unwrap()
    }

    fn codes_of(findings: &[Finding]) -> Vec<&'static str> {
        findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_source_package_skips_analysis() {
        let mut content = MemoryContentSource::new();
        content.insert("/usr/bin/tool", minimal_elf(2));
        let findings = scan_package(
            vec![FileEntry::file("/usr/bin/tool", 64)],
            &meta("tools", "x86_64").source(),
            &content,
            None,
            &CheckConfig::default(),
        )
        .unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_noarch_package_with_elf_executable() {
        let mut content = MemoryContentSource::new();
        content.insert("/usr/bin/tool", minimal_elf(2));
        let findings = scan_package(
            vec![FileEntry::file("/usr/bin/tool", 64)],
            &meta("tools", "noarch"),
            &content,
            None,
            &CheckConfig::default(),
        )
        .unwrap();
        assert_eq!(
            codes_of(&findings),
            vec![codes::ARCH_INDEPENDENT_PACKAGE_CONTAINS_BINARY]
        );
    }

    #[test]
    fn test_shared_object_pipeline_findings() {
        let mut content = MemoryContentSource::new();
        content.insert("/usr/lib64/libfoo.so.1", minimal_elf(3));
        let findings = scan_package(
            vec![FileEntry::file("/usr/lib64/libfoo.so.1", 64)],
            &meta("libfoo1", "aarch64"),
            &content,
            None,
            &CheckConfig::default(),
        )
        .unwrap();
        // The header-only shared object has no soname and no dependencies.
        assert_eq!(
            codes_of(&findings),
            vec![
                codes::NO_SONAME,
                codes::SHARED_LIB_WITHOUT_DEPENDENCY_INFORMATION
            ]
        );
    }

    #[test]
    fn test_unreadable_claimed_binary_degrades() {
        let mut content = MemoryContentSource::new();
        content.insert_description("/usr/bin/tool", "ELF 64-bit LSB executable");
        let findings = scan_package(
            vec![FileEntry::file("/usr/bin/tool", 64)],
            &meta("tools", "x86_64"),
            &content,
            None,
            &CheckConfig::default(),
        )
        .unwrap();
        assert!(codes_of(&findings).contains(&codes::BINARY_INTROSPECTION_FAILED));
        // Exactly one finding for the unreadable path.
        assert_eq!(
            findings
                .iter()
                .filter(|f| f.path == "/usr/bin/tool")
                .count(),
            1
        );
    }

    #[test]
    fn test_unreadable_unknown_file_is_skipped() {
        let content = MemoryContentSource::new();
        let findings = scan_package(
            vec![FileEntry::file("/usr/share/data/blob", 64)],
            &meta("data", "x86_64"),
            &content,
            None,
            &CheckConfig::default(),
        )
        .unwrap();
        // No introspection finding, only the package-level no-binary error.
        assert_eq!(codes_of(&findings), vec![codes::NO_BINARY]);
    }

    #[test]
    fn test_script_files_are_not_binaries() {
        let mut content = MemoryContentSource::new();
        content.insert("/usr/bin/run", b"#!/bin/sh\nexec true\n".to_vec());
        let findings = scan_package(
            vec![FileEntry::file("/usr/bin/run", 20)],
            &meta("scripts", "x86_64"),
            &content,
            None,
            &CheckConfig::default(),
        )
        .unwrap();
        assert_eq!(codes_of(&findings), vec![codes::NO_BINARY]);
    }

    #[test]
    fn test_duplicate_manifest_is_fatal() {
        let content = MemoryContentSource::new();
        let result = scan_package(
            vec![
                FileEntry::file("/usr/bin/tool", 64),
                FileEntry::file("/usr/bin/tool", 64),
            ],
            &meta("tools", "x86_64"),
            &content,
            None,
            &CheckConfig::default(),
        );
        assert!(result.is_err());
    }
}
