// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Shared-library packaging policy. Consumes a package's manifest plus one
//! `BinaryInfo` per file and emits findings in deterministic manifest order.

mod paths;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::binary::{is_unstrippable_path, BinaryInfo, BinaryKind};
use crate::config::CheckConfig;
use crate::content::ContentSource;
use crate::finding::{codes, Finding};
use crate::manifest::{FileEntry, Manifest, PackageMeta};

pub(crate) use paths::is_versioned_shlib_path;

/// Major version shared by a package's library family.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LibraryVersion {
    #[default]
    Unset,
    Version(String),
    /// Shared objects in the package disagree on their major version.
    Conflicting,
}

impl LibraryVersion {
    fn record(&mut self, version: &str) {
        match self {
            Self::Unset => *self = Self::Version(version.to_string()),
            Self::Version(existing) if existing != version => *self = Self::Conflicting,
            _ => {}
        }
    }
}

/// Aggregate built over one evaluation pass, discarded afterwards.
#[derive(Default)]
struct PackageState {
    has_lib: BTreeSet<PathBuf>,
    exec_files: Vec<PathBuf>,
    version: LibraryVersion,
    binary_seen: bool,
    has_usr_lib_file: bool,
    binary_in_usr_lib: bool,
}

/// Evaluates the shared-library rule set for one package at a time.
pub struct PolicyEngine<'a> {
    config: &'a CheckConfig,
}

impl<'a> PolicyEngine<'a> {
    #[must_use]
    pub fn new(config: &'a CheckConfig) -> Self {
        Self { config }
    }

    /// Run all rules over the package.
    ///
    /// `binaries` carries one record per analyzed file; manifest entries
    /// without a record (directories, symlinks, skipped files) are treated
    /// as non-binary. Findings come out ordered by manifest position, so
    /// two runs over the same input produce identical sequences.
    #[must_use]
    pub fn evaluate(
        &self,
        manifest: &Manifest,
        meta: &PackageMeta,
        binaries: &[(PathBuf, BinaryInfo)],
        content: &dyn ContentSource,
    ) -> Vec<Finding> {
        let infos: HashMap<&Path, &BinaryInfo> = binaries
            .iter()
            .map(|(path, info)| (path.as_path(), info))
            .collect();

        let mut findings = Vec::new();
        let mut state = PackageState::default();
        for entry in manifest.iter() {
            self.check_file(entry, &infos, manifest, meta, content, &mut state, &mut findings);
        }
        self.check_package(manifest, meta, &state, &mut findings);
        findings
    }

    #[allow(clippy::too_many_arguments)]
    fn check_file(
        &self,
        entry: &FileEntry,
        infos: &HashMap<&Path, &BinaryInfo>,
        manifest: &Manifest,
        meta: &PackageMeta,
        content: &dyn ContentSource,
        state: &mut PackageState,
        findings: &mut Vec<Finding>,
    ) {
        let path = &entry.path;
        let path_str = path.to_string_lossy();

        if !entry.is_dir() && paths::is_usr_lib_path(&path_str) {
            state.has_usr_lib_file = true;
            if !state.binary_in_usr_lib
                && paths::is_usr_lib_exception(&path_str, &self.config.usr_lib_allowed_subdirs)
            {
                state.binary_in_usr_lib = true;
            }
        }

        let Some(info) = infos.get(path.as_path()).copied().filter(|i| i.class.is_binary()) else {
            if !entry.is_dir() && !entry.is_symlink() && paths::is_reference_path(&path_str) {
                self.check_directory_references(entry, content, findings);
            }
            return;
        };

        state.binary_seen = true;
        if paths::is_usr_lib_path(&path_str) {
            state.binary_in_usr_lib = true;
        }

        if meta.is_noarch() {
            findings.push(Finding::error(
                codes::ARCH_INDEPENDENT_PACKAGE_CONTAINS_BINARY,
                path_str.as_ref(),
            ));
            return;
        }

        if path_str.starts_with("/usr/share/") {
            findings.push(Finding::error(
                codes::ARCH_DEPENDENT_FILE_IN_USR_SHARE,
                path_str.as_ref(),
            ));
        }
        if path_str.starts_with("/etc/") {
            findings.push(Finding::error(codes::BINARY_IN_ETC, path_str.as_ref()));
        }

        // Non-ELF images and deliberately unstripped objects end here.
        if info.kind.is_native() || is_unstrippable_path(path) {
            return;
        }

        if let Some(reason) = &info.extraction_failed {
            findings.push(
                Finding::warning(codes::BINARY_INTROSPECTION_FAILED, path_str.as_ref())
                    .with_detail(reason),
            );
            return;
        }

        if !info.is_stripped {
            findings.push(Finding::warning(
                codes::UNSTRIPPED_BINARY_OR_OBJECT,
                path_str.as_ref(),
            ));
        }

        if paths::is_versioned_shlib_path(path) {
            state.has_lib.insert(path.clone());
            self.check_shared_object(entry, info, manifest, &mut state.version, findings);
        }

        if info.resolution_failed {
            findings.push(Finding::warning(
                codes::LINKAGE_RESOLUTION_FAILED,
                path_str.as_ref(),
            ));
        }

        for component in &info.rpath {
            if self.config.is_system_lib_path(component) || !paths::is_usr_lib_path(component) {
                findings.push(
                    Finding::error(codes::BINARY_OR_SHLIB_DEFINES_RPATH, path_str.as_ref())
                        .with_detail(component)
                        .with_detail(info.rpath.join(":")),
                );
                break;
            }
        }

        let mut is_exec = info.kind == BinaryKind::ElfExecutable;
        let is_shobj = info.kind == BinaryKind::ElfSharedObject;
        if !is_exec && !is_shobj {
            return;
        }
        // PIE executables carry the shared-object ELF type; a ".so"-less
        // name under a bin directory is a program.
        if is_shobj && !path_str.contains(".so") && paths::is_bin_path(&path_str) {
            is_exec = true;
        }

        if is_exec {
            if paths::is_bin_path(&path_str) {
                state.exec_files.push(path.clone());
            }
            if info.ocaml_mixed {
                findings.push(Finding::warning(
                    codes::OCAML_MIXED_EXECUTABLE,
                    path_str.as_ref(),
                ));
            }
            if !is_shobj && self.config.requires_pie(&path_str) {
                findings.push(Finding::error(
                    codes::NON_POSITION_INDEPENDENT_EXECUTABLE,
                    path_str.as_ref(),
                ));
            }
        }

        let soname = info.soname.as_deref();
        if info.needed.is_empty() && !soname.is_some_and(paths::is_ldso_soname) {
            if is_shobj {
                findings.push(Finding::error(
                    codes::SHARED_LIB_WITHOUT_DEPENDENCY_INFORMATION,
                    path_str.as_ref(),
                ));
            } else {
                findings.push(Finding::error(
                    codes::STATICALLY_LINKED_BINARY,
                    path_str.as_ref(),
                ));
            }
        } else if !paths::mentions_libc(&path_str)
            && soname.is_none_or(|s| !paths::mentions_libc(s) && !paths::is_ldso_soname(s))
            && !info.needed.iter().any(|lib| paths::mentions_libc(lib))
        {
            if is_shobj {
                findings.push(Finding::error(
                    codes::LIBRARY_NOT_LINKED_AGAINST_LIBC,
                    path_str.as_ref(),
                ));
            } else {
                findings.push(Finding::error(
                    codes::PROGRAM_NOT_LINKED_AGAINST_LIBC,
                    path_str.as_ref(),
                ));
            }
        }

        if info.has_gnu_stack {
            if info.exec_stack {
                findings.push(Finding::warning(codes::EXECUTABLE_STACK, path_str.as_ref()));
            }
        } else if is_x86_family(meta.arch()) {
            // Without PT_GNU_STACK the dynamic linker falls back to an
            // executable stack on these architectures.
            findings.push(Finding::error(
                codes::MISSING_PT_GNU_STACK_SECTION,
                path_str.as_ref(),
            ));
        }

        if info.calls_setuid && info.calls_setgid && !info.calls_setgroups {
            findings.push(Finding::error(
                codes::MISSING_CALL_TO_SETGROUPS,
                path_str.as_ref(),
            ));
        }
        if info.calls_mktemp {
            findings.push(Finding::error(codes::CALL_TO_MKTEMP, path_str.as_ref()));
        }
    }

    fn check_shared_object(
        &self,
        entry: &FileEntry,
        info: &BinaryInfo,
        manifest: &Manifest,
        version: &mut LibraryVersion,
        findings: &mut Vec<Finding>,
    ) {
        let path_str = entry.path.to_string_lossy();
        match info.soname.as_deref() {
            None => findings.push(Finding::warning(codes::NO_SONAME, path_str.as_ref())),
            Some(soname) => {
                if paths::is_valid_soname(soname) {
                    self.check_ldconfig_symlink(entry, soname, manifest, findings);
                } else {
                    findings.push(
                        Finding::error(codes::INVALID_SONAME, path_str.as_ref())
                            .with_detail(soname),
                    );
                }
                if let Some(v) = paths::soname_version(soname) {
                    version.record(&v);
                }
            }
        }

        if !info.is_pic {
            findings.push(Finding::error(
                codes::SHLIB_WITH_NON_PIC_CODE,
                path_str.as_ref(),
            ));
        }

        for symbol in &info.undefined_symbols {
            findings.push(
                Finding::warning(codes::UNDEFINED_NON_WEAK_SYMBOL, path_str.as_ref())
                    .with_detail(symbol),
            );
        }
        for dependency in &info.unused_dependencies {
            findings.push(
                Finding::warning(codes::UNUSED_DIRECT_SHLIB_DEPENDENCY, path_str.as_ref())
                    .with_detail(dependency),
            );
        }
        for call in &info.exit_calls {
            findings.push(
                Finding::warning(codes::SHARED_LIB_CALLS_EXIT, path_str.as_ref())
                    .with_detail(call),
            );
        }
    }

    /// The symlink ldconfig would create must ship in the package and point
    /// back at the library.
    fn check_ldconfig_symlink(
        &self,
        entry: &FileEntry,
        soname: &str,
        manifest: &Manifest,
        findings: &mut Vec<Finding>,
    ) {
        let path_str = entry.path.to_string_lossy();
        let symlink_path = paths::expected_ldconfig_symlink(&entry.path, soname);
        match manifest.get(&symlink_path) {
            Some(link_entry) => {
                // Targets are normalized at manifest construction, so a
                // relative basename target compares as the full path. An
                // entry that is not a symlink is the library itself.
                if let Some(target) = &link_entry.link_target {
                    if target != &entry.path {
                        findings.push(
                            Finding::error(codes::INVALID_LDCONFIG_SYMLINK, path_str.as_ref())
                                .with_detail(target.to_string_lossy()),
                        );
                    }
                }
            }
            None => {
                let base = entry
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                if base.starts_with("lib") || base.starts_with("ld-") {
                    findings.push(Finding::error(
                        codes::NO_LDCONFIG_SYMLINK,
                        path_str.as_ref(),
                    ));
                }
            }
        }
    }

    fn check_directory_references(
        &self,
        entry: &FileEntry,
        content: &dyn ContentSource,
        findings: &mut Vec<Finding>,
    ) {
        let bytes = match content.read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %entry.path.display(), error = %e, "skipping unreadable reference file");
                return;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<String> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| paths::has_invalid_dir_reference(line))
            .map(|(i, _)| (i + 1).to_string())
            .collect();
        if !lines.is_empty() {
            findings.push(
                Finding::error(
                    codes::INVALID_DIRECTORY_REFERENCE,
                    entry.path.to_string_lossy().as_ref(),
                )
                .with_detail(format!("(line {})", lines.join(", "))),
            );
        }
    }

    fn check_package(
        &self,
        manifest: &Manifest,
        meta: &PackageMeta,
        state: &PackageState,
        findings: &mut Vec<Finding>,
    ) {
        if !state.has_lib.is_empty() {
            // Libraries and executables must not ship together; an upgrade
            // of one would force an upgrade of the other.
            for path in &state.exec_files {
                findings.push(Finding::error(
                    codes::EXECUTABLE_IN_LIBRARY_PACKAGE,
                    path.to_string_lossy().as_ref(),
                ));
            }
            for entry in manifest.iter() {
                if state.exec_files.contains(&entry.path)
                    || paths::is_versioned_shlib_path(&entry.path)
                {
                    continue;
                }
                let path_str = entry.path.to_string_lossy();
                let subject = paths::man_page_subject(&path_str).unwrap_or(path_str.as_ref());
                if !paths::contains_version_digit(subject) {
                    findings.push(Finding::error(
                        codes::NON_VERSIONED_FILE_IN_LIBRARY_PACKAGE,
                        path_str.as_ref(),
                    ));
                }
            }
            if let LibraryVersion::Version(version) = &state.version {
                if !meta.name().contains(version.as_str()) {
                    findings.push(
                        Finding::error(codes::INCOHERENT_VERSION_IN_NAME, meta.name())
                            .with_detail(version),
                    );
                }
            }
        }

        if !state.binary_seen && !meta.is_split_package() && !meta.is_noarch() {
            findings.push(Finding::error(codes::NO_BINARY, meta.name()));
        }

        if state.has_usr_lib_file && !state.binary_in_usr_lib {
            findings.push(Finding::error(
                codes::ONLY_NON_BINARY_IN_USR_LIB,
                meta.name(),
            ));
        }
    }
}

fn is_x86_family(arch: &str) -> bool {
    arch.ends_with("86") || arch.starts_with("pentium") || arch == "athlon" || arch == "x86_64"
}
