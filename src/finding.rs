// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Finding values emitted by the policy engine. Formatting and filtering are the caller's job.

use serde::Serialize;
use std::fmt;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A single policy result for one subject (usually a file path).
///
/// Findings are pure values in the order the engine produced them; the
/// consumer decides how to render, score, or filter them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: &'static str,
    pub path: String,
    pub detail: Vec<String>,
}

impl Finding {
    #[must_use]
    pub fn error(code: &'static str, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            path: path.into(),
            detail: Vec::new(),
        }
    }

    #[must_use]
    pub fn warning(code: &'static str, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            path: path.into(),
            detail: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail.push(detail.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "W",
            Severity::Error => "E",
        };
        write!(f, "{tag}: {} {}", self.code, self.path)?;
        for d in &self.detail {
            write!(f, " {d}")?;
        }
        Ok(())
    }
}

/// Finding codes, named after the packaging defect they describe.
pub mod codes {
    pub const ARCH_INDEPENDENT_PACKAGE_CONTAINS_BINARY: &str =
        "arch-independent-package-contains-binary-or-object";
    pub const ARCH_DEPENDENT_FILE_IN_USR_SHARE: &str = "arch-dependent-file-in-usr-share";
    pub const BINARY_IN_ETC: &str = "binary-in-etc";
    pub const UNSTRIPPED_BINARY_OR_OBJECT: &str = "unstripped-binary-or-object";
    pub const NO_SONAME: &str = "no-soname";
    pub const INVALID_SONAME: &str = "invalid-soname";
    pub const NO_LDCONFIG_SYMLINK: &str = "no-ldconfig-symlink";
    pub const INVALID_LDCONFIG_SYMLINK: &str = "invalid-ldconfig-symlink";
    pub const SHLIB_WITH_NON_PIC_CODE: &str = "shlib-with-non-pic-code";
    pub const UNDEFINED_NON_WEAK_SYMBOL: &str = "undefined-non-weak-symbol";
    pub const UNUSED_DIRECT_SHLIB_DEPENDENCY: &str = "unused-direct-shlib-dependency";
    pub const SHARED_LIB_CALLS_EXIT: &str = "shared-lib-calls-exit";
    pub const BINARY_OR_SHLIB_DEFINES_RPATH: &str = "binary-or-shlib-defines-rpath";
    pub const SHARED_LIB_WITHOUT_DEPENDENCY_INFORMATION: &str =
        "shared-lib-without-dependency-information";
    pub const STATICALLY_LINKED_BINARY: &str = "statically-linked-binary";
    pub const LIBRARY_NOT_LINKED_AGAINST_LIBC: &str = "library-not-linked-against-libc";
    pub const PROGRAM_NOT_LINKED_AGAINST_LIBC: &str = "program-not-linked-against-libc";
    pub const INVALID_DIRECTORY_REFERENCE: &str = "invalid-directory-reference";
    pub const EXECUTABLE_IN_LIBRARY_PACKAGE: &str = "executable-in-library-package";
    pub const NON_VERSIONED_FILE_IN_LIBRARY_PACKAGE: &str =
        "non-versioned-file-in-library-package";
    pub const INCOHERENT_VERSION_IN_NAME: &str = "incoherent-version-in-name";
    pub const NO_BINARY: &str = "no-binary";
    pub const ONLY_NON_BINARY_IN_USR_LIB: &str = "only-non-binary-in-usr-lib";
    pub const BINARY_INTROSPECTION_FAILED: &str = "binary-introspection-failed";
    pub const LINKAGE_RESOLUTION_FAILED: &str = "linkage-resolution-failed";
    pub const EXECUTABLE_STACK: &str = "executable-stack";
    pub const MISSING_PT_GNU_STACK_SECTION: &str = "missing-PT_GNU_STACK-section";
    pub const NON_POSITION_INDEPENDENT_EXECUTABLE: &str = "non-position-independent-executable";
    pub const MISSING_CALL_TO_SETGROUPS: &str = "missing-call-to-setgroups";
    pub const CALL_TO_MKTEMP: &str = "call-to-mktemp";
    pub const OCAML_MIXED_EXECUTABLE: &str = "ocaml-mixed-executable";
}
