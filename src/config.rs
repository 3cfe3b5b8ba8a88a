// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Immutable per-run configuration for the classifier, extractor, and policy engine.

use std::time::Duration;

/// Library directories the dynamic linker already searches. An RPATH entry
/// pointing at one of these is always redundant.
pub const DEFAULT_SYSTEM_LIB_PATHS: &[&str] = &[
    "/lib",
    "/usr/lib",
    "/usr/X11R6/lib",
    "/lib64",
    "/usr/lib64",
    "/usr/X11R6/lib64",
];

/// Subdirectories of `/usr/lib(64)` that legitimately hold non-binary
/// content (interpreter plugin trees and similar).
pub const DEFAULT_USR_LIB_ALLOWED_SUBDIRS: &[&str] = &[
    "perl",
    "python",
    "ruby",
    "menu",
    "pkgconfig",
    "ocaml",
    "bonobo/servers",
];

/// Configuration for one validation run.
///
/// Constructed once and passed by reference into every stage; there is no
/// process-wide mutable state.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Directories considered system library paths for the RPATH rule.
    pub system_lib_paths: Vec<String>,
    /// Subdirectories of `/usr/lib(64)` exempt from the
    /// only-non-binary-in-usr-lib rule.
    pub usr_lib_allowed_subdirs: Vec<String>,
    /// Path prefixes of executables that must be built position independent.
    pub pie_executable_paths: Vec<String>,
    /// Timeout for a single external linkage-resolver invocation.
    pub resolver_timeout: Duration,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            system_lib_paths: DEFAULT_SYSTEM_LIB_PATHS
                .iter()
                .map(ToString::to_string)
                .collect(),
            usr_lib_allowed_subdirs: DEFAULT_USR_LIB_ALLOWED_SUBDIRS
                .iter()
                .map(ToString::to_string)
                .collect(),
            pie_executable_paths: Vec::new(),
            resolver_timeout: Duration::from_secs(30),
        }
    }
}

impl CheckConfig {
    /// Check whether an RPATH component names a system library path.
    #[must_use]
    pub(crate) fn is_system_lib_path(&self, path: &str) -> bool {
        self.system_lib_paths.iter().any(|p| p == path)
    }

    /// Check whether an executable at this path is required to be PIE.
    #[must_use]
    pub(crate) fn requires_pie(&self, path: &str) -> bool {
        self.pie_executable_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_system_lib_paths() {
        let config = CheckConfig::default();
        assert!(config.is_system_lib_path("/usr/lib64"));
        assert!(config.is_system_lib_path("/lib"));
        assert!(!config.is_system_lib_path("/opt/app/lib"));
    }

    #[test]
    fn test_requires_pie_prefix_match() {
        let config = CheckConfig {
            pie_executable_paths: vec!["/usr/sbin/".to_string()],
            ..CheckConfig::default()
        };
        assert!(config.requires_pie("/usr/sbin/httpd"));
        assert!(!config.requires_pie("/usr/bin/httpd"));
    }

    #[test]
    fn test_requires_pie_empty_by_default() {
        let config = CheckConfig::default();
        assert!(!config.requires_pie("/usr/sbin/httpd"));
    }
}
