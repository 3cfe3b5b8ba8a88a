// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Resolves a binary's linkage against the live dynamic linker: undefined
//! non-weak symbols and unused direct dependencies. Only consulted for
//! installed packages.

use std::collections::BTreeSet;
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Result type for resolver operations.
pub type ResolverResult<T> = std::result::Result<T, ResolverError>;

/// Errors from invoking the external linkage resolver.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Command not found: {command} (file: {path:?})")]
    CommandNotFound { command: String, path: PathBuf },
    #[error("Command failed: {command} (file: {path:?})")]
    CommandFailed {
        command: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Command timed out after {timeout:?}: {command} (file: {path:?})")]
    CommandTimeout {
        command: String,
        path: PathBuf,
        timeout: Duration,
    },
    #[error("Resolution failed for {path:?}: exit status {status}")]
    ResolutionFailed { path: PathBuf, status: i32 },
}

/// Symbol-level linkage information for one binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkageReport {
    pub undefined_symbols: BTreeSet<String>,
    pub unused_dependencies: BTreeSet<String>,
}

/// Resolves a binary against the installed libraries.
///
/// An implementation that does not support a pass returns it empty; the
/// policy engine treats "unsupported" and "nothing found" identically.
pub trait LinkageResolver: Sync {
    /// Resolve the file at `path` (a real, readable filesystem path).
    ///
    /// # Errors
    /// Returns an error when the resolver itself could not run; the caller
    /// reports this once per file and proceeds with empty results.
    fn resolve(&self, path: &Path) -> ResolverResult<LinkageReport>;
}

/// `ldd`-backed resolver.
///
/// The undefined-symbol pass is `ldd -d -r`; the unused-dependency pass is
/// `ldd -r -u`, which exits non-zero both when unused dependencies exist and
/// when `-u` is unsupported, so an unsupported linker degrades silently to
/// an empty set.
pub struct LddResolver {
    timeout: Duration,
}

impl LddResolver {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run_ldd(&self, args: &[&str], path: &Path) -> ResolverResult<(i32, String)> {
        let mut child = Command::new("ldd")
            .args(args)
            .arg(path)
            .env("LC_ALL", "C")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ResolverError::CommandNotFound {
                        command: "ldd".to_string(),
                        path: path.to_path_buf(),
                    }
                } else {
                    ResolverError::CommandFailed {
                        command: "ldd".to_string(),
                        path: path.to_path_buf(),
                        source: e,
                    }
                }
            })?;

        let status = wait_with_timeout(&mut child, self.timeout, "ldd", path)?;

        // ldd output is a handful of lines per dependency and fits the pipe
        // buffer, so reading after exit cannot stall.
        let mut output = String::new();
        if let Some(stdout) = child.stdout.as_mut() {
            let _ = stdout.read_to_string(&mut output);
        }
        if let Some(stderr) = child.stderr.as_mut() {
            let _ = stderr.read_to_string(&mut output);
        }
        Ok((status, output))
    }
}

impl LinkageResolver for LddResolver {
    fn resolve(&self, path: &Path) -> ResolverResult<LinkageReport> {
        let mut report = LinkageReport::default();

        let (status, output) = self.run_ldd(&["-d", "-r"], path)?;
        if status != 0 {
            return Err(ResolverError::ResolutionFailed {
                path: path.to_path_buf(),
                status,
            });
        }
        report.undefined_symbols = parse_undefined_symbols(&output);

        // Exit 0 means no unused direct dependencies. Non-zero means either
        // unused dependencies or an ldd without -u support; only the output
        // scan can tell, and an unsupported ldd simply yields nothing.
        match self.run_ldd(&["-r", "-u"], path) {
            Ok((0, _)) => {}
            Ok((_, output)) => report.unused_dependencies = parse_unused_dependencies(&output),
            Err(_) => {}
        }

        Ok(report)
    }
}

/// Wait for a child process with a timeout, killing it on expiry. A process
/// terminated by a signal counts as a command failure.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    command: &str,
    path: &Path,
) -> ResolverResult<i32> {
    if let Some(status) = child
        .wait_timeout(timeout)
        .map_err(|e| ResolverError::CommandFailed {
            command: command.to_string(),
            path: path.to_path_buf(),
            source: e,
        })?
    {
        if let Some(code) = status.code() {
            Ok(code)
        } else if let Some(signal) = status.signal() {
            Err(ResolverError::CommandFailed {
                command: command.to_string(),
                path: path.to_path_buf(),
                source: std::io::Error::other(format!("Process terminated by signal: {signal}")),
            })
        } else {
            Err(ResolverError::CommandFailed {
                command: command.to_string(),
                path: path.to_path_buf(),
                source: std::io::Error::other("Unknown process termination"),
            })
        }
    } else {
        let _ = child.kill();
        let _ = child.wait();
        Err(ResolverError::CommandTimeout {
            command: command.to_string(),
            path: path.to_path_buf(),
            timeout,
        })
    }
}

/// Collect symbols from `undefined symbol: <name>  (<referent>)` lines.
fn parse_undefined_symbols(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("undefined symbol: "))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(ToString::to_string)
        .collect()
}

/// Collect the indented dependency block following the
/// `Unused direct dependencies` header.
fn parse_unused_dependencies(output: &str) -> BTreeSet<String> {
    let mut unused = BTreeSet::new();
    let mut in_unused = false;
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with("Unused direct dependencies") {
            in_unused = true;
        } else if in_unused {
            if line.starts_with(char::is_whitespace) {
                if let Some(dependency) = line.split_whitespace().next() {
                    unused.insert(dependency.to_string());
                }
            } else {
                in_unused = false;
            }
        }
    }
    unused
}
