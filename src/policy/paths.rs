// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Path and soname naming conventions used by the shared-library rules.

use std::path::{Path, PathBuf};

/// True for paths following the versioned shared-object convention:
/// a `lib`/`lib64` directory entry named `*.so` or `*.so.N[.N...]`.
#[must_use]
pub(crate) fn is_versioned_shlib_path(path: &Path) -> bool {
    let parent_is_lib = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == "lib" || n == "lib64");
    if !parent_is_lib {
        return false;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(ends_with_so_version)
}

/// `<base>.so` with zero or more trailing `.N` version groups.
fn ends_with_so_version(name: &str) -> bool {
    let mut rest = name;
    while let Some(i) = rest.rfind('.') {
        let group = &rest[i + 1..];
        if !group.is_empty() && group.bytes().all(|b| b.is_ascii_digit()) {
            rest = &rest[..i];
        } else {
            break;
        }
    }
    rest.ends_with(".so")
}

/// A well-formed soname: `lib<name>.so.<major>[.<minor>...]` or
/// `lib<name>-<major>.so`.
#[must_use]
pub(crate) fn is_valid_soname(soname: &str) -> bool {
    if let Some(prefix) = soname.strip_suffix(".so") {
        if prefix.bytes().last().is_some_and(|b| b.is_ascii_digit()) {
            return true;
        }
    }
    if let Some(i) = soname.rfind(".so.") {
        let version = &soname[i + 4..];
        return !version.is_empty()
            && version
                .split('.')
                .all(|g| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit()));
    }
    false
}

/// Embedded version of a soname: the digit run before `.so` in the
/// `lib<name>-<major>.so` form, else the digit run after the last `.so.`.
#[must_use]
pub(crate) fn soname_version(soname: &str) -> Option<String> {
    let bytes = soname.as_bytes();

    let mut search = 0;
    while let Some(rel) = soname[search..].find(".so") {
        let i = search + rel;
        let mut start = i;
        while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
            start -= 1;
        }
        while start < i && bytes[start] == b'.' {
            start += 1;
        }
        if start < i && bytes[start].is_ascii_digit() {
            return Some(soname[start..i].to_string());
        }
        search = i + 1;
    }

    let mut limit = soname.len();
    while let Some(i) = soname[..limit].rfind(".so.") {
        let start = i + 4;
        if bytes.get(start).is_some_and(u8::is_ascii_digit) {
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
                end += 1;
            }
            return Some(soname[start..end].to_string());
        }
        limit = i + 3;
    }
    None
}

/// Sonames claimed by the dynamic linker itself.
#[must_use]
pub(crate) fn is_ldso_soname(soname: &str) -> bool {
    ["ld.so", "ld-linux.so", "ld-linux-ia64.so", "ld-linux-x86_64.so"]
        .iter()
        .any(|prefix| soname.starts_with(prefix))
}

/// Standard executable locations.
#[must_use]
pub(crate) fn is_bin_path(path: &str) -> bool {
    [
        "/bin/",
        "/sbin/",
        "/usr/bin/",
        "/usr/sbin/",
        "/usr/X11R6/bin/",
        "/usr/X11R6/sbin/",
    ]
    .iter()
    .any(|prefix| path.starts_with(prefix))
}

#[must_use]
pub(crate) fn is_usr_lib_path(path: &str) -> bool {
    path.starts_with("/usr/lib/") || path.starts_with("/usr/lib64/")
}

/// Content under `/usr/lib(64)` exempt from the only-non-binary rule:
/// configured subtrees plus top-level `lib*.so`/`lib*.a`/`lib*.la` files.
#[must_use]
pub(crate) fn is_usr_lib_exception(path: &str, allowed_subdirs: &[String]) -> bool {
    let rest = path
        .strip_prefix("/usr/lib64/")
        .or_else(|| path.strip_prefix("/usr/lib/"));
    let Some(rest) = rest else {
        return false;
    };
    if allowed_subdirs.iter().any(|sub| rest.starts_with(sub.as_str())) {
        return true;
    }
    rest.starts_with("lib")
        && !rest.contains('/')
        && (rest.ends_with(".so") || rest.ends_with(".la") || rest.ends_with(".a"))
}

/// For man pages, the name component that carries the version digits:
/// `/usr/share/man/manN/<name>.N.gz` -> `<name>`.
#[must_use]
pub(crate) fn man_page_subject(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/usr/share/man/man")?;
    let mut chars = rest.char_indices();
    chars.next()?; // section character
    let (slash_idx, slash) = chars.next()?;
    if slash != '/' {
        return None;
    }
    let name = &rest[slash_idx + 1..];
    // Trim the trailing ".N.gz" / ".N.bz2" compression suffix.
    let bytes = name.as_bytes();
    let mut cut = None;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            let after = &name[i + 2..];
            if after.starts_with(".gz") || after.starts_with(".bz2") {
                cut = Some(i);
            }
        }
        i += 1;
    }
    cut.map(|i| &name[..i])
}

/// A digit preceded by anything but a dot, the marker of a versioned name.
#[must_use]
pub(crate) fn contains_version_digit(s: &str) -> bool {
    s.as_bytes()
        .windows(2)
        .any(|w| w[1].is_ascii_digit() && w[0] != b'.')
}

/// Files whose text typically embeds build paths: libtool archives and
/// pkgconfig metadata.
#[must_use]
pub(crate) fn is_reference_path(path: &str) -> bool {
    path.ends_with(".la")
        || path.starts_with("/usr/lib/pkgconfig/")
        || path.starts_with("/usr/lib64/pkgconfig/")
}

/// A reference to `/tmp` or `/home` as a path component.
#[must_use]
pub(crate) fn has_invalid_dir_reference(line: &str) -> bool {
    for needle in ["/tmp", "/home"] {
        let mut search = 0;
        while let Some(rel) = line[search..].find(needle) {
            let after = search + rel + needle.len();
            match line.as_bytes().get(after) {
                None => return true,
                Some(&b) if !(b.is_ascii_alphanumeric() || b == b'_') => return true,
                Some(_) => search = after,
            }
        }
    }
    false
}

/// The symlink path ldconfig maintains for a shared object: its soname in
/// the library's own directory.
#[must_use]
pub(crate) fn expected_ldconfig_symlink(path: &Path, soname: &str) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new("/")).join(soname)
}

#[must_use]
pub(crate) fn mentions_libc(s: &str) -> bool {
    s.contains("libc.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_shlib_path() {
        assert!(is_versioned_shlib_path(Path::new("/usr/lib64/libfoo.so.1")));
        assert!(is_versioned_shlib_path(Path::new("/usr/lib/libfoo.so.1.2.3")));
        assert!(is_versioned_shlib_path(Path::new("/lib/libfoo.so")));
        assert!(!is_versioned_shlib_path(Path::new("/usr/bin/libfoo.so.1")));
        assert!(!is_versioned_shlib_path(Path::new(
            "/usr/lib/x86_64-linux-gnu/libfoo.so.1"
        )));
        assert!(!is_versioned_shlib_path(Path::new("/usr/lib64/libfoo.a")));
        assert!(!is_versioned_shlib_path(Path::new("/usr/lib64/foo.so.x")));
    }

    #[test]
    fn test_valid_sonames() {
        assert!(is_valid_soname("libfoo.so.1"));
        assert!(is_valid_soname("libfoo.so.1.2.3"));
        assert!(is_valid_soname("libfoo-2.so"));
        assert!(is_valid_soname("libfoo-1.2.so"));
        assert!(!is_valid_soname("libfoo.so"));
        assert!(!is_valid_soname("libfoo.so.1a"));
        assert!(!is_valid_soname("libfoo.so.1..2"));
        assert!(!is_valid_soname("libfoo"));
    }

    #[test]
    fn test_soname_version_suffix_form() {
        assert_eq!(soname_version("libfoo.so.2").as_deref(), Some("2"));
        assert_eq!(soname_version("libfoo.so.1.2").as_deref(), Some("1.2"));
    }

    #[test]
    fn test_soname_version_infix_form() {
        assert_eq!(soname_version("libbar-1.2.so").as_deref(), Some("1.2"));
        assert_eq!(soname_version("libbar2.so").as_deref(), Some("2"));
        assert_eq!(soname_version("ld-2.4.so").as_deref(), Some("2.4"));
    }

    #[test]
    fn test_soname_version_absent() {
        assert_eq!(soname_version("libfoo.so"), None);
        assert_eq!(soname_version("libfoo"), None);
    }

    #[test]
    fn test_ldso_sonames() {
        assert!(is_ldso_soname("ld.so"));
        assert!(is_ldso_soname("ld-linux.so.2"));
        assert!(is_ldso_soname("ld-linux-x86_64.so.2"));
        assert!(!is_ldso_soname("libld.so.1"));
        assert!(!is_ldso_soname("ld-2.4.so"));
    }

    #[test]
    fn test_bin_paths() {
        assert!(is_bin_path("/usr/bin/tool"));
        assert!(is_bin_path("/sbin/ifup"));
        assert!(is_bin_path("/usr/X11R6/bin/xterm"));
        assert!(!is_bin_path("/usr/libexec/tool"));
        assert!(!is_bin_path("/opt/bin/tool"));
    }

    #[test]
    fn test_usr_lib_exception() {
        let allowed: Vec<String> = ["perl", "python", "pkgconfig", "bonobo/servers"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(is_usr_lib_exception("/usr/lib/perl5/site_perl/x.pm", &allowed));
        assert!(is_usr_lib_exception(
            "/usr/lib64/python3.9/site-packages/x.py",
            &allowed
        ));
        assert!(is_usr_lib_exception("/usr/lib/pkgconfig/foo.pc", &allowed));
        assert!(is_usr_lib_exception("/usr/lib/libfoo.la", &allowed));
        assert!(is_usr_lib_exception("/usr/lib64/libfoo.so", &allowed));
        assert!(!is_usr_lib_exception("/usr/lib/foo/data.bin", &allowed));
        assert!(!is_usr_lib_exception("/usr/lib/libfoo.so.1", &allowed));
        assert!(!is_usr_lib_exception("/usr/share/libfoo.so", &allowed));
    }

    #[test]
    fn test_man_page_subject() {
        assert_eq!(
            man_page_subject("/usr/share/man/man1/foo.1.gz"),
            Some("foo")
        );
        assert_eq!(
            man_page_subject("/usr/share/man/man3/mylib.3.bz2"),
            Some("mylib")
        );
        assert_eq!(man_page_subject("/usr/share/man/man1/foo.1"), None);
        assert_eq!(man_page_subject("/usr/share/doc/foo.1.gz"), None);
    }

    #[test]
    fn test_contains_version_digit() {
        assert!(contains_version_digit("libfoo2"));
        assert!(contains_version_digit("foo-1.2"));
        assert!(!contains_version_digit("libfoo"));
        // A digit only after a dot does not count as a versioned name.
        assert!(!contains_version_digit("foo.1"));
    }

    #[test]
    fn test_reference_paths() {
        assert!(is_reference_path("/usr/lib64/libfoo.la"));
        assert!(is_reference_path("/usr/lib/pkgconfig/foo.pc"));
        assert!(!is_reference_path("/usr/lib64/libfoo.so.1"));
        assert!(!is_reference_path("/usr/share/pkgconfig-doc/foo.txt"));
    }

    #[test]
    fn test_invalid_dir_reference() {
        assert!(has_invalid_dir_reference("libdir='/tmp/build/lib'"));
        assert!(has_invalid_dir_reference("prefix=/home/builder/install"));
        assert!(has_invalid_dir_reference("path ends with /tmp"));
        assert!(!has_invalid_dir_reference("libdir='/usr/lib64'"));
        // Word characters continue the component: not a /tmp reference.
        assert!(!has_invalid_dir_reference("path=/tmpfs/data"));
        assert!(!has_invalid_dir_reference("path=/homes/user"));
    }

    #[test]
    fn test_expected_ldconfig_symlink() {
        assert_eq!(
            expected_ldconfig_symlink(Path::new("/usr/lib64/libfoo.so.1.2"), "libfoo.so.1"),
            PathBuf::from("/usr/lib64/libfoo.so.1")
        );
    }

    #[test]
    fn test_mentions_libc() {
        assert!(mentions_libc("libc.so.6"));
        assert!(mentions_libc("/usr/lib64/libc.so.6"));
        assert!(!mentions_libc("libcrypt.so.1"));
    }
}
