// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Classifies candidate files into native-code artifact classes from their
//! leading bytes, with a `file(1)`-description fallback.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

// ELF magic bytes: 0x7f followed by ASCII "ELF".
// Defined in the ELF specification: e_ident[EI_MAG0..EI_MAG3].
const ELF_MAGIC: &[u8] = b"\x7fELF";
// Global header of an ar(1) archive.
const AR_MAGIC: &[u8] = b"!<arch>\n";
// Lua precompiled chunk signature.
const LUA_MAGIC: &[u8] = b"\x1bLua";
// Marker prefix of OCaml compiled object files.
const OCAML_MAGIC: &[u8] = b"Caml1999";

/// Non-ELF native code formats the classifier recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NativeFormat {
    OcamlNative,
    LuaBytecode,
}

/// Coarse classification of a candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactClass {
    Elf,
    Archive,
    Native(NativeFormat),
    NotBinary,
}

impl ArtifactClass {
    #[must_use]
    pub fn is_binary(self) -> bool {
        !matches!(self, Self::NotBinary)
    }
}

/// Classify a file from its leading bytes. Unrecognized or short content is
/// `NotBinary`, never an error.
#[must_use]
pub fn classify_bytes(bytes: &[u8]) -> ArtifactClass {
    if bytes.starts_with(ELF_MAGIC) {
        ArtifactClass::Elf
    } else if bytes.starts_with(AR_MAGIC) {
        ArtifactClass::Archive
    } else if bytes.starts_with(LUA_MAGIC) {
        ArtifactClass::Native(NativeFormat::LuaBytecode)
    } else if bytes.starts_with(OCAML_MAGIC) {
        ArtifactClass::Native(NativeFormat::OcamlNative)
    } else {
        ArtifactClass::NotBinary
    }
}

/// Classify from a `file(1)`-style type description, when only that is
/// available (e.g. the file itself could not be read).
#[must_use]
pub fn classify_description(description: &str) -> ArtifactClass {
    if description.contains("ELF") {
        ArtifactClass::Elf
    } else if description.contains("current ar archive") {
        ArtifactClass::Archive
    } else if description.contains("Objective caml native") {
        ArtifactClass::Native(NativeFormat::OcamlNative)
    } else if description.contains("Lua bytecode") {
        ArtifactClass::Native(NativeFormat::LuaBytecode)
    } else {
        ArtifactClass::NotBinary
    }
}

/// Debug-info files follow a pure naming convention.
#[must_use]
pub fn is_debug_path(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".debug")
}

/// Objects and static images that are expected to keep their symbols.
#[must_use]
pub fn is_unstrippable_path(path: &Path) -> bool {
    let path = path.to_string_lossy();
    path.ends_with(".o") || path.ends_with(".static")
}

// Binaries typically don't have extensions (aside from .so, .so.x, etc.), so
// skipping on these is safe and avoids reading bulk data files.
static NON_BINARY_EXTENSIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "txt", "md", "json", "yaml", "yml", "conf", "cfg", "ini", "toml", "xml", "html", "css",
        "js", "py", "sh", "bash", "zsh", "fish", "csh", "ksh", "pl", "rb", "php", "lua", "tcl",
        "awk", "sed", "perl", "pm", "pod", "gz", "bz2", "xz", "zst", "zip", "tar", "rpm", "deb",
        "dpkg", "png", "jpg", "jpeg", "gif", "svg", "ico", "bmp", "webp", "tiff", "pdf", "ps",
        "eps", "dvi", "tex", "rtf", "odt", "doc", "docx", "mp3", "mp4", "avi", "mkv", "mov", "wav",
        "flac", "ogg", "m4a", "db", "sqlite", "sqlite3", "db3",
    ])
});

/// Check if a path can be skipped (before reading) by extension alone.
#[must_use]
pub(crate) fn has_non_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| NON_BINARY_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_elf_magic() {
        assert_eq!(classify_bytes(b"\x7fELF\x02\x01\x01"), ArtifactClass::Elf);
    }

    #[test]
    fn test_classify_ar_magic() {
        assert_eq!(
            classify_bytes(b"!<arch>\ndebian-binary"),
            ArtifactClass::Archive
        );
    }

    #[test]
    fn test_classify_lua_bytecode() {
        assert_eq!(
            classify_bytes(b"\x1bLua\x53\x00"),
            ArtifactClass::Native(NativeFormat::LuaBytecode)
        );
    }

    #[test]
    fn test_classify_ocaml_object() {
        assert_eq!(
            classify_bytes(b"Caml1999O012"),
            ArtifactClass::Native(NativeFormat::OcamlNative)
        );
    }

    #[test]
    fn test_classify_unrecognized_and_short_buffers() {
        assert_eq!(classify_bytes(b"#!/bin/sh\n"), ArtifactClass::NotBinary);
        assert_eq!(classify_bytes(b""), ArtifactClass::NotBinary);
        assert_eq!(classify_bytes(b"\x7fEL"), ArtifactClass::NotBinary);
    }

    #[test]
    fn test_classify_description() {
        assert_eq!(
            classify_description("ELF 64-bit LSB shared object, x86-64, not stripped"),
            ArtifactClass::Elf
        );
        assert_eq!(
            classify_description("current ar archive"),
            ArtifactClass::Archive
        );
        assert_eq!(
            classify_description("Objective caml native object file"),
            ArtifactClass::Native(NativeFormat::OcamlNative)
        );
        assert_eq!(classify_description("ASCII text"), ArtifactClass::NotBinary);
    }

    #[test]
    fn test_debug_path() {
        assert!(is_debug_path(Path::new(
            "/usr/lib/debug/usr/bin/tool.debug"
        )));
        assert!(!is_debug_path(Path::new("/usr/bin/tool")));
    }

    #[test]
    fn test_unstrippable_path() {
        assert!(is_unstrippable_path(Path::new("/usr/lib64/crt1.o")));
        assert!(is_unstrippable_path(Path::new("/usr/lib64/libfoo.static")));
        assert!(!is_unstrippable_path(Path::new("/usr/lib64/libfoo.so.1")));
    }

    #[test]
    fn test_non_binary_extension() {
        assert!(has_non_binary_extension(Path::new("/usr/share/doc/README.txt")));
        assert!(!has_non_binary_extension(Path::new("/usr/lib64/libfoo.so.1")));
        assert!(!has_non_binary_extension(Path::new("/usr/bin/tool")));
    }
}
