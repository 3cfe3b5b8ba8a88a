// Copyright (C) 2026 Checkmk GmbH - License: GNU General Public License v2
// This file is part of Checkmk (https://checkmk.com). It is subject to the terms and
// conditions defined in the file COPYING, which is part of this source code package.

//! Parses ELF files into `BinaryInfo` records: dependencies, `RPATH`/`RUNPATH`,
//! `SONAME`, PIC status, stack flags, and the symbol references the policy
//! engine checks. Uses the `goblin` crate for ELF parsing.

use goblin::elf::dynamic::{DF_TEXTREL, DT_FLAGS, DT_NEEDED, DT_RPATH, DT_RUNPATH, DT_SONAME, DT_TEXTREL};
use goblin::elf::header::{ET_DYN, ET_EXEC, ET_REL};
use goblin::elf::program_header::{PF_X, PT_GNU_STACK};
use goblin::elf::section_header::SHF_ALLOC;
use goblin::elf::Elf as GoblinElf;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

use super::classify::{classify_bytes, is_debug_path, ArtifactClass, NativeFormat};

/// Fine-grained artifact kind, refined from the classifier's coarse class by
/// the ELF header where applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryKind {
    ElfExecutable,
    ElfSharedObject,
    ElfRelocatable,
    ArArchive,
    Native(NativeFormat),
    NotBinary,
}

impl BinaryKind {
    #[must_use]
    pub fn is_binary(self) -> bool {
        !matches!(self, Self::NotBinary)
    }

    #[must_use]
    pub fn is_native(self) -> bool {
        matches!(self, Self::Native(_))
    }

    #[must_use]
    pub fn is_elf(self) -> bool {
        matches!(
            self,
            Self::ElfExecutable | Self::ElfSharedObject | Self::ElfRelocatable
        )
    }
}

/// Link-time metadata for one candidate file.
///
/// A record with `extraction_failed` set carries whatever could still be
/// determined (at least the coarse class); the policy engine reports the
/// failure once and runs no further checks against such a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryInfo {
    /// Coarse classification claim for the file.
    pub class: ArtifactClass,
    pub kind: BinaryKind,
    pub is_debug: bool,
    /// `DT_NEEDED` entries in encounter order, duplicates preserved.
    pub needed: Vec<String>,
    /// `DT_RPATH` and `DT_RUNPATH` components, colon-split, in order.
    pub rpath: Vec<String>,
    /// `DT_SONAME`; `None` unless `kind` is `ElfSharedObject`.
    pub soname: Option<String>,
    pub has_comment_section: bool,
    pub is_pic: bool,
    pub is_stripped: bool,
    pub has_gnu_stack: bool,
    pub exec_stack: bool,
    /// Names of exit-family functions a shared object references, cleared
    /// when `fork` is referenced as well.
    pub exit_calls: Vec<String>,
    pub calls_mktemp: bool,
    pub calls_setuid: bool,
    pub calls_setgid: bool,
    pub calls_setgroups: bool,
    /// Trailing OCaml runtime marker found on the image.
    pub ocaml_mixed: bool,
    /// Undefined non-weak symbols; populated by the linkage resolver for
    /// installed packages only.
    pub undefined_symbols: BTreeSet<String>,
    /// Direct dependencies never used for symbol resolution; installed
    /// packages only.
    pub unused_dependencies: BTreeSet<String>,
    /// The linkage resolver could not run for this file.
    pub resolution_failed: bool,
    /// Reason introspection failed; suppresses all other per-file checks.
    pub extraction_failed: Option<String>,
}

impl Default for BinaryInfo {
    fn default() -> Self {
        Self {
            class: ArtifactClass::NotBinary,
            kind: BinaryKind::NotBinary,
            is_debug: false,
            needed: Vec::new(),
            rpath: Vec::new(),
            soname: None,
            has_comment_section: false,
            is_pic: true,
            is_stripped: true,
            has_gnu_stack: false,
            exec_stack: false,
            exit_calls: Vec::new(),
            calls_mktemp: false,
            calls_setuid: false,
            calls_setgid: false,
            calls_setgroups: false,
            ocaml_mixed: false,
            undefined_symbols: BTreeSet::new(),
            unused_dependencies: BTreeSet::new(),
            resolution_failed: false,
            extraction_failed: None,
        }
    }
}

impl BinaryInfo {
    /// Record for a file that is not a native-code artifact.
    #[must_use]
    pub fn not_binary() -> Self {
        Self::default()
    }

    /// Degraded record for a candidate that could not be introspected.
    #[must_use]
    pub fn failed(class: ArtifactClass, kind: BinaryKind, path: &Path, reason: impl Into<String>) -> Self {
        Self {
            class,
            kind,
            is_debug: is_debug_path(path),
            extraction_failed: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Extract link-time metadata from a file's bytes.
    ///
    /// `is_shlib` marks files whose path follows the versioned shared-object
    /// naming convention; only those collect exit-family references.
    ///
    /// Never returns an error: structural failures yield a degraded record
    /// with `extraction_failed` set.
    #[must_use]
    pub fn extract(path: &Path, bytes: &[u8], is_shlib: bool) -> Self {
        let is_debug = is_debug_path(path);
        match classify_bytes(bytes) {
            ArtifactClass::NotBinary => Self::not_binary(),
            // Archives never yield a SONAME or RPATH regardless of the
            // relocatable objects inside; they are not parsed further.
            ArtifactClass::Archive => Self {
                class: ArtifactClass::Archive,
                kind: BinaryKind::ArArchive,
                is_debug,
                ..Self::default()
            },
            ArtifactClass::Native(format) => Self {
                class: ArtifactClass::Native(format),
                kind: BinaryKind::Native(format),
                is_debug,
                ..Self::default()
            },
            ArtifactClass::Elf => match Self::extract_elf(bytes, is_debug, is_shlib) {
                Ok(info) => info,
                Err(e) => Self::failed(
                    ArtifactClass::Elf,
                    elf_kind_from_header(bytes),
                    path,
                    e.to_string(),
                ),
            },
        }
    }

    fn extract_elf(
        bytes: &[u8],
        is_debug: bool,
        is_shlib: bool,
    ) -> Result<Self, goblin::error::Error> {
        let elf = GoblinElf::parse(bytes)?;

        let kind = match elf.header.e_type {
            ET_EXEC => BinaryKind::ElfExecutable,
            ET_DYN => BinaryKind::ElfSharedObject,
            ET_REL => BinaryKind::ElfRelocatable,
            other => {
                return Err(goblin::error::Error::Malformed(format!(
                    "unsupported ELF type {other:#x}"
                )))
            }
        };

        let mut info = Self {
            class: ArtifactClass::Elf,
            kind,
            is_debug,
            is_stripped: elf.syms.is_empty(),
            ..Self::default()
        };

        let mut soname_index = None;
        let mut textrel = false;
        if let Some(dynamic) = &elf.dynamic {
            for dyn_entry in &dynamic.dyns {
                match dyn_entry.d_tag {
                    DT_NEEDED => {
                        if let Ok(idx) = usize::try_from(dyn_entry.d_val) {
                            if let Some(name) = elf.dynstrtab.get_at(idx) {
                                info.needed.push(name.to_string());
                            }
                        }
                    }
                    DT_RPATH | DT_RUNPATH => {
                        if let Ok(idx) = usize::try_from(dyn_entry.d_val) {
                            if let Some(value) = elf.dynstrtab.get_at(idx) {
                                info.rpath.extend(
                                    value
                                        .split(':')
                                        .filter(|s| !s.is_empty())
                                        .map(ToString::to_string),
                                );
                            }
                        }
                    }
                    DT_SONAME => {
                        if let Ok(idx) = usize::try_from(dyn_entry.d_val) {
                            soname_index = elf.dynstrtab.get_at(idx);
                        }
                    }
                    DT_TEXTREL => textrel = true,
                    DT_FLAGS => {
                        if dyn_entry.d_val & DF_TEXTREL != 0 {
                            textrel = true;
                        }
                    }
                    _ => {}
                }
            }
        }
        // A shared object may only declare its runtime name.
        if kind == BinaryKind::ElfSharedObject {
            info.soname = soname_index.map(ToString::to_string);
        }

        let mut pic_section = false;
        for section in &elf.section_headers {
            let Some(name) = elf.shdr_strtab.get_at(section.sh_name) else {
                continue;
            };
            if name == ".comment" {
                info.has_comment_section = true;
            } else if is_pic_relocation_section(name)
                && section.sh_flags & u64::from(SHF_ALLOC) != 0
            {
                pic_section = true;
            }
        }
        info.is_pic = pic_section || !textrel;

        for header in &elf.program_headers {
            if header.p_type == PT_GNU_STACK {
                info.has_gnu_stack = true;
                if header.p_flags & PF_X != 0 {
                    info.exec_stack = true;
                }
            }
        }

        info.scan_symbols(&elf, is_shlib);
        info.ocaml_mixed = has_ocaml_trailer(bytes);

        Ok(info)
    }

    /// One pass over all function symbols (dynamic and regular tables),
    /// recording the libc entry points the policy rules care about.
    fn scan_symbols(&mut self, elf: &GoblinElf, is_shlib: bool) {
        let mut fork_called = false;
        let dynsym_names = elf
            .dynsyms
            .iter()
            .filter(|sym| sym.is_function())
            .filter_map(|sym| elf.dynstrtab.get_at(sym.st_name));
        let symtab_names = elf
            .syms
            .iter()
            .filter(|sym| sym.is_function())
            .filter_map(|sym| elf.strtab.get_at(sym.st_name));
        for name in dynsym_names.chain(symtab_names) {
            // Strip a symbol-version suffix such as "exit@GLIBC_2.2.5".
            let name = name.split('@').next().unwrap_or(name);
            match name {
                "mktemp" => self.calls_mktemp = true,
                "setuid" | "seteuid" | "setresuid" => self.calls_setuid = true,
                "setgid" | "setegid" | "setresgid" => self.calls_setgid = true,
                "setgroups" | "initgroups" => self.calls_setgroups = true,
                "exit" | "_exit" if is_shlib => {
                    if !self.exit_calls.iter().any(|c| c == name) {
                        self.exit_calls.push(name.to_string());
                    }
                }
                "fork" if is_shlib => fork_called = true,
                _ => {}
            }
        }
        // A library that forks may legitimately exit in the child; reporting
        // those exits would drown real findings in false positives.
        if fork_called {
            self.exit_calls.clear();
        }
    }
}

/// Relocation sections emitted for PIC-compiled data/text.
fn is_pic_relocation_section(name: &str) -> bool {
    let rest = name
        .strip_prefix(".rela.")
        .or_else(|| name.strip_prefix(".rel."));
    rest.is_some_and(|r| r.starts_with("data") || r.starts_with("text"))
}

/// Executables produced by `ocamlc -custom` end with a `Caml1999X0NN`
/// section marker in their trailing bytes.
fn has_ocaml_trailer(bytes: &[u8]) -> bool {
    if bytes.len() < 12 {
        return false;
    }
    let tail = &bytes[bytes.len() - 12..];
    tail.starts_with(b"Caml1999X0")
        && tail[10].is_ascii_digit()
        && tail[11].is_ascii_digit()
}

/// Best-effort kind recovery from the raw ELF header, for buffers goblin
/// rejects. Reads `e_type` honoring `e_ident[EI_DATA]` endianness.
fn elf_kind_from_header(bytes: &[u8]) -> BinaryKind {
    if bytes.len() < 18 {
        return BinaryKind::NotBinary;
    }
    let e_type = match bytes[5] {
        1 => u16::from_le_bytes([bytes[16], bytes[17]]),
        2 => u16::from_be_bytes([bytes[16], bytes[17]]),
        _ => return BinaryKind::NotBinary,
    };
    match e_type {
        ET_EXEC => BinaryKind::ElfExecutable,
        ET_DYN => BinaryKind::ElfSharedObject,
        ET_REL => BinaryKind::ElfRelocatable,
        _ => BinaryKind::NotBinary,
    }
}
