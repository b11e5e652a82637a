//! ISA file loading: extension-kind rules, `:include` resolution with cycle
//! detection, and `:attach` system assembly.
//!
//! - `.isa` — a base description, loadable standalone.
//! - `.isaext` — an extension that may reference symbols defined elsewhere;
//!   only meaningful when included from a `.core`.
//! - `.core` — a base plus extensions plus core-specific directives, glued
//!   with `:include`.
//! - `.sys` — references cores via `:attach <name> <path>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::soc::isa::ast::{IsaDocument, IsaItem};
use crate::soc::isa::error::IsaError;
use crate::soc::isa::machine::MachineDescription;
use crate::soc::isa::parser::parse_str;

/// A fully attached multi-core system description.
pub struct SystemDescription {
    pub cores: BTreeMap<String, MachineDescription>,
}

#[derive(Default)]
pub struct IsaLoader;

impl IsaLoader {
    pub fn new() -> Self {
        Self
    }

    /// Loads a standalone `.isa` or a `.core` (with its includes) into a
    /// machine description.
    pub fn load_machine(&mut self, path: impl AsRef<Path>) -> Result<MachineDescription, IsaError> {
        let path = path.as_ref();
        match extension(path) {
            "isa" | "core" => {}
            "isaext" => {
                return Err(IsaError::FileKind {
                    path: path.display().to_string(),
                    reason: "extension files are only valid inside a core",
                });
            }
            _ => {
                return Err(IsaError::FileKind {
                    path: path.display().to_string(),
                    reason: "expected a .isa or .core file",
                });
            }
        }
        let mut chain = Vec::new();
        let docs = self.load_documents(path, &mut chain, false)?;
        MachineDescription::from_documents(docs)
    }

    /// Loads a `.sys` file and every core it attaches.
    pub fn load_system(&mut self, path: impl AsRef<Path>) -> Result<SystemDescription, IsaError> {
        let path = path.as_ref();
        if extension(path) != "sys" {
            return Err(IsaError::FileKind {
                path: path.display().to_string(),
                reason: "expected a .sys file",
            });
        }
        let source = std::fs::read_to_string(path)?;
        let doc = parse_str(path.to_path_buf(), &source)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut cores = BTreeMap::new();
        for item in &doc.items {
            if let IsaItem::Attach(attach) = item {
                let core_path = base.join(&attach.path);
                debug!(core = %attach.name, path = %core_path.display(), "attaching core");
                let machine = self.load_machine(&core_path)?;
                cores.insert(attach.name.clone(), machine);
            }
        }
        Ok(SystemDescription { cores })
    }

    /// Parses one file and, depth-first, everything it includes. The chain
    /// argument carries the active include stack for cycle detection.
    fn load_documents(
        &mut self,
        path: &Path,
        chain: &mut Vec<PathBuf>,
        in_core: bool,
    ) -> Result<Vec<IsaDocument>, IsaError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if chain.contains(&canonical) {
            let mut cycle: Vec<String> = chain
                .iter()
                .map(|entry| entry.display().to_string())
                .collect();
            cycle.push(canonical.display().to_string());
            return Err(IsaError::IncludeLoop { chain: cycle });
        }
        if extension(path) == "isaext" && !in_core && chain.is_empty() {
            return Err(IsaError::FileKind {
                path: path.display().to_string(),
                reason: "extension files are only valid inside a core",
            });
        }
        chain.push(canonical);

        let source = std::fs::read_to_string(path)?;
        let doc = parse_str(path.to_path_buf(), &source)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let is_core = extension(path) == "core";

        let mut docs = Vec::new();
        for item in &doc.items {
            if let IsaItem::Include(include) = item {
                let target = base.join(&include.path);
                docs.extend(self.load_documents(&target, chain, is_core || in_core)?);
            }
        }
        docs.push(doc);
        chain.pop();
        Ok(docs)
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nanoscope-isa-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create fixture dir");
        dir
    }

    #[test]
    fn core_files_resolve_their_includes() {
        let dir = unique_dir("core");
        fs::write(
            dir.join("base.isa"),
            ":space insn addr=32 word=32 type=logic endian=big\n\
             :insn X subfields={ OPCD @(0-5) op=func RT @(6-10) op=target }\n",
        )
        .unwrap();
        fs::write(
            dir.join("ext.isaext"),
            ":insn::X nop mask={OPCD=24}\n",
        )
        .unwrap();
        fs::write(
            dir.join("cpu.core"),
            ":include \"base.isa\"\n:include \"ext.isaext\"\n",
        )
        .unwrap();

        let mut loader = IsaLoader::new();
        let machine = loader.load_machine(dir.join("cpu.core")).expect("core loads");
        assert_eq!(machine.instructions.len(), 1);
        assert!(machine.spaces.contains_key("insn"));
    }

    #[test]
    fn standalone_extension_files_are_rejected() {
        let dir = unique_dir("ext");
        fs::write(dir.join("lonely.isaext"), ":space x addr=32 word=32 type=logic\n").unwrap();
        let mut loader = IsaLoader::new();
        let err = loader.load_machine(dir.join("lonely.isaext")).unwrap_err();
        assert!(matches!(err, IsaError::FileKind { .. }));
    }

    #[test]
    fn include_cycles_are_detected() {
        let dir = unique_dir("cycle");
        fs::write(dir.join("a.core"), ":include \"b.core\"\n").unwrap();
        fs::write(dir.join("b.core"), ":include \"a.core\"\n").unwrap();
        let mut loader = IsaLoader::new();
        let err = loader.load_machine(dir.join("a.core")).unwrap_err();
        assert!(matches!(err, IsaError::IncludeLoop { .. }));
    }

    #[test]
    fn systems_attach_their_cores() {
        let dir = unique_dir("sys");
        fs::write(
            dir.join("cpu.core"),
            ":space insn addr=32 word=32 type=logic\n\
             :insn X subfields={ OPCD @(0-5) op=func }\n\
             :insn::X stop mask={OPCD=63}\n",
        )
        .unwrap();
        fs::write(dir.join("board.sys"), ":attach main \"cpu.core\"\n").unwrap();
        let mut loader = IsaLoader::new();
        let system = loader.load_system(dir.join("board.sys")).expect("system loads");
        assert_eq!(system.cores.len(), 1);
        assert!(system.cores.contains_key("main"));
    }
}
