//! File-ingest side: ELF containers, DWARF debug information, and ISA
//! description files, all funnelled into the shared program model.

pub mod dwarf;
pub mod elf;
pub mod isa;

use std::io;
use std::path::Path;

use tracing::warn;

use crate::soc::prog::symbols::{SymbolSource, SymbolTable, SymbolTableBuilder};
use crate::soc::prog::types::TypeArena;

pub use dwarf::LineRow;
pub use elf::{ElfError, ElfImage};

/// Confidence in a parsed artifact. Recoverable defects downgrade the level
/// and keep going, so as much of the binary as possible stays queryable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadTrust {
    Full,
    Partial,
    Error,
}

impl LoadTrust {
    pub fn downgrade(&mut self) {
        if matches!(self, LoadTrust::Full) {
            *self = LoadTrust::Partial;
        }
    }

    pub fn merge(&mut self, other: LoadTrust) {
        *self = match (*self, other) {
            (LoadTrust::Error, _) | (_, LoadTrust::Error) => LoadTrust::Error,
            (LoadTrust::Partial, _) | (_, LoadTrust::Partial) => LoadTrust::Partial,
            _ => LoadTrust::Full,
        };
    }
}

/// File extensions accepted by [`load_path`].
pub const BINARY_EXTENSIONS: &[&str] = &["elf", "out", "o", "so", "lib", "a"];

/// Fully ingested program: frozen symbol table (with its type arena), the
/// container metadata, line rows, and the trust the reader ended up with.
pub struct ProgramImage {
    pub trust: LoadTrust,
    pub symbols: SymbolTable,
    pub elf: ElfImage,
    pub lines: Vec<LineRow>,
}

impl ProgramImage {
    pub fn load_path(path: &Path) -> io::Result<ProgramImage> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !BINARY_EXTENSIONS.contains(&extension.as_str()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{extension}' is not a recognized binary extension"),
            ));
        }
        let bytes = std::fs::read(path)?;
        Ok(Self::load_bytes(bytes))
    }

    /// Parses the container and its debug info. A fatal header mismatch
    /// yields `Error` trust with empty tables rather than failing outright.
    pub fn load_bytes(bytes: Vec<u8>) -> ProgramImage {
        Self::load_bytes_with_metadata(bytes, |_| Vec::new())
    }

    /// Like [`load_bytes`](Self::load_bytes), with a hook that contributes
    /// secondary metadata sources (calibration descriptions and the like)
    /// before the table freezes. The hook receives the builder so metadata
    /// types can be minted in the image's own arena.
    pub fn load_bytes_with_metadata<F>(bytes: Vec<u8>, metadata: F) -> ProgramImage
    where
        F: FnOnce(&mut SymbolTableBuilder) -> Vec<SymbolSource>,
    {
        let elf = match ElfImage::parse(bytes) {
            Ok(elf) => elf,
            Err(err) => {
                warn!(error = %err, "container rejected; exposing empty tables");
                return ProgramImage {
                    trust: LoadTrust::Error,
                    symbols: SymbolTableBuilder::new(TypeArena::new()).freeze(),
                    elf: ElfImage::empty(),
                    lines: Vec::new(),
                };
            }
        };
        let mut trust = elf.trust;

        let mut builder = SymbolTableBuilder::new(TypeArena::new());
        for symbol in elf.symbols() {
            builder.absorb(SymbolSource::Image(symbol));
        }

        let debug = dwarf::DwarfInfo::parse(&elf, &mut builder);
        trust.merge(debug.trust);
        debug.bind_symbols(&mut builder);

        for source in metadata(&mut builder) {
            builder.absorb(source);
        }

        ProgramImage {
            trust,
            symbols: builder.freeze(),
            elf,
            lines: debug.lines,
        }
    }
}
