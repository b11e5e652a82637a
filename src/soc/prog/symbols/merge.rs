//! Sum-typed symbol sources and the rules that combine them into one record
//! per label: addresses and sizes come from the side that owns the image,
//! semantic type information from the metadata side.

use crate::soc::prog::types::{FixedScalar, TypeId, TypeRecord};

use super::table::{StorageFlags, SymbolBinding, SymbolId, SymbolKind, SymbolTableBuilder};

/// Address-bearing description extracted from a loaded image.
#[derive(Clone, Debug)]
pub struct ImageSymbol {
    pub label: String,
    pub numeric_id: Option<u64>,
    pub file_addr: Option<u64>,
    pub runtime_addr: Option<u64>,
    pub size: Option<u64>,
    pub section_index: Option<u16>,
    pub binding: SymbolBinding,
    pub kind: SymbolKind,
    pub storage: StorageFlags,
}

/// Semantic description from a calibration/metadata source: no authoritative
/// address, but richer typing.
#[derive(Clone, Debug)]
pub struct MetadataSymbol {
    pub label: String,
    pub type_id: Option<TypeId>,
    pub size: Option<u64>,
}

pub enum SymbolSource {
    Image(ImageSymbol),
    Metadata(MetadataSymbol),
}

impl SymbolTableBuilder {
    /// Feeds one source into the table, creating or merging the record for
    /// its label.
    pub fn absorb(&mut self, source: SymbolSource) -> SymbolId {
        match source {
            SymbolSource::Image(image) => self.absorb_image(image),
            SymbolSource::Metadata(meta) => self.absorb_metadata(meta),
        }
    }

    fn absorb_image(&mut self, image: ImageSymbol) -> SymbolId {
        if let Some(id) = self.lookup_id(&image.label) {
            let record = self.get_mut(id);
            record.file_addr = image.file_addr.or(record.file_addr);
            record.runtime_addr = image.runtime_addr.or(record.runtime_addr);
            record.section_index = image.section_index.or(record.section_index);
            record.binding = image.binding;
            record.kind = image.kind;
            record.storage |= image.storage;
            if let Some(size) = image.size {
                let previous = record.size;
                record.size = Some(size);
                if previous != Some(size) {
                    self.reconcile_type_size(id, size);
                }
            }
            return id;
        }
        let mut builder = self
            .symbol(&image.label)
            .binding(image.binding)
            .kind(image.kind)
            .storage(image.storage);
        if let Some(numeric) = image.numeric_id {
            builder = builder.numeric_id(numeric);
        }
        if let Some(addr) = image.file_addr {
            builder = builder.file_addr(addr);
        }
        if let Some(addr) = image.runtime_addr {
            builder = builder.runtime_addr(addr);
        }
        if let Some(size) = image.size {
            builder = builder.size(size);
        }
        if let Some(section) = image.section_index {
            builder = builder.section_index(section);
        }
        builder.finish()
    }

    fn absorb_metadata(&mut self, meta: MetadataSymbol) -> SymbolId {
        if let Some(id) = self.lookup_id(&meta.label) {
            if let Some(ty) = meta.type_id {
                let existing = self.get(id).type_id;
                let size = self.get(id).size;
                let merged = self.merge_types(existing, ty, size);
                self.get_mut(id).type_id = Some(merged);
            }
            let record = self.get_mut(id);
            record.storage |= StorageFlags::METADATA;
            if record.size.is_none() {
                record.size = meta.size;
            }
            return id;
        }
        let mut builder = self.symbol(&meta.label).storage(StorageFlags::METADATA);
        if let Some(ty) = meta.type_id {
            builder = builder.type_id(ty);
        }
        if let Some(size) = meta.size {
            builder = builder.size(size);
        }
        builder.finish()
    }

    /// Resolves a type conflict between an existing binding and a metadata
    /// type. The metadata side wins semantically; fixed-point wrappers are
    /// preserved over plain scalars, and sequences are crushed to the image
    /// size when one is known.
    fn merge_types(&mut self, existing: Option<TypeId>, incoming: TypeId, size: Option<u64>) -> TypeId {
        let arena = self.arena_mut();
        match (existing, arena.get(incoming).clone()) {
            // A metadata sequence adopts the image footprint.
            (_, TypeRecord::Sequence(mut seq)) => {
                if let Some(size) = size {
                    if seq.byte_size() != Some(size as usize) {
                        seq.set_byte_size(size as usize);
                        return arena.push_record(TypeRecord::Sequence(seq));
                    }
                }
                incoming
            }
            // A plain scalar never displaces a fixed-point view of the same
            // storage.
            (Some(current), TypeRecord::Scalar(scalar)) => {
                if let TypeRecord::Fixed(fixed) = arena.get(current) {
                    if fixed.base.byte_size == scalar.byte_size {
                        return current;
                    }
                }
                incoming
            }
            _ => incoming,
        }
    }

    /// Applies an image size update to an already-bound type: arrays follow
    /// the image (count crush), aggregates keep the debug-info layout.
    fn reconcile_type_size(&mut self, id: SymbolId, size: u64) {
        let Some(ty) = self.get(id).type_id else {
            return;
        };
        let arena = self.arena_mut();
        let crushed = match arena.get(ty) {
            TypeRecord::Sequence(seq) if seq.byte_size() != Some(size as usize) => {
                let mut crushed = seq.clone();
                crushed.set_byte_size(size as usize);
                Some(crushed)
            }
            _ => None,
        };
        if let Some(crushed) = crushed {
            let new_ty = arena.push_record(TypeRecord::Sequence(crushed));
            self.get_mut(id).type_id = Some(new_ty);
        }
    }
}

/// Convenience used by metadata feeds that describe a value as fixed-point
/// over an integer base.
pub fn fixed_metadata_type(
    builder: &mut SymbolTableBuilder,
    base_bytes: usize,
    scale: f64,
    offset: f64,
) -> TypeId {
    use crate::soc::prog::types::{DisplayFormat, ScalarEncoding, ScalarType};
    let base = ScalarType::new(None, base_bytes, ScalarEncoding::Unsigned, DisplayFormat::Default);
    builder
        .arena_mut()
        .push_record(TypeRecord::Fixed(FixedScalar::new(base, scale, offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::{
        DisplayFormat, ScalarEncoding, SequenceCount, SequenceType, TypeArena, TypeBuilder,
    };

    fn image(label: &str, addr: u64, size: u64) -> SymbolSource {
        SymbolSource::Image(ImageSymbol {
            label: label.into(),
            numeric_id: None,
            file_addr: None,
            runtime_addr: Some(addr),
            size: Some(size),
            section_index: None,
            binding: SymbolBinding::Global,
            kind: SymbolKind::Object,
            storage: StorageFlags::RAM,
        })
    }

    #[test]
    fn metadata_type_joins_image_address() {
        let mut builder = SymbolTableBuilder::new(TypeArena::new());
        builder.absorb(image("speed", 0x4000_1000, 4));
        let fixed = fixed_metadata_type(&mut builder, 2, 0.01, 0.0);
        builder.absorb(SymbolSource::Metadata(MetadataSymbol {
            label: "speed".into(),
            type_id: Some(fixed),
            size: None,
        }));
        let table = builder.freeze();
        let record = table.lookup("speed").expect("merged symbol");
        assert_eq!(record.runtime_addr, Some(0x4000_1000), "address from image");
        assert_eq!(record.size, Some(4), "size from the address-bearing source");
        assert_eq!(record.type_id, Some(fixed), "type from metadata");
        assert!(record.storage.contains(StorageFlags::METADATA | StorageFlags::RAM));
    }

    #[test]
    fn image_size_crushes_metadata_arrays() {
        let mut builder = SymbolTableBuilder::new(TypeArena::new());
        let elem = TypeBuilder::new(builder.arena_mut()).scalar(
            None,
            4,
            ScalarEncoding::Unsigned,
            DisplayFormat::Default,
        );
        let seq = builder
            .arena_mut()
            .push_record(TypeRecord::Sequence(SequenceType::new(
                elem,
                4,
                SequenceCount::Static(64),
            )));
        builder.absorb(SymbolSource::Metadata(MetadataSymbol {
            label: "table".into(),
            type_id: Some(seq),
            size: None,
        }));
        builder.absorb(image("table", 0x8000, 40));
        let table = builder.freeze();
        let record = table.lookup("table").expect("merged symbol");
        let TypeRecord::Sequence(seq) = table.arena().get(record.type_id.unwrap()) else {
            panic!("expected sequence type");
        };
        assert_eq!(seq.element_count(), Some(10), "count crushed to the image size");
    }

    #[test]
    fn fixed_view_survives_scalar_metadata() {
        let mut builder = SymbolTableBuilder::new(TypeArena::new());
        builder.absorb(image("temp", 0x100, 2));
        let fixed = fixed_metadata_type(&mut builder, 2, 0.5, -40.0);
        builder.absorb(SymbolSource::Metadata(MetadataSymbol {
            label: "temp".into(),
            type_id: Some(fixed),
            size: None,
        }));
        // A later plain-scalar description of the same storage must not strip
        // the fixed-point view.
        let plain = TypeBuilder::new(builder.arena_mut()).scalar(
            None,
            2,
            ScalarEncoding::Unsigned,
            DisplayFormat::Default,
        );
        builder.absorb(SymbolSource::Metadata(MetadataSymbol {
            label: "temp".into(),
            type_id: Some(plain),
            size: None,
        }));
        let table = builder.freeze();
        let record = table.lookup("temp").unwrap();
        assert_eq!(record.type_id, Some(fixed));
    }
}
