//! Word decoding: primary-opcode candidate lookup, most-specific-mask
//! selection, operand extraction, and the listing driver.

use crate::soc::device::Endianness;

use super::format;
use super::space::SpaceInfo;
use super::MachineDescription;

#[derive(Clone, Debug)]
pub(crate) struct DecodeSpace {
    pub name: String,
    pub word_bits: u32,
    pub word_bytes: usize,
    pub mask: u64,
    pub endianness: Endianness,
}

impl DecodeSpace {
    pub fn from_space(space: &SpaceInfo) -> Self {
        Self {
            name: space.name.clone(),
            word_bits: space.word_bits,
            word_bytes: space.word_bytes(),
            mask: if space.word_bits >= 64 {
                u64::MAX
            } else {
                (1u64 << space.word_bits) - 1
            },
            endianness: space.endianness,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedOperand {
    pub name: String,
    pub value: u64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedInstruction {
    pub space: String,
    pub mnemonic: String,
    pub operands: Vec<DecodedOperand>,
    pub word: u64,
    pub word_bytes: usize,
}

/// Decode result: the sentinel variants keep the raw word so callers can
/// report or dump it.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeOutcome {
    Decoded(DecodedInstruction),
    Unknown {
        word: u64,
        word_bytes: usize,
    },
    Ambiguous {
        word: u64,
        candidates: Vec<String>,
    },
}

impl DecodeOutcome {
    pub fn mnemonic(&self) -> Option<&str> {
        match self {
            DecodeOutcome::Decoded(decoded) => Some(&decoded.mnemonic),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Disassembly {
    pub address: u64,
    pub outcome: DecodeOutcome,
}

impl MachineDescription {
    /// Decodes one word against a named logic space.
    pub fn decode(&self, space_name: &str, word: u64) -> DecodeOutcome {
        let Some(decode_space) = self
            .decode_spaces
            .iter()
            .find(|space| space.name == space_name)
        else {
            return DecodeOutcome::Unknown {
                word,
                word_bytes: 0,
            };
        };
        self.decode_in(decode_space, word & decode_space.mask)
    }

    fn decode_in(&self, decode_space: &DecodeSpace, word: u64) -> DecodeOutcome {
        let mut matching: Vec<usize> = Vec::new();
        if let Some(primary) = self.primary_fields.get(&decode_space.name) {
            let opcode = primary.read(word);
            if let Some(bucket) = self
                .opcode_index
                .get(&(decode_space.name.clone(), opcode))
            {
                matching.extend(bucket.iter().copied());
            }
        }
        if let Some(rest) = self.unbucketed.get(&decode_space.name) {
            matching.extend(rest.iter().copied());
        }
        matching.retain(|&index| self.patterns[index].matches(word));

        let Some(best) = matching
            .iter()
            .map(|&index| self.patterns[index].specificity())
            .max()
        else {
            return DecodeOutcome::Unknown {
                word,
                word_bytes: decode_space.word_bytes,
            };
        };
        let winners: Vec<usize> = matching
            .into_iter()
            .filter(|&index| self.patterns[index].specificity() == best)
            .collect();
        if winners.len() > 1 {
            return DecodeOutcome::Ambiguous {
                word,
                candidates: winners
                    .iter()
                    .map(|&index| {
                        self.instructions[self.patterns[index].instruction_idx]
                            .name
                            .clone()
                    })
                    .collect(),
            };
        }

        let pattern = &self.patterns[winners[0]];
        let instruction = &self.instructions[pattern.instruction_idx];
        let space = &self.spaces[&pattern.space];
        let form = pattern
            .form
            .as_deref()
            .and_then(|name| space.forms.get(name));

        let mut operands = Vec::with_capacity(pattern.operand_names.len());
        if let Some(form) = form {
            for name in &pattern.operand_names {
                let Some(subfield) = form.subfield(name) else {
                    operands.push(DecodedOperand {
                        name: name.clone(),
                        value: 0,
                        text: format!("?{name}"),
                    });
                    continue;
                };
                let value = subfield.construct.read(word);
                let text = format::format_operand(self, space, subfield, word);
                operands.push(DecodedOperand {
                    name: name.clone(),
                    value,
                    text,
                });
            }
        }

        let mnemonic = match form {
            Some(form) => format::compose_mnemonic(&instruction.name, form, pattern, word),
            None => instruction.name.clone(),
        };

        DecodeOutcome::Decoded(DecodedInstruction {
            space: pattern.space.clone(),
            mnemonic,
            operands,
            word,
            word_bytes: decode_space.word_bytes,
        })
    }

    /// Walks a byte stream producing one listing entry per word. With several
    /// logic spaces the widest encoding is tried first and narrower ones take
    /// over when it has no match.
    pub fn disassemble_from(&self, bytes: &[u8], base_address: u64) -> Vec<Disassembly> {
        let mut listing = Vec::new();
        if self.decode_spaces.is_empty() {
            return listing;
        }
        let mut cursor = 0usize;
        let mut address = base_address;
        while cursor < bytes.len() {
            let remaining = &bytes[cursor..];
            let mut outcome = None;
            for decode_space in &self.decode_spaces {
                if remaining.len() < decode_space.word_bytes {
                    continue;
                }
                let chunk = &remaining[..decode_space.word_bytes];
                let word = decode_space.endianness.decode_word(chunk) & decode_space.mask;
                match self.decode_in(decode_space, word) {
                    DecodeOutcome::Unknown { .. } if self.decode_spaces.len() > 1 => continue,
                    other => {
                        outcome = Some(other);
                        break;
                    }
                }
            }
            let Some(outcome) = outcome else {
                // No space matched; consume the narrowest word as unknown.
                let narrowest = self
                    .decode_spaces
                    .iter()
                    .filter(|space| remaining.len() >= space.word_bytes)
                    .min_by_key(|space| space.word_bytes);
                match narrowest {
                    Some(space) => {
                        let chunk = &remaining[..space.word_bytes];
                        let word = space.endianness.decode_word(chunk) & space.mask;
                        listing.push(Disassembly {
                            address,
                            outcome: DecodeOutcome::Unknown {
                                word,
                                word_bytes: space.word_bytes,
                            },
                        });
                        cursor += space.word_bytes;
                        address += space.word_bytes as u64;
                        continue;
                    }
                    None => break,
                }
            };
            let consumed = match &outcome {
                DecodeOutcome::Decoded(decoded) => decoded.word_bytes,
                DecodeOutcome::Unknown { word_bytes, .. } => *word_bytes,
                DecodeOutcome::Ambiguous { .. } => self.decode_spaces[0].word_bytes,
            }
            .max(1);
            listing.push(Disassembly { address, outcome });
            cursor += consumed;
            address += consumed as u64;
        }
        listing
    }

    pub fn disassemble(&self, bytes: &[u8]) -> Vec<Disassembly> {
        self.disassemble_from(bytes, 0)
    }
}
