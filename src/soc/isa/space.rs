//! Per-space field registry used during validation: direct fields plus
//! bracketed arrays whose instances match by index suffix.

use std::collections::{HashMap, HashSet};

use super::ast::FieldDecl;

#[derive(Debug, Default)]
pub(crate) struct FieldInfo {
    subfields: HashSet<String>,
}

impl FieldInfo {
    pub(crate) fn has_subfield(&self, name: &str) -> bool {
        self.subfields.contains(name)
    }
}

#[derive(Debug)]
pub(crate) struct RangedFieldInfo {
    base: String,
    start: u32,
    end: u32,
    subfields: HashSet<String>,
}

impl RangedFieldInfo {
    fn matches(&self, candidate: &str) -> bool {
        let Some(suffix) = candidate.strip_prefix(self.base.as_str()) else {
            return false;
        };
        if suffix.is_empty() {
            return false;
        }
        match parse_index_suffix(suffix) {
            Some(index) => index >= self.start && index <= self.end,
            None => false,
        }
    }

    pub(crate) fn has_subfield(&self, name: &str) -> bool {
        self.subfields.contains(name)
    }
}

/// Plain decimal instance suffix, e.g. the `17` of `GPR17`.
pub(crate) fn parse_index_suffix(suffix: &str) -> Option<u32> {
    if suffix.is_empty() || !suffix.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

#[derive(Debug)]
pub(crate) enum FieldRegistrationError {
    DuplicateField { name: String },
}

pub(crate) enum FieldLookup<'state> {
    Direct(&'state FieldInfo),
    Ranged(&'state RangedFieldInfo),
}

impl FieldLookup<'_> {
    pub(crate) fn has_subfield(&self, name: &str) -> bool {
        match self {
            FieldLookup::Direct(info) => info.has_subfield(name),
            FieldLookup::Ranged(info) => info.has_subfield(name),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SpaceState {
    fields: HashMap<String, FieldInfo>,
    ranges: Vec<RangedFieldInfo>,
}

impl SpaceState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lookup_field(&self, name: &str) -> Option<FieldLookup<'_>> {
        if let Some(info) = self.fields.get(name) {
            return Some(FieldLookup::Direct(info));
        }
        self.ranges
            .iter()
            .find(|entry| entry.matches(name))
            .map(FieldLookup::Ranged)
    }

    pub(crate) fn register_field(&mut self, field: &FieldDecl) -> Result<(), FieldRegistrationError> {
        let subfields: HashSet<String> = field
            .subfields
            .iter()
            .map(|sub| sub.name.clone())
            .collect();
        if let Some((start, end)) = field.range {
            if self.ranges.iter().any(|entry| entry.base == field.name) {
                return Err(FieldRegistrationError::DuplicateField {
                    name: field.name.clone(),
                });
            }
            self.ranges.push(RangedFieldInfo {
                base: field.name.clone(),
                start,
                end,
                subfields,
            });
        } else {
            if self.fields.contains_key(&field.name) {
                return Err(FieldRegistrationError::DuplicateField {
                    name: field.name.clone(),
                });
            }
            self.fields.insert(field.name.clone(), FieldInfo { subfields });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_suffixes_only_accept_plain_decimals() {
        assert_eq!(parse_index_suffix("17"), Some(17));
        assert_eq!(parse_index_suffix(""), None);
        assert_eq!(parse_index_suffix("x7"), None);
    }
}
