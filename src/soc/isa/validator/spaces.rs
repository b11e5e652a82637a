use super::Validator;
use crate::soc::isa::ast::{BusDecl, BusRangeDecl, SpaceDecl, SpaceKind};
use crate::soc::isa::logic::LogicSpaceState;
use crate::soc::isa::space::SpaceState;

impl Validator {
    pub(super) fn validate_space(&mut self, space: &SpaceDecl) {
        if self.space_kinds.contains_key(&space.tag) {
            self.push_error(
                "validation.duplicate-space",
                format!("space '{}' declared multiple times", space.tag),
                Some(space.span.clone()),
            );
            return;
        }
        self.space_kinds.insert(space.tag.clone(), space.kind);
        if let Some(word) = space.word_bits {
            self.space_word_sizes.insert(space.tag.clone(), word);
        }
        if space.kind == SpaceKind::Logic {
            self.logic_states.insert(
                space.tag.clone(),
                LogicSpaceState::new(space.word_bits.unwrap_or(32)),
            );
        } else {
            self.space_states
                .insert(space.tag.clone(), SpaceState::new());
        }
    }

    pub(super) fn validate_bus(&mut self, bus: &BusDecl) {
        if self.bus_sizes.contains_key(&bus.tag) || self.space_kinds.contains_key(&bus.tag) {
            self.push_error(
                "validation.duplicate-space",
                format!("bus '{}' collides with an existing declaration", bus.tag),
                Some(bus.span.clone()),
            );
            return;
        }
        self.bus_sizes.insert(bus.tag.clone(), bus.addr_bits);
        self.bus_ranges.insert(bus.tag.clone(), Vec::new());
    }

    /// Bus ranges must fit the declared address width; overlap at equal
    /// priority is an error, at lower priority an overlay warning.
    pub(super) fn validate_bus_range(&mut self, range: &BusRangeDecl) {
        let Some(addr_bits) = self.bus_sizes.get(&range.bus).copied() else {
            self.push_error(
                "validation.bus.unknown",
                format!("range '{}' declared on undeclared bus '{}'", range.name, range.bus),
                Some(range.span.clone()),
            );
            return;
        };
        let limit = if addr_bits >= 64 {
            u64::MAX
        } else {
            1u64 << addr_bits
        };
        let end = range.offset.saturating_add(range.size);
        if range.size == 0 || end > limit {
            self.push_error(
                "validation.bus.range-size",
                format!(
                    "range '{}' (0x{:X}..0x{:X}) does not fit the {}-bit bus '{}'",
                    range.name, range.offset, end, addr_bits, range.bus
                ),
                Some(range.span.clone()),
            );
            return;
        }
        let mut error = None;
        let mut warning = None;
        if let Some(existing) = self.bus_ranges.get(&range.bus) {
            for (other_name, other_start, other_end, other_prio, _) in existing {
                if range.offset < *other_end && *other_start < end {
                    if *other_prio == range.priority {
                        error = Some(format!(
                            "range '{}' overlaps '{}' at equal priority {}",
                            range.name, other_name, range.priority
                        ));
                    } else {
                        warning = Some(format!(
                            "range '{}' overlays '{}' (priorities {} and {})",
                            range.name, other_name, range.priority, other_prio
                        ));
                    }
                }
            }
        }
        if let Some(message) = error {
            self.push_error("validation.bus.overlap", message, Some(range.span.clone()));
            return;
        }
        if let Some(message) = warning {
            self.push_warning("validation.bus.overlay", message, Some(range.span.clone()));
        }
        self.bus_ranges.entry(range.bus.clone()).or_default().push((
            range.name.clone(),
            range.offset,
            end,
            range.priority,
            range.span.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    #[test]
    fn duplicate_space_tags_are_rejected() {
        let err = validate_src(
            ":space regs addr=32 word=64 type=register\n:space regs addr=32 word=64 type=register",
        )
        .unwrap_err();
        expect_validation_diag(err, "declared multiple times");
    }

    #[test]
    fn bus_ranges_must_fit_the_address_width() {
        let err = validate_src(
            ":bus sysbus addr=16\n:sysbus big offset=0xFF00 size=0x200",
        )
        .unwrap_err();
        expect_validation_diag(err, "does not fit the 16-bit bus");
    }

    #[test]
    fn equal_priority_overlap_errors_lower_warns() {
        let err = validate_src(
            ":bus sysbus addr=32\n\
             :sysbus flash offset=0x0 size=0x4000\n\
             :sysbus shadow offset=0x1000 size=0x100",
        )
        .unwrap_err();
        expect_validation_diag(err, "equal priority");

        let validator = validate_src(
            ":bus sysbus addr=32\n\
             :sysbus flash offset=0x0 size=0x4000\n\
             :sysbus window offset=0x1000 size=0x100 prio=1",
        )
        .expect("overlay at higher priority validates");
        assert_eq!(validator.warnings().len(), 1, "overlay reported as warning");
    }
}
