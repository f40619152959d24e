// SPDX-License-Identifier: Apache-2.0

//! Intel (P6-derived) MSR allow-lists.

use crate::{allowed_by_table, RangeTest};

/// Base Intel allow-list: general-purpose counters, event selectors, fixed
/// counters, and a fixed set of status/control MSRs.
///
/// `num_pmc_counters` gates the `reg & 0x190 == 0x190` range, which is only
/// meaningful on hosts with more than four general-purpose PMCs.
#[must_use]
pub fn allowed_intel(reg: u32, num_pmc_counters: u32) -> bool {
    const RANGES: &[RangeTest] = &[
        RangeTest::new(0x0F0, 0x0C0), // general-purpose performance counters
        RangeTest::new(0x190, 0x180), // performance event select registers
        RangeTest::new(0xF00, 0x300),
        RangeTest::new(0xF00, 0xC00),
        RangeTest::new(0xF00, 0xD00),
        RangeTest::new(0xF00, 0xE00),
        RangeTest::new(0xF00, 0xF00),
    ];
    const POINTS: &[u32] = &[
        0x1A0, 0x1A4, 0x0CE, 0x19C, 0x1A2, 0x1AD, 0x1AE, 0x1AF, 0x1AC, 0x1A6, 0x1A7, 0x620, 0xCD,
        0x1B0, 0x1B1,
    ];

    if allowed_by_table(reg, RANGES, POINTS) {
        return true;
    }
    // Extra window valid only when the host reports more than four PMCs.
    reg & 0x190 == 0x190 && num_pmc_counters > 4
}

/// Sandy Bridge-and-later client/server tier: the Intel base plus two
/// further 256-register windows and one PEBS control MSR.
#[must_use]
pub fn allowed_sandybridge(reg: u32, num_pmc_counters: u32) -> bool {
    /// Sandy Bridge's additional PEBS control MSR.
    const MSR_ALT_PEBS: u32 = 0x3F1;

    allowed_intel(reg, num_pmc_counters)
        || reg & 0xF00 == 0x600
        || reg & 0xF00 == 0x700
        || reg == MSR_ALT_PEBS
}

/// Haswell tier: Sandy Bridge plus one further window.
///
/// Not wired into the current `(family, model)` selection table (every
/// Haswell-and-later model selects [`allowed_sandybridge`] for its MSR
/// policy; only the matching PCI policy advances to the Haswell tier), but
/// specified and tested in its own right since it is a documented part of
/// the allow-list family.
#[must_use]
pub fn allowed_haswell(reg: u32, num_pmc_counters: u32) -> bool {
    allowed_sandybridge(reg, num_pmc_counters) || reg & 0xF00 == 0x700
}

/// Silvermont (Atom) tier.
#[must_use]
pub fn allowed_silvermont(reg: u32, _num_pmc_counters: u32) -> bool {
    const RANGES: &[RangeTest] = &[
        RangeTest::new(0x0F8, 0x0C0),
        RangeTest::new(0xFF0, 0x180),
        RangeTest::new(0xF00, 0x300),
        RangeTest::new(0xF00, 0x600),
        RangeTest::new(0xF00, 0xC00),
        RangeTest::new(0xF00, 0xD00),
    ];
    const POINTS: &[u32] = &[0x1A0, 0x0CE, 0x1AD, 0x19C, 0x1A2, 0x1A6, 0x1A7];

    allowed_by_table(reg, RANGES, POINTS)
}

/// Xeon Phi (KNL) tier: Silvermont plus three further windows.
#[must_use]
pub fn allowed_knl(reg: u32, num_pmc_counters: u32) -> bool {
    if allowed_silvermont(reg, num_pmc_counters) {
        return true;
    }
    reg & 0xF00 == 0x700 || reg & 0xF00 == 0xE00 || reg & 0xF00 == 0xF00
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn intel_counter_range_allowed() {
        assert!(allowed_intel(0x0C1, 4));
    }

    #[test]
    fn intel_unlisted_register_denied() {
        assert!(!allowed_intel(0x1A1, 8));
    }

    #[test]
    fn intel_extra_pmc_window_requires_more_than_four_pmcs() {
        assert!(!allowed_intel(0x195, 4));
        assert!(allowed_intel(0x195, 8));
    }

    proptest! {
        #[test]
        fn sandybridge_is_intel_plus_windows_and_pebs(reg in 0u32..=0xFFFF) {
            // Property 8 of the spec's testable-properties list, verbatim.
            let expected =
                allowed_intel(reg, 8) || (reg & 0xF00 == 0x600) || (reg & 0xF00 == 0x700) || reg == 0x3F1;
            prop_assert_eq!(allowed_sandybridge(reg, 8), expected);
        }
    }

    #[test]
    fn haswell_msr_tier_adds_0x700_window_on_top_of_sandybridge() {
        assert!(allowed_haswell(0x710, 8));
        assert!(!allowed_sandybridge(0x710, 8));
    }

    #[test]
    fn knl_falls_back_to_silvermont_then_its_own_windows() {
        // Scenario (c) from the spec: 0x710 isn't covered by silvermont's
        // own ranges, but is covered by KNL's 0x700 window.
        assert!(!allowed_silvermont(0x710, 0));
        assert!(allowed_knl(0x710, 0));
    }

    #[test]
    fn silvermont_denies_registers_outside_its_tables() {
        assert!(!allowed_silvermont(0x1FF, 0));
    }
}
