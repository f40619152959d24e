// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! Per-microarchitecture register allow-list engine.
//!
//! Every predicate here is a pure `fn(u32) -> bool` (or, for PCI, `fn
//! (PciDeviceKind, u32) -> bool`): no I/O, no shared state, deterministic.
//! Each is expressed as the disjunction of a handful of masked range tests
//! plus a short list of point exceptions, mirroring the structure of the
//! per-family functions this engine replaces — just compressed into `const`
//! data instead of a wall of `||` comparisons.

mod amd;
mod intel;
mod pci;
mod select;

pub use amd::{allowed_amd, allowed_amd15, allowed_amd16};
pub use intel::{
    allowed_haswell, allowed_intel, allowed_knl, allowed_sandybridge, allowed_silvermont,
};
pub use pci::{allowed_pci_haswell, allowed_pci_knl, allowed_pci_sandybridge, PciDeviceKind};
pub use select::{select, Microarchitecture};

/// Signature shared by every MSR allow-list predicate.
///
/// The second parameter is the number of general-purpose PMCs reported by
/// the host's CPU identification leaf; only the `intel`-derived family uses
/// it (to gate a range that is only meaningful when more than four PMCs
/// exist), but every predicate takes it so the dispatcher can hold a single
/// function pointer type regardless of which policy was selected.
pub type MsrPolicyFn = fn(u32, u32) -> bool;

/// Signature shared by every PCI allow-list predicate.
pub type PciPolicyFn = fn(PciDeviceKind, u32) -> bool;

/// A single masked range test: `reg & mask == value`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RangeTest {
    pub mask: u32,
    pub value: u32,
}

impl RangeTest {
    pub(crate) const fn new(mask: u32, value: u32) -> Self {
        Self { mask, value }
    }

    pub(crate) fn matches(&self, reg: u32) -> bool {
        reg & self.mask == self.value
    }
}

/// True if `reg` matches any of `ranges` or equals any of `points`.
pub(crate) fn allowed_by_table(reg: u32, ranges: &[RangeTest], points: &[u32]) -> bool {
    ranges.iter().any(|r| r.matches(reg)) || points.contains(&reg)
}
