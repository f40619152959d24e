// SPDX-License-Identifier: Apache-2.0

//! Uncore PCI-config-space allow-lists.
//!
//! Unlike the MSR predicates, these are keyed by both a [`PciDeviceKind`]
//! (which box on the uncore ring the register belongs to) and the register
//! offset itself; each box exposes a small, disjoint point list rather than
//! a masked range.

/// The uncore box a PCI-config-space register belongs to.
///
/// `NoDeviceType` is the daemon's own sentinel for a socket/bus pair that
/// was probed but carries no performance-monitoring box at all; every
/// register is allowed through it since there is nothing sensitive behind
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PciDeviceKind {
    /// No performance-monitoring box behind this slot.
    NoDeviceType,
    /// Ring-to-QPI/UPI bridge (R3QPI).
    R3qpi,
    /// Ring-to-PCIe bridge (R2PCIE).
    R2pcie,
    /// Integrated memory controller channel.
    Imc,
    /// Home agent.
    Ha,
    /// QPI link layer.
    Qpi,
    /// IIO/IRP root port.
    Irp,
    /// Xeon Phi (KNL) edge/distributed cache box.
    Edc,
}

/// Sandy-Bridge/Ivy-Bridge-EP uncore PCI box offsets.
mod sandybridge_offsets {
    pub const R3QPI_BOX_CTL: u32 = 0xF0;
    pub const R3QPI_BOX_STATUS: u32 = 0xF8;
    pub const R3QPI_CTL: [u32; 3] = [0xD8, 0xDC, 0xE0];
    pub const R3QPI_CTR_A: [u32; 3] = [0xA0, 0xA8, 0xB0];
    pub const R3QPI_CTR_B: [u32; 3] = [0xA4, 0xAC, 0xB4];

    pub const R2PCIE_BOX_CTL: u32 = 0xF4;
    pub const R2PCIE_BOX_STATUS: u32 = 0xFC;
    pub const R2PCIE_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const R2PCIE_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const R2PCIE_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];

    pub const IMC_BOX_CTL: u32 = 0xF4;
    pub const IMC_BOX_STATUS: u32 = 0xF8;
    pub const IMC_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const IMC_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const IMC_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const IMC_FIXED_CTL: u32 = 0xF0;
    pub const IMC_FIXED_CTR_A: u32 = 0xD0;
    pub const IMC_FIXED_CTR_B: u32 = 0xD4;

    pub const HA_BOX_CTL: u32 = 0xF4;
    pub const HA_BOX_STATUS: u32 = 0xF8;
    pub const HA_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const HA_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const HA_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const HA_OPCODEMATCH: u32 = 0x54;
    pub const HA_ADDRMATCH0: u32 = 0x40;
    pub const HA_ADDRMATCH1: u32 = 0x44;

    pub const QPI_BOX_CTL: u32 = 0xF4;
    pub const QPI_BOX_STATUS: u32 = 0xF8;
    pub const QPI_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const QPI_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const QPI_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const QPI_MASK: [u32; 2] = [0x238, 0x23C];
    pub const QPI_MATCH: [u32; 2] = [0x228, 0x22C];
    pub const QPI_RATE_STATUS: u32 = 0x18C;

    pub const IRP_BOX_CTL: u32 = 0xF0;
    pub const IRP_BOX_STATUS: u32 = 0xF8;
    pub const IRP0_CTL: [u32; 2] = [0x54, 0x58];
    pub const IRP0_CTR: [u32; 2] = [0xA0, 0xA4];
    pub const IRP1_CTL: [u32; 2] = [0x5C, 0x60];
    pub const IRP1_CTR: [u32; 2] = [0xA8, 0xAC];
}

/// Haswell-EP/Broadwell-EP additions on top of the Sandy Bridge offsets
/// (identical box layouts except the QPI box, which moved to the v3
/// register set on these parts).
mod haswell_offsets {
    pub const V3_QPI_BOX_CTL: u32 = 0xF4;
    pub const V3_QPI_BOX_STATUS: u32 = 0xF8;
    pub const V3_QPI_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const V3_QPI_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const V3_QPI_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const V3_QPI_RX_MASK: [u32; 2] = [0x238, 0x23C];
    pub const V3_QPI_RX_MATCH: [u32; 2] = [0x228, 0x22C];
    pub const V3_QPI_TX_MASK: [u32; 2] = [0x248, 0x24C];
    pub const V3_QPI_TX_MATCH: [u32; 2] = [0x258, 0x25C];
    pub const V3_QPI_RATE_STATUS: u32 = 0x18C;
    pub const V3_QPI_LINK_LLR: u32 = 0xC0;
    pub const V3_QPI_LINK_IDLE: u32 = 0xC4;
}

/// Xeon Phi (KNL) uncore box offsets. KNL's uncore mirrors each box twice
/// (an "upper" and "lower" die half), hence the `_U_`/`_D_` pairs.
mod knl_offsets {
    pub const EDC_U_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const EDC_U_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const EDC_U_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const EDC_U_BOX_CTL: u32 = 0xF4;
    pub const EDC_U_BOX_STATUS: u32 = 0xF8;
    pub const EDC_U_FIXED_CTR_A: u32 = 0xD0;
    pub const EDC_U_FIXED_CTR_B: u32 = 0xD4;
    pub const EDC_U_FIXED_CTL: u32 = 0xF0;
    pub const EDC_D_CTR_A: [u32; 4] = [0x1A0, 0x1A8, 0x1B0, 0x1B8];
    pub const EDC_D_CTR_B: [u32; 4] = [0x1A4, 0x1AC, 0x1B4, 0x1BC];
    pub const EDC_D_CTL: [u32; 4] = [0x1D8, 0x1DC, 0x1E0, 0x1E4];
    pub const EDC_D_BOX_CTL: u32 = 0x1F4;
    pub const EDC_D_BOX_STATUS: u32 = 0x1F8;
    pub const EDC_D_FIXED_CTR_A: u32 = 0x1D0;
    pub const EDC_D_FIXED_CTR_B: u32 = 0x1D4;
    pub const EDC_D_FIXED_CTL: u32 = 0x1F0;

    pub const MC_U_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const MC_U_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const MC_U_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const MC_U_BOX_CTL: u32 = 0xF4;
    pub const MC_U_BOX_STATUS: u32 = 0xF8;
    pub const MC_U_FIXED_CTR_A: u32 = 0xD0;
    pub const MC_U_FIXED_CTR_B: u32 = 0xD4;
    pub const MC_U_FIXED_CTL: u32 = 0xF0;
    pub const MC_D_CTR_A: [u32; 4] = [0x1A0, 0x1A8, 0x1B0, 0x1B8];
    pub const MC_D_CTR_B: [u32; 4] = [0x1A4, 0x1AC, 0x1B4, 0x1BC];
    pub const MC_D_CTL: [u32; 4] = [0x1D8, 0x1DC, 0x1E0, 0x1E4];
    pub const MC_D_BOX_CTL: u32 = 0x1F4;
    pub const MC_D_BOX_STATUS: u32 = 0x1F8;
    pub const MC_D_FIXED_CTR_A: u32 = 0x1D0;
    pub const MC_D_FIXED_CTR_B: u32 = 0x1D4;
    pub const MC_D_FIXED_CTL: u32 = 0x1F0;

    pub const M2PCIE_CTR_A: [u32; 4] = [0xA0, 0xA8, 0xB0, 0xB8];
    pub const M2PCIE_CTR_B: [u32; 4] = [0xA4, 0xAC, 0xB4, 0xBC];
    pub const M2PCIE_CTL: [u32; 4] = [0xD8, 0xDC, 0xE0, 0xE4];
    pub const M2PCIE_BOX_CTL: u32 = 0xF4;
    pub const M2PCIE_BOX_STATUS: u32 = 0xF8;

    pub const IRP_CTR: [u32; 2] = [0xA0, 0xA4];
    pub const IRP_CTL: [u32; 2] = [0xD8, 0xDC];
    pub const IRP_BOX_CTL: u32 = 0xF0;
    pub const IRP_BOX_STATUS: u32 = 0xF8;
}

/// Sandy Bridge/Ivy Bridge-EP uncore allow-list.
#[must_use]
pub fn allowed_pci_sandybridge(kind: PciDeviceKind, reg: u32) -> bool {
    use sandybridge_offsets as o;
    match kind {
        PciDeviceKind::NoDeviceType => true,
        PciDeviceKind::R3qpi => {
            reg == o::R3QPI_BOX_CTL
                || reg == o::R3QPI_BOX_STATUS
                || o::R3QPI_CTL.contains(&reg)
                || o::R3QPI_CTR_A.contains(&reg)
                || o::R3QPI_CTR_B.contains(&reg)
        }
        PciDeviceKind::R2pcie => {
            reg == o::R2PCIE_BOX_CTL
                || reg == o::R2PCIE_BOX_STATUS
                || o::R2PCIE_CTL.contains(&reg)
                || o::R2PCIE_CTR_A.contains(&reg)
                || o::R2PCIE_CTR_B.contains(&reg)
        }
        PciDeviceKind::Imc => {
            reg == o::IMC_BOX_CTL
                || reg == o::IMC_BOX_STATUS
                || reg == o::IMC_FIXED_CTL
                || reg == o::IMC_FIXED_CTR_A
                || reg == o::IMC_FIXED_CTR_B
                || o::IMC_CTL.contains(&reg)
                || o::IMC_CTR_A.contains(&reg)
                || o::IMC_CTR_B.contains(&reg)
        }
        PciDeviceKind::Ha => {
            reg == o::HA_BOX_CTL
                || reg == o::HA_BOX_STATUS
                || reg == o::HA_OPCODEMATCH
                || reg == o::HA_ADDRMATCH0
                || reg == o::HA_ADDRMATCH1
                || o::HA_CTL.contains(&reg)
                || o::HA_CTR_A.contains(&reg)
                || o::HA_CTR_B.contains(&reg)
        }
        PciDeviceKind::Qpi => {
            reg == o::QPI_BOX_CTL
                || reg == o::QPI_BOX_STATUS
                || reg == o::QPI_RATE_STATUS
                || o::QPI_CTL.contains(&reg)
                || o::QPI_CTR_A.contains(&reg)
                || o::QPI_CTR_B.contains(&reg)
                || o::QPI_MASK.contains(&reg)
                || o::QPI_MATCH.contains(&reg)
        }
        PciDeviceKind::Irp => {
            reg == o::IRP_BOX_CTL
                || reg == o::IRP_BOX_STATUS
                || o::IRP0_CTL.contains(&reg)
                || o::IRP0_CTR.contains(&reg)
                || o::IRP1_CTL.contains(&reg)
                || o::IRP1_CTR.contains(&reg)
        }
        PciDeviceKind::Edc => false,
    }
}

/// Haswell-EP/Broadwell-EP uncore allow-list: identical to Sandy Bridge
/// except the QPI box moved to the v3 register layout.
#[must_use]
pub fn allowed_pci_haswell(kind: PciDeviceKind, reg: u32) -> bool {
    use haswell_offsets as o;
    match kind {
        PciDeviceKind::Qpi => {
            reg == o::V3_QPI_BOX_CTL
                || reg == o::V3_QPI_BOX_STATUS
                || reg == o::V3_QPI_RATE_STATUS
                || reg == o::V3_QPI_LINK_LLR
                || reg == o::V3_QPI_LINK_IDLE
                || o::V3_QPI_CTL.contains(&reg)
                || o::V3_QPI_CTR_A.contains(&reg)
                || o::V3_QPI_CTR_B.contains(&reg)
                || o::V3_QPI_RX_MASK.contains(&reg)
                || o::V3_QPI_RX_MATCH.contains(&reg)
                || o::V3_QPI_TX_MASK.contains(&reg)
                || o::V3_QPI_TX_MATCH.contains(&reg)
        }
        other => allowed_pci_sandybridge(other, reg),
    }
}

/// Xeon Phi (KNL) uncore allow-list.
#[must_use]
pub fn allowed_pci_knl(kind: PciDeviceKind, reg: u32) -> bool {
    use knl_offsets as o;
    match kind {
        PciDeviceKind::Edc => {
            reg == o::EDC_U_BOX_CTL
                || reg == o::EDC_U_BOX_STATUS
                || reg == o::EDC_U_FIXED_CTL
                || reg == o::EDC_U_FIXED_CTR_A
                || reg == o::EDC_U_FIXED_CTR_B
                || o::EDC_U_CTL.contains(&reg)
                || o::EDC_U_CTR_A.contains(&reg)
                || o::EDC_U_CTR_B.contains(&reg)
                || reg == o::EDC_D_BOX_CTL
                || reg == o::EDC_D_BOX_STATUS
                || reg == o::EDC_D_FIXED_CTL
                || reg == o::EDC_D_FIXED_CTR_A
                || reg == o::EDC_D_FIXED_CTR_B
                || o::EDC_D_CTL.contains(&reg)
                || o::EDC_D_CTR_A.contains(&reg)
                || o::EDC_D_CTR_B.contains(&reg)
        }
        PciDeviceKind::Imc => {
            reg == o::MC_U_BOX_CTL
                || reg == o::MC_U_BOX_STATUS
                || reg == o::MC_U_FIXED_CTL
                || reg == o::MC_U_FIXED_CTR_A
                || reg == o::MC_U_FIXED_CTR_B
                || o::MC_U_CTL.contains(&reg)
                || o::MC_U_CTR_A.contains(&reg)
                || o::MC_U_CTR_B.contains(&reg)
                || reg == o::MC_D_BOX_CTL
                || reg == o::MC_D_BOX_STATUS
                || reg == o::MC_D_FIXED_CTL
                || reg == o::MC_D_FIXED_CTR_A
                || reg == o::MC_D_FIXED_CTR_B
                || o::MC_D_CTL.contains(&reg)
                || o::MC_D_CTR_A.contains(&reg)
                || o::MC_D_CTR_B.contains(&reg)
        }
        PciDeviceKind::R2pcie => {
            reg == o::M2PCIE_BOX_CTL
                || reg == o::M2PCIE_BOX_STATUS
                || o::M2PCIE_CTL.contains(&reg)
                || o::M2PCIE_CTR_A.contains(&reg)
                || o::M2PCIE_CTR_B.contains(&reg)
        }
        PciDeviceKind::Irp => {
            reg == o::IRP_BOX_CTL
                || reg == o::IRP_BOX_STATUS
                || o::IRP_CTL.contains(&reg)
                || o::IRP_CTR.contains(&reg)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_device_type_allows_everything() {
        assert!(allowed_pci_sandybridge(PciDeviceKind::NoDeviceType, 0xDEAD));
    }

    #[test]
    fn sandybridge_r3qpi_allows_listed_registers_only() {
        assert!(allowed_pci_sandybridge(PciDeviceKind::R3qpi, 0xF0));
        assert!(!allowed_pci_sandybridge(PciDeviceKind::R3qpi, 0x00));
    }

    #[test]
    fn haswell_qpi_uses_v3_offsets_not_sandybridge_ones() {
        assert!(allowed_pci_haswell(PciDeviceKind::Qpi, 0xC0));
        assert!(!allowed_pci_sandybridge(PciDeviceKind::Qpi, 0xC0));
    }

    #[test]
    fn haswell_falls_back_to_sandybridge_for_non_qpi_boxes() {
        assert_eq!(
            allowed_pci_haswell(PciDeviceKind::Ha, 0xF4),
            allowed_pci_sandybridge(PciDeviceKind::Ha, 0xF4)
        );
    }

    #[test]
    fn knl_edc_box_has_both_upper_and_lower_die_halves() {
        assert!(allowed_pci_knl(PciDeviceKind::Edc, 0xF4));
        assert!(allowed_pci_knl(PciDeviceKind::Edc, 0x1F4));
    }

    #[test]
    fn knl_has_no_ha_or_qpi_boxes() {
        assert!(!allowed_pci_knl(PciDeviceKind::Ha, 0xF4));
        assert!(!allowed_pci_knl(PciDeviceKind::Qpi, 0xF4));
    }
}
