// SPDX-License-Identifier: Apache-2.0

//! Per-microarchitecture PCI device tables: which uncore boxes exist, what
//! their `/proc/bus/pci` path suffix is, and a human-readable name for
//! logging.

use hwreg_policy::{Microarchitecture, PciDeviceKind};

/// One row of a microarchitecture's PCI device table.
#[derive(Debug, Clone, Copy)]
pub struct PciDevice {
    /// Which allow-list (and register layout) this slot's registers follow.
    pub kind: PciDeviceKind,
    /// `<device>.<function>` suffix appended to `PCI_ROOT_PATH<bus>/` to
    /// form the full `/proc/bus/pci` path.
    pub path_suffix: &'static str,
    /// Name surfaced in logs and diagnostics.
    pub name: &'static str,
}

const SANDYBRIDGE_EP_DEVICES: &[PciDevice] = &[
    PciDevice {
        kind: PciDeviceKind::Ha,
        path_suffix: "0e.1",
        name: "ha0",
    },
    PciDevice {
        kind: PciDeviceKind::Imc,
        path_suffix: "0f.0",
        name: "imc0",
    },
    PciDevice {
        kind: PciDeviceKind::Imc,
        path_suffix: "0f.1",
        name: "imc1",
    },
    PciDevice {
        kind: PciDeviceKind::Qpi,
        path_suffix: "08.2",
        name: "qpi0",
    },
    PciDevice {
        kind: PciDeviceKind::R3qpi,
        path_suffix: "08.3",
        name: "r3qpi0",
    },
    PciDevice {
        kind: PciDeviceKind::R2pcie,
        path_suffix: "13.0",
        name: "r2pcie",
    },
];

const HASWELL_EP_DEVICES: &[PciDevice] = &[
    PciDevice {
        kind: PciDeviceKind::Ha,
        path_suffix: "0e.1",
        name: "ha0",
    },
    PciDevice {
        kind: PciDeviceKind::Imc,
        path_suffix: "0f.0",
        name: "imc0",
    },
    PciDevice {
        kind: PciDeviceKind::Imc,
        path_suffix: "0f.1",
        name: "imc1",
    },
    PciDevice {
        kind: PciDeviceKind::Qpi,
        path_suffix: "08.2",
        name: "qpi0",
    },
    PciDevice {
        kind: PciDeviceKind::R3qpi,
        path_suffix: "08.3",
        name: "r3qpi0",
    },
    PciDevice {
        kind: PciDeviceKind::R2pcie,
        path_suffix: "13.0",
        name: "r2pcie",
    },
];

const KNL_DEVICES: &[PciDevice] = &[
    PciDevice {
        kind: PciDeviceKind::Imc,
        path_suffix: "08.0",
        name: "mc0",
    },
    PciDevice {
        kind: PciDeviceKind::Imc,
        path_suffix: "09.0",
        name: "mc1",
    },
    PciDevice {
        kind: PciDeviceKind::Edc,
        path_suffix: "0a.0",
        name: "edc0",
    },
    PciDevice {
        kind: PciDeviceKind::Edc,
        path_suffix: "0b.0",
        name: "edc1",
    },
    PciDevice {
        kind: PciDeviceKind::R2pcie,
        path_suffix: "0c.0",
        name: "m2pcie",
    },
    PciDevice {
        kind: PciDeviceKind::Irp,
        path_suffix: "0d.0",
        name: "irp",
    },
];

/// The PCI device table for `microarch`, or `None` when that
/// microarchitecture has no uncore in PCI configuration space.
#[must_use]
pub fn devices_for(microarch: Microarchitecture) -> Option<&'static [PciDevice]> {
    match microarch {
        Microarchitecture::SandyIvyEp => Some(SANDYBRIDGE_EP_DEVICES),
        Microarchitecture::BroadwellDHaswellEpBroadwellE => Some(HASWELL_EP_DEVICES),
        Microarchitecture::XeonPhiKnl => Some(KNL_DEVICES),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_parts_have_no_pci_device_table() {
        assert!(devices_for(Microarchitecture::SandyIvyClient).is_none());
    }

    #[test]
    fn sandybridge_ep_table_is_nonempty() {
        assert!(!devices_for(Microarchitecture::SandyIvyEp).unwrap().is_empty());
    }

    #[test]
    fn knl_table_has_no_ha_or_qpi_rows() {
        let table = devices_for(Microarchitecture::XeonPhiKnl).unwrap();
        assert!(table
            .iter()
            .all(|d| !matches!(d.kind, PciDeviceKind::Ha | PciDeviceKind::Qpi)));
    }
}
