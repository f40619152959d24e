// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! Host CPU identification and the static PCI device tables that describe
//! where each supported microarchitecture's uncore performance-monitoring
//! boxes live in PCI configuration space.
//!
//! Everything here runs once, at service-process bootstrap, before the
//! dispatcher loop starts: identify the host, resolve its
//! [`hwreg_policy::Microarchitecture`], and look up its PCI device table
//! (if it has one).

mod cpuid;
mod identify;
mod pci_devices;

pub use cpuid::{CpuIdentity, CpuidResult, FixedCpuId};
#[cfg(target_arch = "x86_64")]
pub use cpuid::HostCpuId;
pub use identify::{identify, HostIdentity, UnsupportedProcessor};
pub use pci_devices::{devices_for, PciDevice};
