// SPDX-License-Identifier: Apache-2.0

//! Runs once per service process, before the dispatcher loop starts:
//! identify the host, select its policy, open every MSR file, and (for
//! microarchitectures with an uncore in PCI configuration space) discover
//! the socket-to-bus mapping and probe every device slot.

use std::path::{Path, PathBuf};

use hwreg_policy::{select, MsrPolicyFn, PciPolicyFn};
use hwreg_topology::{identify, CpuIdentity, UnsupportedProcessor};

use crate::resource_table::ResourceTable;

/// Default root of the PCI configuration-space filesystem.
pub const DEFAULT_PCI_ROOT: &str = "/proc/bus/pci/";

/// Upper bound on sockets a single host can report; the socket-discovery
/// walk never reads more than this many bus files, so a wedged or
/// adversarial PCI tree cannot turn discovery into an unbounded loop.
const MAX_SOCKETS: usize = 8;

/// Bus at which socket 0's own root-bus probe starts; socket 0's real bus
/// (`0xff` on a 2-socket host, `0x3f` on a 4-socket host) is read from this
/// bus's `05.0` function, the same way every later socket's bus is read
/// from the one before it.
const FIRST_PROBE_BUS: u8 = 0x00;

/// PCI function probed for the next socket's root bus.
const BUS_DISCOVERY_FUNCTION: &str = "05.0";
/// Byte offset of the cross-socket bus-number field within that function.
const BUS_DISCOVERY_OFFSET: u64 = 0x108;

/// The resolved policy and resource table a connection's dispatcher loop
/// runs against, assembled once at connection start.
#[derive(Debug)]
pub struct ServiceContext {
    /// Allow-list for MSR requests.
    pub msr_allowed: MsrPolicyFn,
    /// Allow-list for PCI requests, if this host has PCI uncore.
    pub pci_allowed: Option<PciPolicyFn>,
    /// General-purpose PMC count reported by CPUID leaf `0x0A`, gating the
    /// `intel` policy tier's extra counter window.
    pub num_pmc_counters: u32,
    /// The populated resource table.
    pub resources: ResourceTable,
}

impl ServiceContext {
    /// Identifies the host, opens every MSR file, and (if applicable)
    /// discovers and probes the PCI uncore, using `pci_root` as the PCI
    /// filesystem root (overridable so tests never touch `/proc`).
    ///
    /// # Errors
    /// [`UnsupportedProcessor`] if the host's `(family, model)` has no
    /// known allow-list; this is the only fatal bootstrap condition.
    pub fn bootstrap(
        cpu: &dyn CpuIdentity,
        cpu_count: u32,
        pci_root: &Path,
    ) -> Result<Self, UnsupportedProcessor> {
        let host = identify(cpu)?;
        let (msr_allowed, pci_allowed) = select(host.microarch);
        let msr = ResourceTable::open_msr_files(cpu_count);

        let resources = match hwreg_topology::devices_for(host.microarch) {
            Some(devices) => {
                let socket_bus = discover_socket_bus(pci_root);
                let pci = ResourceTable::probe_pci_slots(pci_root, &socket_bus, devices);
                ResourceTable::new(msr, pci, socket_bus)
            }
            None => ResourceTable::without_pci(msr),
        };

        Ok(Self {
            msr_allowed,
            pci_allowed,
            num_pmc_counters: host.num_pmc_counters,
            resources,
        })
    }
}

/// Probes [`FIRST_PROBE_BUS`] to discover socket 0's real bus, then walks
/// the root-bus chain from there, reading each discovered bus's `05.0`
/// function to find the next socket's bus, until a read fails (no further
/// socket). Sockets beyond the last discovered one carry the `"N-A"`
/// sentinel, filled in up to [`MAX_SOCKETS`] so the PCI slot table always
/// has a fixed, bounded shape.
fn discover_socket_bus(pci_root: &Path) -> Vec<String> {
    let mut buses = Vec::with_capacity(MAX_SOCKETS);

    if let Some(mut bus) = read_next_bus(pci_root, FIRST_PROBE_BUS) {
        loop {
            if buses.len() >= MAX_SOCKETS {
                break;
            }
            buses.push(format!("{bus:02x}/"));
            match read_next_bus(pci_root, bus) {
                Some(next) => bus = next,
                None => break,
            }
        }
    }

    while buses.len() < MAX_SOCKETS {
        buses.push("N-A".to_string());
    }
    buses
}

fn read_next_bus(pci_root: &Path, bus: u8) -> Option<u8> {
    use std::os::unix::fs::FileExt;

    let path = bus_function_path(pci_root, bus);
    let file = std::fs::File::open(path).ok()?;
    let mut buf = [0u8; 4];
    file.read_at(&mut buf, BUS_DISCOVERY_OFFSET).ok()?;
    let cpubusno = u32::from_ne_bytes(buf);
    #[allow(clippy::cast_possible_truncation)]
    let next_bus = ((cpubusno >> 8) & 0xFF) as u8;
    // A bus chaining to itself or to the socket that led here would spin
    // forever; treat it as "no further socket" instead.
    (next_bus != bus && next_bus != 0).then_some(next_bus)
}

fn bus_function_path(pci_root: &Path, bus: u8) -> PathBuf {
    pci_root
        .join(format!("{bus:02x}"))
        .join(BUS_DISCOVERY_FUNCTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwreg_topology::FixedCpuId;
    use std::os::unix::fs::FileExt as _;

    fn seed_bus_function(pci_root: &Path, bus: u8, next_bus: u8) {
        let dir = pci_root.join(format!("{bus:02x}"));
        std::fs::create_dir_all(&dir).unwrap();
        let f = std::fs::File::create(dir.join(BUS_DISCOVERY_FUNCTION)).unwrap();
        f.write_at(
            &(u32::from(next_bus) << 8).to_ne_bytes(),
            BUS_DISCOVERY_OFFSET,
        )
        .unwrap();
    }

    #[test]
    fn no_probe_file_means_no_sockets_discovered() {
        let dir = tempfile::tempdir().unwrap();
        // No `00/05.0` file at all: socket 0's bus can't even be read.
        let buses = discover_socket_bus(dir.path());
        assert_eq!(buses[0], "N-A");
        assert_eq!(buses.len(), MAX_SOCKETS);
    }

    #[test]
    fn single_socket_host_has_only_the_sentinel_beyond_socket_zero() {
        let dir = tempfile::tempdir().unwrap();
        // `00/05.0` reports socket 0's own bus (0xff); no `ff/05.0` file at
        // all, so discovery stops after socket 0.
        seed_bus_function(dir.path(), 0x00, 0xff);

        let buses = discover_socket_bus(dir.path());
        assert_eq!(buses[0], "ff/");
        assert_eq!(buses[1], "N-A");
        assert_eq!(buses.len(), MAX_SOCKETS);
    }

    #[test]
    fn two_socket_host_chains_to_the_next_bus() {
        let dir = tempfile::tempdir().unwrap();
        seed_bus_function(dir.path(), 0x00, 0xff);
        seed_bus_function(dir.path(), 0xff, 0x7f);

        let buses = discover_socket_bus(dir.path());
        assert_eq!(buses[0], "ff/");
        assert_eq!(buses[1], "7f/");
        assert_eq!(buses[2], "N-A");
    }

    #[test]
    fn bootstrap_fails_fast_on_an_unsupported_processor() {
        let cpu = FixedCpuId::new();
        let dir = tempfile::tempdir().unwrap();
        let result = crate::bootstrap::ServiceContext::bootstrap(&cpu, 1, dir.path());
        assert!(result.is_err());
    }
}
