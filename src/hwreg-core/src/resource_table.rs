// SPDX-License-Identifier: Apache-2.0

//! The lazily-populated mapping from logical resource ids to open file
//! handles: one entry per logical CPU for MSRs, one entry per
//! `(socket, slot)` pair for uncore PCI devices.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use hwreg_topology::PciDevice;

/// State of one logical CPU's MSR device file.
#[derive(Debug)]
pub enum MsrSlot {
    /// No open attempt has been made for this CPU (out-of-range request).
    Unopened,
    /// Opened successfully at bootstrap.
    Open(File),
    /// Opened attempted at bootstrap and failed; never retried.
    Failed,
}

/// State of one `(socket, slot)` uncore PCI device file.
#[derive(Debug)]
pub enum PciSlot {
    /// This slot does not exist on this host's PCI device table, or the
    /// socket itself was never discovered.
    Unavailable,
    /// Probed successfully at bootstrap; not yet opened for I/O.
    ReadyNotOpen {
        /// Full path to the PCI-config file, computed once at probe time.
        path: std::path::PathBuf,
    },
    /// Opened on first use.
    Open(File),
}

/// Failure performing positioned I/O against an already-open resource.
#[derive(Debug, thiserror::Error)]
#[error("short {0} at offset {1:#x}: got {2} of {3} expected bytes")]
pub struct ShortIo(pub &'static str, pub u64, pub usize, pub usize);

/// Failure lazily opening a PCI-config file.
#[derive(Debug, thiserror::Error)]
#[error("failed to open {path}: {source}")]
pub struct PciOpenError {
    path: std::path::PathBuf,
    #[source]
    source: std::io::Error,
}

/// Everything that can go wrong performing PCI-config I/O through the
/// resource table: either the lazy open failed, or the positioned I/O
/// itself came up short.
#[derive(Debug, thiserror::Error)]
pub enum PciIoError {
    /// The slot was `READY_NOT_OPEN` and the lazy open failed.
    #[error(transparent)]
    Open(#[from] PciOpenError),
    /// The slot was open but the read/write did not complete.
    #[error(transparent)]
    Io(#[from] ShortIo),
}

/// The full resource table for one service process.
///
/// Immutable in composition once built: no entries are added or removed
/// after bootstrap, only their open/closed state changes.
#[derive(Debug)]
pub struct ResourceTable {
    msr: Vec<MsrSlot>,
    pci: Vec<Vec<PciSlot>>,
    socket_bus: Vec<String>,
}

const SENTINEL_BUS: &str = "N-A";

impl ResourceTable {
    /// Opens `/dev/cpu/<id>/msr` (falling back to `/dev/msr<id>`) for every
    /// `id` in `0..cpu_count`. Per-CPU open failures are recorded, not
    /// propagated: they degrade that CPU's slot to `NODEV` at request time.
    #[must_use]
    pub fn open_msr_files(cpu_count: u32) -> Vec<MsrSlot> {
        (0..cpu_count)
            .map(|cpu| {
                let primary = format!("/dev/cpu/{cpu}/msr");
                let fallback = format!("/dev/msr{cpu}");
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&primary)
                    .or_else(|_| OpenOptions::new().read(true).write(true).open(&fallback))
                    .map_or(MsrSlot::Failed, MsrSlot::Open)
            })
            .collect()
    }

    /// Builds a resource table from already-opened MSR slots and a
    /// discovered socket/PCI layout. Used by [`crate::bootstrap`] once
    /// topology discovery has run.
    #[must_use]
    pub fn new(msr: Vec<MsrSlot>, pci: Vec<Vec<PciSlot>>, socket_bus: Vec<String>) -> Self {
        Self { msr, pci, socket_bus }
    }

    /// A table with no PCI uncore at all — used for microarchitectures
    /// that never expose one.
    #[must_use]
    pub fn without_pci(msr: Vec<MsrSlot>) -> Self {
        Self {
            msr,
            pci: Vec::new(),
            socket_bus: Vec::new(),
        }
    }

    /// Builds the per-socket PCI slot table from a device list and the
    /// discovered bus prefixes, probing each slot's file for existence.
    ///
    /// A slot probes `READY_NOT_OPEN` when `<pci_root><bus><path_suffix>`
    /// exists; otherwise it is `UNAVAILABLE`.
    #[must_use]
    pub fn probe_pci_slots(
        pci_root: &Path,
        socket_bus: &[String],
        devices: &[PciDevice],
    ) -> Vec<Vec<PciSlot>> {
        socket_bus
            .iter()
            .map(|bus| {
                if bus == SENTINEL_BUS {
                    return devices.iter().map(|_| PciSlot::Unavailable).collect();
                }
                devices
                    .iter()
                    .map(|device| {
                        let path = pci_root.join(bus).join(device.path_suffix);
                        if path.exists() {
                            PciSlot::ReadyNotOpen { path }
                        } else {
                            PciSlot::Unavailable
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// The MSR slot for `cpu`, or [`MsrSlot::Unopened`] if out of range.
    #[must_use]
    pub fn msr_slot(&self, cpu: u32) -> &MsrSlot {
        self.msr.get(cpu as usize).unwrap_or(&MsrSlot::Unopened)
    }

    /// The PCI slot for `(socket, slot)`, or [`PciSlot::Unavailable`] if out
    /// of range.
    #[must_use]
    pub fn pci_slot(&self, socket: u32, slot: u32) -> &PciSlot {
        self.pci
            .get(socket as usize)
            .and_then(|row| row.get(slot as usize))
            .unwrap_or(&PciSlot::Unavailable)
    }

    /// Reads 8 bytes at `reg` from the MSR file for `cpu`.
    ///
    /// # Errors
    /// [`ShortIo`] if the CPU has no open MSR handle, or the read returned
    /// fewer than 8 bytes.
    #[tracing::instrument(level = "debug", ret(skip), skip(self))]
    pub fn read_msr(&self, cpu: u32, reg: u32) -> Result<u64, ShortIo> {
        let MsrSlot::Open(file) = self.msr_slot(cpu) else {
            return Err(ShortIo("read", u64::from(reg), 0, 8));
        };
        let mut buf = [0u8; 8];
        file.read_at(&mut buf, u64::from(reg))
            .map_err(|_| ShortIo("read", u64::from(reg), 0, 8))?;
        Ok(u64::from_ne_bytes(buf))
    }

    /// Writes 8 bytes at `reg` to the MSR file for `cpu`.
    ///
    /// # Errors
    /// [`ShortIo`] if the CPU has no open MSR handle, or the write did not
    /// complete.
    #[tracing::instrument(level = "debug", ret(skip), skip(self, value))]
    pub fn write_msr(&self, cpu: u32, reg: u32, value: u64) -> Result<(), ShortIo> {
        let MsrSlot::Open(file) = self.msr_slot(cpu) else {
            return Err(ShortIo("write", u64::from(reg), 0, 8));
        };
        file.write_at(&value.to_ne_bytes(), u64::from(reg))
            .map_err(|_| ShortIo("write", u64::from(reg), 0, 8))?;
        Ok(())
    }

    /// Opens (if not already open) and reads 4 bytes at `reg` from the PCI
    /// slot `(socket, slot)`.
    ///
    /// # Errors
    /// [`PciIoError::Open`] if the slot was `READY_NOT_OPEN` and the lazy
    /// open failed; [`PciIoError::Io`] if the read itself came up short.
    #[tracing::instrument(level = "debug", ret(skip), skip(self))]
    pub fn read_pci(&mut self, socket: u32, slot: u32, reg: u32) -> Result<u32, PciIoError> {
        let file = self.ensure_pci_open(socket, slot)?;
        let mut buf = [0u8; 4];
        file.read_at(&mut buf, u64::from(reg))
            .map_err(|_| ShortIo("read", u64::from(reg), 0, 4))?;
        Ok(u32::from_ne_bytes(buf))
    }

    /// Opens (if not already open) and writes 4 bytes at `reg` to the PCI
    /// slot `(socket, slot)`.
    ///
    /// # Errors
    /// See [`Self::read_pci`].
    #[tracing::instrument(level = "debug", ret(skip), skip(self, value))]
    pub fn write_pci(
        &mut self,
        socket: u32,
        slot: u32,
        reg: u32,
        value: u32,
    ) -> Result<(), PciIoError> {
        let file = self.ensure_pci_open(socket, slot)?;
        file.write_at(&value.to_ne_bytes(), u64::from(reg))
            .map_err(|_| ShortIo("write", u64::from(reg), 0, 4))?;
        Ok(())
    }

    fn ensure_pci_open(&mut self, socket: u32, slot: u32) -> Result<&File, PciOpenError> {
        let entry = self
            .pci
            .get_mut(socket as usize)
            .and_then(|row| row.get_mut(slot as usize));
        let Some(entry) = entry else {
            // Unreachable in practice: callers check `pci_slot` for
            // `Unavailable` before calling this, but degrade gracefully.
            return Err(PciOpenError {
                path: std::path::PathBuf::new(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        };
        if let PciSlot::ReadyNotOpen { path } = entry {
            let path = path.clone();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|source| PciOpenError {
                    path: path.clone(),
                    source,
                })?;
            *entry = PciSlot::Open(file);
        }
        match entry {
            PciSlot::Open(file) => Ok(file),
            PciSlot::Unavailable | PciSlot::ReadyNotOpen { .. } => unreachable!(
                "ensure_pci_open always leaves the entry Open when it returns Ok"
            ),
        }
    }

    /// The short ASCII bus prefix for `socket`, or the `"N-A"` sentinel.
    #[must_use]
    pub fn socket_bus(&self, socket: u32) -> &str {
        self.socket_bus
            .get(socket as usize)
            .map_or(SENTINEL_BUS, String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unopened_cpu_reports_as_unopened() {
        let table = ResourceTable::without_pci(Vec::new());
        assert!(matches!(table.msr_slot(0), MsrSlot::Unopened));
    }

    #[test]
    fn msr_read_fails_cleanly_without_an_open_handle() {
        let table = ResourceTable::without_pci(vec![MsrSlot::Failed]);
        assert!(table.read_msr(0, 0x0C1).is_err());
    }

    #[test]
    fn msr_round_trips_through_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msr0");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&[0u8; 4096]).unwrap();
        }
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let table = ResourceTable::without_pci(vec![MsrSlot::Open(file)]);
        table.write_msr(0, 0x10, 0xDEAD_BEEF).unwrap();
        assert_eq!(table.read_msr(0, 0x10).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn pci_slot_transitions_from_ready_not_open_to_open_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("00.0");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 256])
            .unwrap();
        let mut table = ResourceTable::new(
            Vec::new(),
            vec![vec![PciSlot::ReadyNotOpen { path }]],
            vec!["ff/".to_string()],
        );
        assert!(matches!(
            table.pci_slot(0, 0),
            PciSlot::ReadyNotOpen { .. }
        ));
        table.write_pci(0, 0, 0x10, 7).unwrap();
        assert!(matches!(table.pci_slot(0, 0), PciSlot::Open(_)));
        assert_eq!(table.read_pci(0, 0, 0x10).unwrap(), 7);
    }

    #[test]
    fn pci_open_failure_does_not_panic_and_leaves_the_slot_retryable() {
        let mut table = ResourceTable::new(
            Vec::new(),
            vec![vec![PciSlot::ReadyNotOpen {
                path: std::path::PathBuf::from("/nonexistent/bus/dev.fn"),
            }]],
            vec!["ff/".to_string()],
        );
        assert!(table.read_pci(0, 0, 0x10).is_err());
    }

    #[test]
    fn out_of_range_socket_bus_is_the_sentinel() {
        let table = ResourceTable::without_pci(Vec::new());
        assert_eq!(table.socket_bus(3), "N-A");
    }
}
