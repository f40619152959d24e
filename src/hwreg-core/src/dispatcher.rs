// SPDX-License-Identifier: Apache-2.0

//! Turns one decoded [`Request`] into one outgoing [`AccessDataRecord`],
//! consulting the external lock and the resource table exactly as often as
//! the protocol requires and no more.

use hwreg_policy::PciDeviceKind;
use hwreg_proto::{AccessDataRecord, ErrorCode, Request, Target};
use tracing::{instrument, warn};

use crate::bootstrap::ServiceContext;
use crate::lock::LockCheck;
use crate::resource_table::{MsrSlot, PciIoError, PciSlot};

/// The device kind backing a PCI slot, resolved for logging and policy
/// checks. The resource table only knows paths and open state; the kind
/// comes from the topology device table, so the dispatcher is the layer
/// that joins the two.
pub trait PciKindLookup {
    /// The device kind at `(socket, slot)`, if that slot exists at all.
    fn kind(&self, socket: u32, slot: u32) -> Option<PciDeviceKind>;
}

/// [`PciKindLookup`] backed by a microarchitecture's static PCI device
/// table; `slot` indexes directly into it, matching the wire's `device`
/// field semantics for PCI requests.
#[derive(Debug, Clone, Copy)]
pub struct TopologyPciKinds<'a> {
    devices: &'a [hwreg_topology::PciDevice],
}

impl<'a> TopologyPciKinds<'a> {
    /// Wraps a microarchitecture's PCI device table.
    #[must_use]
    pub fn new(devices: &'a [hwreg_topology::PciDevice]) -> Self {
        Self { devices }
    }
}

impl PciKindLookup for TopologyPciKinds<'_> {
    fn kind(&self, _socket: u32, slot: u32) -> Option<PciDeviceKind> {
        self.devices.get(slot as usize).map(|d| d.kind)
    }
}

/// What the dispatcher should do after handling one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep serving; write `response` back to the client.
    Respond,
    /// The client asked to end the connection; no response is required.
    Exit,
}

/// Handles one decoded request against `ctx`, consulting `lock` first for
/// anything other than `CHECK`.
///
/// Returns the response record to write back (ignored on [`Outcome::Exit`])
/// and whether the connection should continue.
#[instrument(level = "debug", ret(skip), skip(ctx, lock, kinds, record))]
pub fn handle(
    ctx: &mut ServiceContext,
    lock: &dyn LockCheck,
    kinds: &dyn PciKindLookup,
    record: AccessDataRecord,
) -> (AccessDataRecord, Outcome) {
    let request = record.decode();

    if matches!(
        request,
        Request::Read { .. } | Request::Write { .. }
    ) && lock.is_locked()
    {
        return (record.respond(0, ErrorCode::Locked), Outcome::Respond);
    }

    match request {
        Request::Read { target, reg } => (read(ctx, kinds, &record, target, reg), Outcome::Respond),
        Request::Write { target, reg, data } => {
            (write(ctx, kinds, &record, target, reg, data), Outcome::Respond)
        }
        Request::Check { target } => (check(ctx, &record, target), Outcome::Respond),
        Request::Exit => (record, Outcome::Exit),
        Request::Unknown(raw) => {
            warn!(kind = raw, "unrecognized request type");
            (record.respond(0, ErrorCode::Unknown), Outcome::Respond)
        }
    }
}

#[instrument(level = "debug", ret(skip), skip(ctx, kinds, record))]
fn read(
    ctx: &mut ServiceContext,
    kinds: &dyn PciKindLookup,
    record: &AccessDataRecord,
    target: Target,
    reg: u32,
) -> AccessDataRecord {
    match target {
        Target::Msr { cpu } => match msr_gate(ctx, cpu, reg) {
            Err(code) => record.respond(0, code),
            Ok(()) => match ctx.resources.read_msr(cpu, reg) {
                Ok(value) => record.respond(value, ErrorCode::NoError),
                Err(err) => {
                    warn!(cpu, reg, error = %err, "msr read failed");
                    record.respond(0, ErrorCode::ReadWriteFailed)
                }
            },
        },
        Target::Pci { socket, slot } => {
            match pci_gate(ctx, kinds, socket, slot, reg) {
                Err(code) => record.respond(0, code),
                Ok(()) => match ctx.resources.read_pci(socket, slot, reg) {
                    Ok(value) => record.respond(u64::from(value), ErrorCode::NoError),
                    Err(err) => {
                        warn!(socket, slot, reg, error = %err, "pci read failed");
                        record.respond(0, pci_error_code(&err))
                    }
                },
            }
        }
    }
}

#[instrument(level = "debug", ret(skip), skip(ctx, kinds, record, data))]
fn write(
    ctx: &mut ServiceContext,
    kinds: &dyn PciKindLookup,
    record: &AccessDataRecord,
    target: Target,
    reg: u32,
    data: u64,
) -> AccessDataRecord {
    match target {
        Target::Msr { cpu } => match msr_gate(ctx, cpu, reg) {
            Err(code) => record.respond(0, code),
            Ok(()) => match ctx.resources.write_msr(cpu, reg, data) {
                Ok(()) => record.respond(0, ErrorCode::NoError),
                Err(err) => {
                    warn!(cpu, reg, error = %err, "msr write failed");
                    record.respond(0, ErrorCode::ReadWriteFailed)
                }
            },
        },
        Target::Pci { socket, slot } => {
            match pci_gate(ctx, kinds, socket, slot, reg) {
                Err(code) => record.respond(0, code),
                Ok(()) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let narrow = data as u32;
                    match ctx.resources.write_pci(socket, slot, reg, narrow) {
                        Ok(()) => record.respond(0, ErrorCode::NoError),
                        Err(err) => {
                            warn!(socket, slot, reg, error = %err, "pci write failed");
                            record.respond(0, pci_error_code(&err))
                        }
                    }
                }
            }
        }
    }
}

#[instrument(level = "debug", ret(skip), skip(ctx, record))]
fn check(ctx: &ServiceContext, record: &AccessDataRecord, target: Target) -> AccessDataRecord {
    let available = match target {
        Target::Msr { cpu } => matches!(ctx.resources.msr_slot(cpu), MsrSlot::Open(_)),
        Target::Pci { socket, slot } => {
            !matches!(ctx.resources.pci_slot(socket, slot), PciSlot::Unavailable)
        }
    };
    if available {
        record.respond(0, ErrorCode::NoError)
    } else {
        record.respond(0, ErrorCode::NoDevice)
    }
}

/// Rejects an MSR access before any I/O: `NODEV` if the handle never
/// opened, `RESTREG` if policy denies the register.
#[instrument(level = "debug", ret(skip), skip(ctx))]
fn msr_gate(ctx: &ServiceContext, cpu: u32, reg: u32) -> Result<(), ErrorCode> {
    if !matches!(ctx.resources.msr_slot(cpu), MsrSlot::Open(_)) {
        return Err(ErrorCode::NoDevice);
    }
    if !(ctx.msr_allowed)(reg, ctx.num_pmc_counters) {
        warn!(cpu, reg, "msr access denied by policy");
        return Err(ErrorCode::RestrictedRegister);
    }
    Ok(())
}

/// Rejects a PCI access before any I/O: `NODEV` if the slot doesn't exist,
/// `RESTREG` if a PCI policy exists and denies it.
#[instrument(level = "debug", ret(skip), skip(ctx, kinds))]
fn pci_gate(
    ctx: &ServiceContext,
    kinds: &dyn PciKindLookup,
    socket: u32,
    slot: u32,
    reg: u32,
) -> Result<(), ErrorCode> {
    if matches!(ctx.resources.pci_slot(socket, slot), PciSlot::Unavailable) {
        return Err(ErrorCode::NoDevice);
    }
    if let Some(pci_allowed) = ctx.pci_allowed {
        let Some(kind) = kinds.kind(socket, slot) else {
            return Err(ErrorCode::NoDevice);
        };
        if !pci_allowed(kind, reg) {
            warn!(socket, slot, reg, "pci access denied by policy");
            return Err(ErrorCode::RestrictedRegister);
        }
    }
    Ok(())
}

fn pci_error_code(err: &PciIoError) -> ErrorCode {
    match err {
        PciIoError::Open(_) => ErrorCode::OpenFailed,
        PciIoError::Io(_) => ErrorCode::ReadWriteFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwreg_proto::{wire_type, MSR_DEV};
    use std::path::PathBuf;

    struct NoLock;
    impl LockCheck for NoLock {
        fn is_locked(&self) -> bool {
            false
        }
    }

    struct AlwaysLocked;
    impl LockCheck for AlwaysLocked {
        fn is_locked(&self) -> bool {
            true
        }
    }

    struct NoKinds;
    impl PciKindLookup for NoKinds {
        fn kind(&self, _socket: u32, _slot: u32) -> Option<PciDeviceKind> {
            None
        }
    }

    fn ctx_with_msr(file: std::fs::File) -> ServiceContext {
        ServiceContext {
            msr_allowed: hwreg_policy::allowed_sandybridge,
            pci_allowed: None,
            num_pmc_counters: 8,
            resources: crate::resource_table::ResourceTable::without_pci(vec![
                crate::resource_table::MsrSlot::Open(file),
            ]),
        }
    }

    fn scratch_msr_file() -> std::fs::File {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("msr0");
        std::fs::File::create(&path).unwrap();
        std::mem::forget(dir);
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap()
    }

    #[test]
    fn locked_refuses_read_without_touching_resources() {
        let mut ctx = ctx_with_msr(scratch_msr_file());
        let record = AccessDataRecord::request(wire_type::READ, 0, 0x0C1, MSR_DEV, 0);
        let (resp, outcome) = handle(&mut ctx, &AlwaysLocked, &NoKinds, record);
        assert_eq!(outcome, Outcome::Respond);
        assert_eq!(ErrorCode::from_raw(resp.errorcode), ErrorCode::Locked);
    }

    #[test]
    fn restricted_register_is_denied_before_any_io() {
        let mut ctx = ctx_with_msr(scratch_msr_file());
        let record = AccessDataRecord::request(wire_type::READ, 0, 0x1A1, MSR_DEV, 0);
        let (resp, _) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(
            ErrorCode::from_raw(resp.errorcode),
            ErrorCode::RestrictedRegister
        );
        assert_eq!(resp.data, 0);
    }

    #[test]
    fn write_response_never_echoes_the_written_value() {
        let mut ctx = ctx_with_msr(scratch_msr_file());
        let record = AccessDataRecord::request(wire_type::WRITE, 0, 0x0C1, MSR_DEV, 0xCAFE);
        let (resp, _) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(ErrorCode::from_raw(resp.errorcode), ErrorCode::NoError);
        assert_eq!(resp.data, 0);
    }

    #[test]
    fn num_pmc_counters_from_context_gates_the_extra_pmc_window() {
        let mut ctx = ctx_with_msr(scratch_msr_file());
        ctx.num_pmc_counters = 4;
        let record = AccessDataRecord::request(wire_type::READ, 0, 0x195, MSR_DEV, 0);
        let (resp, _) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(
            ErrorCode::from_raw(resp.errorcode),
            ErrorCode::RestrictedRegister
        );

        let mut ctx = ctx_with_msr(scratch_msr_file());
        ctx.num_pmc_counters = 8;
        let record = AccessDataRecord::request(wire_type::READ, 0, 0x195, MSR_DEV, 0);
        let (resp, _) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(ErrorCode::from_raw(resp.errorcode), ErrorCode::NoError);
    }

    #[test]
    fn check_reports_nodev_for_an_unopened_cpu_without_touching_it() {
        let mut ctx = ServiceContext {
            msr_allowed: hwreg_policy::allowed_sandybridge,
            pci_allowed: None,
            num_pmc_counters: 8,
            resources: crate::resource_table::ResourceTable::without_pci(Vec::new()),
        };
        let record = AccessDataRecord::request(wire_type::CHECK, 0, 0, MSR_DEV, 0);
        let (resp, _) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(ErrorCode::from_raw(resp.errorcode), ErrorCode::NoDevice);
    }

    #[test]
    fn exit_requires_no_response_processing() {
        let mut ctx = ctx_with_msr(scratch_msr_file());
        let record = AccessDataRecord::request(wire_type::EXIT, 0, 0, MSR_DEV, 0);
        let (_, outcome) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(outcome, Outcome::Exit);
    }

    #[test]
    fn unknown_type_reports_unknown_and_changes_nothing() {
        let mut ctx = ctx_with_msr(scratch_msr_file());
        let record = AccessDataRecord::request(99, 0, 0, MSR_DEV, 0);
        let (resp, outcome) = handle(&mut ctx, &NoLock, &NoKinds, record);
        assert_eq!(outcome, Outcome::Respond);
        assert_eq!(ErrorCode::from_raw(resp.errorcode), ErrorCode::Unknown);
    }
}
