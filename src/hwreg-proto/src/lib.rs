// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! Wire protocol for the hardware register access broker.
//!
//! The protocol is a single fixed-size record, exchanged verbatim (host byte
//! order, host alignment) over a connected stream socket: the client sends
//! one [`AccessDataRecord`] and reads back exactly one in response, every
//! time. [`AccessDataRecord::decode`] recovers the tagged [`Request`] view
//! the rest of the broker actually operates on; the raw struct only exists
//! at the socket boundary.

use thiserror::Error;

/// Sentinel value of the `device` field selecting the MSR resource class.
/// Any other value is an index into the per-microarchitecture PCI device
/// table.
pub const MSR_DEV: u32 = 0xFFFF_FFFF;

/// Raw `type` field values as they appear on the wire.
pub mod wire_type {
    /// Read a register.
    pub const READ: u32 = 0;
    /// Write a register.
    pub const WRITE: u32 = 1;
    /// Check whether a resource handle is available, without touching it.
    pub const CHECK: u32 = 2;
    /// Terminate the connection.
    pub const EXIT: u32 = 3;
}

/// The fixed-size wire message, identical in shape for request and
/// response.
///
/// `repr(C)` and plain-old-data so a whole record can be read or written in
/// one positioned I/O call without a serialization pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessDataRecord {
    /// Raw request type; one of the constants in [`wire_type`], or an
    /// unrecognized value (see [`Request::Unknown`]).
    pub kind: u32,
    /// Logical CPU id (MSR operations) or socket id (PCI operations).
    pub cpu: u32,
    /// MSR address or PCI-config byte offset.
    pub reg: u32,
    /// [`MSR_DEV`] for MSR operations, otherwise a PCI device-table index.
    pub device: u32,
    /// Write value on WRITE, read value on READ, zero otherwise.
    pub data: u64,
    /// Raw [`ErrorCode`] value.
    pub errorcode: u32,
}

/// The closed error taxonomy reported in [`AccessDataRecord::errorcode`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Operation succeeded.
    NoError = 0,
    /// Request `type` field held an unrecognized value.
    Unknown = 1,
    /// Policy denies this register for this microarchitecture.
    RestrictedRegister = 2,
    /// Resource handle unavailable for this CPU or PCI slot.
    NoDevice = 3,
    /// Lazy open of a PCI-config file failed.
    OpenFailed = 4,
    /// Positioned I/O returned a short count or a kernel error.
    ReadWriteFailed = 5,
    /// The external lock is held; all access refused.
    Locked = 6,
}

impl ErrorCode {
    /// Decodes a raw wire value, defaulting to [`ErrorCode::Unknown`] for
    /// anything not in the closed taxonomy (this only matters for
    /// defensively decoding records this broker did not itself produce,
    /// e.g. in tests).
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::NoError,
            2 => Self::RestrictedRegister,
            3 => Self::NoDevice,
            4 => Self::OpenFailed,
            5 => Self::ReadWriteFailed,
            6 => Self::Locked,
            _ => Self::Unknown,
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code as u32
    }
}

/// The resource a request addresses, with the wire's overloaded `cpu`/
/// `device` fields resolved into a real tagged variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A model-specific register on a logical CPU.
    Msr {
        /// Logical CPU id.
        cpu: u32,
    },
    /// An uncore performance-monitoring register in PCI configuration
    /// space.
    Pci {
        /// Socket id.
        socket: u32,
        /// Index into the per-microarchitecture PCI device table.
        slot: u32,
    },
}

/// A decoded client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Read a register.
    Read {
        /// Resource to read from.
        target: Target,
        /// Register number.
        reg: u32,
    },
    /// Write a register.
    Write {
        /// Resource to write to.
        target: Target,
        /// Register number.
        reg: u32,
        /// Value to write.
        data: u64,
    },
    /// Check whether a resource handle is available.
    Check {
        /// Resource to check.
        target: Target,
    },
    /// Terminate the connection.
    Exit,
    /// Request `type` field held a value outside `{READ, WRITE, CHECK,
    /// EXIT}`. Carries the raw value for logging.
    Unknown(u32),
}

/// Framing-level failure: the transport did not deliver a whole record.
///
/// This is distinct from [`ErrorCode`], which lives entirely inside a
/// successfully-framed record; a [`FramingError`] means there was no record
/// to put an error code in.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The peer closed the connection (a zero-length read). Per this
    /// broker's resolution of the wire's EOF-vs-EXIT ambiguity, this is
    /// always a clean termination, never an error to report to the client.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// A read or write returned fewer bytes than `size_of::<AccessDataRecord>()`,
    /// other than a clean zero-length read.
    #[error("short {0} of {1} of {2} expected bytes")]
    ShortIo(&'static str, usize, usize),
}

impl AccessDataRecord {
    /// Size of the record on the wire, in bytes.
    pub const WIRE_SIZE: usize = std::mem::size_of::<AccessDataRecord>();

    /// Packs this record into its wire representation (host byte order,
    /// host alignment's padding bytes left zeroed).
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..4].copy_from_slice(&self.kind.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.cpu.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.reg.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.device.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.data.to_ne_bytes());
        buf[24..28].copy_from_slice(&self.errorcode.to_ne_bytes());
        buf
    }

    /// Unpacks a record from its wire representation.
    #[must_use]
    pub fn from_bytes(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        Self {
            kind: u32::from_ne_bytes(buf[0..4].try_into().unwrap()),
            cpu: u32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            reg: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            device: u32::from_ne_bytes(buf[12..16].try_into().unwrap()),
            data: u64::from_ne_bytes(buf[16..24].try_into().unwrap()),
            errorcode: u32::from_ne_bytes(buf[24..28].try_into().unwrap()),
        }
    }

    /// Builds a request record.
    #[must_use]
    pub fn request(kind: u32, cpu: u32, reg: u32, device: u32, data: u64) -> Self {
        Self {
            kind,
            cpu,
            reg,
            device,
            data,
            errorcode: ErrorCode::NoError.into(),
        }
    }

    /// Decodes the tagged [`Request`] this record represents.
    #[must_use]
    pub fn decode(&self) -> Request {
        let target = if self.device == MSR_DEV {
            Target::Msr { cpu: self.cpu }
        } else {
            Target::Pci {
                socket: self.cpu,
                slot: self.device,
            }
        };
        match self.kind {
            wire_type::READ => Request::Read {
                target,
                reg: self.reg,
            },
            wire_type::WRITE => Request::Write {
                target,
                reg: self.reg,
                data: self.data,
            },
            wire_type::CHECK => Request::Check { target },
            wire_type::EXIT => Request::Exit,
            other => Request::Unknown(other),
        }
    }

    /// Builds the response record for this request: the `kind`/`cpu`/`reg`/
    /// `device` fields are echoed, `data` and `errorcode` are set fresh.
    ///
    /// Per the wire contract, a WRITE response's `data` is always zero and
    /// any error response's `data` is always zero; callers pass `0` in
    /// both cases.
    #[must_use]
    pub fn respond(&self, data: u64, errorcode: ErrorCode) -> Self {
        Self {
            kind: self.kind,
            cpu: self.cpu,
            reg: self.reg,
            device: self.device,
            data,
            errorcode: errorcode.into(),
        }
    }
}
