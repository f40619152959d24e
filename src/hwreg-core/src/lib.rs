// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! Resource mediation, topology bootstrap, and request dispatch: the
//! per-connection heart of the hardware register access broker, built
//! once the host's microarchitecture is known and torn down when the
//! connection ends.

mod bootstrap;
mod connection;
mod dispatcher;
mod error;
mod lock;
mod resource_table;

pub use bootstrap::{ServiceContext, DEFAULT_PCI_ROOT};
pub use connection::{read_record, serve, write_record};
pub use dispatcher::{handle, Outcome, PciKindLookup, TopologyPciKinds};
pub use error::ServiceError;
pub use lock::{LockCheck, LockFile};
pub use resource_table::{MsrSlot, PciIoError, PciOpenError, PciSlot, ResourceTable, ShortIo};
