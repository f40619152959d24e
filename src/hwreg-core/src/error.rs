// SPDX-License-Identifier: Apache-2.0

//! Internal (process) error types: failures that cannot be represented in
//! the wire [`hwreg_proto::ErrorCode`] because there is no request in
//! flight to attach them to, or because they are fatal to the connection.

use hwreg_topology::UnsupportedProcessor;

/// Everything that can end a service process outside the normal
/// request/response flow: a fatal bootstrap condition, or a fatal framing
/// failure on the client channel.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The host's microarchitecture has no known allow-list.
    #[error(transparent)]
    Bootstrap(#[from] UnsupportedProcessor),
    /// The client channel closed mid-record, or a read/write returned an
    /// error; either way this connection cannot continue.
    #[error("client channel framing failure: {0}")]
    Framing(#[from] hwreg_proto::FramingError),
    /// Writing the response record back to the client failed.
    #[error("failed to write response: {0}")]
    ResponseWrite(#[source] std::io::Error),
}
