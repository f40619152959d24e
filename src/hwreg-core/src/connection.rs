// SPDX-License-Identifier: Apache-2.0

//! Frames [`AccessDataRecord`]s on and off a byte stream and drives one
//! connection's request/response loop to completion.

use std::io::{ErrorKind, Read, Write};

use hwreg_proto::{AccessDataRecord, FramingError};
use tracing::{error, instrument};

use crate::bootstrap::ServiceContext;
use crate::dispatcher::{self, Outcome, PciKindLookup};
use crate::error::ServiceError;
use crate::lock::LockCheck;

/// Reads exactly one [`AccessDataRecord`] from `stream`.
///
/// A zero-length read is reported as [`FramingError::ConnectionClosed`]:
/// per this broker's resolution of the wire's EOF-vs-EXIT ambiguity, that
/// is always a clean termination, never an error to surface further up.
pub fn read_record(stream: &mut impl Read) -> Result<AccessDataRecord, FramingError> {
    let mut buf = [0u8; AccessDataRecord::WIRE_SIZE];
    let mut read_total = 0;
    while read_total < buf.len() {
        match stream.read(&mut buf[read_total..]) {
            Ok(0) if read_total == 0 => return Err(FramingError::ConnectionClosed),
            Ok(0) => {
                return Err(FramingError::ShortIo("read", read_total, buf.len()));
            }
            Ok(n) => read_total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return Err(FramingError::ShortIo("read", read_total, buf.len())),
        }
    }
    Ok(AccessDataRecord::from_bytes(&buf))
}

/// Writes exactly one [`AccessDataRecord`] to `stream`.
pub fn write_record(stream: &mut impl Write, record: &AccessDataRecord) -> std::io::Result<()> {
    stream.write_all(&record.to_bytes())
}

/// Serves one connection to completion: read, dispatch, respond, repeat,
/// until `EXIT`, a clean disconnect, or a fatal framing failure.
#[instrument(level = "debug", skip_all)]
pub fn serve(
    stream: &mut (impl Read + Write),
    ctx: &mut ServiceContext,
    lock: &dyn LockCheck,
    kinds: &dyn PciKindLookup,
) -> Result<(), ServiceError> {
    loop {
        let record = match read_record(stream) {
            Ok(record) => record,
            Err(FramingError::ConnectionClosed) => return Ok(()),
            Err(err) => {
                error!(error = %err, "fatal framing failure reading request");
                return Err(err.into());
            }
        };

        let (response, outcome) = dispatcher::handle(ctx, lock, kinds, record);

        if outcome == Outcome::Exit {
            return Ok(());
        }

        write_record(stream, &response).map_err(ServiceError::ResponseWrite)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwreg_proto::{wire_type, MSR_DEV};
    use std::io::Cursor;

    #[test]
    fn zero_length_read_is_a_clean_close() {
        let mut stream = Cursor::new(Vec::<u8>::new());
        assert_eq!(read_record(&mut stream), Err(FramingError::ConnectionClosed));
    }

    #[test]
    fn short_nonzero_read_is_a_framing_error() {
        let mut stream = Cursor::new(vec![0u8; 4]);
        assert!(matches!(
            read_record(&mut stream),
            Err(FramingError::ShortIo("read", 4, _))
        ));
    }

    #[test]
    fn round_trips_a_record_through_a_byte_buffer() {
        let record = AccessDataRecord::request(wire_type::READ, 1, 0x0C1, MSR_DEV, 0);
        let mut buf = Vec::new();
        write_record(&mut buf, &record).unwrap();
        assert_eq!(buf.len(), AccessDataRecord::WIRE_SIZE);
        let mut cursor = Cursor::new(buf);
        let decoded = read_record(&mut cursor).unwrap();
        assert_eq!(decoded, record);
    }
}
