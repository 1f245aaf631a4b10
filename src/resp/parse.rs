//! Strict decimal-integer parsing shared by the RESP scanner (length
//! prefixes) and the `SELECT` argument handler.
//!
//! Grounded on `JasonkayZK-mini-redis/src/connection/frame.rs`'s
//! `get_decimal`, which calls `atoi::atoi::<u64>` directly. Reused here
//! verbatim for the digit-to-integer conversion, but gated behind an
//! explicit all-digits check first: `atoi` alone accepts a leading `-` or
//! `+` as part of ordinary integer parsing, and this proxy's wire format
//! only ever permits `-1` as the explicit bulk/array null sentinel, which
//! callers check for before falling back to this parser.

use crate::error::ProtocolError;

/// Parse a byte slice as `[0-9]+`. Rejects empty input, any sign, and any
/// embedded non-digit.
pub fn parse_decimal(bytes: &[u8]) -> Result<u64, ProtocolError> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::Parse(format!(
            "invalid integer `{}`",
            String::from_utf8_lossy(bytes)
        )));
    }

    atoi::atoi::<u64>(bytes).ok_or_else(|| ProtocolError::Parse("integer overflow".into()))
}
