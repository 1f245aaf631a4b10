//! Scans a complete RESP multi-bulk command out of a byte buffer, keeping
//! the verbatim span so it can be forwarded upstream unchanged.
//!
//! Grounded on `JasonkayZK-mini-redis/src/connection/frame.rs`'s
//! `Frame::check`/`Frame::parse` cursor idiom (`get_u8`/`peek_u8`/
//! `get_line`/`skip`), specialized to the one shape a client command ever
//! takes: a top-level array whose elements are all bulk strings (spec
//! section 4.1). Inline commands are not accepted; every command must be
//! framed as a multi-bulk array.

use std::io::Cursor;
use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::resp::parse::parse_decimal;

/// A complete, parsed client command.
///
/// `bytes` is the verbatim RESP array, forwarded upstream unchanged; `name`
/// and `first_arg` are zero-copy views into it (cheap `Bytes` clones, not
/// allocations) used by the classifier and router.
#[derive(Debug, Clone)]
pub struct CommandFrame {
    bytes: Bytes,
    name_lower: String,
    argc: usize,
    first_arg: Option<Bytes>,
}

impl CommandFrame {
    /// The full verbatim RESP array, to write upstream as-is.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The command name, lowercased, e.g. `"get"`, `"multi"`.
    pub fn name(&self) -> &str {
        &self.name_lower
    }

    /// Number of elements in the command array, including the name itself.
    pub fn argc(&self) -> usize {
        self.argc
    }

    /// The first argument after the command name, if any (the "key" for
    /// commands that have one).
    pub fn first_arg(&self) -> Option<&Bytes> {
        self.first_arg.as_ref()
    }
}

struct Spans {
    total_len: usize,
    name: Range<usize>,
    first_arg: Option<Range<usize>>,
    argc: usize,
}

/// Try to scan one complete command out of `buf`.
///
/// Returns `Ok(None)` when `buf` doesn't yet contain a whole command (the
/// caller should read more bytes and retry). On success, the consumed bytes
/// are split off the front of `buf` via `BytesMut::split_to`, so the buffer
/// acts as the ring buffer the spec's design notes recommend: bytes are
/// released as soon as a complete frame has been taken out.
pub fn scan(buf: &mut BytesMut) -> Result<Option<CommandFrame>, ProtocolError> {
    let spans = {
        let mut cursor = Cursor::new(&buf[..]);
        match check(&mut cursor) {
            Ok(spans) => spans,
            Err(ProtocolError::Incomplete) => return Ok(None),
            Err(e) => return Err(e),
        }
    };

    let owned = buf.split_to(spans.total_len).freeze();
    let name_lower = std::str::from_utf8(&owned[spans.name.clone()])
        .map_err(|_| ProtocolError::Parse("command name is not valid UTF-8".into()))?
        .to_ascii_lowercase();
    let first_arg = spans.first_arg.map(|range| owned.slice(range));

    Ok(Some(CommandFrame {
        bytes: owned,
        name_lower,
        argc: spans.argc,
        first_arg,
    }))
}

/// Validate a command array is fully present in `src` and record the byte
/// ranges of its name and first argument. Does not consume/mutate the
/// backing buffer; only advances the cursor used for validation.
fn check(src: &mut Cursor<&[u8]>) -> Result<Spans, ProtocolError> {
    let start = src.position() as usize;

    match get_u8(src)? {
        b'*' => {}
        other => {
            return Err(ProtocolError::Parse(format!(
                "expected array, got `{}`; inline commands are not supported",
                other as char
            )))
        }
    }

    let count = get_decimal(src)?;
    if count == 0 {
        return Err(ProtocolError::Parse("empty command array".into()));
    }

    let mut name: Option<Range<usize>> = None;
    let mut first_arg: Option<Range<usize>> = None;

    for i in 0..count {
        let element = get_bulk_string_span(src)?;
        if i == 0 {
            name = Some(element);
        } else if i == 1 {
            first_arg = Some(element);
        }
    }

    let end = src.position() as usize;

    Ok(Spans {
        total_len: end - start,
        name: name.expect("count >= 1 guarantees one element was read"),
        first_arg,
        argc: count as usize,
    })
}

/// Read one `$<len>\r\n<bytes>\r\n` element and return its payload's byte
/// range. Fails if the element is not a bulk string (section 4.1: "an
/// element of a top-level command is not a bulk string").
fn get_bulk_string_span(src: &mut Cursor<&[u8]>) -> Result<Range<usize>, ProtocolError> {
    match get_u8(src)? {
        b'$' => {
            let len = get_decimal(src)? as usize;
            let start = src.position() as usize;
            skip(src, len)?;
            let payload = start..start + len;
            expect_crlf(src)?;
            Ok(payload)
        }
        other => Err(ProtocolError::Parse(format!(
            "expected bulk string element, got `{}`",
            other as char
        ))),
    }
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::Incomplete);
    }
    src.advance(n);
    Ok(())
}

fn expect_crlf(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::Incomplete);
    }
    let pos = src.position() as usize;
    let buf = *src.get_ref();
    if &buf[pos..pos + 2] != b"\r\n" {
        return Err(ProtocolError::Parse("expected CRLF terminator".into()));
    }
    src.advance(2);
    Ok(())
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::Incomplete);
    }
    Ok(src.get_u8())
}

/// Read a CRLF-terminated decimal length prefix. A bare `-1` bulk/array null
/// sentinel is not accepted here: this scanner only ever reads command
/// arrays and bulk-string elements of them, neither of which may be null
/// (section 4.1 requires every element to be a bulk string).
fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<u64, ProtocolError> {
    let line = get_line(src)?;
    parse_decimal(line)
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let buf = *src.get_ref();
    if buf.len() < 2 {
        return Err(ProtocolError::Incomplete);
    }
    let end = buf.len() - 1;

    for i in start..end {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }

    Err(ProtocolError::Incomplete)
}
