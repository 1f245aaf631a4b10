//! Streaming the server-side half of RESP: copying upstream reply frames to
//! the client writer one at a time, and writing the handful of replies the
//! proxy synthesizes itself (`+PONG`, `+OK`, and RESP errors).
//!
//! Grounded on `JasonkayZK-mini-redis/src/connection/frame.rs` for the
//! line/length framing rules, and on
//! `other_examples/854c76ce_comnipl-redis-rwproxy__src-resp.rs.rs` for the
//! "proxy forwards bytes it never fully materializes" shape: unlike the
//! teacher (which parses a whole `Frame` tree into memory because it needs
//! to inspect values), this proxy only ever needs to know a reply's
//! boundaries, so bulk payloads are streamed through a fixed-size buffer
//! rather than collected.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::resp::parse::parse_decimal;

const STREAM_CHUNK: usize = 8 * 1024;

/// Copy exactly one RESP reply frame from `reader` to `writer`, recursively
/// for arrays. Null array (`*-1\r\n`) and null bulk (`$-1\r\n`) are
/// single-line terminal forms. Large bulk payloads are streamed through a
/// fixed-size buffer instead of being collected in memory.
pub fn copy_reply<'a, R, W>(
    reader: &'a mut R,
    writer: &'a mut W,
) -> Pin<Box<dyn Future<Output = Result<(), ProtocolError>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    Box::pin(async move {
        let mut tag = [0u8; 1];
        read_exact_or_incomplete(reader, &mut tag).await?;

        match tag[0] {
            b'+' | b'-' | b':' => {
                let line = read_line(reader).await?;
                writer.write_all(&tag).await.map_err(io_err)?;
                writer.write_all(&line).await.map_err(io_err)?;
                writer.write_all(b"\r\n").await.map_err(io_err)?;
                Ok(())
            }
            b'$' => {
                let line = read_line(reader).await?;
                writer.write_all(b"$").await.map_err(io_err)?;
                writer.write_all(&line).await.map_err(io_err)?;
                writer.write_all(b"\r\n").await.map_err(io_err)?;

                if line == b"-1" {
                    return Ok(());
                }

                let len = parse_decimal(&line)? as usize;
                stream_n(reader, writer, len + 2).await
            }
            b'*' => {
                let line = read_line(reader).await?;
                writer.write_all(b"*").await.map_err(io_err)?;
                writer.write_all(&line).await.map_err(io_err)?;
                writer.write_all(b"\r\n").await.map_err(io_err)?;

                if line == b"-1" {
                    return Ok(());
                }

                let count = parse_decimal(&line)?;
                for _ in 0..count {
                    copy_reply(reader, writer).await?;
                }
                Ok(())
            }
            other => Err(ProtocolError::Parse(format!(
                "invalid reply type byte `{}`",
                other as char
            ))),
        }
    })
}

/// Copy exactly `n` bytes from `reader` to `writer` through a bounded
/// intermediate buffer, so an arbitrarily large bulk reply never needs to
/// fit in memory at once.
async fn stream_n<R, W>(reader: &mut R, writer: &mut W, mut n: usize) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; STREAM_CHUNK];
    while n > 0 {
        let chunk = n.min(STREAM_CHUNK);
        reader
            .read_exact(&mut buf[..chunk])
            .await
            .map_err(io_err)?;
        writer.write_all(&buf[..chunk]).await.map_err(io_err)?;
        n -= chunk;
    }
    Ok(())
}

/// Read a line up to but not including the trailing `\r\n`.
pub(crate) async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await.map_err(io_err)?;
    if n == 0 {
        return Err(ProtocolError::Incomplete);
    }
    if line.len() < 2 || &line[line.len() - 2..] != b"\r\n" {
        return Err(ProtocolError::Parse("expected CRLF terminator".into()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

async fn read_exact_or_incomplete<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::Incomplete),
        Err(e) => Err(io_err(e)),
    }
}

fn io_err(e: std::io::Error) -> ProtocolError {
    ProtocolError::Parse(format!("io error: {}", e))
}

/// Write a synthesized simple-string reply, e.g. `+PONG\r\n`.
pub async fn write_simple<W>(writer: &mut W, s: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"+").await?;
    writer.write_all(s.as_bytes()).await?;
    writer.write_all(b"\r\n").await
}

/// Write a synthesized error reply, e.g. `-ERR unsupported command\r\n`.
pub async fn write_error<W>(writer: &mut W, message: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"-").await?;
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\r\n").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn roundtrip(input: &[u8]) -> Vec<u8> {
        let mut reader = BufReader::new(input);
        let mut out = Vec::new();
        copy_reply(&mut reader, &mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn copies_simple_string() {
        assert_eq!(roundtrip(b"+OK\r\n").await, b"+OK\r\n");
    }

    #[tokio::test]
    async fn copies_error() {
        assert_eq!(roundtrip(b"-ERR oops\r\n").await, b"-ERR oops\r\n");
    }

    #[tokio::test]
    async fn copies_integer() {
        assert_eq!(roundtrip(b":1000\r\n").await, b":1000\r\n");
    }

    #[tokio::test]
    async fn copies_bulk_string() {
        assert_eq!(roundtrip(b"$5\r\nhello\r\n").await, b"$5\r\nhello\r\n");
    }

    #[tokio::test]
    async fn copies_null_bulk() {
        assert_eq!(roundtrip(b"$-1\r\n").await, b"$-1\r\n");
    }

    #[tokio::test]
    async fn copies_null_array() {
        assert_eq!(roundtrip(b"*-1\r\n").await, b"*-1\r\n");
    }

    #[tokio::test]
    async fn copies_nested_array() {
        let input = b"*2\r\n$3\r\nfoo\r\n*2\r\n:1\r\n:2\r\n";
        assert_eq!(roundtrip(input).await, input.to_vec());
    }

    #[tokio::test]
    async fn rejects_truncated_bulk() {
        let mut reader = BufReader::new(&b"$5\r\nhel"[..]);
        let mut out = Vec::new();
        assert!(copy_reply(&mut reader, &mut out).await.is_err());
    }
}
