//! Newline-terminated line framing over a buffered byte stream.
//!
//! Used for request lines, status markers and the listing line. Lines are
//! not escaped, so a file name containing `\n` cannot be sent intact.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransferError};

/// Initial capacity for a line buffer
const LINE_CAPACITY: usize = 256;

/// Read one line, trailing newline included.
///
/// Blocks until a `\n` arrives or the stream ends. A stream that ends
/// before any byte yields `EndOfStream`; a final unterminated line is
/// returned as-is. Bytes are not decoded.
pub async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(LINE_CAPACITY);

    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(TransferError::EndOfStream);
    }

    Ok(line)
}

/// Write `text` followed by a single `\n`, then flush.
///
/// The peer blocks on this line, so it must never sit in a buffer.
pub async fn write_line<W, T>(writer: &mut W, text: T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: AsRef<[u8]>,
{
    let text = text.as_ref();
    let mut line = BytesMut::with_capacity(text.len() + 1);
    line.extend_from_slice(text);
    line.put_u8(b'\n');

    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
