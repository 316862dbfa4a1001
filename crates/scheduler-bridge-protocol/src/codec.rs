//! Newline-delimited JSON framing
//!
//! Both protocol surfaces of the bridge (the agent runtime on stdio and the
//! host scheduler on the Unix socket) exchange one compact JSON object per
//! line. There is no `Content-Length` header framing: a frame ends at the
//! first `\n`, so encoded payloads must never contain a raw newline.
//!
//! [`LineFramer`] is the synchronous core (append bytes, drain complete
//! lines). [`LineReader`] drives it from any [`AsyncRead`], and
//! [`read_lines`] hands every line of a stream to a callback.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{CodecError, CodecResult};

/// Size of a single read from the underlying stream.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Accumulates raw bytes and yields complete, trimmed, non-empty lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
    /// Bytes at the front of `buf` already known not to contain `\n`
    scanned: usize,
}

impl LineFramer {
    /// Create an empty framer
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from a stream
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes that do not yet form a complete line
    #[inline]
    fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete line.
    ///
    /// Whitespace-only lines are skipped. Invalid UTF-8 is replaced rather
    /// than rejected; the JSON parser downstream decides what to do with it.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let offset = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = offset else {
                self.scanned = self.buf.len();
                return None;
            };

            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buf[..end]).trim().to_owned();
            self.buf.advance(end + 1);
            self.scanned = 0;

            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Hand every complete line to `handler`, returning how many were drained
    pub fn drain<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(&str),
    {
        let mut count = 0;
        while let Some(line) = self.next_line() {
            handler(&line);
            count += 1;
        }
        count
    }

    /// Flush an unterminated trailing line once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buffered_len() == 0 {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).trim().to_owned();
        self.buf.clear();
        self.scanned = 0;
        (!line.is_empty()).then_some(line)
    }
}

/// Reads newline-delimited lines from an async byte stream.
///
/// [`LineReader::next_line`] is cancel safe: dropping the future between
/// reads loses no buffered data, so it can sit in a `tokio::select!` arm.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    framer: LineFramer,
    chunk: Box<[u8]>,
    eof: bool,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a stream
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            eof: false,
        }
    }

    /// Next complete line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(self.framer.finish());
            }

            let read = self.reader.read(&mut self.chunk).await?;
            if read == 0 {
                self.eof = true;
            } else {
                self.framer.push(&self.chunk[..read]);
            }
        }
    }
}

/// Feed every line of `reader` to `handler` until EOF.
pub async fn read_lines<R, F>(reader: R, mut handler: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut lines = LineReader::new(reader);
    while let Some(line) = lines.next_line().await? {
        handler(line);
    }
    Ok(())
}

/// Serialize `value` as compact JSON terminated by exactly one `\n`.
pub fn encode_line<T>(value: &T) -> CodecResult<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut bytes = serde_json::to_vec(value)?;
    if bytes.contains(&b'\n') {
        return Err(CodecError::EmbeddedNewline);
    }
    bytes.push(b'\n');
    Ok(bytes)
}
