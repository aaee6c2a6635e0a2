//! Streaming RESP protocol parser.
//!
//! The parser accumulates bytes from the socket and yields complete
//! frames. Incomplete input leaves the buffer untouched so the caller
//! can retry after the next read. Plain-text inline commands are
//! accepted alongside RESP arrays.

use super::frame::Frame;
use super::markers;
use crate::error::ProtocolError;
use crate::{MAX_ARGUMENTS, MAX_BULK_SIZE, MAX_INLINE_SIZE};
use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;

/// RESP protocol parser with streaming support.
#[derive(Debug, Default)]
pub struct RespParser {
    buffer: BytesMut,
}

impl RespParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer.
    #[inline]
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns true if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the parser buffer (after a protocol error).
    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to parse a complete frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if the data is malformed
    pub fn parse(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let first = self.buffer[0];
        if !is_resp_marker(first) {
            return self.parse_inline();
        }

        // Parse against a cursor first; the buffer only advances once a
        // whole frame is available, so partial reads can be retried.
        let mut cursor = Cursor::new(&self.buffer);
        match parse_frame_at(&mut cursor) {
            Ok(frame) => {
                let consumed = cursor.pos;
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Parse an inline command (plain text, space-separated).
    fn parse_inline(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let line_end = match find_crlf(&self.buffer) {
            Some(pos) => pos,
            None => {
                if self.buffer.len() > MAX_INLINE_SIZE {
                    return Err(ProtocolError::LineTooLong {
                        len: self.buffer.len(),
                        max: MAX_INLINE_SIZE,
                    });
                }
                return Ok(None);
            }
        };

        let line = self.buffer.split_to(line_end);
        self.buffer.advance(2); // Skip CRLF

        let args: Vec<Frame> = line
            .as_ref()
            .split(|&b| b == b' ' || b == b'\t')
            .filter(|part| !part.is_empty())
            .map(|part| Frame::Bulk(Bytes::copy_from_slice(part)))
            .collect();

        if args.is_empty() {
            return Ok(None);
        }
        Ok(Some(Frame::Array(args)))
    }
}

/// Read-only cursor over the parse buffer.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn next_byte(&mut self) -> Result<u8, ProtocolError> {
        let b = *self
            .remaining()
            .first()
            .ok_or(ProtocolError::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a line up to CRLF, advancing past the terminator.
    fn read_line(&mut self) -> Result<&'a [u8], ProtocolError> {
        match find_crlf(self.remaining()) {
            Some(end) => {
                let line = &self.remaining()[..end];
                self.pos += end + 2;
                Ok(line)
            }
            None => Err(ProtocolError::Incomplete),
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining().len() < len {
            return Err(ProtocolError::Incomplete);
        }
        let data = &self.remaining()[..len];
        self.pos += len;
        Ok(data)
    }
}

fn parse_frame_at(cursor: &mut Cursor<'_>) -> Result<Frame, ProtocolError> {
    let marker = cursor.next_byte()?;

    match marker {
        markers::SIMPLE_STRING => {
            let line = cursor.read_line()?;
            let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
            Ok(Frame::Simple(s.to_string()))
        }
        markers::ERROR => {
            let line = cursor.read_line()?;
            let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
            Ok(Frame::Error(s.to_string()))
        }
        markers::INTEGER => {
            let n = parse_decimal(cursor.read_line()?)?;
            Ok(Frame::Integer(n))
        }
        markers::BULK_STRING => {
            let len = parse_decimal(cursor.read_line()?)?;
            if len < 0 {
                return Ok(Frame::Null);
            }
            let len = len as usize;
            if len > MAX_BULK_SIZE {
                return Err(ProtocolError::BulkTooLarge {
                    len,
                    max: MAX_BULK_SIZE,
                });
            }
            let data = Bytes::copy_from_slice(cursor.read_exact(len)?);
            if cursor.read_exact(2)? != b"\r\n" {
                return Err(ProtocolError::MissingCrlf);
            }
            Ok(Frame::Bulk(data))
        }
        markers::ARRAY => {
            let len = parse_decimal(cursor.read_line()?)?;
            if len < 0 {
                return Ok(Frame::NullArray);
            }
            let len = len as usize;
            if len > MAX_ARGUMENTS {
                return Err(ProtocolError::TooManyElements {
                    count: len,
                    max: MAX_ARGUMENTS,
                });
            }
            let mut frames = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                frames.push(parse_frame_at(cursor)?);
            }
            Ok(Frame::Array(frames))
        }
        _ => Err(ProtocolError::InvalidTypeMarker(marker)),
    }
}

fn parse_decimal(line: &[u8]) -> Result<i64, ProtocolError> {
    let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(s.parse()?)
}

/// Check if a byte is a RESP2 marker.
#[inline]
fn is_resp_marker(b: u8) -> bool {
    matches!(
        b,
        markers::SIMPLE_STRING
            | markers::ERROR
            | markers::INTEGER
            | markers::BULK_STRING
            | markers::ARRAY
    )
}

/// Find CRLF in a byte slice.
///
/// Uses SIMD-optimized memchr for the `\r` search, then verifies `\n`
/// follows.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while offset + 1 < buf.len() {
        match memchr(b'\r', &buf[offset..]) {
            Some(pos) => {
                let abs_pos = offset + pos;
                if abs_pos + 1 < buf.len() && buf[abs_pos + 1] == b'\n' {
                    return Some(abs_pos);
                }
                offset = abs_pos + 1;
            }
            None => return None,
        }
    }
    None
}

/// Parse a single frame from a byte slice (for testing and one-shot parsing).
pub fn parse_frame(data: &[u8]) -> Result<Frame, ProtocolError> {
    let mut parser = RespParser::new();
    parser.extend(data);
    parser.parse()?.ok_or(ProtocolError::Incomplete)
}
