//! Length-prefixed text frames on a byte stream
//!
//! A frame is the ASCII decimal length of the payload, terminated by a single
//! `\n`, followed by exactly that many payload bytes:
//!
//! ```text
//! 21\ntemp,pressure,humidity
//! ```
//!
//! The length token and the payload are written as two separate writes. The
//! transport may split or merge them arbitrarily, so [`FrameReader`] keeps any
//! bytes it has received but not yet consumed and resumes from them on the next
//! call. A read that times out in the middle of a frame therefore never loses
//! alignment with the stream.
//!
//! # Failure modes
//!
//! - A read returning zero bytes is [`StreamError::ConnectionClosed`].
//! - A read that times out is retried up to the retry budget, after which the
//!   receive fails with [`StreamError::ReceiveTimeoutExceeded`].
//! - A length token that is not a decimal number, or that exceeds the maximum
//!   frame length, is [`StreamError::MalformedFrame`].
//!
//! # Unterminated length tokens
//!
//! The `\n` after the length token is mandatory. A producer that writes bare
//! digits straight into the payload (`21temp,pressure,humidity`) is not
//! understood: once more than 21 bytes are buffered without a terminator the
//! receive fails with [`StreamError::MalformedFrame`]. If such a producer goes
//! quiet before that many bytes arrive, the receive fails with
//! [`StreamError::ReceiveTimeoutExceeded`] instead.

use crate::stream::error::{StreamError, StreamResult};
use std::io::{ErrorKind, Read, Write};

/// Byte terminating the length token
pub const LENGTH_TERMINATOR: u8 = b'\n';

/// Number of timed-out reads tolerated before a receive fails
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Upper bound on a single payload
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Size of each read from the underlying transport
const READ_CHUNK: usize = 1024;

/// Longest length token accepted (digits of `u64::MAX` plus `\r`)
const MAX_LENGTH_TOKEN: usize = 21;

/// Build the length token for a payload of `len` bytes
pub fn length_token(len: usize) -> Vec<u8> {
    let mut token = len.to_string().into_bytes();
    token.push(LENGTH_TERMINATOR);
    token
}

/// Encode a complete frame into one buffer
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = length_token(payload.len());
    frame.extend_from_slice(payload);
    frame
}

/// Write one frame: the length token, then the payload
///
/// The frame counts as sent once both writes have completed.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> StreamResult<()> {
    writer.write_all(&length_token(payload.len()))?;
    writer.flush()?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Parse a length token (without its terminator)
fn parse_length(token: &[u8], max_frame_len: usize) -> StreamResult<usize> {
    let token = std::str::from_utf8(token)
        .map_err(|_| StreamError::MalformedFrame("length token is not ASCII".to_string()))?
        .trim();

    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StreamError::MalformedFrame(format!(
            "invalid length token {:?}",
            token
        )));
    }

    let len: usize = token
        .parse()
        .map_err(|_| StreamError::MalformedFrame(format!("length {} out of range", token)))?;

    if len > max_frame_len {
        return Err(StreamError::MalformedFrame(format!(
            "frame length {} exceeds limit {}",
            len, max_frame_len
        )));
    }

    Ok(len)
}

/// Reassembles frames from a byte stream
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    /// Bytes received but not yet returned as part of a frame
    pending: Vec<u8>,
    retry_budget: u32,
    max_frame_len: usize,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader with the default retry budget and frame limit
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            retry_budget: DEFAULT_RETRY_BUDGET,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Set the number of timed-out reads tolerated per receive
    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget.max(1);
        self
    }

    /// Set the maximum accepted payload length
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Borrow the underlying reader
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Number of bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Unwrap the underlying reader, discarding buffered bytes
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Receive one complete frame and return its payload
    pub fn read_frame(&mut self) -> StreamResult<Vec<u8>> {
        let (header_len, payload_len) = loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == LENGTH_TERMINATOR) {
                let len = parse_length(&self.pending[..pos], self.max_frame_len)?;
                break (pos + 1, len);
            }
            if self.pending.len() > MAX_LENGTH_TOKEN {
                return Err(StreamError::MalformedFrame(
                    "length token is not terminated".to_string(),
                ));
            }
            self.fill()?;
        };

        let frame_len = header_len + payload_len;
        while self.pending.len() < frame_len {
            self.fill()?;
        }

        let payload = self.pending[header_len..frame_len].to_vec();
        self.pending.drain(..frame_len);
        Ok(payload)
    }

    /// Receive one frame and decode it as ASCII text
    pub fn read_text_frame(&mut self) -> StreamResult<String> {
        let payload = self.read_frame()?;
        String::from_utf8(payload)
            .map_err(|_| StreamError::MalformedFrame("payload is not valid text".to_string()))
    }

    /// Perform one successful read into the pending buffer, retrying timeouts
    fn fill(&mut self) -> StreamResult<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut attempts = 0;

        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(StreamError::ConnectionClosed),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    attempts += 1;
                    if attempts >= self.retry_budget {
                        return Err(StreamError::ReceiveTimeoutExceeded { attempts });
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}
