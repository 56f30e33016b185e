//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` to hold everything read from the socket that has
//! not been handed out yet. Implements a state machine for handling
//! fragmented frames:
//! - `WaitingForHeader`: need `length_bytes` header digits
//! - `WaitingForBody`: header parsed, need N more body bytes
//!
//! # Example
//!
//! ```
//! use lottery_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new(4);
//!
//! // Data arrives in arbitrary pieces from the socket
//! assert!(buffer.push(b"00").unwrap().is_empty());
//! let frames = buffer.push(b"02ok0001").unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0][..], b"ok");
//! assert!(buffer.is_mid_frame());
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::decode_header;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frame bodies.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Header width in digits.
    length_bytes: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer for headers of `length_bytes` digits.
    pub fn new(length_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHeader,
            length_bytes,
        }
    }

    /// Push data into the buffer and extract all complete frame bodies.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a framing error if a header is not a decimal number.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame body from the buffered bytes.
    ///
    /// Returns:
    /// - `Ok(Some(body))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the header is malformed
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < self.length_bytes {
                        return Ok(None);
                    }

                    let length = decode_header(&self.buffer[..self.length_bytes])?;
                    let _ = self.buffer.split_to(self.length_bytes);
                    self.state = State::WaitingForBody { length };
                }

                State::WaitingForBody { length } => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(length).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Whether a header has been parsed and its body is still pending.
    #[inline]
    pub fn is_awaiting_body(&self) -> bool {
        matches!(self.state, State::WaitingForBody { .. })
    }

    /// Whether any part of an unfinished frame has been received.
    #[inline]
    pub fn is_mid_frame(&self) -> bool {
        self.is_awaiting_body() || !self.buffer.is_empty()
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
