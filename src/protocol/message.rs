//! Reassembly of logical messages from frame bodies.

use bytes::BytesMut;

use super::wire_format::MESSAGE_DELIMITER;
use crate::error::{ClientError, Result};

/// Concatenates frame bodies until a message delimiter shows up.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
}

/// A logical message recovered from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Message text without its trailing delimiter.
    pub text: String,
    /// Bytes that followed the delimiter in the last frame.
    pub discarded: usize,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame body.
    ///
    /// Returns the complete message once the delimiter has been received.
    /// Anything after the delimiter is dropped and reported in
    /// [`AssembledMessage::discarded`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ProtocolViolation`] if the message is not UTF-8.
    pub fn push(&mut self, body: &[u8]) -> Result<Option<AssembledMessage>> {
        let Some(pos) = body.iter().position(|&b| b == MESSAGE_DELIMITER) else {
            self.buffer.extend_from_slice(body);
            return Ok(None);
        };

        self.buffer.extend_from_slice(&body[..pos]);
        let bytes = self.buffer.split().freeze();
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| ClientError::protocol(format!("Message is not UTF-8: {}", e)))?;

        Ok(Some(AssembledMessage {
            text,
            discarded: body.len() - pos - 1,
        }))
    }
}
