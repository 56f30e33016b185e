//! Frame building and message chunking.
//!
//! A logical message is terminated with [`MESSAGE_DELIMITER`] and then cut
//! into slices of at most `max_message_size` bytes. Each slice travels as its
//! own frame; the delimiter is the only reassembly marker.
//!
//! # Example
//!
//! ```
//! use lottery_client::protocol::{build_frame, frame_message};
//!
//! let frame = build_frame(b"hello", 4).unwrap();
//! assert_eq!(frame, b"0005hello");
//!
//! let frames = frame_message(b"FIN,AGENCIA=1", 8, 4).unwrap();
//! assert_eq!(frames, vec![b"0008FIN,AGEN".to_vec(), b"0006CIA=1\n".to_vec()]);
//! ```

use super::wire_format::{encode_header, MESSAGE_DELIMITER};
use crate::error::{ClientError, Result};

/// Build a complete frame (`header + body`) as a single byte vector.
///
/// # Errors
///
/// Returns [`ClientError::HeaderOverflow`] if `body.len()` cannot be written
/// in `width` digits.
pub fn build_frame(body: &[u8], width: usize) -> Result<Vec<u8>> {
    let header = encode_header(body.len(), width)?;
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Terminate a message body and split it into framed chunks.
///
/// The returned frames, written back to back, carry `body` followed by a
/// single newline. Every frame body is at most `max_message_size` bytes.
///
/// # Errors
///
/// - [`ClientError::Config`] if `max_message_size` is zero.
/// - [`ClientError::HeaderOverflow`] if a chunk length does not fit the
///   header width.
pub fn frame_message(body: &[u8], max_message_size: usize, width: usize) -> Result<Vec<Vec<u8>>> {
    if max_message_size == 0 {
        return Err(ClientError::Config(
            "max_message_size must be at least 1".to_string(),
        ));
    }

    let mut message = Vec::with_capacity(body.len() + 1);
    message.extend_from_slice(body);
    message.push(MESSAGE_DELIMITER);

    message
        .chunks(max_message_size)
        .map(|chunk| build_frame(chunk, width))
        .collect()
}
