//! Wire format encoding and decoding.
//!
//! Every frame starts with a fixed-width ASCII decimal header holding the
//! byte length of the body, zero-padded to `length_bytes` digits:
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │ Length (ASCII digits)│ Body                 │
//! │ length_bytes bytes   │ Length bytes         │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! There is no separator between header and body. A logical message is
//! terminated by [`MESSAGE_DELIMITER`] and may span several frames.

use crate::error::{ClientError, Result};

/// Default header width in digits.
pub const DEFAULT_LENGTH_BYTES: usize = 6;

/// Default maximum body size of a single frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8192;

/// Terminator of a logical message.
pub const MESSAGE_DELIMITER: u8 = b'\n';

/// Message kind and field names used in message bodies.
pub mod kinds {
    /// Batch submission.
    pub const BATCH: &str = "BATCH";
    /// End of batches notification.
    pub const FIN: &str = "FIN";
    /// Winners query.
    pub const WINNERS: &str = "GANADORES";

    /// Agency field key.
    pub const AGENCY: &str = "AGENCIA";
    /// Bettor first name key.
    pub const NAME: &str = "NOMBRE";
    /// Bettor surname key.
    pub const SURNAME: &str = "APELLIDO";
    /// Document number key.
    pub const DOCUMENT: &str = "DOCUMENTO";
    /// Birth date key.
    pub const BIRTH_DATE: &str = "NACIMIENTO";
    /// Gambled number key.
    pub const NUMBER: &str = "NUMERO";

    /// Separator between fields of a record.
    pub const FIELD_SEPARATOR: char = ',';
    /// Separator between records of a batch.
    pub const RECORD_SEPARATOR: char = ':';
}

/// Largest body length representable with `width` digits.
///
/// Saturates at `usize::MAX` for widths wider than `usize` can count.
pub fn max_encodable_length(width: usize) -> usize {
    u32::try_from(width)
        .ok()
        .and_then(|w| 10usize.checked_pow(w))
        .map(|limit| limit - 1)
        .unwrap_or(usize::MAX)
}

/// Encode a body length as a zero-padded ASCII header.
///
/// # Example
///
/// ```
/// use lottery_client::protocol::encode_header;
///
/// assert_eq!(encode_header(42, 6).unwrap(), b"000042");
/// assert!(encode_header(1_000, 3).is_err());
/// ```
///
/// # Errors
///
/// Returns [`ClientError::HeaderOverflow`] when `length` needs more than
/// `width` digits. Lengths are never truncated.
pub fn encode_header(length: usize, width: usize) -> Result<Vec<u8>> {
    if width == 0 || length > max_encodable_length(width) {
        return Err(ClientError::HeaderOverflow { length, width });
    }
    Ok(format!("{:0width$}", length, width = width).into_bytes())
}

/// Decode an ASCII header into a body length.
///
/// # Errors
///
/// Returns [`ClientError::Framing`] if the header contains anything other
/// than ASCII digits.
pub fn decode_header(buf: &[u8]) -> Result<usize> {
    if buf.is_empty() || !buf.iter().all(u8::is_ascii_digit) {
        return Err(ClientError::Framing(format!(
            "Non-numeric length header {:?}",
            String::from_utf8_lossy(buf)
        )));
    }

    // All digits, so this only fails on overflow.
    std::str::from_utf8(buf)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            ClientError::Framing(format!(
                "Length header {:?} out of range",
                String::from_utf8_lossy(buf)
            ))
        })
}
