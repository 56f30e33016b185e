//! Protocol module - wire format, framing, and message reassembly.
//!
//! This module implements the framing layer of the lottery protocol:
//! - Fixed-width ASCII length header encoding/decoding
//! - Chunking of oversized messages into several frames
//! - Frame buffer for accumulating partial reads
//! - Reassembly of newline-terminated logical messages

mod frame;
mod frame_buffer;
mod message;
mod wire_format;

pub use frame::{build_frame, frame_message};
pub use frame_buffer::FrameBuffer;
pub use message::{AssembledMessage, MessageAssembler};
pub use wire_format::{
    decode_header, encode_header, kinds, max_encodable_length, DEFAULT_LENGTH_BYTES,
    DEFAULT_MAX_MESSAGE_SIZE, MESSAGE_DELIMITER,
};
