//! Transport module - framed, cancellation-aware byte streams.
//!
//! Provides:
//! - [`FrameTransport`] over any `AsyncRead + AsyncWrite` stream
//! - [`connect`] for TCP connections to the server

mod framed;
mod tcp;

pub use framed::{FrameTransport, TransportConfig, DEFAULT_BODY_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use tcp::{connect, TcpTransport};
