//! Cancellation-aware frame transport over a byte stream.
//!
//! Every blocking read or write is bounded by the poll interval. When an
//! attempt times out, the cancellation token is checked and the attempt is
//! retried, so a silent peer never delays shutdown by more than one interval.
//!
//! # Example
//!
//! ```ignore
//! use lottery_client::transport::{FrameTransport, TransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut transport = FrameTransport::new(stream, CancellationToken::new(), TransportConfig::default());
//! transport.send(b"000003ok\n").await?;
//! let ack = transport.recv_message().await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::protocol::{FrameBuffer, MessageAssembler, DEFAULT_LENGTH_BYTES};

/// Default bound on a single read or write attempt.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time allowed for a frame body once its header has arrived.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for a [`FrameTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Header width in digits.
    pub length_bytes: usize,
    /// Bound on each read/write attempt between cancellation checks.
    pub poll_interval: Duration,
    /// Time allowed for a body after its header has been read.
    pub body_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            length_bytes: DEFAULT_LENGTH_BYTES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }
}

/// Sends raw payloads and receives length-prefixed frames over `S`.
///
/// Owns the stream exclusively; dropping the transport closes the connection.
pub struct FrameTransport<S> {
    stream: S,
    cancel: CancellationToken,
    frames: FrameBuffer,
    read_buf: Vec<u8>,
    config: TransportConfig,
}

impl<S> FrameTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, cancel: CancellationToken, config: TransportConfig) -> Self {
        Self {
            stream,
            cancel,
            frames: FrameBuffer::new(config.length_bytes),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            config,
        }
    }

    /// Write all of `payload`, looping over partial writes.
    ///
    /// The token is checked before every write attempt.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Cancelled`] if the token is set before the payload is
    ///   fully written.
    /// - [`ClientError::Io`] for any write failure, including a zero-byte write.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut sent = 0;

        while sent < payload.len() {
            if self.cancel.is_cancelled() {
                tracing::debug!(
                    "action: send_all | result: interrupted | sent: {} | total: {}",
                    sent,
                    payload.len()
                );
                return Err(ClientError::Cancelled);
            }

            match timeout(self.config.poll_interval, self.stream.write(&payload[sent..])).await {
                Err(_elapsed) => continue,
                Ok(Ok(0)) => {
                    return Err(ClientError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "write returned 0",
                    )))
                }
                Ok(Ok(n)) => sent += n,
                Ok(Err(e)) => return Err(ClientError::Io(e)),
            }
        }

        self.stream.flush().await?;
        Ok(())
    }

    /// Receive the body of the next frame.
    ///
    /// Header reads are retried on timeout for as long as the token is not
    /// set. Once a header is parsed, its body must arrive within
    /// `body_timeout`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Cancelled`] if the token is set while waiting.
    /// - [`ClientError::ConnectionClosed`] if the peer closed the connection
    ///   before any byte of the frame.
    /// - [`ClientError::Framing`] for a non-numeric header, a body that does
    ///   not arrive in time, or a close in the middle of a frame.
    pub async fn recv_frame(&mut self) -> Result<Bytes> {
        let mut body_deadline: Option<Instant> = None;

        loop {
            if let Some(body) = self.frames.next_frame()? {
                return Ok(body);
            }

            if self.cancel.is_cancelled() {
                tracing::debug!("action: recv_frame | result: interrupted");
                return Err(ClientError::Cancelled);
            }

            if self.frames.is_awaiting_body() {
                let deadline = *body_deadline
                    .get_or_insert_with(|| Instant::now() + self.config.body_timeout);
                if Instant::now() >= deadline {
                    return Err(ClientError::Framing(format!(
                        "Frame body not received within {:?}",
                        self.config.body_timeout
                    )));
                }
            }

            let read = timeout(self.config.poll_interval, self.stream.read(&mut self.read_buf));
            match read.await {
                Err(_elapsed) => continue,
                Ok(Ok(0)) if self.frames.is_mid_frame() => {
                    return Err(ClientError::Framing(format!(
                        "Connection closed mid-frame with {} bytes buffered",
                        self.frames.len()
                    )));
                }
                Ok(Ok(0)) => return Err(ClientError::ConnectionClosed),
                Ok(Ok(n)) => self.frames.extend(&self.read_buf[..n]),
                Ok(Err(e)) => return Err(ClientError::Io(e)),
            }
        }
    }

    /// Receive one logical message, reassembled from as many frames as needed.
    ///
    /// Returns the message without its trailing newline.
    ///
    /// # Errors
    ///
    /// Same as [`recv_frame`](Self::recv_frame). A close after the first
    /// frame of a message is a [`ClientError::Framing`] error, not
    /// [`ClientError::ConnectionClosed`].
    pub async fn recv_message(&mut self) -> Result<String> {
        let mut assembler = MessageAssembler::new();
        let mut frames = 0usize;

        loop {
            let body = match self.recv_frame().await {
                Err(ClientError::ConnectionClosed) if frames > 0 => {
                    return Err(ClientError::Framing(format!(
                        "Connection closed after {} frames of an unfinished message",
                        frames
                    )));
                }
                other => other?,
            };
            frames += 1;

            if let Some(message) = assembler.push(&body)? {
                if message.discarded > 0 {
                    tracing::warn!(
                        "action: recv_message | result: trailing_data | discarded_bytes: {}",
                        message.discarded
                    );
                }
                return Ok(message.text);
            }
        }
    }

    /// Shut down the write half of the connection.
    ///
    /// Errors are logged and ignored; the socket is released on drop anyway.
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("action: close_connection | result: fail | error: {}", e);
        }
    }
}
