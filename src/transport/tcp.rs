//! TCP connections to the lottery server.

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::framed::{FrameTransport, TransportConfig};
use crate::error::{ClientError, Result};

/// Frame transport over a TCP connection.
pub type TcpTransport = FrameTransport<TcpStream>;

/// Dial `address` and wrap the connection in a [`FrameTransport`].
///
/// The dial races the cancellation token.
///
/// # Errors
///
/// - [`ClientError::Cancelled`] if the token fires before the dial completes.
/// - [`ClientError::Connect`] if the dial fails.
pub async fn connect(
    address: &str,
    cancel: &CancellationToken,
    config: TransportConfig,
) -> Result<TcpTransport> {
    let stream = tokio::select! {
        biased;

        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        result = TcpStream::connect(address) => result.map_err(|source| ClientError::Connect {
            address: address.to_string(),
            source,
        })?,
    };

    // Frames are small and latency-bound
    stream.set_nodelay(true)?;

    tracing::debug!("action: connect | result: success | address: {}", address);
    Ok(FrameTransport::new(stream, cancel.clone(), config))
}
