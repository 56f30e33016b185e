//! Client builder and the three-phase submission exchange.
//!
//! The [`ClientBuilder`] validates a [`ClientConfig`] and builds a
//! [`LotteryClient`]. A run goes through these phases:
//! 1. `SendingBatches` - every batch of the source is sent and acked
//! 2. `NotifyingEnd` - `FIN` tells the server this agency is done
//! 3. `AwaitingWinners` - `GANADORES` is polled until the draw is available
//!
//! Batches and `FIN` share one connection. Each winners poll opens its own.
//!
//! # Example
//!
//! ```ignore
//! use lottery_client::bets::FileBetSource;
//! use lottery_client::LotteryClient;
//!
//! #[tokio::main]
//! async fn main() -> lottery_client::Result<()> {
//!     let mut client = LotteryClient::builder()
//!         .server_address("server:12345")
//!         .agency_id("1")
//!         .batch_size(50)
//!         .build()?;
//!
//!     let mut source = FileBetSource::new("./agency-1.csv", client.config().batch_size);
//!     let winners = client.run(&mut source).await?;
//!     println!("{} winners", winners.count);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::bets::{BetSource, FORBIDDEN_CHARS};
use crate::codec::{format_batch, format_fin, format_winners_query, parse_winners, WinnersResult};
use crate::error::{ClientError, Result};
use crate::protocol::{
    frame_message, max_encodable_length, DEFAULT_LENGTH_BYTES, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::transport::{
    connect, FrameTransport, TransportConfig, DEFAULT_BODY_TIMEOUT, DEFAULT_POLL_INTERVAL,
};

/// Default number of bets per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default wait between winners polls.
pub const DEFAULT_WINNERS_BACKOFF: Duration = Duration::from_secs(1);

/// Client settings.
///
/// Durations are given in milliseconds when deserialized.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the lottery server.
    pub server_address: String,
    /// Agency id attached to every record and control message.
    pub agency_id: String,
    /// Maximum bets per batch.
    pub batch_size: usize,
    /// Maximum frame body size; larger messages are split across frames.
    pub max_message_size: usize,
    /// Header width in digits.
    pub length_bytes: usize,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    #[serde(with = "millis")]
    pub body_timeout: Duration,
    #[serde(with = "millis")]
    pub winners_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            agency_id: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            length_bytes: DEFAULT_LENGTH_BYTES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            body_timeout: DEFAULT_BODY_TIMEOUT,
            winners_backoff: DEFAULT_WINNERS_BACKOFF,
        }
    }
}

impl ClientConfig {
    /// Check the settings against each other.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.server_address.is_empty() {
            return Err(ClientError::Config("server_address is required".into()));
        }
        if self.agency_id.is_empty() {
            return Err(ClientError::Config("agency_id is required".into()));
        }
        if self.agency_id.contains(&FORBIDDEN_CHARS[..]) {
            return Err(ClientError::Config(format!(
                "agency_id {:?} contains a message delimiter",
                self.agency_id
            )));
        }
        if self.batch_size == 0 {
            return Err(ClientError::Config("batch_size must be at least 1".into()));
        }
        if self.length_bytes == 0 {
            return Err(ClientError::Config("length_bytes must be at least 1".into()));
        }
        if self.max_message_size == 0 {
            return Err(ClientError::Config(
                "max_message_size must be at least 1".into(),
            ));
        }
        let limit = max_encodable_length(self.length_bytes);
        if self.max_message_size > limit {
            return Err(ClientError::Config(format!(
                "max_message_size {} does not fit in a {}-digit header (max {})",
                self.max_message_size, self.length_bytes, limit
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll_interval must be non-zero".into()));
        }
        Ok(())
    }

    /// Transport settings derived from this configuration.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            length_bytes: self.length_bytes,
            poll_interval: self.poll_interval,
            body_timeout: self.body_timeout,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Builder for configuring and creating a [`LotteryClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    cancel: Option<CancellationToken>,
    span: Option<Span>,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    /// Start from an existing configuration, e.g. one read from a file.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            cancel: None,
            span: None,
        }
    }

    pub fn server_address(mut self, address: impl Into<String>) -> Self {
        self.config.server_address = address.into();
        self
    }

    pub fn agency_id(mut self, id: impl Into<String>) -> Self {
        self.config.agency_id = id.into();
        self
    }

    /// Set the maximum bets per batch.
    ///
    /// Default: 100
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the maximum frame body size.
    ///
    /// Default: 8192
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the header width in digits.
    ///
    /// Default: 6
    pub fn length_bytes(mut self, width: usize) -> Self {
        self.config.length_bytes = width;
        self
    }

    /// Set the bound on each socket attempt between cancellation checks.
    ///
    /// Default: 500 milliseconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Default: 5 seconds
    pub fn body_timeout(mut self, timeout: Duration) -> Self {
        self.config.body_timeout = timeout;
        self
    }

    /// Set the wait between winners polls.
    ///
    /// Default: 1 second
    pub fn winners_backoff(mut self, backoff: Duration) -> Self {
        self.config.winners_backoff = backoff;
        self
    }

    /// Use an existing cancellation token instead of a fresh one.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Record the client's events under `span`.
    ///
    /// Default: an `info` span named `client` carrying the agency id.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<LotteryClient> {
        self.config.validate()?;

        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("client", agency = %self.config.agency_id));

        Ok(LotteryClient {
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
            span,
            phase: Phase::Idle,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SendingBatches,
    NotifyingEnd,
    AwaitingWinners,
    Done,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::SendingBatches => "sending_batches",
            Phase::NotifyingEnd => "notifying_end",
            Phase::AwaitingWinners => "awaiting_winners",
            Phase::Done => "done",
            Phase::Cancelled => "cancelled",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submits an agency's bets and retrieves its winners.
pub struct LotteryClient {
    config: ClientConfig,
    cancel: CancellationToken,
    span: Span,
    phase: Phase,
}

impl LotteryClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token observed by every blocking operation of this client.
    ///
    /// Cancelling it makes the current run return [`ClientError::Cancelled`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the full exchange: all batches, then `FIN`, then the winners query.
    ///
    /// The first error ends the run and is returned unchanged for the caller
    /// to report.
    pub async fn run<B>(&mut self, source: &mut B) -> Result<WinnersResult>
    where
        B: BetSource + ?Sized,
    {
        let span = self.span.clone();
        let result = self.run_phases(source).instrument(span.clone()).await;

        let terminal = match &result {
            Ok(_) => Phase::Done,
            Err(e) if e.is_cancelled() => Phase::Cancelled,
            Err(_) => Phase::Failed,
        };
        let _entered = span.enter();
        self.transition(terminal);

        result
    }

    async fn run_phases<B>(&mut self, source: &mut B) -> Result<WinnersResult>
    where
        B: BetSource + ?Sized,
    {
        self.transition(Phase::SendingBatches);
        let mut transport = connect(
            &self.config.server_address,
            &self.cancel,
            self.config.transport(),
        )
        .await?;
        self.send_all_batches(&mut transport, source).await?;

        self.transition(Phase::NotifyingEnd);
        self.notify_end(&mut transport).await?;
        transport.close().await;
        drop(transport);

        self.transition(Phase::AwaitingWinners);
        self.query_winners().await
    }

    fn transition(&mut self, next: Phase) {
        tracing::info!(
            "action: phase_change | result: success | from: {} | to: {}",
            self.phase,
            next
        );
        self.phase = next;
    }

    /// Send `body` as one logical message, split into as many frames as
    /// `max_message_size` requires.
    pub async fn send_chunked<S>(&self, transport: &mut FrameTransport<S>, body: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frames = frame_message(
            body.as_bytes(),
            self.config.max_message_size,
            self.config.length_bytes,
        )?;

        for frame in &frames {
            transport.send(frame).await?;
        }

        tracing::debug!(
            "action: send_message | result: success | bytes: {} | frames: {}",
            body.len() + 1,
            frames.len()
        );
        Ok(())
    }

    /// Send every batch of `source`, waiting for the server's ack after each.
    ///
    /// Returns the number of batches sent.
    pub async fn send_all_batches<S, B>(
        &self,
        transport: &mut FrameTransport<S>,
        source: &mut B,
    ) -> Result<usize>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        B: BetSource + ?Sized,
    {
        let agency_id = &self.config.agency_id;
        let mut sent = 0usize;

        while let Some(batch) = source.next_batch().await? {
            let formatted = format_batch(&batch, agency_id);
            self.send_chunked(transport, &formatted.body).await?;

            let ack = transport.recv_message().await?;
            sent += 1;
            tracing::debug!(
                "action: send_batch | result: success | batch: {} | bets: {} | skipped: {} | response: {}",
                sent,
                formatted.emitted,
                formatted.skipped,
                ack
            );
        }

        tracing::info!("action: send_batches | result: success | batches: {}", sent);
        Ok(sent)
    }

    /// Tell the server this agency has no more bets.
    ///
    /// No reply is expected.
    pub async fn notify_end<S>(&self, transport: &mut FrameTransport<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.send_chunked(transport, &format_fin(&self.config.agency_id))
            .await?;
        tracing::debug!("action: notify_server | result: success");
        Ok(())
    }

    /// Poll the server for this agency's winners.
    ///
    /// Each poll uses a fresh connection. A server that closes it before
    /// answering has not held the draw yet: wait the backoff and poll again.
    /// Only cancellation or a fatal error ends the loop early.
    pub async fn query_winners(&self) -> Result<WinnersResult> {
        let query = format_winners_query(&self.config.agency_id);
        let mut attempt = 0u64;

        loop {
            attempt += 1;
            let mut transport = connect(
                &self.config.server_address,
                &self.cancel,
                self.config.transport(),
            )
            .await?;
            self.send_chunked(&mut transport, &query).await?;

            match transport.recv_message().await {
                Ok(message) => {
                    let winners = parse_winners(&message).map_err(|e| {
                        tracing::debug!(
                            "action: parse_winners | result: fail | response: {:?} | error: {}",
                            message,
                            e
                        );
                        e
                    })?;
                    tracing::info!(
                        "action: consulta_ganadores | result: success | cant_ganadores: {}",
                        winners.count
                    );
                    return Ok(winners);
                }
                Err(ClientError::ConnectionClosed) => {
                    tracing::debug!(
                        "action: ask_winners | result: in_progress | attempt: {}",
                        attempt
                    );
                }
                Err(e) => return Err(e),
            }

            drop(transport);
            self.backoff().await?;
        }
    }

    /// Sleep for the winners backoff unless cancelled first.
    async fn backoff(&self) -> Result<()> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(self.config.winners_backoff) => Ok(()),
        }
    }
}
