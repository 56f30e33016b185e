//! # lottery-client
//!
//! Agency client for the national lottery server.
//!
//! An agency submits its bets in batches over a TCP connection, tells the
//! server it is done, then polls until the draw is held and its winners are
//! known.
//!
//! ## Architecture
//!
//! - **Transport**: length-prefixed frames with a fixed-width ASCII decimal
//!   header. Every blocking read and write is bounded so a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) is observed
//!   promptly.
//! - **Protocol**: newline-terminated text messages (`BATCH`, `FIN`,
//!   `GANADORES`) split across frames when they exceed the maximum frame size.
//!
//! ## Example
//!
//! ```ignore
//! use lottery_client::bets::EagerBetSource;
//! use lottery_client::LotteryClient;
//!
//! #[tokio::main]
//! async fn main() -> lottery_client::Result<()> {
//!     let mut client = LotteryClient::builder()
//!         .server_address("server:12345")
//!         .agency_id("1")
//!         .build()?;
//!
//!     let mut source =
//!         EagerBetSource::load("./agency-1.csv", 100, &client.cancel_token()).await?;
//!     let winners = client.run(&mut source).await?;
//!     println!("{:?}", winners.documents);
//!     Ok(())
//! }
//! ```

pub mod bets;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod shutdown;
pub mod transport;

mod client;

pub use client::{
    ClientBuilder, ClientConfig, LotteryClient, Phase, DEFAULT_BATCH_SIZE, DEFAULT_WINNERS_BACKOFF,
};
pub use codec::WinnersResult;
pub use error::{ClientError, Result, Violation};
