//! Bet records and the sources that produce them in batches.
//!
//! A [`BetSource`] hands the protocol one [`Batch`] at a time. Two sources
//! read the agency's bets file:
//!
//! - [`EagerBetSource`] - loads every batch up front ([`load_batches`])
//! - [`FileBetSource`] - reads one batch per call from a tracked byte offset
//!   ([`read_batch_at`])
//!
//! # Example
//!
//! ```ignore
//! use lottery_client::bets::{BetSource, FileBetSource};
//!
//! let mut source = FileBetSource::new("./agency-1.csv", 100);
//! while let Some(batch) = source.next_batch().await? {
//!     println!("{} bets", batch.len());
//! }
//! ```

mod file;

pub use file::{load_batches, parse_record, read_batch_at, BatchChunk, BET_FIELDS};

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Characters that would break the message grammar if sent inside a field.
pub const FORBIDDEN_CHARS: [char; 3] = ['\n', ':', ','];

/// A single lottery bet, as read from the agency's file.
///
/// The submitting agency is attached when the bet is encoded, since every
/// bet of a run belongs to the client's configured agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub name: String,
    pub surname: String,
    pub document: String,
    pub birth_date: String,
    pub number: String,
}

impl Bet {
    pub fn new(
        name: impl Into<String>,
        surname: impl Into<String>,
        document: impl Into<String>,
        birth_date: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            surname: surname.into(),
            document: document.into(),
            birth_date: birth_date.into(),
            number: number.into(),
        }
    }

    /// Field values in wire order.
    pub fn fields(&self) -> [&str; BET_FIELDS] {
        [
            &self.name,
            &self.surname,
            &self.document,
            &self.birth_date,
            &self.number,
        ]
    }

    /// First field value holding a forbidden delimiter, if any.
    pub fn forbidden_field(&self) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|value| value.contains(&FORBIDDEN_CHARS[..]))
    }
}

/// Ordered group of bets sent as one message.
pub type Batch = Vec<Bet>;

/// Producer of bet batches consumed by the submission protocol.
#[async_trait]
pub trait BetSource: Send {
    /// Next batch, or `None` once the source is exhausted.
    async fn next_batch(&mut self) -> Result<Option<Batch>>;
}

/// Source over batches already held in memory.
#[derive(Debug, Default)]
pub struct EagerBetSource {
    batches: VecDeque<Batch>,
}

impl EagerBetSource {
    /// Wrap batches that were materialized elsewhere.
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    /// Load every batch of `path` up front.
    pub async fn load(
        path: impl Into<PathBuf>,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let batches = load_batches(path.into(), batch_size, cancel).await?;
        Ok(Self::new(batches))
    }

    /// Batches not handed out yet.
    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

#[async_trait]
impl BetSource for EagerBetSource {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.batches.pop_front())
    }
}

/// Source that reads the bets file one batch at a time.
///
/// Keeps the byte offset where the next batch starts, so consumed lines are
/// never read twice.
#[derive(Debug)]
pub struct FileBetSource {
    path: PathBuf,
    batch_size: usize,
    cursor: u64,
    line: usize,
    exhausted: bool,
}

impl FileBetSource {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size,
            cursor: 0,
            line: 0,
            exhausted: false,
        }
    }

    /// Byte offset the next batch will be read from.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[async_trait]
impl BetSource for FileBetSource {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        let chunk = read_batch_at(&self.path, self.batch_size, self.cursor, self.line).await?;
        self.cursor = chunk.next_cursor;
        self.line = chunk.next_line;
        self.exhausted = chunk.is_last;

        if chunk.batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk.batch))
    }
}
