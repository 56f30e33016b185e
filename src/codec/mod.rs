//! Codec module - message bodies of the lottery protocol.
//!
//! - [`format_batch`] / [`format_fin`] / [`format_winners_query`] - bodies sent
//!   by the client
//! - [`parse_winners`] - the server's winners response
//! - [`decode_batch`] - reads a `BATCH` body back into bets
//!
//! # Design
//!
//! Codecs are plain functions over text bodies. Framing and the trailing
//! message delimiter are handled by the [`protocol`](crate::protocol) module.

mod batch;
mod winners;

pub use batch::{
    decode_batch, encode_bet, format_batch, format_fin, format_winners_query, DecodedBatch,
    FormattedBatch,
};
pub use winners::{parse_winners, WinnersResult};
