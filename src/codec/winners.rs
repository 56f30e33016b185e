//! Decoding of the winners response: `<count>[,<doc_1>,...,<doc_count>]`.

use crate::error::{ClientError, Result, Violation};
use crate::protocol::kinds::FIELD_SEPARATOR;

/// Winners reported by the server for this agency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinnersResult {
    /// Declared winner count.
    pub count: usize,
    /// Winning documents, in server order.
    pub documents: Vec<String>,
}

impl WinnersResult {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Parse a winners response.
///
/// # Example
///
/// ```
/// use lottery_client::codec::parse_winners;
///
/// let winners = parse_winners("2,111,222").unwrap();
/// assert_eq!(winners.count, 2);
/// assert_eq!(winners.documents, vec!["111", "222"]);
///
/// assert!(parse_winners("0").unwrap().is_empty());
/// assert!(parse_winners("2,111").is_err());
/// ```
///
/// # Errors
///
/// Returns [`ClientError::ProtocolViolation`] if the count is not a bare
/// decimal number, or [`Violation::WinnersMismatch`] inside it if the number
/// of documents differs from the declared count.
pub fn parse_winners(message: &str) -> Result<WinnersResult> {
    let mut fields = message.split(FIELD_SEPARATOR);
    let declared = fields.next().unwrap_or_default();

    let count: usize = declared
        .parse()
        .map_err(|_| ClientError::protocol(format!("Invalid winners count {:?}", declared)))?;

    if count == 0 {
        return Ok(WinnersResult::default());
    }

    let documents: Vec<String> = fields.map(str::to_string).collect();
    if documents.len() != count {
        return Err(ClientError::ProtocolViolation(Violation::WinnersMismatch {
            expected: count,
            actual: documents.len(),
        }));
    }

    Ok(WinnersResult { count, documents })
}
