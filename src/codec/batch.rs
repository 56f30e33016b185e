//! Encoding of client→server message bodies.
//!
//! ```text
//! BATCH,<N>,<rec_1>:<rec_2>:...:<rec_N>
//! FIN,AGENCIA=<id>
//! GANADORES,AGENCIA=<id>
//!
//! rec = AGENCIA=<id>,NOMBRE=<s>,APELLIDO=<s>,DOCUMENTO=<s>,NACIMIENTO=<s>,NUMERO=<s>
//! ```

use crate::bets::Bet;
use crate::error::{ClientError, Result};
use crate::protocol::kinds::{
    AGENCY, BATCH, BIRTH_DATE, DOCUMENT, FIELD_SEPARATOR, FIN, NAME, NUMBER, RECORD_SEPARATOR,
    SURNAME, WINNERS,
};

/// Body of a `BATCH` message and what went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedBatch {
    /// Message body, without the trailing delimiter.
    pub body: String,
    /// Records written to the body (the declared count).
    pub emitted: usize,
    /// Bets dropped for holding a forbidden delimiter.
    pub skipped: usize,
}

/// Encode a single bet as a record of the batch grammar.
pub fn encode_bet(bet: &Bet, agency_id: &str) -> String {
    format!(
        "{AGENCY}={},{NAME}={},{SURNAME}={},{DOCUMENT}={},{BIRTH_DATE}={},{NUMBER}={}",
        agency_id, bet.name, bet.surname, bet.document, bet.birth_date, bet.number
    )
}

/// Build the `BATCH` body for `batch`.
///
/// Bets with a forbidden delimiter in any field are left out and logged; the
/// batch itself is still produced. The declared count is the number of
/// records actually written, so it always matches what a receiver splits out
/// of the body.
///
/// # Example
///
/// ```
/// use lottery_client::bets::Bet;
/// use lottery_client::codec::format_batch;
///
/// let batch = vec![
///     Bet::new("Juan", "Perez", "1", "2000-01-01", "7"),
///     Bet::new("Ana,Maria", "Diaz", "2", "2001-02-03", "8"),
/// ];
/// let formatted = format_batch(&batch, "3");
/// assert_eq!(formatted.emitted, 1);
/// assert_eq!(
///     formatted.body,
///     "BATCH,1,AGENCIA=3,NOMBRE=Juan,APELLIDO=Perez,DOCUMENTO=1,NACIMIENTO=2000-01-01,NUMERO=7"
/// );
/// ```
pub fn format_batch(batch: &[Bet], agency_id: &str) -> FormattedBatch {
    let mut records = Vec::with_capacity(batch.len());

    for bet in batch {
        if let Some(value) = bet.forbidden_field() {
            tracing::warn!(
                "action: format_batch | result: skip | document: {} | invalid_value: {:?}",
                bet.document,
                value
            );
            continue;
        }
        records.push(encode_bet(bet, agency_id));
    }

    let emitted = records.len();
    let body = format!(
        "{BATCH}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
        emitted,
        records.join(&RECORD_SEPARATOR.to_string())
    );

    FormattedBatch {
        body,
        emitted,
        skipped: batch.len() - emitted,
    }
}

/// Body of the end-of-batches notification.
pub fn format_fin(agency_id: &str) -> String {
    format!("{FIN}{FIELD_SEPARATOR}{AGENCY}={}", agency_id)
}

/// Body of the winners query.
pub fn format_winners_query(agency_id: &str) -> String {
    format!("{WINNERS}{FIELD_SEPARATOR}{AGENCY}={}", agency_id)
}

/// A `BATCH` body split back into its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBatch {
    /// Count declared in the body.
    pub declared: usize,
    /// `(agency, bet)` pairs in body order.
    pub records: Vec<(String, Bet)>,
}

/// Parse a `BATCH` body, the way a receiving server reads it.
///
/// The client never reads `BATCH` bodies itself. This exists so mock peers
/// in tests can check what was sent.
///
/// # Errors
///
/// Returns [`ClientError::ProtocolViolation`] if the body does not follow
/// the batch grammar or the declared count differs from the records found.
pub fn decode_batch(body: &str) -> Result<DecodedBatch> {
    let violation = |reason: String| ClientError::protocol(reason);

    let mut parts = body.splitn(3, FIELD_SEPARATOR);
    if parts.next() != Some(BATCH) {
        return Err(violation(format!("Not a {BATCH} message: {:?}", body)));
    }

    let declared: usize = parts
        .next()
        .and_then(|count| count.parse().ok())
        .ok_or_else(|| violation(format!("Missing batch count in {:?}", body)))?;

    let records = match parts.next() {
        Some(rest) if !rest.is_empty() => rest
            .split(RECORD_SEPARATOR)
            .map(decode_record)
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    if records.len() != declared {
        return Err(violation(format!(
            "Batch declared {} records, found {}",
            declared,
            records.len()
        )));
    }

    Ok(DecodedBatch { declared, records })
}

fn decode_record(record: &str) -> Result<(String, Bet)> {
    let keys = [AGENCY, NAME, SURNAME, DOCUMENT, BIRTH_DATE, NUMBER];
    let values: Vec<&str> = record.split(FIELD_SEPARATOR).collect();

    if values.len() != keys.len() {
        return Err(ClientError::protocol(format!(
            "Record has {} fields, expected {}: {:?}",
            values.len(),
            keys.len(),
            record
        )));
    }

    let mut fields = Vec::with_capacity(keys.len());
    for (key, pair) in keys.iter().zip(values) {
        match pair.split_once('=') {
            Some((k, v)) if k == *key => fields.push(v.to_string()),
            _ => {
                return Err(ClientError::protocol(format!(
                    "Expected key {} in {:?}",
                    key, pair
                )))
            }
        }
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or_default();
    let agency = next();
    let bet = Bet::new(next(), next(), next(), next(), next());
    Ok((agency, bet))
}
