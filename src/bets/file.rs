//! Reading bets from the agency's delimited file.
//!
//! One bet per line: `name,surname,document,birth_date,number`. Fields may be
//! double-quoted, in which case they can hold commas and `""` stands for a
//! literal quote. Blank lines are ignored.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::{Batch, Bet};
use crate::error::{ClientError, Result};

/// Number of fields in a bet line.
pub const BET_FIELDS: usize = 5;

/// One batch read from a byte offset, plus where to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchChunk {
    /// Bets read, at most `batch_size`.
    pub batch: Batch,
    /// Byte offset right after the last consumed line.
    pub next_cursor: u64,
    /// Number of lines consumed from the start of the file.
    pub next_line: usize,
    /// Whether the end of the file was reached.
    pub is_last: bool,
}

/// Parse a single bet line.
///
/// `line_no` is only used for error reporting.
pub fn parse_record(line: &str, line_no: usize) -> Result<Bet> {
    let fields = split_fields(line).map_err(|reason| ClientError::InvalidRecord {
        line: line_no,
        reason,
    })?;

    let [name, surname, document, birth_date, number]: [String; BET_FIELDS] =
        fields.try_into().map_err(|fields: Vec<String>| ClientError::InvalidRecord {
            line: line_no,
            reason: format!("expected {} fields, found {}", BET_FIELDS, fields.len()),
        })?;

    Ok(Bet {
        name,
        surname,
        document,
        birth_date,
        number,
    })
}

fn split_fields(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::with_capacity(BET_FIELDS);
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(&['\n', '\r'][..])
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(ClientError::Config("batch_size must be at least 1".to_string()));
    }
    Ok(())
}

/// Read the whole file into batches of `batch_size` bets.
///
/// The token is checked between lines; a cancelled scan returns
/// [`ClientError::Cancelled`].
pub async fn load_batches(
    path: impl AsRef<Path>,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Batch>> {
    check_batch_size(batch_size)?;

    let file = File::open(path.as_ref()).await?;
    let mut lines = BufReader::new(file).lines();

    let mut batches = Vec::new();
    let mut current = Batch::with_capacity(batch_size);
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        if cancel.is_cancelled() {
            tracing::debug!("action: read_bets | result: interrupted");
            return Err(ClientError::Cancelled);
        }

        line_no += 1;
        let line = trim_line_ending(&line);
        if line.trim().is_empty() {
            continue;
        }

        current.push(parse_record(line, line_no)?);
        if current.len() == batch_size {
            batches.push(std::mem::replace(
                &mut current,
                Batch::with_capacity(batch_size),
            ));
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }

    tracing::debug!(
        "action: read_bets | result: success | file: {} | batches: {}",
        path.as_ref().display(),
        batches.len()
    );
    Ok(batches)
}

/// Read up to `batch_size` bets starting at byte offset `cursor`.
///
/// `first_line` is the number of lines before `cursor`, used to number
/// lines in errors. Pass the returned `next_cursor` and `next_line` to read
/// the following batch.
pub async fn read_batch_at(
    path: impl AsRef<Path>,
    batch_size: usize,
    cursor: u64,
    first_line: usize,
) -> Result<BatchChunk> {
    check_batch_size(batch_size)?;

    let mut file = File::open(path.as_ref()).await?;
    file.seek(SeekFrom::Start(cursor)).await?;
    let mut reader = BufReader::new(file);

    let mut batch = Batch::with_capacity(batch_size);
    let mut next_cursor = cursor;
    let mut line_no = first_line;
    let mut raw = Vec::new();

    while batch.len() < batch_size {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).await?;
        if n == 0 {
            return Ok(BatchChunk {
                batch,
                next_cursor,
                next_line: line_no,
                is_last: true,
            });
        }

        next_cursor += n as u64;
        line_no += 1;

        let line = std::str::from_utf8(&raw).map_err(|_| ClientError::InvalidRecord {
            line: line_no,
            reason: "not valid UTF-8".to_string(),
        })?;
        let line = trim_line_ending(line);
        if line.trim().is_empty() {
            continue;
        }

        batch.push(parse_record(line, line_no)?);
    }

    Ok(BatchChunk {
        batch,
        next_cursor,
        next_line: line_no,
        is_last: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bets::{BetSource, EagerBetSource, FileBetSource};
    use std::path::PathBuf;

    /// Write `contents` to a fresh file in the temp dir.
    fn temp_file(tag: &str, contents: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "lottery-bets-{}-{}-{}.csv",
            tag,
            std::process::id(),
            nanos
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    const FIVE_BETS: &str = "\
Santiago Lionel,Lorca,30904465,1999-03-17,2201
Joaquin Lautaro,Gonzalez,27458192,1987-11-02,1533
Maria,Fernandez,33012547,1995-06-21,8721
\"Ana,Maria\",Diaz,41236598,2001-01-09,4412
Lucas,Martinez,29874563,1990-08-30,7574
";

    #[test]
    fn test_parse_plain_record() {
        let bet = parse_record("Juan,Perez,123,2000-01-01,77", 1).unwrap();
        assert_eq!(bet, Bet::new("Juan", "Perez", "123", "2000-01-01", "77"));
    }

    #[test]
    fn test_parse_quoted_record() {
        let bet = parse_record("\"Ana,Maria\",\"O\"\"Neil\",1,2000-01-01,5", 1).unwrap();
        assert_eq!(bet.name, "Ana,Maria");
        assert_eq!(bet.surname, "O\"Neil");
    }

    #[test]
    fn test_parse_wrong_field_count() {
        let err = parse_record("Juan,Perez,123", 7).unwrap_err();
        match err {
            ClientError::InvalidRecord { line, reason } => {
                assert_eq!(line, 7);
                assert!(reason.contains("expected 5 fields, found 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_unterminated_quote() {
        assert!(matches!(
            parse_record("\"Juan,Perez,1,2,3", 2),
            Err(ClientError::InvalidRecord { line: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_load_batches() {
        let path = temp_file("eager", FIVE_BETS);
        let batches = load_batches(&path, 2, &CancellationToken::new()).await.unwrap();

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[1][1].name, "Ana,Maria");
        assert_eq!(batches[2][0].number, "7574");

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_load_batches_cancelled() {
        let path = temp_file("cancel", FIVE_BETS);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = load_batches(&path, 2, &cancel).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let path = temp_file("zero", FIVE_BETS);
        let result = read_batch_at(&path, 0, 0, 0).await;
        assert!(matches!(result, Err(ClientError::Config(_))));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_read_batch_at_resumes_from_cursor() {
        let path = temp_file("resume", FIVE_BETS);

        let first = read_batch_at(&path, 2, 0, 0).await.unwrap();
        assert_eq!(first.batch.len(), 2);
        assert!(!first.is_last);
        assert_eq!(first.next_line, 2);

        let second = read_batch_at(&path, 2, first.next_cursor, first.next_line)
            .await
            .unwrap();
        assert_eq!(second.batch[0].name, "Maria");
        assert!(!second.is_last);

        let third = read_batch_at(&path, 2, second.next_cursor, second.next_line)
            .await
            .unwrap();
        assert_eq!(third.batch.len(), 1);
        assert_eq!(third.batch[0].name, "Lucas");
        assert!(third.is_last);
        assert_eq!(third.next_cursor, FIVE_BETS.len() as u64);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let path = temp_file("nonl", "a,b,1,2000-01-01,1\nc,d,2,2000-01-01,2");
        let chunk = read_batch_at(&path, 10, 0, 0).await.unwrap();
        assert_eq!(chunk.batch.len(), 2);
        assert_eq!(chunk.batch[1].number, "2");
        assert!(chunk.is_last);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_error_reports_absolute_line() {
        let path = temp_file("badline", "a,b,1,2000-01-01,1\n\nbroken line\n");
        let err = read_batch_at(&path, 10, 0, 0).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRecord { line: 3, .. }));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_eager_and_resumable_sources_agree() {
        let path = temp_file("agree", FIVE_BETS);

        let mut eager = EagerBetSource::load(&path, 2, &CancellationToken::new())
            .await
            .unwrap();
        let mut resumable = FileBetSource::new(&path, 2);

        loop {
            let a = eager.next_batch().await.unwrap();
            let b = resumable.next_batch().await.unwrap();
            assert_eq!(a, b);
            if a.is_none() {
                break;
            }
        }
        assert_eq!(resumable.cursor(), FIVE_BETS.len() as u64);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_cleanly() {
        let path = temp_file("exact", "a,b,1,2000-01-01,1\nc,d,2,2000-01-01,2\n");
        let mut source = FileBetSource::new(&path, 2);

        assert_eq!(source.next_batch().await.unwrap().unwrap().len(), 2);
        assert!(source.next_batch().await.unwrap().is_none());
        assert!(source.next_batch().await.unwrap().is_none());

        std::fs::remove_file(path).ok();
    }
}
