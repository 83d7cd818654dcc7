//! Comma-delimited bulk export/import of channel datasets.
//!
//! # Responsibility
//! - Encode karma rows as `name,added,subtracted` and alias rows as
//!   `name,alias`, quoting fields only when needed.
//! - Decode the same formats, validating every row before anything is
//!   handed to a repository.
//! - Write export files atomically via a sibling temp file.
//!
//! # Invariants
//! - No header row is written or expected.
//! - Decoding is all-or-nothing: the first malformed row fails the whole
//!   file with its 1-based line number.
//! - A failed export never truncates an existing target file.

use crate::model::alias::AliasRecord;
use crate::model::karma::KarmaRecord;
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub type TransferResult<T> = Result<T, TransferError>;

/// Bulk transfer failure.
#[derive(Debug)]
pub enum TransferError {
    Io(std::io::Error),
    Csv(csv::Error),
    /// A row had the wrong field count or unusable counters.
    MalformedRecord { line: u64, reason: String },
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Csv(err) => write!(f, "{err}"),
            Self::MalformedRecord { line, reason } => {
                write!(f, "malformed import record at line {line}: {reason}")
            }
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::MalformedRecord { .. } => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for TransferError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Writes karma rows to `writer`.
pub fn encode_karma<W: Write>(writer: W, records: &[KarmaRecord]) -> TransferResult<()> {
    let mut out = csv_writer(writer);
    for record in records {
        let added = record.added.to_string();
        let subtracted = record.subtracted.to_string();
        out.write_record([record.name.as_str(), added.as_str(), subtracted.as_str()])?;
    }
    out.flush()?;
    Ok(())
}

/// Writes alias rows to `writer`.
pub fn encode_aliases<W: Write>(writer: W, records: &[AliasRecord]) -> TransferResult<()> {
    let mut out = csv_writer(writer);
    for record in records {
        out.write_record([record.name.as_str(), record.alias.as_str()])?;
    }
    out.flush()?;
    Ok(())
}

/// Reads karma rows from `reader`.
///
/// # Errors
/// - `MalformedRecord` when a row does not have exactly three fields or a
///   counter is not a non-negative integer.
/// - `MalformedRecord` when `added + subtracted` overflows `i64`.
pub fn decode_karma<R: Read>(reader: R) -> TransferResult<Vec<KarmaRecord>> {
    decode_rows(reader, 3, |line, row| {
        let added = parse_counter(line, "added", &row[1])?;
        let subtracted = parse_counter(line, "subtracted", &row[2])?;
        if added.checked_add(subtracted).is_none() {
            return Err(TransferError::MalformedRecord {
                line,
                reason: format!("activity {added} + {subtracted} does not fit in 64 bits"),
            });
        }
        Ok(KarmaRecord::new(&row[0], added, subtracted))
    })
}

/// Reads alias rows from `reader`.
pub fn decode_aliases<R: Read>(reader: R) -> TransferResult<Vec<AliasRecord>> {
    decode_rows(reader, 2, |_, row| Ok(AliasRecord::new(&row[0], &row[1])))
}

/// Atomically writes an export file at `path`.
///
/// The content is produced into a temp file in the same directory and then
/// renamed over `path`.
pub fn write_atomically<F>(path: &Path, produce: F) -> TransferResult<()>
where
    F: FnOnce(&mut File) -> TransferResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    produce(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| TransferError::Io(err.error))?;
    Ok(())
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer)
}

fn decode_rows<R, T, F>(reader: R, fields: usize, mut build: F) -> TransferResult<Vec<T>>
where
    R: Read,
    F: FnMut(u64, &StringRecord) -> TransferResult<T>,
{
    let mut input = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, row) in input.records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map_or(index as u64 + 1, |position| position.line());
        if row.len() != fields {
            return Err(TransferError::MalformedRecord {
                line,
                reason: format!("expected {fields} fields, found {}", row.len()),
            });
        }
        rows.push(build(line, &row)?);
    }
    Ok(rows)
}

fn parse_counter(line: u64, column: &str, value: &str) -> TransferResult<i64> {
    match value.trim().parse::<i64>() {
        Ok(parsed) if parsed >= 0 => Ok(parsed),
        Ok(parsed) => Err(TransferError::MalformedRecord {
            line,
            reason: format!("{column} must not be negative, found {parsed}"),
        }),
        Err(_) => Err(TransferError::MalformedRecord {
            line,
            reason: format!("{column} is not an integer: `{value}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_aliases, decode_karma, encode_karma, write_atomically, TransferError};
    use crate::model::karma::KarmaRecord;
    use std::io::Write;

    #[test]
    fn encode_quotes_only_when_needed() {
        let mut out = Vec::new();
        let records = vec![
            KarmaRecord::new("plain", 3, 1),
            KarmaRecord::new("with, comma", 0, 2),
            KarmaRecord::new("say \"hi\"", 1, 0),
        ];
        encode_karma(&mut out, &records).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "plain,3,1\n\"with, comma\",0,2\n\"say \"\"hi\"\"\",1,0\n"
        );
    }

    #[test]
    fn decode_rejects_wrong_field_count_with_line() {
        let err = decode_karma("a,1,0\nb,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TransferError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn decode_rejects_non_numeric_and_negative_counters() {
        let err = decode_karma("a,x,0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("added is not an integer"));

        let err = decode_karma("a,1,-4\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("subtracted must not be negative"));
    }

    #[test]
    fn decode_rejects_counters_whose_activity_overflows() {
        let err = decode_karma("ok,1,0\nfoo,9223372036854775807,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TransferError::MalformedRecord { line: 2, .. }));

        let records = decode_karma("foo,9223372036854775807,0\n".as_bytes()).unwrap();
        assert_eq!(records[0].added, i64::MAX);
    }

    #[test]
    fn decode_aliases_reads_pairs() {
        let records = decode_aliases("Alice,ali\n\"Bob, Jr\",bobby\n".as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "Bob, Jr");
        assert_eq!(records[1].normalized, "bob, jr");
        assert_eq!(records[1].alias, "bobby");
    }

    #[test]
    fn failed_atomic_write_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karma.csv");
        std::fs::write(&path, "old,1,0\n").unwrap();

        let err = write_atomically(&path, |file| {
            file.write_all(b"partial")?;
            Err(TransferError::MalformedRecord {
                line: 0,
                reason: "simulated".to_string(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, TransferError::MalformedRecord { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old,1,0\n");
    }
}
