//! Karma repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide counter CRUD, ranking and bulk replace over one channel's
//!   `karma` table.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Lookups and mutations key on `normalize_name(name)`.
//! - Creating a row for an existing normalized key is ignored; the first
//!   writer's display name is kept and only the counter is bumped.
//! - Read paths reject negative persisted counters instead of masking them.

use crate::db::{DbError, Schema};
use crate::model::karma::{
    normalize_name, KarmaCounts, KarmaLookup, KarmaRecord, MostKind, RankedEntry,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by karma and alias persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Connection was not bootstrapped with the expected schema.
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::MissingRequiredTable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for one channel's karma counters.
pub trait KarmaRepository {
    /// Exact lookup on the normalized name.
    fn get(&self, name: &str) -> RepoResult<Option<KarmaCounts>>;
    /// Exact lookup returning the full row, including the stored display name.
    fn get_record(&self, name: &str) -> RepoResult<Option<KarmaRecord>>;
    /// Bulk lookup; unknown names are partitioned into `neutral`.
    fn get_many(&self, names: &[String]) -> RepoResult<KarmaLookup>;
    /// Highest totals first.
    fn top(&self, limit: u32) -> RepoResult<Vec<RankedEntry>>;
    /// Lowest totals first.
    fn bottom(&self, limit: u32) -> RepoResult<Vec<RankedEntry>>;
    /// `1 + count(total > target)`, matching on the exact display name.
    fn rank(&self, display_name: &str) -> RepoResult<Option<u64>>;
    fn size(&self) -> RepoResult<u64>;
    /// Fails with `InvalidData` once `added + subtracted` would exceed `i64::MAX`.
    fn increment(&mut self, name: &str) -> RepoResult<()>;
    fn decrement(&mut self, name: &str) -> RepoResult<()>;
    /// Deletes the row unconditionally; callers only invoke it at total zero.
    fn garbage_collect(&self, name: &str) -> RepoResult<()>;
    fn most(&self, kind: MostKind, limit: u32) -> RepoResult<Vec<RankedEntry>>;
    /// Resets both counters to zero without deleting the row.
    fn clear(&self, name: &str) -> RepoResult<()>;
    /// All rows in storage order.
    fn list_records(&self) -> RepoResult<Vec<KarmaRecord>>;
    /// Replaces every row of the channel in one transaction.
    fn replace_all(&mut self, records: &[KarmaRecord]) -> RepoResult<()>;
}

/// SQLite-backed karma repository over one channel connection.
pub struct SqliteKarmaRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteKarmaRepository<'conn> {
    /// Constructs a repository from a migrated karma connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_table(conn, Schema::Karma)?;
        Ok(Self { conn })
    }

    fn bump(&mut self, name: &str, column: &'static str) -> RepoResult<()> {
        let normalized = normalize_name(name);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO karma (id, name, normalized, added, subtracted)
             VALUES (NULL, ?1, ?2, 0, 0);",
            params![name, normalized],
        )?;
        // `added + subtracted` must stay an INTEGER; SQLite turns overflow into REAL.
        let updated = tx.execute(
            &format!(
                "UPDATE karma SET {column} = {column} + 1
                 WHERE normalized = ?1 AND added + subtracted < ?2;"
            ),
            params![normalized, i64::MAX],
        )?;
        if updated == 0 {
            return Err(RepoError::InvalidData(format!(
                "counters of `{normalized}` are at their maximum"
            )));
        }
        tx.commit()?;
        Ok(())
    }

    fn ranked(&self, sql: &str, limit: u32) -> RepoResult<Vec<RankedEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([i64::from(limit)])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(RankedEntry::new(row.get::<_, String>(0)?, row.get(1)?));
        }
        Ok(entries)
    }
}

impl KarmaRepository for SqliteKarmaRepository<'_> {
    fn get(&self, name: &str) -> RepoResult<Option<KarmaCounts>> {
        Ok(self.get_record(name)?.map(|record| record.counts()))
    }

    fn get_record(&self, name: &str) -> RepoResult<Option<KarmaRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, normalized, added, subtracted
             FROM karma
             WHERE normalized = ?1;",
        )?;
        let mut rows = stmt.query([normalize_name(name)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_karma_row(row)?));
        }
        Ok(None)
    }

    fn get_many(&self, names: &[String]) -> RepoResult<KarmaLookup> {
        let wanted: BTreeSet<String> = names.iter().map(|name| normalize_name(name)).collect();
        if wanted.is_empty() {
            return Ok(KarmaLookup::default());
        }

        let placeholders = vec!["?"; wanted.len()].join(", ");
        let sql = format!(
            "SELECT name, normalized, added - subtracted
             FROM karma
             WHERE normalized IN ({placeholders})
             ORDER BY added - subtracted DESC, id ASC;"
        );
        let bind_values: Vec<Value> = wanted.iter().cloned().map(Value::Text).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        while let Some(row) = rows.next()? {
            let normalized: String = row.get(1)?;
            found.push(RankedEntry::new(row.get::<_, String>(0)?, row.get(2)?));
            seen.insert(normalized);
        }

        let neutral = wanted
            .into_iter()
            .filter(|normalized| !seen.contains(normalized))
            .collect();
        Ok(KarmaLookup { found, neutral })
    }

    fn top(&self, limit: u32) -> RepoResult<Vec<RankedEntry>> {
        self.ranked(
            "SELECT name, added - subtracted
             FROM karma
             ORDER BY added - subtracted DESC, id ASC
             LIMIT ?1;",
            limit,
        )
    }

    fn bottom(&self, limit: u32) -> RepoResult<Vec<RankedEntry>> {
        self.ranked(
            "SELECT name, added - subtracted
             FROM karma
             ORDER BY added - subtracted ASC, id ASC
             LIMIT ?1;",
            limit,
        )
    }

    fn rank(&self, display_name: &str) -> RepoResult<Option<u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT added - subtracted
             FROM karma
             WHERE name = ?1
             ORDER BY id ASC
             LIMIT 1;",
        )?;
        let mut rows = stmt.query([display_name])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let total: i64 = row.get(0)?;

        let greater: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM karma WHERE added - subtracted > ?1;",
            [total],
            |row| row.get(0),
        )?;
        Ok(Some(to_count(greater)? + 1))
    }

    fn size(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM karma;", [], |row| row.get(0))?;
        to_count(count)
    }

    fn increment(&mut self, name: &str) -> RepoResult<()> {
        self.bump(name, "added")
    }

    fn decrement(&mut self, name: &str) -> RepoResult<()> {
        self.bump(name, "subtracted")
    }

    fn garbage_collect(&self, name: &str) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM karma WHERE normalized = ?1;",
            [normalize_name(name)],
        )?;
        Ok(())
    }

    fn most(&self, kind: MostKind, limit: u32) -> RepoResult<Vec<RankedEntry>> {
        let metric = kind.metric_sql();
        self.ranked(
            &format!(
                "SELECT name, {metric}
                 FROM karma
                 ORDER BY {metric} DESC, id ASC
                 LIMIT ?1;"
            ),
            limit,
        )
    }

    fn clear(&self, name: &str) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE karma SET added = 0, subtracted = 0 WHERE normalized = ?1;",
            [normalize_name(name)],
        )?;
        Ok(())
    }

    fn list_records(&self) -> RepoResult<Vec<KarmaRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, normalized, added, subtracted
             FROM karma
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_karma_row(row)?);
        }
        Ok(records)
    }

    fn replace_all(&mut self, records: &[KarmaRecord]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM karma;", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO karma (id, name, normalized, added, subtracted)
                 VALUES (NULL, ?1, ?2, ?3, ?4);",
            )?;
            for record in records {
                insert.execute(params![
                    record.name,
                    normalize_name(&record.name),
                    record.added,
                    record.subtracted,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn parse_karma_row(row: &Row<'_>) -> RepoResult<KarmaRecord> {
    let record = KarmaRecord {
        name: row.get("name")?,
        normalized: row.get("normalized")?,
        added: row.get("added")?,
        subtracted: row.get("subtracted")?,
    };
    if record.added < 0 || record.subtracted < 0 {
        return Err(RepoError::InvalidData(format!(
            "negative counters ({}, {}) for `{}` in karma",
            record.added, record.subtracted, record.normalized
        )));
    }
    Ok(record)
}

fn to_count(value: i64) -> RepoResult<u64> {
    u64::try_from(value).map_err(|_| RepoError::InvalidData(format!("negative count {value}")))
}

pub(crate) fn ensure_table(conn: &Connection, schema: Schema) -> RepoResult<()> {
    let table = schema.table_name();
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::MissingRequiredTable(table))
    }
}
