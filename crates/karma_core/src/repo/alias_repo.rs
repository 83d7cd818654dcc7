//! Alias repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store `alias -> canonical name` rows for one channel.
//! - Answer forward (name -> aliases) and reverse (alias -> names) lookups.
//!
//! # Invariants
//! - Forward lookup matches the normalized canonical name exactly.
//! - Reverse lookup uses SQL `LIKE`, so it is ASCII case-insensitive and
//!   honours `%`/`_` wildcards present in the probe string.
//! - Adding an alias never deduplicates existing identical rows.

use crate::db::Schema;
use crate::model::alias::AliasRecord;
use crate::model::karma::normalize_name;
use crate::repo::karma_repo::{ensure_table, RepoResult};
use rusqlite::{params, Connection, TransactionBehavior};

/// Repository interface for one channel's alias relation.
pub trait AliasRepository {
    /// Aliases registered for `name`, in insertion order.
    fn aliases_of(&self, name: &str) -> RepoResult<Vec<String>>;
    /// Normalized canonical names whose alias matches `alias`.
    fn resolve(&self, alias: &str) -> RepoResult<Vec<String>>;
    fn add_alias(&self, name: &str, alias: &str) -> RepoResult<()>;
    /// Deletes every row of the exact pair and returns how many went away.
    fn remove_alias(&self, name: &str, alias: &str) -> RepoResult<usize>;
    fn list_records(&self) -> RepoResult<Vec<AliasRecord>>;
    /// Replaces every row of the channel in one transaction.
    fn replace_all(&mut self, records: &[AliasRecord]) -> RepoResult<()>;
}

/// SQLite-backed alias repository over one channel connection.
pub struct SqliteAliasRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteAliasRepository<'conn> {
    /// Constructs a repository from a migrated alias connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_table(conn, Schema::Alias)?;
        Ok(Self { conn })
    }

    fn strings(&self, sql: &str, probe: &str) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([probe])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(row.get(0)?);
        }
        Ok(values)
    }
}

impl AliasRepository for SqliteAliasRepository<'_> {
    fn aliases_of(&self, name: &str) -> RepoResult<Vec<String>> {
        self.strings(
            "SELECT aliases FROM alias WHERE normalized = ?1 ORDER BY id ASC;",
            &normalize_name(name),
        )
    }

    fn resolve(&self, alias: &str) -> RepoResult<Vec<String>> {
        self.strings(
            "SELECT normalized FROM alias WHERE aliases LIKE ?1 ORDER BY id ASC;",
            &normalize_name(alias),
        )
    }

    fn add_alias(&self, name: &str, alias: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO alias (id, name, normalized, aliases) VALUES (NULL, ?1, ?2, ?3);",
            params![name, normalize_name(name), alias],
        )?;
        Ok(())
    }

    fn remove_alias(&self, name: &str, alias: &str) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM alias WHERE normalized = ?1 AND aliases = ?2;",
            params![normalize_name(name), alias],
        )?;
        Ok(removed)
    }

    fn list_records(&self) -> RepoResult<Vec<AliasRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, normalized, aliases FROM alias ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(AliasRecord {
                name: row.get(0)?,
                normalized: row.get(1)?,
                alias: row.get(2)?,
            });
        }
        Ok(records)
    }

    fn replace_all(&mut self, records: &[AliasRecord]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM alias;", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO alias (id, name, normalized, aliases) VALUES (NULL, ?1, ?2, ?3);",
            )?;
            for record in records {
                insert.execute(params![
                    record.name,
                    normalize_name(&record.name),
                    record.alias
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
