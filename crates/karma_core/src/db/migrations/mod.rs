//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register per-schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic within one schema.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A karma file and an alias file never share a connection, so each schema
//!   owns its own version sequence.

use crate::db::{DbError, DbResult, Schema};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const KARMA_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_karma_init.sql"),
}];

const ALIAS_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_alias_init.sql"),
}];

fn migrations_for(schema: Schema) -> &'static [Migration] {
    match schema {
        Schema::Karma => KARMA_MIGRATIONS,
        Schema::Alias => ALIAS_MIGRATIONS,
    }
}

/// Returns the latest migration version known by this binary for `schema`.
pub fn latest_version(schema: Schema) -> u32 {
    migrations_for(schema)
        .last()
        .map_or(0, |migration| migration.version)
}

/// Applies all pending migrations for `schema` on the provided connection.
pub fn apply_migrations(conn: &mut Connection, schema: Schema) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version(schema);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            schema,
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations_for(schema) {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
