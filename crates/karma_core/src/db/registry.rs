//! Per-process registry of lazily opened channel datasets.
//!
//! # Responsibility
//! - Map `(schema, channel)` to one cached connection.
//! - Derive per-channel file locations under the configured data directory.
//! - Release every cached handle on shutdown.
//!
//! # Invariants
//! - Channel identifiers are IRC-casefolded; `#Foo[1]` and `#foo{1}` share a
//!   dataset.
//! - Distinct keys map to distinct directories.
//! - The registry map lock is never held while a database is being opened,
//!   so a slow open on one channel does not stall other channels.
//! - Each cached connection sits behind its own mutex; callers hold it for a
//!   whole read-modify-write sequence.

use super::{open_db, open_db_in_memory, DbError, DbResult, Schema};
use crate::model::karma::irc_casefold;
use log::{info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to one channel dataset.
pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug, Clone)]
enum Backing {
    Directory(PathBuf),
    Memory,
}

/// Lazily populated cache of open channel connections.
pub struct ChannelRegistry {
    backing: Backing,
    handles: Mutex<HashMap<(Schema, String), SharedConnection>>,
}

impl ChannelRegistry {
    /// Creates a registry persisting datasets below `data_dir`.
    ///
    /// Nothing is touched on disk until a channel is first accessed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::Directory(data_dir.into()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry whose datasets live in private in-memory databases.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the data directory, or `None` for in-memory registries.
    pub fn data_dir(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Directory(dir) => Some(dir.as_path()),
            Backing::Memory => None,
        }
    }

    /// Returns the file backing `channel` for `schema`, if file-backed.
    pub fn dataset_path(&self, channel: &str, schema: Schema) -> DbResult<Option<PathBuf>> {
        let key = channel_key(channel)?;
        Ok(self
            .data_dir()
            .map(|dir| dir.join(channel_dir_name(&key)).join(schema.file_name())))
    }

    /// Returns the cached connection for `channel`, opening it on first use.
    pub fn connection(&self, channel: &str, schema: Schema) -> DbResult<SharedConnection> {
        let key = channel_key(channel)?;
        let map_key = (schema, key);

        if let Some(existing) = self.lock_handles().get(&map_key) {
            return Ok(Arc::clone(existing));
        }

        let conn = match &self.backing {
            Backing::Directory(dir) => open_db(
                dir.join(channel_dir_name(&map_key.1)).join(schema.file_name()),
                schema,
            )?,
            Backing::Memory => open_db_in_memory(schema)?,
        };

        // A concurrent caller may have opened the same dataset meanwhile; the
        // first inserted handle wins and ours is dropped.
        let mut handles = self.lock_handles();
        let handle = handles
            .entry(map_key)
            .or_insert_with(|| Arc::new(Mutex::new(conn)));
        Ok(Arc::clone(handle))
    }

    /// Number of datasets currently cached.
    pub fn open_count(&self) -> usize {
        self.lock_handles().len()
    }

    /// Closes every cached connection and empties the registry.
    ///
    /// Handles still borrowed elsewhere are released when their last clone
    /// drops. Returns the first close failure after attempting all of them.
    pub fn close_all(&self) -> DbResult<()> {
        let drained: Vec<_> = self.lock_handles().drain().collect();
        let total = drained.len();
        let mut first_error = None;

        for ((schema, channel), handle) in drained {
            let Ok(mutex) = Arc::try_unwrap(handle) else {
                warn!(
                    "event=registry_close module=db status=deferred schema={} channel={}",
                    schema.as_str(),
                    channel
                );
                continue;
            };
            let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Err((_conn, err)) = conn.close() {
                warn!(
                    "event=registry_close module=db status=error schema={} channel={} error={}",
                    schema.as_str(),
                    channel,
                    err
                );
                if first_error.is_none() {
                    first_error = Some(DbError::Sqlite(err));
                }
            }
        }

        info!("event=registry_close module=db status=ok handles={total}");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, HashMap<(Schema, String), SharedConnection>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.close_all() {
            warn!("event=registry_drop module=db status=error error={err}");
        }
    }
}

/// Folds a channel identifier into its registry key (IRC casemapping).
///
/// # Errors
/// - Returns `InvalidChannel` for blank names and `.`/`..`.
pub fn channel_key(channel: &str) -> DbResult<String> {
    let trimmed = channel.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(DbError::InvalidChannel(channel.to_string()));
    }
    Ok(irc_casefold(trimmed))
}

/// Percent-encodes `%`, path separators and NUL so distinct keys never share
/// a directory.
fn channel_dir_name(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '%' | '/' | '\\' | '\0' => encoded.push_str(&format!("%{:02X}", u32::from(ch))),
            other => encoded.push(other),
        }
    }
    encoded
}
