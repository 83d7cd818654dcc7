//! SQLite storage bootstrap, schema migrations and the channel registry.
//!
//! # Responsibility
//! - Open and configure SQLite connections for karma and alias datasets.
//! - Apply schema migrations in deterministic order.
//! - Cache one connection per channel and schema for the process lifetime.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not read/write channel data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod registry;

pub use open::{open_db, open_db_in_memory};
pub use registry::{channel_key, ChannelRegistry, SharedConnection};

pub type DbResult<T> = Result<T, DbError>;

/// The two independently versioned dataset kinds kept per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// `karma` table: per-entity added/subtracted counters.
    Karma,
    /// `alias` table: canonical name to alias string rows.
    Alias,
}

impl Schema {
    /// Base filename of the per-channel database file.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Karma => "Karma.db",
            Self::Alias => "KarmaAliases.db",
        }
    }

    /// Table every repository over this schema requires.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Karma => "karma",
            Self::Alias => "alias",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Karma => "karma",
            Self::Alias => "alias",
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    UnsupportedSchemaVersion {
        schema: Schema,
        db_version: u32,
        latest_supported: u32,
    },
    /// Channel identifier cannot be mapped to a dataset location.
    InvalidChannel(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                schema,
                db_version,
                latest_supported,
            } => write!(
                f,
                "{} database schema version {db_version} is newer than supported {latest_supported}",
                schema.as_str()
            ),
            Self::InvalidChannel(channel) => write!(f, "invalid channel name `{channel}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::InvalidChannel(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
