//! Core domain logic for the channel karma tracker.
//! This crate is the single source of truth for counting and alias invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod parser;
pub mod repo;
pub mod service;
pub mod transfer;

pub use config::{ChannelOverrides, ChannelSettings, ConfigError, KarmaConfig, LoggingConfig};
pub use db::{ChannelRegistry, DbError, Schema};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::alias::AliasRecord;
pub use model::karma::{
    Direction, InvalidMostKind, KarmaCounts, KarmaLookup, KarmaRecord, MostKind, RankedEntry,
};
pub use parser::{ChannelMembers, MessageOp};
pub use repo::alias_repo::{AliasRepository, SqliteAliasRepository};
pub use repo::karma_repo::{KarmaRepository, RepoError, RepoResult, SqliteKarmaRepository};
pub use service::karma_engine::{
    AdjustOutcome, Adjustment, KarmaEngine, KarmaError, KarmaResult, MessageContext, Reply,
    ResponseCategory, SUCCESS_REPLY,
};
pub use transfer::TransferError;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
