//! Karma engine: message intake, alias fan-out and counter mutation.
//!
//! # Responsibility
//! - Turn inbound chat text into karma adjustments and alias changes.
//! - Enforce the self-rating rule and garbage-collect neutral records.
//! - Decide which replies a host should emit.
//!
//! # Invariants
//! - The increment/decrement, read-back and conditional delete of one target
//!   run under that channel's karma connection lock.
//! - A record whose total reaches zero through a mutation is deleted before
//!   the lock is released.
//! - Self-rating is only rejected for single-target operations.
//! - A storage failure aborts the remaining operations of the message; no
//!   success reply is produced for the failed step.

use crate::config::{ChannelSettings, KarmaConfig};
use crate::db::{ChannelRegistry, DbError, Schema};
use crate::model::karma::{irc_casefold, strip_enclosing_parens, Direction};
use crate::parser::{
    ends_with_karma_token, parse_karma_tokens, parse_message, ChannelMembers, MessageOp,
};
use crate::repo::alias_repo::{AliasRepository, SqliteAliasRepository};
use crate::repo::karma_repo::{KarmaRepository, RepoError, RepoResult, SqliteKarmaRepository};
use crate::service::format::render_karma_message;
use crate::transfer::TransferError;
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::PoisonError;

pub type KarmaResult<T> = Result<T, KarmaError>;

/// Engine and query-layer error.
#[derive(Debug)]
pub enum KarmaError {
    /// Author tried to adjust their own karma while self-rating is off.
    PermissionDenied,
    /// Unrecognized argument, e.g. an unknown `most` kind.
    InvalidArgument(String),
    /// Database access failed.
    Storage(RepoError),
    /// Bulk export/import failed; includes malformed import rows.
    Transfer(TransferError),
}

impl Display for KarmaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "You're not allowed to adjust your own karma."),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Transfer(err) => write!(f, "{err}"),
        }
    }
}

impl Error for KarmaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Transfer(err) => Some(err),
            Self::PermissionDenied | Self::InvalidArgument(_) => None,
        }
    }
}

impl From<RepoError> for KarmaError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<DbError> for KarmaError {
    fn from(value: DbError) -> Self {
        Self::Storage(RepoError::Db(value))
    }
}

impl From<TransferError> for KarmaError {
    fn from(value: TransferError) -> Self {
        Self::Transfer(value)
    }
}

/// Inbound chat line as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub channel: String,
    /// Nick of the message author.
    pub author: String,
    pub text: String,
    /// Whether the bot was explicitly addressed.
    pub addressed: bool,
}

impl MessageContext {
    pub fn new(
        channel: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            author: author.into(),
            text: text.into(),
            addressed: false,
        }
    }

    pub fn addressed(mut self) -> Self {
        self.addressed = true;
        self
    }
}

/// Reply category picked after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCategory {
    /// Total went back to zero; the record was garbage-collected.
    None,
    Up,
    Down,
}

/// Applied adjustment of one resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    /// Resolved target as displayed (canonical name for aliases).
    pub target: String,
    /// Surface token when the target was reached through an alias.
    pub via_alias: Option<String>,
    pub direction: Direction,
    pub total: i64,
    pub category: ResponseCategory,
}

/// Per-target result of one karma operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustOutcome {
    Applied(Adjustment),
    SelfRatingDenied { target: String },
}

/// Something the host should say in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Message(String),
    Error(String),
}

/// Success acknowledgement used by privileged commands.
pub const SUCCESS_REPLY: &str = "The operation succeeded.";

/// Karma subsystem facade over the channel registry and configuration.
pub struct KarmaEngine {
    registry: ChannelRegistry,
    config: KarmaConfig,
}

impl KarmaEngine {
    /// Creates an engine over an existing registry.
    pub fn new(registry: ChannelRegistry, config: KarmaConfig) -> Self {
        Self { registry, config }
    }

    /// Creates an engine persisting under `config.data_dir`.
    pub fn open(config: KarmaConfig) -> Self {
        let registry = ChannelRegistry::open(config.data_dir.clone());
        Self::new(registry, config)
    }

    pub fn config(&self) -> &KarmaConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn settings(&self, channel: &str) -> ChannelSettings {
        self.config.settings_for(channel)
    }

    /// Processes one chat line and returns the replies to emit.
    ///
    /// # Contract
    /// - Addressed lines are only scanned for karma when their last token
    ///   ends in `++`/`--`; alias phrases are ignored.
    /// - Unaddressed lines are ignored unless `allow_unaddressed_karma`.
    /// - Karma replies obey `response`; alias acknowledgements and
    ///   self-rating errors are always emitted.
    pub fn handle_message(
        &self,
        ctx: &MessageContext,
        members: &ChannelMembers,
    ) -> KarmaResult<Vec<Reply>> {
        let settings = self.settings(&ctx.channel);
        let text = ctx.text.trim_end();

        let ops = if ctx.addressed {
            if ends_with_karma_token(text) {
                parse_karma_tokens(text, members)
            } else {
                Vec::new()
            }
        } else if settings.allow_unaddressed_karma {
            parse_message(text, members)
        } else {
            Vec::new()
        };

        let mut replies = Vec::new();
        for op in &ops {
            match op {
                MessageOp::Karma { thing, direction } => {
                    for outcome in self.adjust(&ctx.channel, &ctx.author, thing, *direction)? {
                        match outcome {
                            AdjustOutcome::Applied(adjustment) if settings.response => {
                                replies.push(Reply::Message(render_karma_message(
                                    &settings,
                                    &adjustment,
                                )));
                            }
                            AdjustOutcome::Applied(_) => {}
                            AdjustOutcome::SelfRatingDenied { .. } => {
                                let message = KarmaError::PermissionDenied.to_string();
                                replies.push(Reply::Error(message));
                            }
                        }
                    }
                }
                MessageOp::Alias { name, alias } => {
                    self.add_alias(&ctx.channel, name, alias)?;
                    replies.push(Reply::Message(format!("{name} is also {alias}, got it!")));
                }
                MessageOp::Unalias { name, alias } => {
                    self.remove_alias(&ctx.channel, name, alias)?;
                    replies.push(Reply::Message(format!(
                        "Who?  I've forgotten that {name} was ever {alias}!"
                    )));
                }
            }
        }
        Ok(replies)
    }

    /// Applies one `thing++`/`thing--` on behalf of `author`.
    ///
    /// The thing is resolved through the alias table first; every canonical
    /// name it maps to is adjusted. Returns one outcome per target.
    pub fn adjust(
        &self,
        channel: &str,
        author: &str,
        thing: &str,
        direction: Direction,
    ) -> KarmaResult<Vec<AdjustOutcome>> {
        let stripped = strip_enclosing_parens(thing);
        if stripped.is_empty() {
            return Ok(Vec::new());
        }

        let canonical = self.resolve_alias(channel, stripped)?;
        let (targets, via_alias) = if canonical.is_empty() {
            (vec![thing.to_string()], None)
        } else {
            (canonical, Some(thing.to_string()))
        };
        let settings = self.settings(channel);
        let single_target = targets.len() == 1;

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            if single_target
                && !settings.allow_self_rating
                && irc_casefold(&target) == irc_casefold(author)
            {
                warn!(
                    "event=karma_adjust module=engine status=denied reason=self_rating direction={}",
                    direction.as_str()
                );
                outcomes.push(AdjustOutcome::SelfRatingDenied { target });
                continue;
            }

            let total = self.bump_and_collect(channel, &target, direction)?;
            let category = match (total, direction) {
                (0, _) => ResponseCategory::None,
                (_, Direction::Up) => ResponseCategory::Up,
                (_, Direction::Down) => ResponseCategory::Down,
            };
            info!(
                "event=karma_adjust module=engine status=ok direction={} aliased={} neutral={}",
                direction.as_str(),
                via_alias.is_some(),
                total == 0
            );
            outcomes.push(AdjustOutcome::Applied(Adjustment {
                target,
                via_alias: via_alias.clone(),
                direction,
                total,
                category,
            }));
        }
        Ok(outcomes)
    }

    /// Registers `alias` as another name of `name`.
    pub fn add_alias(&self, channel: &str, name: &str, alias: &str) -> KarmaResult<()> {
        self.with_aliases(channel, |repo| repo.add_alias(name, alias))?;
        info!("event=alias_add module=engine status=ok");
        Ok(())
    }

    /// Removes every `(name, alias)` row; returns how many were removed.
    pub fn remove_alias(&self, channel: &str, name: &str, alias: &str) -> KarmaResult<usize> {
        let removed = self.with_aliases(channel, |repo| repo.remove_alias(name, alias))?;
        info!("event=alias_remove module=engine status=ok removed={removed}");
        Ok(removed)
    }

    /// Canonical names `alias` refers to, deduplicated in first-seen order.
    pub fn resolve_alias(&self, channel: &str, alias: &str) -> KarmaResult<Vec<String>> {
        let mut names = self.with_aliases(channel, |repo| repo.resolve(alias))?;
        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
        Ok(names)
    }

    /// Flushes and releases every cached channel handle.
    pub fn close(&self) -> KarmaResult<()> {
        self.registry.close_all()?;
        Ok(())
    }

    /// Runs `op` against the channel's karma repository under its lock.
    pub(crate) fn with_karma<T>(
        &self,
        channel: &str,
        op: impl FnOnce(&mut SqliteKarmaRepository<'_>) -> RepoResult<T>,
    ) -> KarmaResult<T> {
        let handle = self.registry.connection(channel, Schema::Karma)?;
        let mut conn = handle.lock().unwrap_or_else(PoisonError::into_inner);
        let mut repo = SqliteKarmaRepository::try_new(&mut conn)?;
        Ok(op(&mut repo)?)
    }

    /// Runs `op` against the channel's alias repository under its lock.
    pub(crate) fn with_aliases<T>(
        &self,
        channel: &str,
        op: impl FnOnce(&mut SqliteAliasRepository<'_>) -> RepoResult<T>,
    ) -> KarmaResult<T> {
        let handle = self.registry.connection(channel, Schema::Alias)?;
        let mut conn = handle.lock().unwrap_or_else(PoisonError::into_inner);
        let mut repo = SqliteAliasRepository::try_new(&mut conn)?;
        Ok(op(&mut repo)?)
    }

    fn bump_and_collect(
        &self,
        channel: &str,
        target: &str,
        direction: Direction,
    ) -> KarmaResult<i64> {
        let key = strip_enclosing_parens(target);
        self.with_karma(channel, |repo| {
            match direction {
                Direction::Up => repo.increment(key)?,
                Direction::Down => repo.decrement(key)?,
            }
            let total = repo.get(key)?.map_or(0, |counts| counts.total());
            if total == 0 {
                repo.garbage_collect(key)?;
            }
            Ok(total)
        })
    }
}
