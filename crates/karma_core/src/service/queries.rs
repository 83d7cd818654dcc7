//! Read-only karma queries, bulk transfer and command replies.
//!
//! # Responsibility
//! - Wrap repository reads for command handlers (lookup, ranking, `most`).
//! - Run dump/load of channel datasets through `transfer`.
//! - Render the reply text of the `karma`, `most`, `showaliases`, `clear`,
//!   `dump` and `load` commands.
//!
//! # Invariants
//! - Unknown `most` kinds are rejected before any storage access.
//! - `load_*` decodes the whole file before replacing the channel dataset.

use crate::db::Schema;
use crate::model::alias::AliasRecord;
use crate::model::karma::{KarmaCounts, KarmaLookup, KarmaRecord, MostKind, RankedEntry};
use crate::repo::alias_repo::AliasRepository;
use crate::repo::karma_repo::KarmaRepository;
use crate::service::format::{join_list, quoted, times};
use crate::service::karma_engine::{KarmaEngine, KarmaError, KarmaResult, Reply, SUCCESS_REPLY};
use crate::transfer::{decode_aliases, decode_karma, encode_aliases, encode_karma, write_atomically};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const NO_KARMA_ERROR: &str = "I have no karma for this channel.";

impl KarmaEngine {
    /// Counters of one entity, `None` when neutral.
    pub fn karma(&self, channel: &str, name: &str) -> KarmaResult<Option<KarmaCounts>> {
        self.with_karma(channel, |repo| repo.get(name))
    }

    /// Bulk lookup partitioned into known and neutral names.
    pub fn karma_many(&self, channel: &str, names: &[String]) -> KarmaResult<KarmaLookup> {
        self.with_karma(channel, |repo| repo.get_many(names))
    }

    pub fn top(&self, channel: &str, limit: u32) -> KarmaResult<Vec<RankedEntry>> {
        self.with_karma(channel, |repo| repo.top(limit))
    }

    pub fn bottom(&self, channel: &str, limit: u32) -> KarmaResult<Vec<RankedEntry>> {
        self.with_karma(channel, |repo| repo.bottom(limit))
    }

    pub fn rank(&self, channel: &str, display_name: &str) -> KarmaResult<Option<u64>> {
        self.with_karma(channel, |repo| repo.rank(display_name))
    }

    pub fn size(&self, channel: &str) -> KarmaResult<u64> {
        self.with_karma(channel, |repo| repo.size())
    }

    pub fn most(
        &self,
        channel: &str,
        kind: MostKind,
        limit: u32,
    ) -> KarmaResult<Vec<RankedEntry>> {
        self.with_karma(channel, |repo| repo.most(kind, limit))
    }

    /// `most` with a textual kind, as received from a command line.
    ///
    /// # Errors
    /// - `InvalidArgument` for anything but increased/decreased/active.
    pub fn most_named(
        &self,
        channel: &str,
        kind: &str,
        limit: u32,
    ) -> KarmaResult<Vec<RankedEntry>> {
        let kind = kind
            .parse::<MostKind>()
            .map_err(|err| KarmaError::InvalidArgument(err.to_string()))?;
        self.most(channel, kind, limit)
    }

    /// Resets both counters of `name` to zero, keeping the row.
    pub fn clear(&self, channel: &str, name: &str) -> KarmaResult<()> {
        self.with_karma(channel, |repo| repo.clear(name))?;
        info!("event=karma_clear module=queries status=ok");
        Ok(())
    }

    pub fn aliases_of(&self, channel: &str, name: &str) -> KarmaResult<Vec<String>> {
        self.with_aliases(channel, |repo| repo.aliases_of(name))
    }

    /// Writes every karma row of `channel` to `path` atomically.
    pub fn dump_karma(&self, channel: &str, path: &Path) -> KarmaResult<usize> {
        let records = self.with_karma(channel, |repo| repo.list_records())?;
        write_atomically(path, |file| encode_karma(file, &records))?;
        info!(
            "event=dump module=queries status=ok schema=karma rows={}",
            records.len()
        );
        Ok(records.len())
    }

    /// Replaces every karma row of `channel` with the contents of `path`.
    pub fn load_karma(&self, channel: &str, path: &Path) -> KarmaResult<usize> {
        let records: Vec<KarmaRecord> = decode_karma(open_for_load(path)?)?;
        self.with_karma(channel, |repo| repo.replace_all(&records))?;
        info!(
            "event=load module=queries status=ok schema=karma rows={}",
            records.len()
        );
        Ok(records.len())
    }

    /// Writes every alias row of `channel` to `path` atomically.
    pub fn dump_aliases(&self, channel: &str, path: &Path) -> KarmaResult<usize> {
        let records = self.with_aliases(channel, |repo| repo.list_records())?;
        write_atomically(path, |file| encode_aliases(file, &records))?;
        info!(
            "event=dump module=queries status=ok schema=alias rows={}",
            records.len()
        );
        Ok(records.len())
    }

    /// Replaces every alias row of `channel` with the contents of `path`.
    pub fn load_aliases(&self, channel: &str, path: &Path) -> KarmaResult<usize> {
        let records: Vec<AliasRecord> = decode_aliases(open_for_load(path)?)?;
        self.with_aliases(channel, |repo| repo.replace_all(&records))?;
        info!(
            "event=load module=queries status=ok schema=alias rows={}",
            records.len()
        );
        Ok(records.len())
    }

    /// Reply of `karma [thing...]` as asked by `caller`.
    ///
    /// - No things: highest/lowest lists plus the caller's rank.
    /// - One thing: its counters (terse with `simple_output`).
    /// - Several things: totals of the known ones, then the neutral ones.
    pub fn karma_reply(
        &self,
        channel: &str,
        caller: &str,
        things: &[String],
    ) -> KarmaResult<Reply> {
        let settings = self.settings(channel);
        match things {
            [] => self.ranking_reply(channel, caller, settings.ranking_display),
            [thing] => {
                let reply = match self.karma(channel, thing)? {
                    None => format!("{thing} has neutral karma."),
                    Some(counts) if settings.simple_output => {
                        format!("{thing}: {}", counts.total())
                    }
                    Some(counts) => format!(
                        "Karma for {} has been increased {} and decreased {} for a total karma of {}.",
                        quoted(thing),
                        times(counts.added),
                        times(counts.subtracted),
                        counts.total()
                    ),
                };
                Ok(Reply::Message(reply))
            }
            _ => {
                let lookup = self.karma_many(channel, things)?;
                if lookup.found.is_empty() {
                    return Ok(Reply::Message(
                        "I didn't know the karma for any of those things.".to_string(),
                    ));
                }
                let found: Vec<String> = lookup
                    .found
                    .iter()
                    .map(|entry| format!("{}: {}", entry.name, entry.value))
                    .collect();
                let mut reply = join_list(&found);
                if !lookup.neutral.is_empty() {
                    let verb = if lookup.neutral.len() == 1 { "has" } else { "have" };
                    reply.push_str(&format!(
                        ".  {} {verb} neutral karma",
                        join_list(&lookup.neutral)
                    ));
                }
                reply.push('.');
                Ok(Reply::Message(reply))
            }
        }
    }

    /// Reply of `most <kind>`.
    pub fn most_reply(&self, channel: &str, kind: MostKind) -> KarmaResult<Reply> {
        let limit = self.settings(channel).most_display;
        let entries = self.most(channel, kind, limit)?;
        if entries.is_empty() {
            return Ok(Reply::Error(NO_KARMA_ERROR.to_string()));
        }
        let items: Vec<String> = entries
            .iter()
            .map(|entry| format!("{}: {}", quoted(&entry.name), entry.value))
            .collect();
        Ok(Reply::Message(join_list(&items)))
    }

    /// Reply of `showaliases <word>`.
    pub fn showaliases_reply(&self, channel: &str, name: Option<&str>) -> KarmaResult<Reply> {
        let Some(name) = name.filter(|value| !value.trim().is_empty()) else {
            return Ok(Reply::Message(
                "Give me *something*!  A nick, a word, anything!".to_string(),
            ));
        };
        let aliases = self.aliases_of(channel, name)?;
        if aliases.is_empty() {
            return Ok(Reply::Message(format!("{name} doesn't have any aliases!")));
        }
        Ok(Reply::Message(format!(
            "{name} is known as {}.",
            join_list(&aliases)
        )))
    }

    /// Reply of `clear <name>`.
    pub fn clear_reply(&self, channel: &str, name: &str) -> KarmaResult<Reply> {
        self.clear(channel, name)?;
        Ok(Reply::Message(SUCCESS_REPLY.to_string()))
    }

    /// Reply of `dump <filename>` for one dataset of `channel`.
    ///
    /// Relative names land in the data directory.
    pub fn dump_reply(
        &self,
        channel: &str,
        schema: Schema,
        file_name: impl AsRef<Path>,
    ) -> KarmaResult<Reply> {
        let path = self.config().resolve_data_path(file_name);
        match schema {
            Schema::Karma => self.dump_karma(channel, &path)?,
            Schema::Alias => self.dump_aliases(channel, &path)?,
        };
        Ok(Reply::Message(SUCCESS_REPLY.to_string()))
    }

    /// Reply of `load <filename>` for one dataset of `channel`.
    pub fn load_reply(
        &self,
        channel: &str,
        schema: Schema,
        file_name: impl AsRef<Path>,
    ) -> KarmaResult<Reply> {
        let path = self.config().resolve_data_path(file_name);
        match schema {
            Schema::Karma => self.load_karma(channel, &path)?,
            Schema::Alias => self.load_aliases(channel, &path)?,
        };
        Ok(Reply::Message(SUCCESS_REPLY.to_string()))
    }

    fn ranking_reply(&self, channel: &str, caller: &str, limit: u32) -> KarmaResult<Reply> {
        let highest = self.top(channel, limit)?;
        let lowest = self.bottom(channel, limit)?;
        if highest.is_empty() || lowest.is_empty() {
            return Ok(Reply::Error(NO_KARMA_ERROR.to_string()));
        }

        let render = |entries: &[RankedEntry]| -> String {
            let items: Vec<String> = entries
                .iter()
                .map(|entry| format!("{} ({})", quoted(&entry.name), entry.value))
                .collect();
            join_list(&items)
        };
        let rank = match self.rank(channel, caller)? {
            Some(rank) => format!(
                "  You ({caller}) are ranked {rank} out of {}.",
                self.size(channel)?
            ),
            None => String::new(),
        };
        Ok(Reply::Message(format!(
            "Highest karma: {}.  Lowest karma: {}.{rank}",
            render(&highest),
            render(&lowest)
        )))
    }
}

fn open_for_load(path: &Path) -> KarmaResult<BufReader<File>> {
    let file = File::open(path).map_err(|err| KarmaError::Transfer(err.into()))?;
    Ok(BufReader::new(file))
}
