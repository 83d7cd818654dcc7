//! Chat message tokenizer for karma and alias declarations.
//!
//! # Responsibility
//! - Extract `thing++` / `thing--` operations from whitespace tokens.
//! - Detect `X is also known as Y` and `X is no longer known as Y` phrases.
//! - Resolve the trailing-`--` ambiguity against the live member list.
//!
//! # Invariants
//! - Pure: no storage access, no normalization beyond member matching.
//! - Output order is karma tokens (message order), then alias, then unalias.
//! - A token that literally equals a channel member is never a decrement.

use crate::model::karma::{irc_casefold, Direction};
use std::collections::HashSet;

const ALIAS_PHRASE: &str = "is also known as";
const UNALIAS_PHRASE: &str = "is no longer known as";

/// One operation extracted from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOp {
    Karma { thing: String, direction: Direction },
    Alias { name: String, alias: String },
    Unalias { name: String, alias: String },
}

/// Nicknames currently present in a channel, compared with IRC casemapping.
#[derive(Debug, Clone, Default)]
pub struct ChannelMembers {
    folded: HashSet<String>,
}

impl ChannelMembers {
    pub fn new<I, S>(nicks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            folded: nicks
                .into_iter()
                .map(|nick| irc_casefold(nick.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.folded.contains(&irc_casefold(nick))
    }

    pub fn len(&self) -> usize {
        self.folded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folded.is_empty()
    }
}

/// Runs every pass over `text`: karma tokens, alias and unalias phrases.
pub fn parse_message(text: &str, members: &ChannelMembers) -> Vec<MessageOp> {
    let mut ops = parse_karma_tokens(text, members);
    ops.extend(parse_alias(text));
    ops.extend(parse_unalias(text));
    ops
}

/// Extracts karma operations from whitespace-separated tokens.
pub fn parse_karma_tokens(text: &str, members: &ChannelMembers) -> Vec<MessageOp> {
    text.split_whitespace()
        .filter_map(|token| karma_op(token, members))
        .collect()
}

/// Whether the last token ends in `++` or `--`.
///
/// Addressed messages only count as karma when this holds.
pub fn ends_with_karma_token(text: &str) -> bool {
    text.split_whitespace()
        .next_back()
        .is_some_and(|token| token.ends_with("++") || token.ends_with("--"))
}

/// Parses `<name> is also known as <alias>`.
pub fn parse_alias(text: &str) -> Option<MessageOp> {
    split_phrase(text, ALIAS_PHRASE).map(|(name, alias)| MessageOp::Alias { name, alias })
}

/// Parses `<name> is no longer known as <alias>`.
pub fn parse_unalias(text: &str) -> Option<MessageOp> {
    split_phrase(text, UNALIAS_PHRASE).map(|(name, alias)| MessageOp::Unalias { name, alias })
}

fn karma_op(token: &str, members: &ChannelMembers) -> Option<MessageOp> {
    if let Some((thing, _)) = token.split_once("++") {
        return karma(thing, Direction::Up);
    }

    if !token.contains("--") || members.contains(token) {
        return None;
    }

    let without_suffix = drop_last_chars(token, 2);
    let thing = if members.contains(without_suffix) {
        without_suffix
    } else {
        token.split_once("--").map_or(token, |(head, _)| head)
    };
    karma(thing, Direction::Down)
}

fn karma(thing: &str, direction: Direction) -> Option<MessageOp> {
    let thing = thing.trim();
    if thing.is_empty() {
        return None;
    }
    Some(MessageOp::Karma {
        thing: thing.to_string(),
        direction,
    })
}

fn split_phrase(text: &str, phrase: &str) -> Option<(String, String)> {
    let (before, after) = text.split_once(phrase)?;
    let name = before.split_whitespace().next_back()?;
    let alias = after.split_whitespace().next()?;
    Some((name.to_string(), alias.to_string()))
}

fn drop_last_chars(token: &str, count: usize) -> &str {
    let mut chars = token.chars();
    for _ in 0..count {
        chars.next_back();
    }
    chars.as_str()
}
