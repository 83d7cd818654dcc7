//! Karma record model.
//!
//! # Responsibility
//! - Define the persisted counter record and its derived total.
//! - Provide closed enumerations for adjustment direction and `most` kinds.
//!
//! # Invariants
//! - `added` and `subtracted` are never negative.
//! - `normalized` is the case-folded `name` and the uniqueness key per channel.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One persisted karma row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaRecord {
    /// Display name as first written (first writer wins on casing).
    pub name: String,
    /// Case-folded storage key.
    pub normalized: String,
    pub added: i64,
    pub subtracted: i64,
}

impl KarmaRecord {
    /// Builds a record keyed by the normalized form of `name`.
    pub fn new(name: impl Into<String>, added: i64, subtracted: i64) -> Self {
        let name = name.into();
        let normalized = normalize_name(&name);
        Self {
            name,
            normalized,
            added,
            subtracted,
        }
    }

    pub fn counts(&self) -> KarmaCounts {
        KarmaCounts {
            added: self.added,
            subtracted: self.subtracted,
        }
    }

    pub fn total(&self) -> i64 {
        self.counts().total()
    }
}

/// Raw counter pair of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaCounts {
    pub added: i64,
    pub subtracted: i64,
}

impl KarmaCounts {
    /// Net karma (`added - subtracted`).
    pub fn total(self) -> i64 {
        self.added - self.subtracted
    }

    /// Whether both counters are zero.
    pub fn is_empty(self) -> bool {
        self.added == 0 && self.subtracted == 0
    }
}

/// `(display name, value)` row returned by ranking queries.
///
/// `value` is the total for `top`/`bottom`/`get_many` and the selected metric
/// for `most`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub name: String,
    pub value: i64,
}

impl RankedEntry {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Result of a bulk lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KarmaLookup {
    /// Known entities sorted by total descending.
    pub found: Vec<RankedEntry>,
    /// Normalized names without a record, sorted ascending.
    pub neutral: Vec<String>,
}

/// Direction of one karma adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Metric selector for the `most` ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MostKind {
    /// Ranks by `added`.
    Increased,
    /// Ranks by `subtracted`.
    Decreased,
    /// Ranks by `added + subtracted`.
    Active,
}

impl MostKind {
    pub const ALL: [MostKind; 3] = [Self::Increased, Self::Decreased, Self::Active];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Active => "active",
        }
    }

    /// SQL expression producing the ranked metric.
    pub(crate) fn metric_sql(self) -> &'static str {
        match self {
            Self::Increased => "added",
            Self::Decreased => "subtracted",
            Self::Active => "added + subtracted",
        }
    }
}

/// Rejected `most` kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMostKind(pub String);

impl Display for InvalidMostKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid kind `{}`; expected increased|decreased|active",
            self.0
        )
    }
}

impl Error for InvalidMostKind {}

impl FromStr for MostKind {
    type Err = InvalidMostKind;

    /// Accepts the full kind name or any unambiguous prefix of it.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(InvalidMostKind(value.to_string()));
        }
        let mut matches = Self::ALL
            .into_iter()
            .filter(|kind| kind.as_str().starts_with(normalized.as_str()));
        match (matches.next(), matches.next()) {
            (Some(kind), None) => Ok(kind),
            _ => Err(InvalidMostKind(value.to_string())),
        }
    }
}

/// Case-folds an entity name into its storage key.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Folds a nick or channel name with IRC (rfc1459) casemapping.
///
/// Beyond lowercasing, `[`, `]`, `\` and `~` fold to `{`, `}`, `|` and `^`.
pub fn irc_casefold(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            other => other,
        })
        .collect()
}

/// Strips one layer of enclosing parentheses, e.g. `(foo bar)` -> `foo bar`.
pub fn strip_enclosing_parens(thing: &str) -> &str {
    if thing.len() >= 2 && thing.starts_with('(') && thing.ends_with(')') {
        &thing[1..thing.len() - 1]
    } else {
        thing
    }
}
