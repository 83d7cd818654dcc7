//! Karma configuration: data location, logging and per-channel settings.
//!
//! # Responsibility
//! - Deserialize the TOML configuration consumed by hosts.
//! - Resolve the effective settings of one channel (overrides over defaults).
//!
//! # Invariants
//! - Missing keys fall back to defaults; an empty file is a valid config.
//! - Channel override lookup is case-insensitive.

use crate::model::karma::irc_casefold;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_KARMA_MESSAGE_UP: &str = "USER's karma has increased to TOTAL points.";
pub const DEFAULT_KARMA_MESSAGE_DOWN: &str = "USER's karma has decreased to TOTAL points.";
pub const DEFAULT_KARMA_MESSAGE_NONE: &str = "USER's karma is back to neutral (TOTAL points).";

/// Configuration loading failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarmaConfig {
    /// Directory holding one sub-directory per channel.
    pub data_dir: PathBuf,
    pub logging: LoggingConfig,
    /// Settings applied to every channel without an override.
    pub defaults: ChannelSettings,
    /// Partial per-channel overrides, keyed by channel name.
    pub channels: HashMap<String, ChannelOverrides>,
}

impl Default for KarmaConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            logging: LoggingConfig::default(),
            defaults: ChannelSettings::default(),
            channels: HashMap::new(),
        }
    }
}

impl KarmaConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(ConfigError::Parse)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Effective settings for `channel`.
    pub fn settings_for(&self, channel: &str) -> ChannelSettings {
        let wanted = irc_casefold(channel.trim());
        let overrides = self
            .channels
            .iter()
            .find(|(name, _)| irc_casefold(name.trim()) == wanted)
            .map(|(_, overrides)| overrides);

        match overrides {
            Some(overrides) => overrides.apply(&self.defaults),
            None => self.defaults.clone(),
        }
    }

    /// Resolves a dump/load filename: relative paths land in `data_dir`.
    pub fn resolve_data_path(&self, file_name: impl AsRef<Path>) -> PathBuf {
        let file_name = file_name.as_ref();
        if file_name.is_absolute() {
            file_name.to_path_buf()
        } else {
            self.data_dir.join(file_name)
        }
    }
}

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute log directory; logging stays off when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

/// Behavior knobs for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Whether users may adjust karma of their own nick.
    pub allow_self_rating: bool,
    /// Whether unaddressed chat text is scanned for karma tokens.
    pub allow_unaddressed_karma: bool,
    /// Whether implicit karma changes get a reply.
    pub response: bool,
    /// Terse `name: total` replies for single lookups.
    pub simple_output: bool,
    /// Entries shown in each of the highest/lowest lists.
    pub ranking_display: u32,
    /// Entries shown by `most`.
    pub most_display: u32,
    pub karma_message_up: String,
    pub karma_message_down: String,
    pub karma_message_none: String,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            allow_self_rating: false,
            allow_unaddressed_karma: true,
            response: true,
            simple_output: false,
            ranking_display: 3,
            most_display: 25,
            karma_message_up: DEFAULT_KARMA_MESSAGE_UP.to_string(),
            karma_message_down: DEFAULT_KARMA_MESSAGE_DOWN.to_string(),
            karma_message_none: DEFAULT_KARMA_MESSAGE_NONE.to_string(),
        }
    }
}

/// Partial channel settings; `None` inherits the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOverrides {
    pub allow_self_rating: Option<bool>,
    pub allow_unaddressed_karma: Option<bool>,
    pub response: Option<bool>,
    pub simple_output: Option<bool>,
    pub ranking_display: Option<u32>,
    pub most_display: Option<u32>,
    pub karma_message_up: Option<String>,
    pub karma_message_down: Option<String>,
    pub karma_message_none: Option<String>,
}

impl ChannelOverrides {
    fn apply(&self, defaults: &ChannelSettings) -> ChannelSettings {
        ChannelSettings {
            allow_self_rating: self.allow_self_rating.unwrap_or(defaults.allow_self_rating),
            allow_unaddressed_karma: self
                .allow_unaddressed_karma
                .unwrap_or(defaults.allow_unaddressed_karma),
            response: self.response.unwrap_or(defaults.response),
            simple_output: self.simple_output.unwrap_or(defaults.simple_output),
            ranking_display: self.ranking_display.unwrap_or(defaults.ranking_display),
            most_display: self.most_display.unwrap_or(defaults.most_display),
            karma_message_up: self
                .karma_message_up
                .clone()
                .unwrap_or_else(|| defaults.karma_message_up.clone()),
            karma_message_down: self
                .karma_message_down
                .clone()
                .unwrap_or_else(|| defaults.karma_message_down.clone()),
            karma_message_none: self
                .karma_message_none
                .clone()
                .unwrap_or_else(|| defaults.karma_message_none.clone()),
        }
    }
}
