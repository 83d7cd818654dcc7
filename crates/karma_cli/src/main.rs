//! Command-line host for the karma engine.
//!
//! # Responsibility
//! - Feed one chat line or command into `karma_core` per invocation.
//! - Print the replies a chat host would send to the channel.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use karma_core::{ChannelMembers, KarmaConfig, KarmaEngine, MessageContext, MostKind, Reply, Schema};

#[derive(Parser)]
#[command(name = "karma", version, about = "Per-channel karma tracker")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the configured one
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Channel the command runs in
    #[arg(short, long, global = true, default_value = "#default")]
    channel: String,

    /// Nick of the user issuing the command
    #[arg(short, long, global = true, default_value = "operator")]
    nick: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a chat line as if it was said in the channel
    Message {
        /// Raw message text
        text: String,

        /// Treat the line as addressed to the bot
        #[arg(short, long)]
        addressed: bool,

        /// Nick present in the channel (repeatable)
        #[arg(short, long = "member")]
        members: Vec<String>,
    },

    /// Show karma of things, or the rankings when none are given
    Karma {
        things: Vec<String>,
    },

    /// List the most increased, decreased or active things
    Most {
        kind: CliMostKind,
    },

    /// Show the aliases of a word
    Showaliases {
        word: Option<String>,
    },

    /// Reset the counters of a thing
    Clear {
        name: String,
    },

    /// Write the channel dataset to a CSV file
    Dump {
        file: PathBuf,

        /// Dump the alias table instead of karma
        #[arg(long)]
        aliases: bool,
    },

    /// Replace the channel dataset with a CSV file
    Load {
        file: PathBuf,

        /// Load the alias table instead of karma
        #[arg(long)]
        aliases: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum CliMostKind {
    Increased,
    Decreased,
    Active,
}

impl From<CliMostKind> for MostKind {
    fn from(val: CliMostKind) -> Self {
        match val {
            CliMostKind::Increased => MostKind::Increased,
            CliMostKind::Decreased => MostKind::Decreased,
            CliMostKind::Active => MostKind::Active,
        }
    }
}

fn load_config(cli: &Cli) -> Result<KarmaConfig> {
    let mut config = match &cli.config {
        Some(path) => KarmaConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => KarmaConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn dataset(aliases: bool) -> Schema {
    if aliases {
        Schema::Alias
    } else {
        Schema::Karma
    }
}

fn print_replies(replies: &[Reply]) {
    for reply in replies {
        match reply {
            Reply::Message(text) => println!("{text}"),
            Reply::Error(text) => eprintln!("error: {text}"),
        }
    }
}

fn run(engine: &KarmaEngine, cli: Cli) -> Result<()> {
    let channel = cli.channel.as_str();
    let replies = match cli.command {
        Commands::Message {
            text,
            addressed,
            members,
        } => {
            let mut ctx = MessageContext::new(channel, cli.nick.as_str(), text);
            if addressed {
                ctx = ctx.addressed();
            }
            engine.handle_message(&ctx, &ChannelMembers::new(&members))?
        }
        Commands::Karma { things } => vec![engine.karma_reply(channel, &cli.nick, &things)?],
        Commands::Most { kind } => vec![engine.most_reply(channel, kind.into())?],
        Commands::Showaliases { word } => vec![engine.showaliases_reply(channel, word.as_deref())?],
        Commands::Clear { name } => vec![engine.clear_reply(channel, &name)?],
        Commands::Dump { file, aliases } => {
            vec![engine.dump_reply(channel, dataset(aliases), &file)?]
        }
        Commands::Load { file, aliases } => {
            vec![engine.load_reply(channel, dataset(aliases), &file)?]
        }
    };
    print_replies(&replies);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    karma_core::init_from_config(&config.logging)
        .map_err(anyhow::Error::msg)
        .context("failed to start logging")?;

    let engine = KarmaEngine::open(config);
    let outcome = run(&engine, cli);
    engine.close().context("failed to close channel databases")?;
    outcome
}
