use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Watches a feed and mirrors dated posts into a calendar and a chat channel.
#[derive(Parser, Debug, Clone)]
#[command(name = "courier", version, about, long_about = None)]
pub struct Cli {
    /// Log outgoing calendar and chat calls instead of making them; state
    /// files are read but never written.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Directory holding config.toml and the secret files.
    #[arg(long, global = true, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Provision the calendar, then poll the feed until interrupted.
    Run,
    /// Run a single reconciliation pass and exit.
    Once,
    /// Converge the calendar's ACL onto the configured rules.
    #[command(name = "sync-acl")]
    SyncAcl,
    /// Show how a title and body would be rewritten, without any side effects.
    Extract(ExtractArgs),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Args)]
pub struct ExtractArgs {
    #[arg(long)]
    pub title: String,

    /// A content block; repeat for several blocks.
    #[arg(long = "body", value_name = "TEXT")]
    pub body: Vec<String>,

    /// IANA zone for times without one (defaults to the configured zone).
    #[arg(long, value_name = "ZONE")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print the resolved configuration and state paths.
    Path,
    /// Write a config.toml filled with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}
