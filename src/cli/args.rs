//! CLI argument definitions using clap derive

use crate::network::Method;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// swcache - offline caching agent
///
/// Pre-caches an application's resources into versioned buckets, serves
/// requests cache-first, and clears old versions on activation.
#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Bucket directory (overrides storage.dir)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Skip local .swcache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pre-cache the manifest into this version's bucket
    Install,

    /// Delete buckets from other versions
    Activate,

    /// Install then activate through a registration
    Deploy,

    /// Resolve one request the way the interceptor would
    Fetch(FetchArgs),

    /// List cache buckets
    Buckets(BucketsArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// URL or path relative to agent.scope
    pub url: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET", value_parser = parse_method)]
    pub method: Method,

    /// Request body
    #[arg(short = 'd', long)]
    pub body: Option<String>,

    /// Write the response body to stdout
    #[arg(short = 'o', long)]
    pub output: bool,
}

/// Arguments for the buckets command
#[derive(Parser, Debug)]
pub struct BucketsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., agent.version)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local .swcache.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

fn parse_method(s: &str) -> Result<Method, String> {
    s.parse::<Method>().map_err(|e| e.to_string())
}
