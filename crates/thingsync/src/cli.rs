//! Clap derive structures for the `thingsync` CLI.
//!
//! Kept free of crate-local imports so `build.rs` can include it to render
//! man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// thingsync -- push SmartThings device events into a local hub
#[derive(Debug, Parser)]
#[command(
    name = "thingsync",
    version,
    about = "Bridge SmartThings device events into a local home-automation hub",
    long_about = "Registers a webhook SmartApp with SmartThings, installs it into a\n\
        location, and keeps its capability subscriptions in line with the\n\
        devices that location actually has.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "THINGSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// SmartThings personal access token
    #[arg(long, env = "THINGSYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "THINGSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register the SmartApp and install it into a location
    Setup(SetupArgs),

    /// Serve the webhook and keep subscriptions in sync
    Serve(ServeArgs),

    /// Run one subscription sync pass per installation
    Sync(SyncArgs),

    /// Inspect installed app subscriptions
    #[command(alias = "subs")]
    Subscriptions(SubscriptionsArgs),

    /// List locations visible to the access token
    #[command(alias = "loc")]
    Locations(LocationsArgs),

    /// Manage locally recorded installations
    #[command(alias = "inst")]
    Installations(InstallationsArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Setup / Serve / Sync ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Externally reachable base URL (saved as webhook.public_url)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Local address for the webhook server while setup runs
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Local address to bind (overrides webhook.bind)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Only sync this installed app
    #[arg(long)]
    pub installed_app_id: Option<String>,
}

// ── Subscriptions ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SubscriptionsArgs {
    #[command(subcommand)]
    pub command: SubscriptionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionsCommand {
    /// List subscriptions of recorded installations
    #[command(alias = "ls")]
    List {
        /// Only list this installed app
        #[arg(long)]
        installed_app_id: Option<String>,
    },
}

// ── Locations ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LocationsArgs {
    #[command(subcommand)]
    pub command: LocationsCommand,
}

#[derive(Debug, Subcommand)]
pub enum LocationsCommand {
    /// List locations
    #[command(alias = "ls")]
    List,
}

// ── Installations ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InstallationsArgs {
    #[command(subcommand)]
    pub command: InstallationsCommand,
}

#[derive(Debug, Subcommand)]
pub enum InstallationsCommand {
    /// List recorded installations
    #[command(alias = "ls")]
    List,

    /// Forget a recorded installation
    #[command(alias = "rm")]
    Remove {
        /// Installed app ID
        installed_app_id: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive configuration wizard
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
