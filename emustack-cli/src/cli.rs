//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// emustack -- run a LocalStack emulator container as a test fixture.
///
/// Use `emustack <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "emustack", version, about, long_about = None)]
pub struct Cli {
    /// Path to the emustack.toml configuration file (defaults apply if absent).
    #[arg(short, long, default_value = "emustack.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the fixture and keep it running until Ctrl-C.
    Up(UpArgs),

    /// Show running emulator containers of the configured image.
    Status,

    /// Probe an emulator endpoint.
    Health(HealthArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- up ----

/// Start the fixture in the foreground.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Replace a fixture this invocation already runs.
    #[arg(short, long)]
    pub force: bool,

    /// Join a running container with the same name instead of failing.
    #[arg(long)]
    pub reuse: bool,

    /// Container name (overrides `fixture.container_name`).
    #[arg(long)]
    pub name: Option<String>,

    /// Image reference (overrides `fixture.image`).
    #[arg(long)]
    pub image: Option<String>,

    /// Directory of init scripts to mount into the emulator.
    #[arg(long, requires = "marker")]
    pub init_dir: Option<PathBuf>,

    /// Log line printed by the init scripts when they finish.
    #[arg(long)]
    pub marker: Option<String>,

    /// Readiness timeout in seconds (0 = wait forever).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Return as soon as the container is started.
    #[arg(long)]
    pub no_wait: bool,
}

// ---- health ----

/// Ask an emulator whether its services are up.
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the emulator.
    #[arg(long, default_value = "http://127.0.0.1:4566")]
    pub endpoint: String,
}

// ---- config ----

/// Manage emustack configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, fixture).
        #[arg(long)]
        section: Option<String>,
    },
}
