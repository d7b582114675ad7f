//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cmekcheck.toml";

/// cmekcheck -- verifies that an impersonated identity can create a
/// CMEK-protected Secret Manager secret.
///
/// Use `cmekcheck <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "cmekcheck", version, about, long_about = None)]
pub struct Cli {
    /// Path to the cmekcheck.toml configuration file.
    ///
    /// When omitted, `cmekcheck.toml` is used if present, otherwise
    /// built-in defaults plus `CMEKCHECK_*` environment overrides.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Create a key ring, crypto key and CMEK-protected secret as the
    /// impersonated identity.
    Run(RunArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run the provisioning workflow once.
///
/// Identity precedence: flags, then `--terraform-outputs`, then
/// environment, then the configuration file.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Target project id.
    #[arg(long)]
    pub project_id: Option<String>,

    /// Service account email to impersonate.
    #[arg(long)]
    pub impersonate: Option<String>,

    /// `terraform output -json` file providing `project_id` and
    /// `service_account_email`.
    #[arg(long)]
    pub terraform_outputs: Option<PathBuf>,

    /// KMS location for the key ring.
    #[arg(long)]
    pub location: Option<String>,

    /// Retry deadline for key ring creation, in seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

// ---- config ----

/// Manage cmekcheck configuration.
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
        /// Show only a specific section (general, identity, kms,
        /// secret_manager, retry, http, naming).
        #[arg(long)]
        section: Option<String>,
    },
}
