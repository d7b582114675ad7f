//! cmekcheck -- CMEK-protected Secret Manager provisioning check
//!
//! Exit codes follow [`CliError::exit_code`].

mod cli;
mod commands;
mod error;
mod logging;
mod output;
mod outputs;

use clap::Parser;

use cmekcheck_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};
use crate::commands::{load_config, resolve_config_source};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let writer = OutputWriter::new(cli.output);
    let source = resolve_config_source(cli.config.as_deref());

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(&source).await?;
            let mut general = config.general.clone();
            if let Some(level) = cli.log_level {
                general.log_level = level;
            }
            logging::init_tracing(&general)?;
            cmekcheck_core::metrics::describe_all();

            commands::run::execute(args, config, &writer).await?;
        }
        Commands::Config(args) => {
            // Config may be invalid here; log with defaults.
            let mut general = GeneralConfig {
                log_level: "warn".to_owned(),
                ..GeneralConfig::default()
            };
            if let Some(level) = cli.log_level {
                general.log_level = level;
            }
            logging::init_tracing(&general)?;

            commands::config::execute(args, &source, &writer).await?;
        }
    }

    Ok(())
}
