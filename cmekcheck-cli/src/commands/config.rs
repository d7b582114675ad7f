//! `cmekcheck config` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use cmekcheck_core::config::CmekCheckConfig;

use super::{ConfigSource, load_config};
use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &[&str] = &[
    "general",
    "identity",
    "kms",
    "secret_manager",
    "retry",
    "http",
    "naming",
];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    source: &ConfigSource,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(source, writer).await,
        ConfigAction::Show { section } => execute_show(source, section, writer).await,
    }
}

/// Load and validate the configuration, reporting any errors.
///
/// Identity values are checked too when they are set, since `run` flags may
/// still supply them.
async fn execute_validate(source: &ConfigSource, writer: &OutputWriter) -> Result<(), CliError> {
    info!(source = %source, "validating configuration");

    let mut errors = Vec::new();
    match load_config(source).await {
        Ok(config) => {
            let identity = &config.identity;
            if !identity.project_id.is_empty() || !identity.impersonate_service_account.is_empty()
            {
                if let Err(e) = config.identity() {
                    errors.push(e.to_string());
                }
            }
        }
        Err(e) => errors.push(e.to_string()),
    }

    let report = ConfigValidationReport {
        source: source.to_string(),
        valid: errors.is_empty(),
        errors,
    };
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Display the effective configuration, optionally a single section.
async fn execute_show(
    source: &ConfigSource,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(source = %source, "loading configuration");

    let config = load_config(source).await?;
    let report = ConfigReport::build(source, &config, section)?;
    writer.render(&report)?;
    Ok(())
}

/// Configuration display report.
///
/// `config_toml` is used for text rendering; JSON output carries `config`.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl ConfigReport {
    fn build(
        source: &ConfigSource,
        config: &CmekCheckConfig,
        section: Option<String>,
    ) -> Result<Self, CliError> {
        let full = serde_json::to_value(config)?;
        let value = match &section {
            Some(name) => full.get(name.as_str()).cloned().ok_or_else(|| {
                CliError::Config(format!(
                    "unknown section: {} (expected: {})",
                    name,
                    SECTIONS.join(", ")
                ))
            })?,
            None => full,
        };

        let config_toml = toml::to_string_pretty(&value)
            .unwrap_or_else(|e| format!("(serialization error: {})", e));

        Ok(Self {
            source: source.to_string(),
            section,
            config: value,
            config_toml,
        })
    }
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
