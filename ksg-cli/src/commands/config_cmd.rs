//! `ksg-cli config` — inspect and validate the resolved configuration
//! (spec §6.4), mirroring the teacher's `config show`/`config validate`
//! shape without a mutating `config set` (settings here are environment-
//! driven per spec §6.4, not a writable store).

use std::io::Write;

use clap::Subcommand;
use serde::Serialize;

use crate::config::CliConfig;
use crate::output::{Output, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the resolved CLI and core configuration.
    Show,
    /// Validate the resolved configuration without running anything.
    Validate,
}

#[derive(Debug, Serialize)]
struct ConfigOutput {
    backend: String,
    store_path: Option<String>,
    default_format: String,
    reuse_threshold: f32,
    plan_min_confidence: f32,
    max_adapt_attempts: u32,
    skip_llm_for_obvious_intents: bool,
}

impl Output for ConfigOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "backend:                      {}", self.backend)?;
        writeln!(writer, "store_path:                   {}", self.store_path.as_deref().unwrap_or("(none)"))?;
        writeln!(writer, "default_format:               {}", self.default_format)?;
        writeln!(writer, "reuse_threshold:              {}", self.reuse_threshold)?;
        writeln!(writer, "plan_min_confidence:          {}", self.plan_min_confidence)?;
        writeln!(writer, "max_adapt_attempts:           {}", self.max_adapt_attempts)?;
        writeln!(writer, "skip_llm_for_obvious_intents: {}", self.skip_llm_for_obvious_intents)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    valid: bool,
    error: Option<String>,
}

impl Output for ValidateOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        match &self.error {
            None => writeln!(writer, "configuration is valid"),
            Some(err) => writeln!(writer, "configuration is invalid: {err}"),
        }
        .map_err(Into::into)
    }
}

pub async fn handle_config_command(
    command: ConfigCommands,
    cli_config: &CliConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => {
            let core = cli_config.core_config();
            let output = ConfigOutput {
                backend: format!("{:?}", cli_config.backend).to_lowercase(),
                store_path: cli_config.store_path.clone(),
                default_format: cli_config.default_format.clone(),
                reuse_threshold: core.reuse_threshold,
                plan_min_confidence: core.plan_min_confidence,
                max_adapt_attempts: core.max_adapt_attempts,
                skip_llm_for_obvious_intents: core.skip_llm_for_obvious_intents,
            };
            format.print_output(&output)?;
        }
        ConfigCommands::Validate => {
            let output = match cli_config.validate() {
                Ok(()) => ValidateOutput { valid: true, error: None },
                Err(err) => ValidateOutput { valid: false, error: Some(err.to_string()) },
            };
            format.print_output(&output)?;
        }
    }
    Ok(())
}
