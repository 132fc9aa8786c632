//! `ksg-cli procedure` — procedure-subsystem operations (spec §4.3):
//! reuse search, hydration, and manual run recording, independent of
//! the full agent loop.

use std::io::Write;

use clap::Subcommand;
use serde::Serialize;

use crate::output::{Output, OutputFormat};

use super::{parse_uuid, AppContext};

#[derive(Subcommand, Debug)]
pub enum ProcedureCommands {
    /// List reuse candidates for a request, ranked by similarity.
    Search {
        query: String,
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,
    },
    /// Print a stored procedure's hydrated plan as JSON.
    Show { id: String },
    /// Record a run outcome against a stored procedure without
    /// executing it (for replaying externally-observed results).
    RecordRun {
        id: String,
        #[arg(long)]
        success: bool,
    },
}

#[derive(Debug, Serialize)]
struct ReuseOutput {
    hints: Vec<ReuseEntry>,
}

#[derive(Debug, Serialize)]
struct ReuseEntry {
    procedure_id: String,
    score: f32,
    execute: bool,
}

impl Output for ReuseOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.hints.is_empty() {
            return writeln!(writer, "(no reusable procedures found)");
        }
        for hint in &self.hints {
            writeln!(
                writer,
                "{}  score={:.3}  {}",
                hint.procedure_id,
                hint.score,
                if hint.execute { "execute" } else { "search_only" }
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PlanOutput {
    name: String,
    description: Option<String>,
    step_count: usize,
    plan_json: serde_json::Value,
}

impl Output for PlanOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "name:        {}", self.name)?;
        if let Some(desc) = &self.description {
            writeln!(writer, "description: {desc}")?;
        }
        writeln!(writer, "steps:       {}", self.step_count)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RunOutput {
    run_id: String,
}

impl Output for RunOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "recorded run {}", self.run_id)
    }
}

pub async fn handle_procedure_command(
    command: ProcedureCommands,
    ctx: &AppContext,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        ProcedureCommands::Search { query, min_score } => {
            let hints = ctx.procedures.find_reusable(&query, min_score).await?;
            let output = ReuseOutput {
                hints: hints
                    .into_iter()
                    .map(|h| ReuseEntry {
                        procedure_id: h.procedure_id().to_string(),
                        score: h.score(),
                        execute: matches!(h, ksg_core::procedure::ReuseHint::Execute { .. }),
                    })
                    .collect(),
            };
            format.print_output(&output)?;
        }
        ProcedureCommands::Show { id } => {
            let id = parse_uuid(&id)?;
            let plan = ctx.procedures.hydrate(id).await?;
            let output = PlanOutput {
                name: plan.name.clone(),
                description: plan.description.clone(),
                step_count: plan.steps.len(),
                plan_json: serde_json::to_value(&plan)?,
            };
            format.print_output(&output)?;
        }
        ProcedureCommands::RecordRun { id, success } => {
            let id = parse_uuid(&id)?;
            let run_id = ctx.procedures.record_run(id, success, &[], uuid::Uuid::new_v4()).await?;
            format.print_output(&RunOutput { run_id: run_id.to_string() })?;
        }
    }
    Ok(())
}
