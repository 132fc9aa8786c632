//! `ksg-cli scheduler` — time-rule registration and manual ticking
//! (spec §4.6). Rules are process-lifetime only, same as the rest of
//! `ksg-cli`'s in-process `AppContext`.

use std::io::Write;

use chrono::Utc;
use clap::Subcommand;
use ksg_core::scheduler::TimeRule;
use serde::Serialize;
use serde_json::Value;

use crate::output::{Output, OutputFormat};

use super::{parse_uuid, AppContext};

#[derive(Subcommand, Debug)]
pub enum SchedulerCommands {
    /// Register a fixed-interval rule (`seconds` between fires).
    AddInterval {
        seconds: i64,
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Register a one-shot rule firing at an RFC3339 timestamp.
    AddAt {
        when: String,
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Register a 5-field cron rule (`min hour dom month dow`).
    AddCron {
        expression: String,
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Remove a registered rule.
    RemoveRule { id: String },
    /// Evaluate every registered rule against now (or `--at`) and enqueue
    /// due items.
    Tick {
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct RuleOutput {
    id: String,
}

impl Output for RuleOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}", self.id)
    }
}

#[derive(Debug, Serialize)]
struct TickOutput {
    enqueued: Vec<String>,
}

impl Output for TickOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.enqueued.is_empty() {
            return writeln!(writer, "(no rules fired)");
        }
        writeln!(writer, "enqueued {} item(s):", self.enqueued.len())?;
        for id in &self.enqueued {
            writeln!(writer, "  {id}")?;
        }
        Ok(())
    }
}

pub async fn handle_scheduler_command(
    command: SchedulerCommands,
    ctx: &AppContext,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        SchedulerCommands::AddInterval { seconds, payload } => {
            let payload: Value = serde_json::from_str(&payload)?;
            let id = ctx.scheduler.add_rule(TimeRule::interval(seconds, payload, Utc::now()));
            format.print_output(&RuleOutput { id: id.to_string() })?;
        }
        SchedulerCommands::AddAt { when, payload } => {
            let payload: Value = serde_json::from_str(&payload)?;
            let when = chrono::DateTime::parse_from_rfc3339(&when)?.with_timezone(&Utc);
            let id = ctx.scheduler.add_rule(TimeRule::at(when, payload));
            format.print_output(&RuleOutput { id: id.to_string() })?;
        }
        SchedulerCommands::AddCron { expression, payload } => {
            let payload: Value = serde_json::from_str(&payload)?;
            let id = ctx.scheduler.add_rule(TimeRule::cron(expression, payload, Utc::now()));
            format.print_output(&RuleOutput { id: id.to_string() })?;
        }
        SchedulerCommands::RemoveRule { id } => {
            ctx.scheduler.remove_rule(parse_uuid(&id)?);
        }
        SchedulerCommands::Tick { at } => {
            let now = at
                .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                .transpose()?
                .unwrap_or_else(Utc::now);
            let enqueued = ctx.scheduler.tick(now).await?;
            format.print_output(&TickOutput { enqueued: enqueued.into_iter().map(|id| id.to_string()).collect() })?;
        }
    }
    Ok(())
}
