//! `ksg-cli queue` — task queue operations (spec §4.5): enqueue, list,
//! dequeue, and status transitions against the running `AppContext`'s
//! default `TaskQueue`.

use std::io::Write;

use clap::Subcommand;
use ksg_core::queue::{EnqueueRequest, QueueState};
use serde::Serialize;
use serde_json::Value;

use crate::output::{Output, OutputFormat};

use super::{parse_uuid, AppContext};

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Enqueue a new `QueueItem`.
    Enqueue {
        /// Higher runs sooner. Defaults to 0.
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Arbitrary JSON payload carried on the item.
        #[arg(long)]
        payload: Option<String>,
        /// Procedure to run when this item is dequeued.
        #[arg(long)]
        runs_procedure: Option<String>,
    },
    /// List items currently eligible to run (`queued` and `notBefore <= now`).
    List,
    /// Pop the head item and transition it to `running`.
    Dequeue,
    /// Force a state transition (`queued`, `running`, `done`, `failed`).
    UpdateStatus { id: String, state: String },
}

#[derive(Debug, Serialize)]
struct ItemOutput {
    id: String,
    priority: i64,
    state: String,
    not_before: Option<String>,
}

impl Output for ItemOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}  priority={}  state={}", self.id, self.priority, self.state)
    }
}

#[derive(Debug, Serialize)]
struct ListOutput {
    items: Vec<ItemOutput>,
}

impl Output for ListOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.items.is_empty() {
            return writeln!(writer, "(queue empty)");
        }
        for item in &self.items {
            item.write_human(&mut writer)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    id: String,
    updated: bool,
}

impl Output for StatusOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{} -> updated", self.id)
    }
}

fn parse_state(raw: &str) -> anyhow::Result<QueueState> {
    match raw {
        "queued" => Ok(QueueState::Queued),
        "running" => Ok(QueueState::Running),
        "done" => Ok(QueueState::Done),
        "failed" => Ok(QueueState::Failed),
        other => anyhow::bail!("unknown queue state '{other}', expected queued|running|done|failed"),
    }
}

pub async fn handle_queue_command(command: QueueCommands, ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        QueueCommands::Enqueue { priority, payload, runs_procedure } => {
            let payload: Option<Value> = payload.map(|p| serde_json::from_str(&p)).transpose()?;
            let runs_procedure = runs_procedure.map(|id| parse_uuid(&id)).transpose()?;
            let id = ctx
                .queue
                .enqueue(EnqueueRequest { priority, not_before: None, task_ref: None, runs_procedure, payload })
                .await?;
            format.print_output(&StatusOutput { id: id.to_string(), updated: true })?;
        }
        QueueCommands::List => {
            let items = ctx.queue.list_items().await?;
            let output = ListOutput {
                items: items
                    .into_iter()
                    .map(|node| ItemOutput {
                        id: node.id.to_string(),
                        priority: node.get_f64("priority").unwrap_or(0.0) as i64,
                        state: node.get_str("state").unwrap_or("queued").to_string(),
                        not_before: node.get_str("notBefore").map(str::to_string),
                    })
                    .collect(),
            };
            format.print_output(&output)?;
        }
        QueueCommands::Dequeue => match ctx.queue.dequeue().await? {
            Some(node) => {
                format.print_output(&ItemOutput {
                    id: node.id.to_string(),
                    priority: node.get_f64("priority").unwrap_or(0.0) as i64,
                    state: node.get_str("state").unwrap_or("running").to_string(),
                    not_before: node.get_str("notBefore").map(str::to_string),
                })?;
            }
            None => println!("(queue empty)"),
        },
        QueueCommands::UpdateStatus { id, state } => {
            let id = parse_uuid(&id)?;
            let state = parse_state(&state)?;
            ctx.queue.update_status(id, state).await?;
            format.print_output(&StatusOutput { id: id.to_string(), updated: true })?;
        }
    }
    Ok(())
}
