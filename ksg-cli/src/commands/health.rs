//! `ksg-cli health` — a lightweight status check: confirms the store is
//! reachable and reports the seeded prototype count, standing in for the
//! `GET /health` operation spec §6.3 names without a listening server.

use std::io::Write;

use clap::Args;
use ksg_core::store::SearchFilter;
use ksg_core::types::NodeKind;
use serde::Serialize;

use crate::output::{Output, OutputFormat};

use super::AppContext;

#[derive(Args, Debug)]
pub struct HealthCommands;

#[derive(Debug, Serialize)]
struct HealthOutput {
    store_reachable: bool,
    prototype_count: usize,
    queue_depth: usize,
}

impl Output for HealthOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "store:      {}", if self.store_reachable { "reachable" } else { "unreachable" })?;
        writeln!(writer, "prototypes: {}", self.prototype_count)?;
        writeln!(writer, "queue:      {} queued item(s)", self.queue_depth)?;
        Ok(())
    }
}

pub async fn handle_health_command(_args: HealthCommands, ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    let prototypes = ctx.ksg.store().search(&SearchFilter::by_kind(NodeKind::Prototype.as_str()), None, 1000, 0.0).await;
    let output = match prototypes {
        Ok(hits) => {
            let queue_depth = ctx.queue.list_items().await.map(|items| items.len()).unwrap_or(0);
            HealthOutput {
                store_reachable: true,
                prototype_count: hits.len(),
                queue_depth,
            }
        }
        Err(_) => HealthOutput { store_reachable: false, prototype_count: 0, queue_depth: 0 },
    };
    format.print_output(&output)?;
    Ok(())
}
