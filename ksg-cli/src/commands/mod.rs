//! Command dispatch. Each submodule owns one domain's `clap::Subcommand`
//! enum and a `handle_*_command` entry point, following the teacher's
//! `handle_<domain>_command(command, &memory, &config, format, dry_run)`
//! dispatch shape.

mod chat;
mod config_cmd;
mod context;
mod health;
mod ksg_cmd;
mod procedure;
mod queue;
mod scheduler;

pub use chat::{handle_chat_command, ChatCommands};
pub use config_cmd::{handle_config_command, ConfigCommands};
pub use context::AppContext;
pub use health::{handle_health_command, HealthCommands};
pub use ksg_cmd::{handle_ksg_command, KsgCommands};
pub use procedure::{handle_procedure_command, ProcedureCommands};
pub use queue::{handle_queue_command, QueueCommands};
pub use scheduler::{handle_scheduler_command, SchedulerCommands};

use uuid::Uuid;

/// Shared `--uuid`-style argument parsing for every subcommand that
/// takes a node id on the command line.
pub(crate) fn parse_uuid(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| anyhow::anyhow!("invalid uuid '{raw}': {e}"))
}
