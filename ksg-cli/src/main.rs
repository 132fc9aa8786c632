use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};

mod commands;
mod config;
mod errors;
mod output;

use commands::*;
use config::CliConfig;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "ksg-cli")]
#[command(about = "Command-line interface for the procedural learning agent")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit free text to the agent loop (spec §4.9).
    Chat(ChatCommands),
    /// Direct knowledge-graph operations (spec §4.2).
    Ksg {
        #[command(subcommand)]
        command: KsgCommands,
    },
    /// Procedure subsystem operations (spec §4.3).
    Procedure {
        #[command(subcommand)]
        command: ProcedureCommands,
    },
    /// Task queue operations (spec §4.5).
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Time-rule scheduler operations (spec §4.6).
    Scheduler {
        #[command(subcommand)]
        command: SchedulerCommands,
    },
    /// Inspect and validate configuration (spec §6.4).
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Store/queue reachability check, standing in for `GET /health`
    /// (spec §6.3).
    Health(HealthCommands),
    /// Generate shell completion scripts.
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let cli_config = CliConfig::load(cli.config.as_deref())?;
    cli_config.validate()?;

    // `config show`/`config validate` and shell completion only need the
    // file-level settings, not a full agent deployment, so they are
    // handled before `AppContext` is built.
    let command = match cli.command {
        Commands::Config { command } => {
            return handle_config_command(command, &cli_config, cli.format).await;
        }
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "ksg-cli", &mut std::io::stdout());
            return Ok(());
        }
        other => other,
    };

    let ctx = AppContext::build(&cli_config).await?;

    match command {
        Commands::Chat(args) => handle_chat_command(args, &ctx, cli.format).await,
        Commands::Ksg { command } => handle_ksg_command(command, &ctx, cli.format).await,
        Commands::Procedure { command } => handle_procedure_command(command, &ctx, cli.format).await,
        Commands::Queue { command } => handle_queue_command(command, &ctx, cli.format).await,
        Commands::Scheduler { command } => handle_scheduler_command(command, &ctx, cli.format).await,
        Commands::Health(args) => handle_health_command(args, &ctx, cli.format).await,
        Commands::Config { .. } | Commands::Completion { .. } => unreachable!("handled above"),
    }
}
