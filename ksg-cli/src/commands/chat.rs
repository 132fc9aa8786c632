//! `ksg-cli chat` — submits one piece of free text to [`AgentLoop::handle`]
//! (spec §4.9) and reports the resulting [`AgentOutcome`].

use std::io::Write;

use clap::Args;
use ksg_core::agent::{AgentOutcome, StepState};
use serde::Serialize;

use crate::output::{Output, OutputFormat};

use super::AppContext;

#[derive(Args, Debug)]
pub struct ChatCommands {
    /// The request text to hand to the agent loop.
    pub input: String,
}

#[derive(Debug, Serialize)]
struct ChatOutput {
    trace_id: String,
    outcome: String,
    detail: String,
    steps: Vec<(String, String)>,
}

impl Output for ChatOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "trace:  {}", self.trace_id)?;
        writeln!(writer, "result: {}", self.outcome)?;
        if !self.detail.is_empty() {
            writeln!(writer, "detail: {}", self.detail)?;
        }
        for (step, state) in &self.steps {
            writeln!(writer, "  - {step}: {state}")?;
        }
        Ok(())
    }
}

fn state_label(state: StepState) -> &'static str {
    match state {
        StepState::Pending => "pending",
        StepState::Running => "running",
        StepState::Success => "success",
        StepState::ToolError => "tool_error",
        StepState::Timeout => "timeout",
        StepState::Failure => "failure",
    }
}

pub async fn handle_chat_command(args: ChatCommands, ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    let outcome = ctx.agent.handle(&args.input).await?;
    let output = match outcome {
        AgentOutcome::Completed { trace_id, run_id, step_states } => ChatOutput {
            trace_id: trace_id.to_string(),
            outcome: "completed".to_string(),
            detail: format!("run {run_id}"),
            steps: step_states.into_iter().map(|(id, state)| (id, state_label(state).to_string())).collect(),
        },
        AgentOutcome::AskUser { trace_id, reason } => ChatOutput {
            trace_id: trace_id.to_string(),
            outcome: "ask_user".to_string(),
            detail: reason,
            steps: Vec::new(),
        },
        AgentOutcome::Answered { trace_id, intent, retrieved } => ChatOutput {
            trace_id: trace_id.to_string(),
            outcome: "answered".to_string(),
            detail: format!("{intent:?}, {} concept(s) retrieved", retrieved.len()),
            steps: Vec::new(),
        },
    };
    format.print_output(&output)?;
    Ok(())
}
