//! `ksg-cli ksg` — direct knowledge-graph operations (spec §4.2):
//! creating prototypes/concepts and running a bare similarity search,
//! independent of the agent loop.

use std::io::Write;

use clap::Subcommand;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::output::{Output, OutputFormat};

use super::AppContext;

#[derive(Subcommand, Debug)]
pub enum KsgCommands {
    /// Create a new prototype, optionally inheriting from a parent.
    CreatePrototype {
        name: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Create a concept instance of a named prototype.
    CreateConcept {
        prototype: String,
        /// JSON object of properties, e.g. '{"name":"Ada"}'.
        #[arg(long, default_value = "{}")]
        props: String,
    },
    /// Embedding-ranked search over concepts.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        #[arg(long, default_value_t = 0.0)]
        min_similarity: f32,
    },
}

#[derive(Debug, Serialize)]
struct UuidOutput {
    id: String,
}

impl Output for UuidOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}", self.id)
    }
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: String,
    kind: String,
    props: Value,
}

impl Output for SearchOutput {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.hits.is_empty() {
            return writeln!(writer, "(no matches)");
        }
        for hit in &self.hits {
            writeln!(writer, "{}  {}  {}", hit.id, hit.kind, hit.props)?;
        }
        Ok(())
    }
}

pub async fn handle_ksg_command(command: KsgCommands, ctx: &AppContext, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        KsgCommands::CreatePrototype { name, parent } => {
            let id = ctx.ksg.create_prototype(&name, parent.as_deref(), Vec::new()).await?;
            format.print_output(&UuidOutput { id: id.to_string() })?;
        }
        KsgCommands::CreateConcept { prototype, props } => {
            let prototype_id = ctx
                .ksg
                .find_prototype_by_name(&prototype)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown prototype '{prototype}'"))?
                .id;
            let parsed: Map<String, Value> = serde_json::from_str(&props)?;
            let id = ctx.ksg.create_concept(prototype_id, parsed, None, None).await?;
            format.print_output(&UuidOutput { id: id.to_string() })?;
        }
        KsgCommands::Search { query, top_k, min_similarity } => {
            let hits = ctx.ksg.search_concepts(&query, top_k, None, min_similarity, false).await?;
            let output = SearchOutput {
                hits: hits
                    .into_iter()
                    .map(|node| SearchHit { id: node.id.to_string(), kind: node.kind.clone(), props: Value::Object(node.props) })
                    .collect(),
            };
            format.print_output(&output)?;
        }
    }
    Ok(())
}
