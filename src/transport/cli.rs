//! CLI transport for direct terminal interaction

use super::render::truncate_preview;
use crate::agent::SessionFactory;
use crate::config::Config;
use crate::llm::{LlmProvider, OllamaProvider};
use crate::mcp::{McpClient, RemoteInteractionLog};
use crate::storage::{Interaction, InteractionSink};
use anyhow::{bail, Result};
use colored::Colorize;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

/// Table cells are cut to this many characters
const CELL_PREVIEW_CHARS: usize = 60;

/// Output format for `history`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => bail!("Unknown format '{}'. Use: table, json", other),
        }
    }
}

/// Send one message through the agent and print the reply
pub async fn run_ask(config: &Config, message: &str) -> Result<()> {
    let provider = OllamaProvider::from_config(&config.llm.ollama)?;
    let llm: Arc<dyn LlmProvider> = Arc::new(provider);

    let factory = SessionFactory::connect(config, llm).await?;
    let mut session = factory.create("cli");

    println!("{} {}", ">".bold().cyan(), message);
    let outcome = session.handle_turn(message).await;
    factory.close().await;

    for call in &outcome.tool_calls {
        let marker = if call.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} {}",
            marker,
            call.tool.bold(),
            truncate_preview(&call.args.to_string(), CELL_PREVIEW_CHARS).dimmed()
        );
    }

    println!();
    if outcome.error.is_some() {
        println!("{}", outcome.reply.red());
    } else {
        println!("{}", outcome.reply);
    }
    println!();
    let mut summary = format!(
        "({:.2}s, {} tool calls",
        outcome.elapsed_secs,
        outcome.tool_calls.len()
    );
    if let Some(usage) = &outcome.usage {
        summary.push_str(&format!(", {} tokens", usage.total_tokens));
    }
    summary.push(')');
    println!("{}", summary.dimmed());

    Ok(())
}

/// Print the most recent interactions logged by the tool server
pub async fn run_history(config: &Config, limit: usize, format: OutputFormat) -> Result<()> {
    let client = Arc::new(McpClient::connect(&config.chat.server_url).await?);
    let log = RemoteInteractionLog::new(client.clone(), config.chat.tool_timeout_secs);
    let interactions = log.recent(limit).await;

    if let Err(e) = client.close().await {
        tracing::debug!("Failed to close MCP session: {}", e);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&interactions)?);
        }
        OutputFormat::Table => print_history_table(&interactions),
    }

    Ok(())
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Prompt")]
    prompt: String,
    #[tabled(rename = "Response")]
    response: String,
    #[tabled(rename = "Time (s)")]
    time_taken: String,
}

impl From<&Interaction> for HistoryRow {
    fn from(item: &Interaction) -> Self {
        Self {
            id: item.id,
            timestamp: item.timestamp.clone(),
            prompt: truncate_preview(&item.prompt, CELL_PREVIEW_CHARS),
            response: truncate_preview(&item.response, CELL_PREVIEW_CHARS),
            time_taken: format!("{:.3}", item.time_taken_sec),
        }
    }
}

fn print_history_table(interactions: &[Interaction]) {
    println!("\n{}", "=== RECENT INTERACTIONS ===".bold().cyan());
    println!();

    if interactions.is_empty() {
        println!("{}", "No interactions yet.".dimmed());
        return;
    }

    if let Some(err) = interactions.iter().find(|i| i.is_fetch_error()) {
        println!("{} {}", "Error fetching interactions:".red(), err.response);
        return;
    }

    let rows: Vec<HistoryRow> = interactions.iter().map(HistoryRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    println!();
}
