use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod agent;
mod config;
mod llm;
mod mcp;
mod storage;
mod tools;
mod transport;

use config::Config;
use transport::cli::OutputFormat;

#[derive(Parser)]
#[command(name = "sqlmcp")]
#[command(
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SQLMCP_GIT_HASH"), ")"),
    about = "Chat with a local LLM that reads and writes a SQLite database over MCP",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP tool server over the SQLite database
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,

        /// Do not expose the raw SQL tools (add_data, read_data)
        #[arg(long)]
        no_raw_sql: bool,
    },

    /// Start the chat web UI (requires a running tool server)
    Chat {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// MCP endpoint of the tool server
        #[arg(long)]
        server_url: Option<String>,

        /// Ollama model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ask a single question from the terminal
    Ask {
        /// Message to send
        message: String,

        /// MCP endpoint of the tool server
        #[arg(long)]
        server_url: Option<String>,

        /// Ollama model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show recently logged interactions
    History {
        /// Number of interactions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// MCP endpoint of the tool server
        #[arg(long)]
        server_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "sqlmcp_cli=debug,sqlmcp=debug,tower_http=debug"
    } else {
        "sqlmcp_cli=info,sqlmcp=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable config: {:#}", e);
            Config::default()
        }),
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            db,
            no_raw_sql,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(db) = db {
                config.server.db_path = db;
            }
            if no_raw_sql {
                config.server.raw_sql = false;
            }
            mcp::run_tool_server(&config.server).await?;
        }
        Commands::Chat {
            host,
            port,
            server_url,
            model,
        } => {
            if let Some(host) = host {
                config.chat.host = host;
            }
            if let Some(port) = port {
                config.chat.port = port;
            }
            apply_client_overrides(&mut config, server_url, model);
            transport::run_chat_server(&config).await?;
        }
        Commands::Ask {
            message,
            server_url,
            model,
        } => {
            apply_client_overrides(&mut config, server_url, model);
            transport::cli::run_ask(&config, &message).await?;
        }
        Commands::History {
            limit,
            format,
            server_url,
        } => {
            apply_client_overrides(&mut config, server_url, None);
            transport::cli::run_history(&config, limit, format).await?;
        }
    }

    Ok(())
}

fn apply_client_overrides(config: &mut Config, server_url: Option<String>, model: Option<String>) {
    if let Some(url) = server_url {
        config.chat.server_url = url;
    }
    if let Some(model) = model {
        config.llm.ollama.model = model;
    }
}
