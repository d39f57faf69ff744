use anyhow::Result;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;

use sequential_thinking::{ConfigOverrides, SequentialThinkingConfig, SequentialThinkingService};

#[derive(Parser)]
#[command(name = "sequential-thinking")]
#[command(about = "MCP server for structured sequential thinking", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose diagnostic logging
    #[arg(short, long)]
    debug: bool,

    /// Maximum accepted thoughts per session
    #[arg(long)]
    max_thoughts: Option<usize>,

    /// Maximum characters per thought
    #[arg(long)]
    max_thought_length: Option<usize>,

    /// Advisory session budget in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            debug: self.debug,
            max_thoughts: self.max_thoughts,
            max_thought_length: self.max_thought_length,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SequentialThinkingConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&cli.overrides());
    config.validate()?;

    // Initialize tracing to stderr for MCP compatibility
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_log_filter().into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "Starting sequential-thinking server (max {} thoughts, {} chars, {}ms budget)",
        config.limits.max_thoughts,
        config.limits.max_thought_length,
        config.limits.timeout_ms
    );

    let service = SequentialThinkingService::new(config);

    // Start the MCP server on stdio transport
    let server = service.serve(stdio()).await?;

    tracing::info!("sequential-thinking server ready for connections");

    // This keeps the server running until the transport closes
    server.waiting().await?;

    tracing::info!("sequential-thinking server shutting down");
    Ok(())
}
