//! GitHub Projects MCP Server - Exposes Projects V2 management via Model Context Protocol.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use github_projects::mcp::McpServer;
use github_projects::{Config, ProjectsClient};

/// Serve GitHub Projects V2 tools over stdio.
#[derive(Parser)]
#[command(name = "projects-mcp")]
#[command(about = "GitHub Projects V2 MCP server (JSON-RPC over stdio)")]
#[command(version)]
struct Cli {
    /// GitHub token with project and repo scopes
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub GraphQL endpoint
    #[arg(long, env = "GITHUB_GRAPHQL_URL")]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol frames only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(token) = cli.token.filter(|t| !t.is_empty()) {
        config.token = Some(token);
    }
    if let Some(api_url) = cli.api_url.filter(|u| !u.is_empty()) {
        config.api_url = api_url;
    }
    if config.token.is_none() {
        anyhow::bail!("GITHUB_TOKEN environment variable (or --token) is required");
    }

    let client = ProjectsClient::new(config).context("Failed to create GitHub client")?;
    let server = McpServer::new(client);
    info!("GitHub Projects MCP server ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let Some(response) = server.handle_line(&line).await else {
            continue;
        };
        let mut frame = serde_json::to_string(&response).context("Failed to encode response")?;
        frame.push('\n');
        stdout
            .write_all(frame.as_bytes())
            .await
            .context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    Ok(())
}
