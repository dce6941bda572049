//! mcpeek: inspect the MCP servers declared by agentic workflows.

mod config;
mod inspector;
mod render;

use clap::{Parser, Subcommand};
use config::McpeekConfig;
use mcpeek_core::CancelScope;
use mcpeek_mcp::workflow::resolve_workflow_path;
use mcpeek_mcp::{
    find_workflows_with_mcp, load_workflow, ConnectionManager, InspectFilter, InspectionCoordinator,
    RegistryClient,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcpeek", version, about = "mcpeek: inspect the MCP servers declared by agentic workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mcpeek.toml", global = true)]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a workflow's MCP servers and list their capabilities
    Inspect {
        /// Workflow file or name; lists workflows with MCP servers when omitted
        workflow: Option<String>,
        /// Only inspect servers whose name contains this (case-insensitive)
        #[arg(long)]
        server: Option<String>,
        /// Show details of one tool (requires --server)
        #[arg(long)]
        tool: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Launch the external MCP inspector instead
        #[arg(long)]
        inspector: bool,
    },
    /// Query the MCP server registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// Search active servers by name or description
    Search {
        query: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one server by exact name
    Get {
        name: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = config::load(&cli.config)?;
    init_tracing(cli.verbose, config.logging.json);
    debug!(config = %cli.config.display(), "Configuration loaded");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Inspect {
            workflow,
            server,
            tool,
            json,
            inspector,
        } => {
            let filter = InspectFilter { server, tool };
            // reject bad flag combinations before anything is launched
            filter.validate()?;

            if inspector {
                let status = inspector::launch(&config.inspector, &cancel).await?;
                if !status.success() && !cancel.is_cancelled() {
                    anyhow::bail!("inspector exited with {status}");
                }
                return Ok(());
            }

            match workflow {
                Some(workflow) => inspect(&config, &cancel, &workflow, &filter, json).await?,
                None => {
                    let found = find_workflows_with_mcp(&config.workflows_dir).await?;
                    print!("{}", render::workflows(&config.workflows_dir, &found));
                }
            }
        }
        Commands::Registry { action } => {
            let client = RegistryClient::new(&config.registry.url)?;
            let (servers, json) = match action {
                RegistryAction::Search { query, json } => {
                    let query = query.unwrap_or_default();
                    (client.search(&query).await?, json)
                }
                RegistryAction::Get { name, json } => (vec![client.get(&name).await?], json),
            };
            print!("{}", render::registry(&servers, json)?);
        }
    }

    Ok(())
}

async fn inspect(
    config: &McpeekConfig,
    cancel: &CancellationToken,
    workflow: &str,
    filter: &InspectFilter,
    json: bool,
) -> anyhow::Result<()> {
    let path = resolve_workflow_path(&config.workflows_dir, workflow);
    let descriptors = load_workflow(&path).await?;
    info!(workflow = %path.display(), servers = descriptors.len(), "Workflow loaded");

    let manager = ConnectionManager::new(config.inspect.session_options());
    let coordinator = InspectionCoordinator::new(manager, config.inspect.max_concurrency)
        .with_default_timeout(config.inspect.default_server_timeout());
    let scope = CancelScope::from_token(cancel.clone());
    let report = coordinator.inspect(&scope, &descriptors, filter).await?;

    print!("{}", render::report(&report, filter, json)?);
    if cancel.is_cancelled() {
        anyhow::bail!("inspection interrupted");
    }
    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_inspect_flags() {
        let cli = Cli::try_parse_from([
            "mcpeek", "inspect", "triage", "--server", "github", "--tool", "get_issue", "--json", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("mcpeek.toml"));
        match cli.command {
            Commands::Inspect {
                workflow,
                server,
                tool,
                json,
                inspector,
            } => {
                assert_eq!(workflow.as_deref(), Some("triage"));
                assert_eq!(server.as_deref(), Some("github"));
                assert_eq!(tool.as_deref(), Some("get_issue"));
                assert!(json);
                assert!(!inspector);
            }
            Commands::Registry { .. } => panic!("expected inspect"),
        }
    }

    #[test]
    fn test_cli_parses_registry_search_without_query() {
        let cli = Cli::try_parse_from(["mcpeek", "--config", "alt.toml", "registry", "search"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(
            cli.command,
            Commands::Registry {
                action: RegistryAction::Search { query: None, json: false }
            }
        ));
    }
}
