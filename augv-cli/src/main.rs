// AUGV command line interface
// Query the vision server and dispatch route plans to the simulation

use anyhow::{bail, Context};
use augv_server::TcpControlNotifier;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(name = "augv")]
#[command(about = "AUGV vision server command line interface", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "http://localhost:8000", global = true)]
    server: String,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-agent detection status
    Status {
        /// Only this agent
        #[arg(long)]
        agent: Option<String>,
    },
    /// List agents seen within the liveness window
    Agents,
    /// Check server health
    Health,
    /// Send a route plan (`{"AUGV_1": ["Warehouse_1", ...]}`) to the simulation
    DispatchRoutes {
        /// JSON file mapping agent ids to waypoint lists
        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value = "localhost")]
        control_host: String,

        #[arg(long, default_value = "8051")]
        control_port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_target(false)
        .init();

    let server = cli.server.trim_end_matches('/');
    match cli.command {
        Commands::Status { agent } => {
            let path = match agent {
                Some(agent) => format!("/api/yolo/status/{}", agent),
                None => "/api/yolo/check_all".to_string(),
            };
            print_json(&get_json(server, &path).await?)?;
        }
        Commands::Agents => {
            let body = get_json(server, "/api/agents").await?;
            let agents = body["agents"].as_array().cloned().unwrap_or_default();
            if agents.is_empty() {
                println!("No active agents");
            }
            for agent in agents {
                println!("{}", agent.as_str().unwrap_or_default());
            }
        }
        Commands::Health => {
            let body = get_json(server, "/health").await?;
            println!("✅ Server is healthy");
            print_json(&body)?;
        }
        Commands::DispatchRoutes {
            file,
            control_host,
            control_port,
        } => {
            let routes = load_routes(&file)?;
            let notifier = TcpControlNotifier::new(
                format!("{}:{}", control_host, control_port),
                Duration::from_secs(2),
            );
            notifier
                .send_json(&routes)
                .await
                .with_context(|| format!("Failed to reach simulation at {}", notifier.address()))?;
            println!("✅ Dispatched routes for {} agents", routes.len());
        }
    }

    Ok(())
}

async fn get_json(server: &str, path: &str) -> anyhow::Result<Value> {
    let url = format!("{}{}", server, path);
    debug!("GET {}", url);
    let response = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("Server not reachable at {}", server))?;

    let status = response.status();
    let body: Value = response.json().await.context("Invalid JSON response")?;
    if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
        bail!("Server responded with {}: {}", status, body);
    }
    Ok(body)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Route plan: agent id -> ordered waypoint names
fn load_routes(path: &Path) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let routes: BTreeMap<String, Vec<String>> =
        serde_json::from_str(&content).context("Route plan must map agent ids to waypoint lists")?;
    if routes.is_empty() {
        bail!("Route plan is empty");
    }
    for (agent, waypoints) in &routes {
        augv_core::AgentId::new(agent.as_str())
            .with_context(|| format!("Invalid agent id in route plan: {:?}", agent))?;
        if waypoints.is_empty() {
            bail!("Agent {} has no waypoints", agent);
        }
    }
    Ok(routes)
}
