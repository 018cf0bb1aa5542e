//! Conduit CLI - Command-line interface for the Conduit bridge daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Conduit CI bridge CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CONDUIT_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Append an item to a queue
    Enqueue {
        /// Queue name (e.g., coverage-push, analysis-push, tasks)
        #[arg(short, long)]
        queue: String,

        /// Item as JSON string
        #[arg(long)]
        payload: String,
    },

    /// Route a command now and print its result
    Dispatch(CommandArgs),

    /// Queue a command for asynchronous routing
    Submit(CommandArgs),

    /// Collect results of submitted commands (each is returned once)
    Results {
        /// Maximum number of results to collect
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Show queue, worker and gate status
    Status,

    /// Enable or disable the integration
    Integration {
        #[arg(value_enum)]
        action: Toggle,
    },
}

#[derive(clap::Args)]
struct CommandArgs {
    /// HTTP-like method (GET, POST, PUT, DELETE)
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Command path, e.g. /nga/api/v1/status
    #[arg(short, long)]
    path: String,

    /// Body as JSON string
    #[arg(long)]
    body: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    Enable,
    Disable,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct EnqueueResult {
    queue: String,
    pending: usize,
}

/// Body column width in the results table
const BODY_PREVIEW_CHARS: usize = 60;

#[derive(Deserialize)]
struct CollectedResults {
    results: Vec<TaskResult>,
}

#[derive(Deserialize)]
struct TaskResult {
    id: String,
    status: u16,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Tabled)]
struct ResultRow {
    id: String,
    status: u16,
    body: String,
}

impl From<TaskResult> for ResultRow {
    fn from(result: TaskResult) -> Self {
        let body = match result.body {
            Some(body) if body.chars().count() > BODY_PREVIEW_CHARS => {
                let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
                format!("{}...", preview)
            }
            Some(body) => body,
            None => "-".to_string(),
        };
        Self {
            id: result.id,
            status: result.status,
            body,
        }
    }
}

#[derive(Deserialize)]
struct WorkerStats {
    state: String,
    processed: u64,
    retried: u64,
    dropped: u64,
}

#[derive(Deserialize)]
struct ReadinessStats {
    checks: u64,
    not_ready: u64,
    ready_empty: u64,
}

#[derive(Deserialize)]
struct Stats {
    queues: BTreeMap<String, usize>,
    workers: BTreeMap<String, WorkerStats>,
    readiness: ReadinessStats,
    integration_enabled: bool,
    uptime_seconds: i64,
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    pending: usize,
    worker: String,
    processed: String,
    retried: String,
    dropped: String,
}

impl Stats {
    fn rows(&self) -> Vec<QueueRow> {
        self.queues
            .iter()
            .map(|(queue, pending)| match self.workers.get(queue) {
                Some(worker) => QueueRow {
                    queue: queue.clone(),
                    pending: *pending,
                    worker: worker.state.clone(),
                    processed: worker.processed.to_string(),
                    retried: worker.retried.to_string(),
                    dropped: worker.dropped.to_string(),
                },
                None => QueueRow {
                    queue: queue.clone(),
                    pending: *pending,
                    worker: "-".to_string(),
                    processed: "-".to_string(),
                    retried: "-".to_string(),
                    dropped: "-".to_string(),
                },
            })
            .collect()
    }
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Task envelope with a fresh id
fn envelope(args: &CommandArgs) -> Result<Value> {
    if let Some(body) = &args.body {
        serde_json::from_str::<Value>(body).context("Invalid JSON body")?;
    }
    Ok(json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "method": args.method.to_uppercase(),
        "url": args.path,
        "body": args.body,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue { queue, payload } => {
            let payload_json: Value =
                serde_json::from_str(&payload).context("Invalid JSON payload")?;

            let params = json!({
                "queue": queue,
                "payload": payload_json,
            });

            let result = call_rpc(&cli.rpc_url, "queue.enqueue.v1", params).await?;
            let enqueue_result: EnqueueResult = serde_json::from_value(result)?;

            println!("{}", "✓ Item enqueued successfully".green().bold());
            println!();

            let table = Table::new(vec![enqueue_result]).to_string();
            println!("{}", table);
        }

        Commands::Dispatch(args) => {
            let result = call_rpc(&cli.rpc_url, "bridge.dispatch.v1", envelope(&args)?).await?;
            let status = result["status"].as_u64().unwrap_or(0);
            let label = format!("{} {}", status, args.path);
            if (200..300).contains(&status) {
                println!("{}", label.green().bold());
            } else {
                println!("{}", label.red().bold());
            }

            match result["body"].as_str() {
                Some(body) => match serde_json::from_str::<Value>(body) {
                    Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                    Err(_) => println!("{}", body),
                },
                None => println!("{}", "(no body)".dimmed()),
            }
        }

        Commands::Submit(args) => {
            let result = call_rpc(&cli.rpc_url, "bridge.submit.v1", envelope(&args)?).await?;
            println!(
                "{}",
                format!("✓ Command {} queued", result["id"].as_str().unwrap_or("?"))
                    .green()
                    .bold()
            );
        }

        Commands::Results { limit } => {
            let result =
                call_rpc(&cli.rpc_url, "bridge.results.v1", json!({ "limit": limit })).await?;
            let collected: CollectedResults = serde_json::from_value(result)?;

            if collected.results.is_empty() {
                println!("{}", "No results pending".dimmed());
            } else {
                let rows: Vec<ResultRow> =
                    collected.results.into_iter().map(ResultRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Status => {
            println!("{}", "Bridge Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(result) => {
                    let stats: Stats = serde_json::from_value(result)?;
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    let integration = if stats.integration_enabled {
                        "ENABLED".green()
                    } else {
                        "DISABLED".yellow()
                    };
                    println!("  {} {}", "Integration:".bold(), integration);
                    println!(
                        "  {} {} checks, {} not ready, {} empty",
                        "Gate:".bold(),
                        stats.readiness.checks,
                        stats.readiness.not_ready,
                        stats.readiness.ready_empty
                    );
                    println!("  {} {} seconds", "Uptime:".bold(), stats.uptime_seconds);
                    println!();
                    println!("{}", Table::new(stats.rows()));
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Integration { action } => {
            let enabled = matches!(action, Toggle::Enable);
            let result = call_rpc(
                &cli.rpc_url,
                "admin.integration.v1",
                json!({ "enabled": enabled }),
            )
            .await?;

            if result["enabled"].as_bool().unwrap_or(false) {
                println!("{}", "✓ Integration enabled".green().bold());
            } else {
                println!("{}", "✓ Integration disabled".yellow().bold());
            }
        }
    }

    Ok(())
}
