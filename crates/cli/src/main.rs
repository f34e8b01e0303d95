//! Playlist Import CLI - submit playlists and follow their import jobs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::process::ExitCode;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";
const NOT_FOUND: i32 = 4001;

#[derive(Parser)]
#[command(name = "playlist-import-cli")]
#[command(about = "Playlist import service CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "PLAYLIST_IMPORT_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Bearer token for submissions
    #[arg(long, env = "PLAYLIST_IMPORT_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a playlist for import
    Submit {
        /// Playlist URL (http or https)
        playlist_url: String,
    },

    /// Show a job's status and progress
    Status {
        /// Job ID
        job_id: String,
    },

    /// Poll a job until it finishes (exit code 1 on error or not found)
    Watch {
        /// Job ID
        job_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error ({}): {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
struct Progress {
    total: u32,
    processed: u32,
    imported: u32,
    errors: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    id: String,
    status: String,
    #[serde(default)]
    progress: Progress,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

#[derive(Tabled)]
struct JobRow {
    job_id: String,
    status: String,
    progress: String,
}

impl From<&JobView> for JobRow {
    fn from(job: &JobView) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status.clone(),
            progress: progress_line(&job.progress),
        }
    }
}

fn progress_line(p: &Progress) -> String {
    if p.total == 0 {
        format!("{} processed ({} ok, {} failed)", p.processed, p.imported, p.errors)
    } else {
        format!(
            "{}/{} processed ({} ok, {} failed)",
            p.processed, p.total, p.imported, p.errors
        )
    }
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "done" | "error")
}

async fn call_rpc(
    url: &str,
    token: Option<&str>,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let mut builder = client.post(url).json(&request);
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }

    let response: JsonRpcResponse = builder
        .send()
        .await
        .context("Failed to connect to the import service")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        return Err(error.into());
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

async fn fetch_job(cli: &Cli, job_id: &str) -> Result<JobView> {
    let result = call_rpc(
        &cli.rpc_url,
        None,
        "import.status.v1",
        json!({ "job_id": job_id }),
    )
    .await?;
    serde_json::from_value(result).context("Unexpected status payload")
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<JsonRpcError>()
        .is_some_and(|e| e.code == NOT_FOUND)
}

fn print_job(job: &JobView) {
    let status = match job.status.as_str() {
        "done" => job.status.green().bold(),
        "error" => job.status.red().bold(),
        "running" => job.status.cyan().bold(),
        _ => job.status.yellow().bold(),
    };
    println!("{} {}", "Job".bold(), job.id);
    println!("{}", Table::new(vec![JobRow::from(job)]));
    println!("Status: {}", status);
    if let Some(error) = &job.error {
        println!("{} {}", "Error:".red().bold(), error);
    }
    if let Some(result) = &job.result {
        println!("{}", "Result:".green().bold());
        println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        );
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Submit { playlist_url } => {
            let result = call_rpc(
                &cli.rpc_url,
                cli.token.as_deref(),
                "import.submit.v1",
                json!({ "playlist_url": playlist_url }),
            )
            .await?;
            let submitted: SubmitResult = serde_json::from_value(result)?;

            println!("{}", "✓ Playlist submitted".green().bold());
            println!();
            println!("{}", Table::new(vec![submitted]));
        }

        Commands::Status { job_id } => match fetch_job(&cli, job_id).await {
            Ok(job) => print_job(&job),
            Err(e) if is_not_found(&e) => {
                println!("{}", format!("Job {} not found (or expired)", job_id).yellow());
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => return Err(e),
        },

        Commands::Watch {
            job_id,
            interval_ms,
        } => {
            let interval = Duration::from_millis((*interval_ms).max(100));
            let mut last_line = String::new();
            loop {
                let job = match fetch_job(&cli, job_id).await {
                    Ok(job) => job,
                    Err(e) if is_not_found(&e) => {
                        println!("{}", format!("Job {} not found (or expired)", job_id).yellow());
                        return Ok(ExitCode::FAILURE);
                    }
                    Err(e) => return Err(e),
                };

                let line = format!("[{}] {}", job.status, progress_line(&job.progress));
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }

                if is_terminal(&job.status) {
                    println!();
                    print_job(&job);
                    return Ok(if job.status == "done" {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    });
                }
                tokio::time::sleep(interval).await;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
