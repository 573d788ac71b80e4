//! `evalctl`: an admin/operator CLI against a running Gateway's HTTP
//! surface. Deliberately thin — every subcommand is a single HTTP call
//! plus formatted output, grounded on `mqk-cli`'s `clap::Parser` structure
//! but talking to a service over HTTP instead of a database pool directly,
//! since the Gateway (not the Store) is this workspace's external seam.

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "evalctl")]
#[command(about = "Operator CLI for the evaluation control plane", long_about = None)]
struct Cli {
    /// Base URL of the Gateway service.
    #[arg(long, env = "EVALCTL_GATEWAY_URL", default_value = "http://127.0.0.1:8080")]
    gateway_url: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a program for evaluation.
    Submit {
        /// Path to the source file, or "-" to read from stdin.
        #[arg(long)]
        source: String,
        /// Language tag (e.g. python3).
        #[arg(long, default_value = "python3")]
        language: String,
        /// Wall-clock timeout in seconds (1-900).
        #[arg(long, default_value_t = 30)]
        timeout_s: u32,
        /// Runner pool to target.
        #[arg(long)]
        resource_class: Option<String>,
    },

    /// Fetch the current record for one evaluation.
    Status { id: Uuid },

    /// List evaluations, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Fetch captured output for one evaluation.
    Logs { id: Uuid },

    /// Request cancellation of a running evaluation.
    Kill { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let http = reqwest::Client::new();

    match cli.cmd {
        Commands::Submit {
            source,
            language,
            timeout_s,
            resource_class,
        } => submit(&http, &cli.gateway_url, source, language, timeout_s, resource_class).await,
        Commands::Status { id } => status(&http, &cli.gateway_url, id).await,
        Commands::List { status, limit, offset } => {
            list(&http, &cli.gateway_url, status, limit, offset).await
        }
        Commands::Logs { id } => logs(&http, &cli.gateway_url, id).await,
        Commands::Kill { id } => kill(&http, &cli.gateway_url, id).await,
    }
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read source from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))
    }
}

async fn submit(
    http: &reqwest::Client,
    base: &str,
    source: String,
    language: String,
    timeout_s: u32,
    resource_class: Option<String>,
) -> Result<()> {
    let source_text = read_source(&source)?;
    let body = serde_json::json!({
        "source_text": source_text,
        "language_tag": language,
        "timeout_s": timeout_s,
        "resource_class": resource_class,
    });
    let resp = http.post(format!("{base}/eval")).json(&body).send().await?;
    print_response(resp).await
}

async fn status(http: &reqwest::Client, base: &str, id: Uuid) -> Result<()> {
    let resp = http.get(format!("{base}/eval/{id}")).send().await?;
    print_response(resp).await
}

async fn list(
    http: &reqwest::Client,
    base: &str,
    status: Option<String>,
    limit: u32,
    offset: u32,
) -> Result<()> {
    let mut req = http
        .get(format!("{base}/eval"))
        .query(&[("limit", limit.to_string()), ("offset", offset.to_string())]);
    if let Some(status) = status {
        req = req.query(&[("status", status)]);
    }
    let resp = req.send().await?;
    print_response(resp).await
}

async fn logs(http: &reqwest::Client, base: &str, id: Uuid) -> Result<()> {
    let resp = http.get(format!("{base}/eval/{id}/logs")).send().await?;
    print_response(resp).await
}

async fn kill(http: &reqwest::Client, base: &str, id: Uuid) -> Result<()> {
    let resp = http.post(format!("{base}/eval/{id}/kill")).send().await?;
    print_response(resp).await
}

async fn print_response(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("request failed with status {status}");
    }
    Ok(())
}
