//! Polls the prediction endpoint on a fixed cadence and logs which model
//! version answered. Publish a new version while this runs to watch the swap.

use anyhow::{Context, Result};
use clap::Parser;
use model_swap::api::models::{InvokeBody, InvokeRequest, InvokeResponse};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(
    name = "poll-client",
    about = "Invoke the prediction endpoint repeatedly and report the serving model version"
)]
struct Args {
    /// Server base URL
    #[clap(short, long, default_value = "http://127.0.0.1:8080")]
    endpoint: String,

    /// Model to invoke (server default if omitted)
    #[clap(short, long)]
    model: Option<String>,

    /// Delay between invocations in milliseconds
    #[clap(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Stop after this many invocations (runs until Ctrl+C if omitted)
    #[clap(short = 'n', long)]
    count: Option<u64>,

    /// Per-request timeout in seconds
    #[clap(long, default_value = "10")]
    timeout_secs: u64,
}

/// Sepal length, sepal width and petal width for three iris samples
fn demo_rows() -> Vec<Vec<f64>> {
    vec![
        vec![5.1, 3.5, 0.2],
        vec![6.0, 2.7, 1.6],
        vec![7.7, 3.0, 2.2],
    ]
}

async fn invoke(client: &reqwest::Client, args: &Args) -> Result<InvokeResponse> {
    let url = format!("{}/invoke", args.endpoint.trim_end_matches('/'));
    let request = InvokeRequest {
        data: demo_rows(),
        model: args.model.clone(),
    };

    let response = client
        .post(&url)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    response
        .json::<InvokeResponse>()
        .await
        .context("Malformed invocation response")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let args = Args::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    tracing::info!(endpoint = %args.endpoint, "Starting client, press Ctrl+C to stop");
    tracing::info!("To demonstrate zero-downtime, publish a new model version while this runs");

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));
    let mut sent = 0u64;
    let mut failed = 0u64;
    let mut last_version: Option<String> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        sent += 1;
        match invoke(&client, &args).await {
            Ok(InvokeResponse { status_code, body: InvokeBody::Prediction(p) }) => {
                if last_version.as_deref() != Some(p.model_version.as_str()) {
                    tracing::info!(
                        from = ?last_version,
                        to = %p.model_version,
                        "Serving model version changed"
                    );
                    last_version = Some(p.model_version.clone());
                }
                tracing::info!(
                    time = %chrono::Local::now().format("%H:%M:%S"),
                    status_code,
                    prediction = ?p.prediction,
                    model_version = %p.model_version,
                    "Prediction"
                );
            }
            Ok(InvokeResponse { status_code, body: InvokeBody::Error { error } }) => {
                failed += 1;
                tracing::warn!(status_code, error = %error, "Invocation returned an error");
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %format!("{:#}", e), "Invocation failed");
            }
        }

        if args.count.is_some_and(|count| sent >= count) {
            break;
        }
    }

    tracing::info!(sent, failed, "Client stopped");
    Ok(())
}
