//! Publishes a model artifact to the store and updates the manifest entry

use anyhow::{Context, Result};
use clap::Parser;
use model_swap::{
    FileSystemStore, ServeConfig,
    publish::{PublishRequest, publish_model},
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "publish-model",
    about = "Copy a model artifact into the store and point the manifest at it"
)]
struct Args {
    /// Path to configuration file (store root, bucket and manifest key)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Override artifact store root directory
    #[clap(long)]
    store_root: Option<PathBuf>,

    /// Model name in the manifest
    #[clap(short, long, default_value = "iris_model")]
    name: String,

    /// Artifact JSON file to publish
    #[clap(short, long)]
    artifact: PathBuf,

    /// Version token (previous version + 1 if omitted)
    #[clap(long)]
    version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let args = Args::parse();

    let mut config = ServeConfig::load(args.config)?;
    if let Some(store_root) = args.store_root {
        config.store_root = store_root;
    }
    config.validate()?;

    let artifact = tokio::fs::read(&args.artifact)
        .await
        .with_context(|| format!("Failed to read artifact: {:?}", args.artifact))?;

    let store = FileSystemStore::new(config.store_root.clone());
    let published = publish_model(
        &store,
        &config.manifest_location(),
        PublishRequest {
            model_name: args.name,
            artifact,
            version: args.version,
        },
    )
    .await?;

    println!(
        "{} {} -> {}",
        published.entry.name, published.entry.version, published.entry.source_uri
    );

    Ok(())
}
