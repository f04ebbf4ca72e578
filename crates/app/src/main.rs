use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use centim_ai::HttpInference;
use centim_storage::SqliteCategoryStore;

mod config;
mod pipeline;

use config::Config;
use pipeline::IngestPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if files.is_empty() {
        eprintln!("usage: centim <statement.csv> [statement2.csv ...]");
        std::process::exit(2);
    }

    let project_dirs = directories::ProjectDirs::from("app", "centim", "Centim")
        .context("Failed to get app directory")?;
    let data_dir = project_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    let config = Config::load(&data_dir.join("config.toml"))?;

    let pool = centim_storage::create_db(&data_dir.join("centim.db"))
        .await
        .context("Failed to open database")?;
    let store = SqliteCategoryStore::new(pool.clone());

    let mut inference = HttpInference::new(&config.inference_url, &config.model)
        .with_timeout(Duration::from_secs(config.inference_timeout_secs));
    if let Some(key) = &config.api_key {
        inference = inference.with_api_key(key);
    }

    let mut pipeline = IngestPipeline::new(pool, store, Arc::new(inference));
    let summary = pipeline.ingest_files(&files).await?;

    println!(
        "Ingested {} transactions ({} categorized, {} persisted)",
        summary.parsed, summary.categorized, summary.persisted
    );
    for (file, error) in &summary.failures {
        eprintln!("  failed: {file}: {error}");
    }

    if summary.persisted == 0 && !summary.failures.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
