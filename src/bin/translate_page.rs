//! Translate a single page from the command line and print the result as JSON
//! Run with: cargo run --release --bin translate_page -- <image_path> [source] [target]

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use reader_translation::core::{Config, LanguageCode};
use reader_translation::orchestration::TranslationPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("reader_translation=info")
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(image_path) = args.get(1) else {
        eprintln!("Usage: translate_page <image_path> [source] [target]");
        std::process::exit(2);
    };

    if !Path::new(image_path).exists() {
        eprintln!("Image not found: {}", image_path);
        std::process::exit(1);
    }

    let mut config = Config::new().context("Failed to load configuration")?;
    if let Some(source) = args.get(2) {
        config.translation.source_lang = source.parse::<LanguageCode>()?;
    }
    if let Some(target) = args.get(3) {
        config.translation.target_lang = target.parse::<LanguageCode>()?;
    }
    config.translation.enabled = true;

    let pipeline = TranslationPipeline::from_config(&config).await?;

    info!("Loading image: {}", image_path);
    let bytes = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("Failed to read {}", image_path))?;

    let result = pipeline.process_bytes(bytes).await?;
    pipeline.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
