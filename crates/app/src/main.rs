use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use stagetab_export::sink_for;
use stagetab_ocr::{backend_for, RoutePipeline};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.resolve().context("Invalid configuration")?;
    // Fail on an unknown extension before spending time on OCR.
    let sink = sink_for(&config.output)
        .with_context(|| format!("Cannot write {}", config.output.display()))?;
    let backend = backend_for(&config.ocr).context("Failed to set up the OCR engine")?;
    let pipeline = RoutePipeline::new(backend, &config);

    if cli.skip_conditioning {
        tracing::info!(dir = %config.processed_dir.display(), "Skipping conditioning");
    } else {
        pipeline
            .condition_dir(&config.raw_dir, &config.processed_dir)
            .await
            .context("Conditioning failed")?;
    }

    let table = pipeline
        .recognize_dir(&config.processed_dir)
        .await
        .context("Recognition failed")?;

    sink.write_table(&table)
        .with_context(|| format!("Failed to write {}", config.output.display()))?;

    for source in table.sources() {
        tracing::debug!(image = %source.path.display(), records = source.accepted, "Source summary");
    }
    println!(
        "{} images, {} stages -> {}",
        table.sources().len(),
        table.len(),
        config.output.display()
    );
    Ok(())
}
