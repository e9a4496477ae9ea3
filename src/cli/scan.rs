use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::commands::ScanArgs;
use crate::config;
use crate::dast::HttpTransport;
use crate::errors::ApiProbeError;
use crate::ingest::{read_source, IngestSource};
use crate::models::SourceFailure;
use crate::pipeline::{ScanEvent, ScanPipeline};
use crate::rag::create_provider;
use crate::reporting::{format_terminal_summary, write_report, ScanProgress};

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), ApiProbeError> {
    let config = config::parse_config(Path::new(&args.config)).await?;
    info!(config = %args.config, sources = args.sources.len(), "Configuration loaded");

    let (sources, unreadable) = read_sources(&args.sources).await;

    let transport = Arc::new(HttpTransport::new(&config.dast)?);
    let embedder = create_provider(&config.rag)?;
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();

    let mut pipeline = ScanPipeline::new(config.clone(), transport, embedder)
        .with_cancel_token(cancel.clone())
        .with_event_channel(tx)
        .with_source_failures(unreadable);
    if !args.no_probe {
        if let Some(target) = &args.target {
            pipeline = pipeline.with_target(target.clone());
        }
    }

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; waiting for in-flight probes");
            interrupt.cancel();
        }
    });

    let progress_task = tokio::spawn(async move {
        let mut progress = if quiet { ScanProgress::hidden() } else { ScanProgress::new() };
        while let Some(event) = rx.recv().await {
            progress.handle_event(&event);
        }
    });

    let result = pipeline.run(sources).await;
    // Dropping the pipeline closes the event channel and ends the progress task.
    drop(pipeline);
    if let Err(e) = progress_task.await {
        warn!(error = %e, "Progress display task panicked");
    }
    let report = result?;

    let dir = args.output.map(PathBuf::from).unwrap_or_else(|| config.output.directory.clone());
    let format = args.format.unwrap_or(config.output.format);
    let written = write_report(&report, &dir, format).await?;

    if !quiet {
        println!("{}", format_terminal_summary(&report));
        for path in &written {
            println!("  {} {}", style("Report:").dim(), path.display());
        }
    }
    Ok(())
}

/// Unreadable sources become ingestion failures; the pipeline decides whether anything is left to scan.
async fn read_sources(locations: &[String]) -> (Vec<IngestSource>, Vec<SourceFailure>) {
    let mut sources = Vec::with_capacity(locations.len());
    let mut failures = Vec::new();
    for location in locations {
        match read_source(location).await {
            Ok(source) => sources.push(source),
            Err(e) => {
                warn!(source = %location, error = %e, "Failed to read source");
                failures.push(SourceFailure::from_error(location, &e));
            }
        }
    }
    (sources, failures)
}
