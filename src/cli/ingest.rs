use std::path::Path;

use console::style;

use crate::cli::commands::IngestArgs;
use crate::config;
use crate::errors::ApiProbeError;
use crate::ingest::openapi::export_openapi;
use crate::ingest::{read_source, IngestorRegistry};
use crate::models::Endpoint;

pub async fn handle_ingest(args: IngestArgs) -> Result<(), ApiProbeError> {
    let registry = match &args.config {
        Some(path) => IngestorRegistry::from_config(&config::parse_config(Path::new(path)).await?.ingestors),
        None => IngestorRegistry::default(),
    };

    let mut source = read_source(&args.source).await?;
    if let Some(identifier) = args.identifier {
        source.identifier = identifier;
    }
    let (ingestor, endpoints) = registry.ingest(&source)?;

    if args.export_openapi {
        println!("{}", serde_json::to_string_pretty(&export_openapi(&endpoints))?);
        return Ok(());
    }

    println!(
        "{} {} endpoints from {} ({})",
        style("Ingested").bold(),
        endpoints.len(),
        args.source,
        ingestor
    );
    for endpoint in &endpoints {
        println!("  {}", describe(endpoint));
    }
    Ok(())
}

fn describe(endpoint: &Endpoint) -> String {
    let params: Vec<String> = endpoint.parameters.iter()
        .map(|p| format!("{}{}", p.name, if p.required { "" } else { "?" }))
        .collect();
    if params.is_empty() {
        format!("{:<7} {}", endpoint.method().as_str(), endpoint.path())
    } else {
        format!("{:<7} {} {}", endpoint.method().as_str(), endpoint.path(), style(params.join(", ")).dim())
    }
}
