use clap::{Parser, Subcommand, Args};

use crate::config::ReportFormat;

#[derive(Parser)]
#[command(
    name = "apiprobe",
    version,
    about = "API security testing from API descriptions, source code and documentation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long = "json", global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest sources, match documentation and probe a target
    Scan(ScanArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// Parse one API description and list its endpoints
    Ingest(IngestArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// YAML or JSON configuration file
    #[arg(short, long)]
    pub config: String,

    /// Base URL of the API under test
    #[arg(short, long, required_unless_present = "no_probe")]
    pub target: Option<String>,

    /// API descriptions: OpenAPI, GraphQL SDL, Postman, HAR, gateway configs (paths or URLs)
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Output directory for reports (overrides the config file)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Report format: json, markdown, both (overrides the config file)
    #[arg(long, value_parser = parse_format)]
    pub format: Option<ReportFormat>,

    /// Stop after documentation matching; send no traffic to the target
    #[arg(long)]
    pub no_probe: bool,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Path to config file
    pub config: String,

    /// Print the validation report as JSON
    #[arg(long)]
    pub report: bool,
}

#[derive(Args, Clone)]
pub struct IngestArgs {
    /// API description path or URL
    pub source: String,

    /// Select the ingestor by this identifier (file name or content type) instead of the source location
    #[arg(long)]
    pub identifier: Option<String>,

    /// Configuration file for ingestor priority and options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print the endpoints as an OpenAPI 3 document instead of a table
    #[arg(long)]
    pub export_openapi: bool,
}

fn parse_format(s: &str) -> Result<ReportFormat, String> {
    ReportFormat::parse(s).ok_or_else(|| format!("unknown report format '{}': expected json, markdown or both", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_args() {
        let cli = Cli::parse_from([
            "apiprobe", "-vv", "scan", "-c", "apiprobe.yaml", "-t", "http://localhost:8080",
            "api.openapi.json", "traffic.har", "--format", "markdown",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Scan(args) = cli.command else { panic!("expected scan") };
        assert_eq!(args.sources, vec!["api.openapi.json", "traffic.har"]);
        assert_eq!(args.target.as_deref(), Some("http://localhost:8080"));
        assert_eq!(args.format, Some(ReportFormat::Markdown));
        assert!(!args.no_probe);
    }

    #[test]
    fn test_scan_requires_target_unless_no_probe() {
        assert!(Cli::try_parse_from(["apiprobe", "scan", "-c", "a.yaml", "api.graphql"]).is_err());
        assert!(Cli::try_parse_from(["apiprobe", "scan", "-c", "a.yaml", "--no-probe", "api.graphql"]).is_ok());
    }

    #[test]
    fn test_bad_format_rejected() {
        let result = Cli::try_parse_from([
            "apiprobe", "scan", "-c", "a.yaml", "--no-probe", "api.graphql", "--format", "pdf",
        ]);
        assert!(result.is_err());
    }
}
