use std::path::Path;

use console::style;

use crate::cli::commands::ValidateArgs;
use crate::config;
use crate::errors::ApiProbeError;

pub async fn handle_validate(args: ValidateArgs) -> Result<(), ApiProbeError> {
    let value = config::load_config_value(Path::new(&args.config)).await?;
    let report = config::validate(&value);

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.valid {
        println!("{} Configuration is valid: {}", style("✓").green(), args.config);
    } else {
        eprintln!("{} Configuration is invalid: {}", style("✗").red(), args.config);
        for error in &report.errors {
            eprintln!("  - {}", error);
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(ApiProbeError::ConfigurationInvalid(report.errors))
    }
}
