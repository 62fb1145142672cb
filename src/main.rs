use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};

use beeswag::cli::Cli;
use beeswag::pipeline::{generate_docs, CancellationToken};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger with appropriate verbosity level
    let env = Env::default().filter_or("RUST_LOG", if cli.verbose { "debug" } else { "info" });
    env_logger::init_from_env(env);

    debug!("Starting beeswag...");

    let options = cli.into_options()?;
    let project = options.project_root.clone();
    info!("Generating swagger docs for {}", project.display());

    let report = generate_docs(&options, &CancellationToken::new())
        .with_context(|| format!("Failed to generate docs for {}", project.display()))?;

    for warning in &report.warnings {
        warn!("{}", warning);
    }
    for path in &report.written {
        info!("Wrote {}", path.display());
    }
    info!(
        "Swagger documentation generated: {} paths, {} definitions, {} warnings",
        report.document.paths.len(),
        report.document.definitions.len(),
        report.warnings.len()
    );

    Ok(())
}
