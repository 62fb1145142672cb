use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::debug;
use std::path::PathBuf;

use crate::generator::OutputFormat;
use crate::pipeline::GenerateOptions;

/// Generates Swagger 2.0 documents from beego controller annotations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate swagger.json and swagger.yml for a beego project
    Docs {
        /// Root of the Go project
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Output directory, relative to the project root
        #[arg(short, long, default_value = "swagger")]
        output: PathBuf,

        /// Router file declaring the namespaces, relative to the project root
        #[arg(short, long, default_value = "routers/router.go")]
        router: PathBuf,

        /// Number of parser workers (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Root-level directories to exclude in addition to vendor, comma separated
        #[arg(long = "exclude-dir")]
        exclude_dir: Option<String>,

        /// Output types to generate (json,yaml)
        #[arg(long = "ot", default_value = "json,yaml")]
        output_types: String,
    },
}

impl Cli {
    /// Validates the arguments and turns them into run options
    pub fn into_options(self) -> Result<GenerateOptions> {
        let Commands::Docs {
            project,
            output,
            router,
            workers,
            exclude_dir,
            output_types,
        } = self.command;

        if !project.exists() {
            bail!("Project path does not exist: {}", project.display());
        }
        if !project.is_dir() {
            bail!("Project path is not a directory: {}", project.display());
        }
        if workers == Some(0) {
            bail!("--workers must be at least 1");
        }

        let mut formats = Vec::new();
        for output_type in output_types.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let format: OutputFormat = output_type.parse().map_err(anyhow::Error::msg)?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            bail!("No output types given");
        }

        let excluded_dirs: Vec<String> = exclude_dir
            .as_ref()
            .map(|ed| ed.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        let options = GenerateOptions {
            project_root: project,
            output_dir: output,
            router_file: router,
            workers,
            excluded_dirs,
            formats,
        };
        debug!("Run options: {:?}", options);
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_docs_defaults() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().to_string_lossy().to_string();
        let options = parse(&["beeswag", "docs", &project]).into_options().unwrap();

        assert_eq!(options.output_dir, PathBuf::from("swagger"));
        assert_eq!(options.router_file, PathBuf::from("routers/router.go"));
        assert_eq!(options.formats, vec![OutputFormat::Json, OutputFormat::Yaml]);
        assert!(options.excluded_dirs.is_empty());
        assert_eq!(options.workers, None);
    }

    #[test]
    fn test_docs_custom_flags() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().to_string_lossy().to_string();
        let cli = parse(&[
            "beeswag",
            "-v",
            "docs",
            &project,
            "--ot",
            "yaml",
            "--exclude-dir",
            "third_party, scripts",
            "--workers",
            "2",
        ]);
        assert!(cli.verbose);

        let options = cli.into_options().unwrap();
        assert_eq!(options.formats, vec![OutputFormat::Yaml]);
        assert_eq!(options.excluded_dirs, vec!["third_party", "scripts"]);
        assert_eq!(options.workers, Some(2));
    }

    #[test]
    fn test_rejects_missing_project_and_bad_format() {
        assert!(parse(&["beeswag", "docs", "/no/such/project"])
            .into_options()
            .is_err());

        let dir = TempDir::new().unwrap();
        let project = dir.path().to_string_lossy().to_string();
        assert!(parse(&["beeswag", "docs", &project, "--ot", "go"])
            .into_options()
            .is_err());
    }
}
