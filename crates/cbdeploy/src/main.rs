//! # cbdeploy
//!
//! Packages a source directory into a ZIP archive, uploads it into an S3 bucket
//! and triggers a CodeBuild project build. Build progress can be queried with the
//! `--stat` flag.
//!
//! Deployment targets are described in a YAML configuration file:
//!
//! ```yaml
//! default:
//!   project_name: backend
//!   source_bucket: artifacts
//!   source_key: backend/source.zip
//!   directory: ./app
//! ```
//!
//! Every stage is opt-in: `--zip`, `--put` and `--build` enable archiving,
//! uploading and building respectively.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use config::{Settings, TargetConfig};
use pipeline::{AwsConnector, DeployError};

/// Source directory archiving.
mod archiver;

/// Build trigger and status reporting.
mod build;

/// Command line arguments.
mod cli;

/// Configuration file and effective settings.
mod config;

/// Terminal output helpers.
mod console;

/// Stage orchestration.
mod pipeline;

/// Archive upload.
mod upload;

/// CLI entrypoint.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os()));

    common::logging::init(cli.log_level);

    match deploy(cli).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "finished");
            ExitCode::SUCCESS
        }
        Err(error) => {
            console::failure(stage_failure(&error), &error);
            ExitCode::FAILURE
        }
    }
}

/// Load the configuration and run the pipeline against AWS.
async fn deploy(cli: Cli) -> Result<pipeline::Outcome, DeployError> {
    let target = TargetConfig::load(&cli.config, &cli.target)?;
    let settings = Settings::new(cli, target);
    let connector = AwsConnector::new(settings.credentials.clone());

    pipeline::run(&settings, &connector, &mut std::io::stdout()).await
}

/// Headline printed above the cause of a failed run.
fn stage_failure(error: &DeployError) -> &'static str {
    match error {
        DeployError::Config(_) => "Failed to load configuration.",
        DeployError::MissingBucket => "Source bucket is not specified.",
        DeployError::MissingDirectory(_) | DeployError::Io(_) => {
            "Source directory is not available."
        }
        DeployError::Credentials(_) => "Failed to resolve AWS credentials.",
        DeployError::Archive(_) => "Failed to archive source files.",
        DeployError::Upload(_) => "Failed to upload source archive.",
        DeployError::Build(_) => "Failed to start build.",
        DeployError::Status(_) => "Failed to get build status.",
    }
}
