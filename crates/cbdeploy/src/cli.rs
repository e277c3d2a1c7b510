use std::{ffi::OsString, path::PathBuf};

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Region used when none is specified.
pub(crate) const DEFAULT_REGION: &str = "ap-northeast-1";

/// Long flags that are also accepted with a single leading dash.
const LONG_FLAGS: &[&str] = &[
    "build",
    "bucket",
    "config",
    "dir",
    "endpoint",
    "help",
    "log-level",
    "profile",
    "put",
    "region",
    "role",
    "source",
    "stat",
    "target",
    "version",
    "zip",
];

/// CLI configuration.
#[derive(Debug, Parser)]
#[command(about, version)]
pub(crate) struct Cli {
    /// Profile name from the shared credentials file.
    #[arg(long)]
    pub profile: Option<String>,

    /// ARN of a role to assume.
    #[arg(long)]
    pub role: Option<String>,

    /// AWS region.
    #[arg(long, default_value = DEFAULT_REGION)]
    pub region: String,

    /// AWS API endpoint URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// YAML configuration file path.
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    /// Target name inside of the configuration file.
    #[arg(long, default_value = "default")]
    pub target: String,

    /// Source directory.
    #[arg(long)]
    pub dir: Option<String>,

    /// S3 bucket the source archive is uploaded to.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Source name. The archive is named `<SOURCE>.zip`.
    #[arg(long)]
    pub source: Option<String>,

    /// Archive the source directory.
    #[arg(long)]
    pub zip: bool,

    /// Upload the source archive to S3.
    #[arg(long)]
    pub put: bool,

    /// Start a CodeBuild project build.
    #[arg(long)]
    pub build: bool,

    /// Show the status of a CodeBuild build and exit.
    #[arg(long, value_name = "BUILD_ID")]
    pub stat: Option<String>,

    /// Diagnostic log level written to stderr.
    #[arg(long, default_value = "warn")]
    pub log_level: LevelFilter,
}

/// Rewrite single-dash long flags (`-zip`, `-profile=dev`) into their double-dash form.
pub(crate) fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(index, arg)| match arg.to_str() {
            Some(value) if index > 0 && is_single_dash_long(value) => format!("-{value}").into(),
            _ => arg,
        })
        .collect()
}

/// Whether `value` is a known long flag written with a single dash.
fn is_single_dash_long(value: &str) -> bool {
    let Some(flag) = value.strip_prefix('-') else {
        return false;
    };

    let name = flag.split_once('=').map_or(flag, |(name, _)| name);

    LONG_FLAGS.contains(&name)
}
