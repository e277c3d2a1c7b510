use std::path::{Path, PathBuf};

use common::credentials::CredentialSpec;
use derive_more::{Display, Error, From};
use figment::{
    providers::{Env, Format, Yaml},
    value::Dict,
    Figment,
};
use serde::Deserialize;
use tracing::warn;

use crate::{cli::Cli, console};

/// Prefix of environment variables that override configuration file values.
///
/// Nested keys are separated with `__`, for example `CBDEPLOY_DEFAULT__SOURCE_BUCKET`.
const ENV_PREFIX: &str = "CBDEPLOY_";

/// Configuration loading errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ConfigError {
    /// Configuration file does not exist.
    #[display(
        fmt = "configuration file {} does not exist, specify one with the --config option",
        "_0.display()"
    )]
    NotFound(#[error(ignore)] PathBuf),

    /// Requested target is absent from the configuration file.
    #[display(fmt = "target {} is not defined in the configuration file", _0)]
    UndefinedTarget(#[error(ignore)] String),

    /// Unable to parse the configuration using [`figment`].
    Figment(figment::Error),
}

/// Target as it is written in the configuration file.
#[derive(Default, Deserialize)]
struct RawTarget {
    /// Build project name.
    project_name: Option<String>,

    /// Source archive bucket.
    source_bucket: Option<String>,

    /// Source archive object key.
    source_key: Option<String>,

    /// Directory to be archived.
    directory: Option<String>,
}

/// Single deployment target from the configuration file.
///
/// Missing keys are reported as warnings and default to empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct TargetConfig {
    /// Build project name.
    pub project_name: String,

    /// Source archive bucket.
    pub source_bucket: String,

    /// Source archive object key.
    pub source_key: String,

    /// Directory to be archived.
    pub directory: String,
}

impl TargetConfig {
    /// Load the `target` section of the YAML configuration file at `path`.
    pub fn load(path: &Path, target: &str) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_owned()));
        }

        let figment = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(&figment, target)
    }

    /// Extract the `target` section.
    ///
    /// Target names are matched literally against top-level keys, so names containing
    /// dots are not treated as nested paths.
    fn from_figment(figment: &Figment, target: &str) -> Result<Self, ConfigError> {
        let mut targets: Dict = figment.extract()?;

        let raw: RawTarget = targets
            .remove(target)
            .ok_or_else(|| ConfigError::UndefinedTarget(target.to_owned()))?
            .deserialize()?;

        Ok(Self {
            project_name: required(raw.project_name, "project_name", target),
            source_bucket: required(raw.source_bucket, "source_bucket", target),
            source_key: required(raw.source_key, "source_key", target),
            directory: required(raw.directory, "directory", target),
        })
    }
}

/// Unwrap a configuration value, warning about and defaulting a missing one.
fn required(value: Option<String>, key: &str, target: &str) -> String {
    value.unwrap_or_else(|| {
        warn!(key, target, "configuration key is not defined");
        console::warning(format!("Configuration key {key} is not defined for target {target}."));
        String::new()
    })
}

/// Archive file name used when no source name is provided.
pub(crate) const DEFAULT_ARCHIVE_NAME: &str = "source.zip";

/// Effective settings of a single invocation.
///
/// Every value follows the same precedence: explicit flag, then
/// configuration file value, then built-in default.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    /// Credentials used by every remote service client.
    pub credentials: CredentialSpec,

    /// Build project name.
    pub project_name: String,

    /// Source archive bucket.
    pub bucket: String,

    /// Source archive object key.
    pub object_key: String,

    /// Directory to be archived.
    pub directory: PathBuf,

    /// Archive file name.
    pub archive_name: String,

    /// Archive the source directory.
    pub zip: bool,

    /// Upload the source archive.
    pub put: bool,

    /// Start a build.
    pub build: bool,

    /// Build identifier to query the status of.
    pub stat: Option<String>,
}

impl Settings {
    /// Combine parsed flags with the loaded target configuration.
    pub fn new(cli: Cli, target: TargetConfig) -> Self {
        let archive_name = cli
            .source
            .filter(|source| !source.is_empty())
            .map(|source| format!("{source}.zip"))
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_owned());

        let object_key = Some(target.source_key)
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| archive_name.clone());

        Settings {
            credentials: CredentialSpec {
                profile: cli.profile,
                role_arn: cli.role,
                region: cli.region,
                endpoint: cli.endpoint,
            },
            project_name: target.project_name,
            bucket: flag_or(cli.bucket, target.source_bucket),
            object_key,
            directory: PathBuf::from(flag_or(cli.dir, target.directory)),
            archive_name,
            zip: cli.zip,
            put: cli.put,
            build: cli.build,
            stat: cli.stat.filter(|stat| !stat.is_empty()),
        }
    }
}

/// Non-empty flag value, or the configuration value otherwise.
fn flag_or(flag: Option<String>, config: String) -> String {
    flag.filter(|value| !value.is_empty()).unwrap_or(config)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use clap::Parser;
    use figment::Jail;

    use super::{ConfigError, Settings, TargetConfig};
    use crate::cli::Cli;

    const CONFIG: &str = r#"
default:
  project_name: backend
  source_bucket: artifacts
  source_key: backend/source.zip
  directory: src
partial:
  project_name: frontend
"#;

    fn load(jail: &Jail, target: &str) -> Result<TargetConfig, ConfigError> {
        TargetConfig::load(&jail.directory().join("config.yml"), target)
    }

    #[test]
    fn loads_target() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yml", CONFIG)?;

            let target = load(jail, "default").map_err(|e| e.to_string())?;

            assert_eq!(
                target,
                TargetConfig {
                    project_name: String::from("backend"),
                    source_bucket: String::from("artifacts"),
                    source_key: String::from("backend/source.zip"),
                    directory: String::from("src"),
                }
            );

            Ok(())
        });
    }

    #[test]
    fn missing_keys_default_to_empty() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yml", CONFIG)?;

            let target = load(jail, "partial").map_err(|e| e.to_string())?;

            assert_eq!(target.project_name, "frontend");
            assert_eq!(target.source_bucket, "");
            assert_eq!(target.source_key, "");
            assert_eq!(target.directory, "");

            Ok(())
        });
    }

    #[test]
    fn undefined_target() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yml", CONFIG)?;

            assert!(matches!(
                load(jail, "staging"),
                Err(ConfigError::UndefinedTarget(target)) if target == "staging"
            ));

            Ok(())
        });
    }

    #[test]
    fn dotted_target_name_is_literal() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yml",
                r#"
api.v2:
  project_name: api
  source_bucket: artifacts
  source_key: api/source.zip
  directory: api
api:
  project_name: legacy
"#,
            )?;

            let target = load(jail, "api.v2").map_err(|e| e.to_string())?;

            assert_eq!(target.project_name, "api");
            assert_eq!(target.source_bucket, "artifacts");
            assert_eq!(target.directory, "api");

            Ok(())
        });
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            TargetConfig::load(Path::new("definitely/not/here.yml"), "default"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yml", CONFIG)?;
            jail.set_env("CBDEPLOY_DEFAULT__SOURCE_BUCKET", "from-env");

            let target = load(jail, "default").map_err(|e| e.to_string())?;

            assert_eq!(target.source_bucket, "from-env");
            assert_eq!(target.project_name, "backend");

            Ok(())
        });
    }

    fn target() -> TargetConfig {
        TargetConfig {
            project_name: String::from("backend"),
            source_bucket: String::from("artifacts"),
            source_key: String::new(),
            directory: String::from("src"),
        }
    }

    #[test]
    fn flags_take_precedence() {
        let cli = Cli::parse_from([
            "cbdeploy",
            "--bucket",
            "override",
            "--dir",
            "app",
            "--source",
            "release",
            "--profile",
            "dev",
        ]);

        let settings = Settings::new(cli, target());

        assert_eq!(settings.bucket, "override");
        assert_eq!(settings.directory, PathBuf::from("app"));
        assert_eq!(settings.archive_name, "release.zip");
        assert_eq!(settings.object_key, "release.zip");
        assert_eq!(settings.credentials.profile.as_deref(), Some("dev"));
        assert_eq!(settings.credentials.region, "ap-northeast-1");
    }

    #[test]
    fn config_values_and_defaults() {
        let settings = Settings::new(Cli::parse_from(["cbdeploy"]), target());

        assert_eq!(settings.bucket, "artifacts");
        assert_eq!(settings.directory, PathBuf::from("src"));
        assert_eq!(settings.archive_name, "source.zip");
        assert_eq!(settings.project_name, "backend");
        assert!(!settings.zip && !settings.put && !settings.build);
        assert_eq!(settings.stat, None);
    }

    #[test]
    fn source_key_is_used_as_object_key() {
        let settings = Settings::new(
            Cli::parse_from(["cbdeploy"]),
            TargetConfig {
                source_key: String::from("backend/source.zip"),
                ..target()
            },
        );

        assert_eq!(settings.object_key, "backend/source.zip");
    }
}
