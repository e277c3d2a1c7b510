use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use common::{
    codebuild::{BuildService, BuildServiceError, CodeBuildService},
    credentials::{self, CredentialError, CredentialSpec},
    s3::{ObjectStore, S3ObjectStore},
};
use derive_more::{Display, Error, From};
use tracing::{info, instrument};

use crate::{
    archiver::{self, ArchiverError},
    build::{self, StatusError},
    config::{ConfigError, Settings},
    console,
    upload::{self, UploadError, UploadRequest, ARCHIVE_CONTENT_TYPE},
};

/// Deployment errors, one per failed stage.
#[derive(Debug, Display, From, Error)]
pub(crate) enum DeployError {
    /// Configuration file or target error.
    Config(ConfigError),

    /// Bucket name is empty after applying every fallback.
    #[display(fmt = "source bucket for CodeBuild is not specified")]
    #[from(ignore)]
    MissingBucket,

    /// Source directory does not exist.
    #[display(fmt = "source directory {} does not exist", "_0.display()")]
    #[from(ignore)]
    MissingDirectory(#[error(ignore)] PathBuf),

    /// Unable to determine archive location.
    #[display(fmt = "unable to locate archive destination: {}", _0)]
    Io(io::Error),

    /// Remote service credentials could not be resolved.
    #[display(fmt = "unable to resolve credentials: {}", _0)]
    Credentials(CredentialError),

    /// Archive stage failure.
    #[display(fmt = "unable to create source archive: {}", _0)]
    Archive(ArchiverError),

    /// Upload stage failure.
    #[display(fmt = "unable to upload source archive: {}", _0)]
    Upload(UploadError),

    /// Build trigger stage failure.
    #[display(fmt = "unable to start build: {}", _0)]
    Build(BuildServiceError),

    /// Build status query failure.
    #[display(fmt = "unable to get build status: {}", _0)]
    Status(StatusError),
}

/// Successful pipeline completion.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Every requested stage finished.
    Completed,

    /// Build status was reported, remaining stages were not considered.
    StatusReported,
}

/// Remote service client factory.
///
/// Each call produces a client from freshly resolved credentials.
#[async_trait(?Send)]
pub(crate) trait Connector {
    /// Object store the source archive is uploaded to.
    async fn object_store(&self) -> Result<Box<dyn ObjectStore>, CredentialError>;

    /// Build service used to start builds and query their status.
    async fn build_service(&self) -> Result<Box<dyn BuildService>, CredentialError>;
}

/// [`Connector`] for AWS services.
pub(crate) struct AwsConnector {
    /// Credentials every client is resolved from.
    spec: CredentialSpec,
}

impl AwsConnector {
    /// Create new [`AwsConnector`].
    pub fn new(spec: CredentialSpec) -> Self {
        Self { spec }
    }
}

#[async_trait(?Send)]
impl Connector for AwsConnector {
    async fn object_store(&self) -> Result<Box<dyn ObjectStore>, CredentialError> {
        let config = credentials::resolve(&self.spec).await?;
        Ok(Box::new(S3ObjectStore::new(&config)))
    }

    async fn build_service(&self) -> Result<Box<dyn BuildService>, CredentialError> {
        let config = credentials::resolve(&self.spec).await?;
        Ok(Box::new(CodeBuildService::new(&config)))
    }
}

/// Execute the deployment pipeline.
///
/// Stages run strictly in order: status query (exclusive), archive, upload, build.
/// The first failing stage aborts the pipeline. Already finished stages are not rolled back.
#[instrument(skip_all)]
pub(crate) async fn run<C: Connector, W: Write>(
    settings: &Settings,
    connector: &C,
    out: &mut W,
) -> Result<Outcome, DeployError> {
    if settings.bucket.is_empty() {
        return Err(DeployError::MissingBucket);
    }

    if let Some(job_id) = &settings.stat {
        let service = connector.build_service().await?;
        let progress = console::spinner("Fetching build status...");
        let report = build::get_build_status(service.as_ref(), job_id).await;
        progress.finish_and_clear();

        build::render_report(&report?, out).map_err(StatusError::Io)?;

        return Ok(Outcome::StatusReported);
    }

    if !settings.directory.exists() {
        return Err(DeployError::MissingDirectory(settings.directory.clone()));
    }

    let archive_path = archive_path(&settings.directory, &settings.archive_name)?;

    if settings.zip {
        let progress = console::spinner("Archiving...");
        let result = archiver::archive(&settings.directory, &archive_path);
        progress.finish_and_clear();

        result?;
        console::success(format!("Archived source files into {}.", archive_path.display()));
    } else {
        console::skipped("Skipping source archive creation.");
    }

    if settings.put {
        let store = connector.object_store().await?;
        let progress = console::spinner("Uploading...");
        let result = upload::put_object(
            store.as_ref(),
            UploadRequest {
                bucket: settings.bucket.clone(),
                key: settings.object_key.clone(),
                local_file_path: archive_path,
                content_type: Some(ARCHIVE_CONTENT_TYPE.to_owned()),
                cache_control: None,
            },
        )
        .await;
        progress.finish_and_clear();

        result?;
        console::success(format!(
            "Uploaded source archive to s3://{}/{}.",
            settings.bucket, settings.object_key
        ));
    } else {
        console::skipped("Skipping source archive upload.");
    }

    if settings.build {
        let service = connector.build_service().await?;
        let progress = console::spinner("Starting build...");
        let result = build::start_build(service.as_ref(), &settings.project_name).await;
        progress.finish_and_clear();

        let job_id = result?;

        console::success(format!(
            "Build started. Project Name: {}, Build ID: {job_id}",
            settings.project_name
        ));
    } else {
        console::skipped("Skipping CodeBuild build.");
    }

    info!("pipeline finished");

    Ok(Outcome::Completed)
}

/// Location of the source archive: next to the archived directory.
pub(crate) fn archive_path(directory: &Path, archive_name: &str) -> io::Result<PathBuf> {
    let directory = if directory.is_absolute() {
        directory.to_owned()
    } else {
        env::current_dir()?.join(directory)
    };

    let parent = directory
        .canonicalize()?
        .parent()
        .map(ToOwned::to_owned)
        .unwrap_or(directory);

    Ok(parent.join(archive_name))
}
