use async_trait::async_trait;
use aws_sdk_codebuild::{
    primitives::DateTime,
    types::{Build, BuildPhase},
    Client,
};
use derive_more::{Display, Error, From};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::credentials::ResolvedClientConfig;

/// Build service errors.
#[derive(Debug, Display, From, Error)]
pub enum BuildServiceError {
    /// Error returned by the build service, passed through as is.
    Service(aws_sdk_codebuild::Error),

    /// Build was started, but the response did not identify it.
    #[display(fmt = "build service response did not include a build id")]
    MissingBuildId,
}

/// Snapshot of a single build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildStatusReport {
    /// Build identifier.
    pub job_id: String,

    /// Overall build status, such as `IN_PROGRESS` or `SUCCEEDED`.
    pub overall_status: String,

    /// Phases in the order returned by the build service.
    pub phases: Vec<PhaseRecord>,
}

/// A single build phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseRecord {
    /// Phase name, such as `PROVISIONING` or `BUILD`.
    pub phase_type: String,

    /// Phase status. Phases that are still running have none.
    pub phase_status: Option<String>,

    /// Phase start time.
    pub start_time: Option<OffsetDateTime>,

    /// Phase end time, absent until the phase completes.
    pub end_time: Option<OffsetDateTime>,
}

/// Remote build service.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Start a new build of the provided project and return its identifier.
    async fn start_build(&self, project_name: &str) -> Result<String, BuildServiceError>;

    /// Fetch current status snapshots for the provided build identifiers.
    async fn get_build_statuses(
        &self,
        job_ids: &[String],
    ) -> Result<Vec<BuildStatusReport>, BuildServiceError>;
}

/// [`BuildService`] backed by AWS CodeBuild.
pub struct CodeBuildService {
    client: Client,
}

impl CodeBuildService {
    /// Create new [`CodeBuildService`] from the provided [`ResolvedClientConfig`].
    pub fn new(config: &ResolvedClientConfig) -> Self {
        Self {
            client: Client::new(config.sdk_config()),
        }
    }
}

#[async_trait]
impl BuildService for CodeBuildService {
    #[instrument(skip(self))]
    async fn start_build(&self, project_name: &str) -> Result<String, BuildServiceError> {
        let output = self
            .client
            .start_build()
            .project_name(project_name)
            .send()
            .await
            .map_err(aws_sdk_codebuild::Error::from)?;

        let id = output
            .build_value()
            .and_then(Build::id)
            .ok_or(BuildServiceError::MissingBuildId)?;

        debug!(id, "build started");

        Ok(id.to_owned())
    }

    #[instrument(skip(self))]
    async fn get_build_statuses(
        &self,
        job_ids: &[String],
    ) -> Result<Vec<BuildStatusReport>, BuildServiceError> {
        let output = self
            .client
            .batch_get_builds()
            .set_ids(Some(job_ids.to_vec()))
            .send()
            .await
            .map_err(aws_sdk_codebuild::Error::from)?;

        Ok(output.builds().iter().map(status_report).collect())
    }
}

/// Convert a CodeBuild [`Build`] into a [`BuildStatusReport`].
fn status_report(build: &Build) -> BuildStatusReport {
    BuildStatusReport {
        job_id: build.id().unwrap_or_default().to_owned(),
        overall_status: build
            .build_status()
            .map(|status| status.as_str().to_owned())
            .unwrap_or_default(),
        phases: build.phases().iter().map(phase_record).collect(),
    }
}

fn phase_record(phase: &BuildPhase) -> PhaseRecord {
    PhaseRecord {
        phase_type: phase
            .phase_type()
            .map(|phase_type| phase_type.as_str().to_owned())
            .unwrap_or_default(),
        phase_status: phase.phase_status().map(|status| status.as_str().to_owned()),
        start_time: phase.start_time().and_then(offset_date_time),
        end_time: phase.end_time().and_then(offset_date_time),
    }
}

fn offset_date_time(value: &DateTime) -> Option<OffsetDateTime> {
    let nanos = i128::from(value.secs()) * 1_000_000_000 + i128::from(value.subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}
