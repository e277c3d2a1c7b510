use std::io::{self, Write};

use comfy_table::{presets::ASCII_FULL, Table};
use common::codebuild::{BuildService, BuildServiceError, BuildStatusReport, PhaseRecord};
use console::Emoji;
use derive_more::{Display, Error, From};
use time::{
    format_description::FormatItem,
    macros::{format_description, offset},
    OffsetDateTime, UtcOffset,
};
use tracing::{info, instrument};

/// Time zone used to display phase timestamps.
const DISPLAY_OFFSET: UtcOffset = offset!(+9);

/// Display format of phase timestamps.
const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Marker rendered in place of absent values.
pub(crate) const NOT_AVAILABLE: &str = "N/A";

/// Build status query errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum StatusError {
    /// Build service error.
    Service(BuildServiceError),

    /// Build service returned no build for the requested identifier.
    #[display(fmt = "build {} was not found", _0)]
    NotFound(#[error(ignore)] String),

    /// Unable to write the report.
    Io(io::Error),
}

/// Start a build of the provided project and return its identifier.
#[instrument(skip(service))]
pub(crate) async fn start_build(
    service: &dyn BuildService,
    project_name: &str,
) -> Result<String, BuildServiceError> {
    let job_id = service.start_build(project_name).await?;

    info!(%job_id, "build started");

    Ok(job_id)
}

/// Fetch the current status of a single build.
#[instrument(skip(service))]
pub(crate) async fn get_build_status(
    service: &dyn BuildService,
    job_id: &str,
) -> Result<BuildStatusReport, StatusError> {
    service
        .get_build_statuses(&[job_id.to_owned()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StatusError::NotFound(job_id.to_owned()))
}

/// Render the build header and its phase table.
pub(crate) fn render_report<W: Write>(report: &BuildStatusReport, out: &mut W) -> io::Result<()> {
    writeln!(out, "Build ID: {}", report.job_id)?;
    writeln!(out, "Build Status: {}", report.overall_status)?;
    writeln!(out, "{}", phase_table(&report.phases))
}

/// Table with one row per phase, in the order provided.
fn phase_table(phases: &[PhaseRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_header(["Phase", "Status", "Start time", "End time"]);

    for phase in phases {
        table.add_row([
            phase.phase_type.clone(),
            phase
                .phase_status
                .as_deref()
                .map_or_else(|| NOT_AVAILABLE.to_owned(), decorate_status),
            display_time(phase.start_time),
            display_time(phase.end_time),
        ]);
    }

    table
}

/// Prefix a phase status with an emoji marking success or failure.
fn decorate_status(status: &str) -> String {
    if status == "SUCCEEDED" {
        format!("{}{status}", Emoji("✅ ", ""))
    } else {
        format!("{}{status}", Emoji("‼️ ", ""))
    }
}

/// Format a timestamp in the display time zone.
pub(crate) fn display_time(value: Option<OffsetDateTime>) -> String {
    value
        .and_then(|value| value.to_offset(DISPLAY_OFFSET).format(DISPLAY_FORMAT).ok())
        .unwrap_or_else(|| NOT_AVAILABLE.to_owned())
}
