use std::{io, path::PathBuf};

use common::s3::{self, ByteStream, ObjectStore, PutObject};
use derive_more::{Display, Error, From};
use tracing::{info, instrument};

/// Content type attached to uploaded source archives.
pub(crate) const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Upload stage errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum UploadError {
    /// Bucket name is empty after applying every fallback.
    #[display(fmt = "source bucket is not specified")]
    #[from(ignore)]
    MissingBucket,

    /// Local file can not be read.
    #[display(fmt = "unable to open {}: {}", "path.display()", source)]
    Open {
        /// Local file path.
        path: PathBuf,

        /// Underlying IO error.
        source: io::Error,
    },

    /// Object store rejected the upload.
    Service(s3::Error),
}

/// Local file upload parameters.
#[derive(Clone, Debug)]
pub(crate) struct UploadRequest {
    /// Destination bucket, must not be empty.
    pub bucket: String,

    /// Destination object key.
    pub key: String,

    /// File whose contents are uploaded.
    pub local_file_path: PathBuf,

    /// `Content-Type` metadata. Empty values are not sent.
    pub content_type: Option<String>,

    /// `Cache-Control` metadata. Empty values are not sent.
    pub cache_control: Option<String>,
}

/// Upload a local file into the object store in a single attempt.
///
/// The file is streamed from disk rather than read into memory up front.
/// Empty optional metadata values are dropped instead of being sent as empty headers.
#[instrument(skip_all, fields(bucket = %request.bucket, key = %request.key))]
pub(crate) async fn put_object(
    store: &dyn ObjectStore,
    request: UploadRequest,
) -> Result<(), UploadError> {
    if request.bucket.is_empty() {
        return Err(UploadError::MissingBucket);
    }

    let body = ByteStream::from_path(&request.local_file_path)
        .await
        .map_err(|source| UploadError::Open {
            path: request.local_file_path.clone(),
            source: io::Error::other(source),
        })?;

    store
        .put_object(PutObject {
            bucket: request.bucket,
            key: request.key,
            body,
            content_type: non_empty(request.content_type),
            cache_control: non_empty(request.cache_control),
        })
        .await?;

    info!("upload finished");

    Ok(())
}

/// Treat empty strings as absent values.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
