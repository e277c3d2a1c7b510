use async_trait::async_trait;
pub use aws_sdk_s3::{primitives::ByteStream, Error};
use aws_sdk_s3::{config::Builder, Client};
use tracing::{debug, instrument};

use crate::credentials::ResolvedClientConfig;

/// A single object upload.
#[derive(Debug)]
pub struct PutObject {
    /// Destination bucket name.
    pub bucket: String,

    /// Destination object key.
    pub key: String,

    /// Object contents, streamed to the service as the request body.
    pub body: ByteStream,

    /// `Content-Type` value, omitted from the request when [`None`].
    pub content_type: Option<String>,

    /// `Cache-Control` value, omitted from the request when [`None`].
    pub cache_control: Option<String>,
}

/// Object storage capable of accepting uploads.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a single object in one attempt.
    async fn put_object(&self, object: PutObject) -> Result<(), Error>;
}

/// [`ObjectStore`] backed by AWS S3.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create new [`S3ObjectStore`] from the provided [`ResolvedClientConfig`].
    ///
    /// Overridden endpoints are addressed path-style.
    pub fn new(config: &ResolvedClientConfig) -> Self {
        let s3_config = Builder::from(config.sdk_config())
            .force_path_style(config.endpoint_overridden())
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip_all, fields(bucket = %object.bucket, key = %object.key))]
    async fn put_object(&self, object: PutObject) -> Result<(), Error> {
        debug!(size = object.body.size_hint().0, "sending put object request");

        self.client
            .put_object()
            .bucket(object.bucket)
            .key(object.key)
            .body(object.body)
            .set_content_type(object.content_type)
            .set_cache_control(object.cache_control)
            .send()
            .await?;

        Ok(())
    }
}
