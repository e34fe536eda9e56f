use crate::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised while fetching the source object. Always fatal to the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to read object {key} from bucket {bucket}: {message}")]
    Request {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Timed out reading object {key} after {elapsed:?}")]
    Timeout {
        key: String,
        elapsed: std::time::Duration,
    },
}

/// Byte-fetch capability for arrived files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch the full contents of an object
    async fn fetch(&self, container_id: &str, object_key: &str) -> Result<Vec<u8>, FetchError>;
}

/// S3-backed object source
pub struct S3ObjectSource {
    client: S3Client,
}

impl S3ObjectSource {
    /// Create a new S3 source from a loaded AWS configuration
    pub fn new(aws_config: &aws_config::SdkConfig, config: &S3Config) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            endpoint = ?config.endpoint_url,
            "S3 object source initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl ObjectSource for S3ObjectSource {
    #[instrument(skip(self))]
    async fn fetch(&self, container_id: &str, object_key: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |message: String| FetchError::Request {
            bucket: container_id.to_string(),
            key: object_key.to_string(),
            message,
        };

        let response = self
            .client
            .get_object()
            .bucket(container_id)
            .key(object_key)
            .send()
            .await
            .map_err(|e| request_error(DisplayErrorContext(&e).to_string()))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| request_error(e.to_string()))?
            .into_bytes();

        debug!(size_bytes = body.len(), "Object downloaded");

        Ok(body.to_vec())
    }
}
