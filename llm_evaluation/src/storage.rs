use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{info, warn};

pub const HOST_VAR: &str = "BUCKET_STORAGE_HOST";
pub const ACCESS_KEY_VAR: &str = "BUCKET_STORAGE_ACCESS_KEY";
pub const SECRET_KEY_VAR: &str = "BUCKET_STORAGE_SECRET_KEY";
pub const BUCKET_VAR: &str = "BUCKET_STORAGE_BUCKET";

/// Key prefix for uploaded evaluation artifacts.
pub const METRICS_PREFIX: &str = "llm-evaluation-metrics";

const REGION: &str = "us-east-1";

/// S3-compatible bucket that receives a copy of the aggregate results.
///
/// Uploads are best effort: failures are logged and never abort a run.
#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
}

impl ObjectStorage {
    pub fn new(host: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let endpoint = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        let credentials = Credentials::new(access_key, secret_key, None, None, "llm-evaluation");
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new(REGION))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
        }
    }

    /// `None` (with a warning) when the storage variables are not set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let Some(host) = lookup(HOST_VAR).filter(|h| !h.is_empty()) else {
            warn!("{} is not set, object storage uploads are disabled", HOST_VAR);
            return None;
        };
        let (Some(access_key), Some(secret_key), Some(bucket)) =
            (lookup(ACCESS_KEY_VAR), lookup(SECRET_KEY_VAR), lookup(BUCKET_VAR))
        else {
            warn!(
                "{} is set but {}, {} or {} is missing, object storage uploads are disabled",
                HOST_VAR, ACCESS_KEY_VAR, SECRET_KEY_VAR, BUCKET_VAR
            );
            return None;
        };
        info!("Uploading results to bucket {} at {}", bucket, host);
        Some(Self::new(&host, &access_key, &secret_key, &bucket))
    }

    /// Upload `local_path` under `key`. Returns whether the upload succeeded.
    pub async fn upload(&self, local_path: &Path, key: &str) -> bool {
        match self.try_upload(local_path, key).await {
            Ok(()) => {
                info!("Uploaded {} to {}/{}", local_path.display(), self.bucket, key);
                true
            }
            Err(e) => {
                warn!("Upload of {} failed: {:#}", local_path.display(), e);
                false
            }
        }
    }

    async fn try_upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .context("put_object failed")?;
        Ok(())
    }
}
