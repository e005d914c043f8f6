mod error;

use std::path::Path;
use std::time::Duration;

use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};

pub use error::{Result, S3Error};

const PRESIGN_TTL: Duration = Duration::from_secs(900);
const DELETE_BATCH: usize = 1000;

/// Object store adapter: bytes in/out addressed by key, directory-prefix deletion,
/// presigned upload URLs, JSON/text read helpers.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_env(bucket: impl Into<String>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        Self::new(Client::new(&config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Presigned PUT URL, `content_type`-bound, valid for 15 minutes.
    pub async fn generate_presigned_url(
        &self,
        object_key: &str,
        content_type: &str,
    ) -> Result<String> {
        let presign_config = PresigningConfig::expires_in(PRESIGN_TTL)
            .map_err(|e| S3Error::Presign(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(content_type)
            .presigned(presign_config)
            .await
            .map_err(|e| S3Error::Presign(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    pub async fn upload_file(&self, local_path: &Path, object_key: &str) -> Result<()> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path)
            .await
            .map_err(|e| S3Error::Upload(Box::new(e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(body)
            .send()
            .await
            .map_err(|e| S3Error::Upload(Box::new(e)))?;

        tracing::info!(bucket = %self.bucket, key = %object_key, "uploaded_file");
        Ok(())
    }

    pub async fn upload_bytes(&self, bytes: Vec<u8>, object_key: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(bytes.into())
            .send()
            .await
            .map_err(|e| S3Error::Upload(Box::new(e)))?;

        Ok(())
    }

    pub async fn download_file(&self, object_key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| {
                if is_no_such_key(&e) {
                    S3Error::NotFound(object_key.to_string())
                } else {
                    S3Error::Download(Box::new(e))
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| S3Error::Download(Box::new(e)))?
            .into_bytes();

        tokio::fs::write(local_path, bytes).await?;
        tracing::info!(bucket = %self.bucket, key = %object_key, "downloaded_file");
        Ok(())
    }

    /// All keys under `prefix`, excluding directory-marker entries (those ending in `/`).
    pub async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| S3Error::List(Box::new(e)))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    if !key.ends_with('/') {
                        keys.push(key.to_string());
                    }
                }
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(keys)
    }

    pub async fn read_text(&self, object_key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if is_no_such_key(&e) => return Ok(None),
            Err(e) => return Err(S3Error::Download(Box::new(e))),
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| S3Error::Download(Box::new(e)))?
            .into_bytes();

        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        object_key: &str,
    ) -> Result<Option<T>> {
        let Some(text) = self.read_text(object_key).await? else {
            return Ok(None);
        };

        let value = serde_json::from_str(&text).map_err(|e| S3Error::Json {
            key: object_key.to_string(),
            source: e,
        })?;

        Ok(Some(value))
    }

    /// Recursively deletes every object under `prefix`, batched to the API's 1000-key cap.
    pub async fn delete_folder(&self, prefix: &str) -> Result<()> {
        let keys = self.list_files(prefix).await?;

        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .expect("key is always set")
                })
                .collect();

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| S3Error::Delete(Box::new(e)))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| S3Error::Delete(Box::new(e)))?;
        }

        tracing::info!(bucket = %self.bucket, prefix = %prefix, "deleted_folder");
        Ok(())
    }
}

fn is_no_such_key(
    err: &aws_sdk_s3::error::SdkError<
        aws_sdk_s3::operation::get_object::GetObjectError,
        aws_smithy_runtime_api::client::orchestrator::HttpResponse,
    >,
) -> bool {
    err.as_service_error()
        .map(|service_err| service_err.is_no_such_key())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presign_ttl_is_fifteen_minutes() {
        assert_eq!(PRESIGN_TTL, Duration::from_secs(900));
    }

    #[test]
    fn delete_batch_matches_s3_api_cap() {
        assert_eq!(DELETE_BATCH, 1000);
    }
}
