//! [`ObjectStore`] backed by Amazon S3 (or anything speaking its API).
//!
//! Credentials and region come from the standard `aws-config` chain; set
//! `S3_ENDPOINT_URL` to talk to a local S3-compatible server (path-style
//! addressing is switched on in that case).
//!
//! Files larger than the chunk size go up as multipart uploads with that
//! part size, so the ETag S3 assigns equals the digest
//! [`ContentHasher`](docstage_core::hash::ContentHasher) computes locally.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use docstage_core::contract::{DeleteFailure, DeleteResult, ObjectStore, RemoteObject, UploadOptions};
use docstage_core::error::StoreError;
use docstage_core::hash::DEFAULT_CHUNK_SIZE;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Environment variable overriding the S3 endpoint.
pub const ENDPOINT_ENV: &str = "S3_ENDPOINT_URL";

const FORBIDDEN_CODES: [&str; 4] = [
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AllAccessDisabled",
];
const NOT_FOUND_CODES: [&str; 3] = ["NoSuchKey", "NoSuchBucket", "NotFound"];

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    chunk_size: usize,
}

impl S3Store {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Build a client from the default AWS configuration chain.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            info!(endpoint = %endpoint, "Using custom S3 endpoint");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(Client::from_conf(builder.build()), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_file(&self, local_path: &Path, key: &str, options: &UploadOptions) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::Backend(format!("reading {}: {e}", local_path.display())))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(&options.content_type)
            .cache_control(&options.cache_control)
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        local_path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> Result<(), StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&options.content_type)
            .cache_control(&options.cache_control)
            .send()
            .await
            .map_err(|e| classify("create_multipart_upload", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Backend(format!("no upload id returned for {key}")))?
            .to_string();

        match self.upload_parts(local_path, key, &upload_id).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| classify("complete_multipart_upload", e))?;
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Aborting multipart upload");
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %DisplayErrorContext(&abort), "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        local_path: &Path,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let mut file = tokio::fs::File::open(local_path).await?;
        let mut parts = Vec::new();
        let mut part_number = 1i32;

        loop {
            let mut buffer = vec![0u8; self.chunk_size];
            let filled = fill_chunk(&mut file, &mut buffer).await?;
            if filled == 0 {
                break;
            }
            buffer.truncate(filled);

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .map_err(|e| classify("upload_part", e))?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(uploaded.e_tag().unwrap_or_default())
                    .build(),
            );
            debug!(key = %key, part = part_number, "Uploaded part");

            if filled < self.chunk_size {
                break;
            }
            part_number += 1;
        }
        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation_token.take() {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(|e| classify("list_objects_v2", e))?;

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    objects.push(RemoteObject::new(
                        key,
                        obj.size().unwrap_or_default().max(0) as u64,
                        obj.e_tag().unwrap_or_default(),
                    ));
                }
            }

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
            } else {
                break;
            }
        }
        debug!(prefix = %prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> Result<(), StoreError> {
        let size = tokio::fs::metadata(local_path).await?.len();
        if size > self.chunk_size as u64 {
            self.put_multipart(local_path, key, options).await
        } else {
            self.put_file(local_path, key, options).await
        }
    }

    async fn get_redirect(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(head.website_redirect_location().map(str::to_string)),
            Err(e) => match classify("head_object", e) {
                StoreError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn set_redirect(&self, key: &str, destination: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from_static(b""))
            .website_redirect_location(destination)
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteResult, StoreError> {
        if keys.is_empty() {
            return Ok(DeleteResult::default());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let resp = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| classify("delete_objects", e))?;

        let errors = resp
            .errors()
            .iter()
            .map(|err| DeleteFailure {
                key: err.key().unwrap_or_default().to_string(),
                message: format!(
                    "{}: {}",
                    err.code().unwrap_or("Unknown"),
                    err.message().unwrap_or_default()
                ),
            })
            .collect();
        Ok(DeleteResult { errors })
    }
}

/// Map an SDK failure onto the store error taxonomy.
fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let status = err.raw_response().map(|resp| resp.status().as_u16());
    let message = format!("{operation}: {}", DisplayErrorContext(&err));

    let code = code.as_deref().unwrap_or_default();
    if FORBIDDEN_CODES.contains(&code) || status == Some(403) {
        StoreError::Forbidden(message)
    } else if NOT_FOUND_CODES.contains(&code) || status == Some(404) {
        StoreError::NotFound(message)
    } else {
        StoreError::Backend(message)
    }
}

async fn fill_chunk(file: &mut tokio::fs::File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
