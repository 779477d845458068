use super::{ObjectMeta, ObjectStore, StoredObject, hashing::HashingReader, object_key};
use anyhow::{Context, Result};
use aws_sdk_s3::{
    Client,
    presigning::PresigningConfig,
    primitives::{ByteStream, SdkBody},
};
use futures::TryStreamExt;
use http_body_util::StreamBody;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// S3-backed implementation of [`ObjectStore`], grounded on the
/// teacher's `storage::backends::S3Storage` client setup but
/// generalized to operate against an arbitrary bucket per call (this
/// service juggles three buckets: image, other, temporary) rather than
/// one fixed bucket per client instance.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_from_env().await;
        Ok(Self::new(Client::new(&config)))
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn store(
        &self,
        bucket: &str,
        name: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        size: u64,
        content_type: &str,
    ) -> Result<StoredObject> {
        let (bucket, key) = object_key(bucket, name);

        // Hashing and uploading share one pass over the bytes: the
        // reader (whether it's backed by an in-memory buffer or a
        // spooled temp file) is wrapped in a hasher, turned into a
        // chunked byte stream, and handed to the client as a streaming
        // body, so a file spooled above `max_in_memory` is never fully
        // materialized in RAM just to upload it.
        let (hashing, hash) = HashingReader::new(reader);
        let chunks = ReaderStream::new(hashing).map_ok(http_body::Frame::data);
        let body = ByteStream::new(SdkBody::from_body_1_x(StreamBody::new(chunks)));

        self.client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .content_type(content_type)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .context("failed to put object")?;

        Ok(StoredObject {
            size,
            sha256_hex: hash.finalize_hex(),
        })
    }

    async fn get(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Option<(Box<dyn AsyncRead + Send + Unpin>, ObjectMeta)>> {
        let (bucket, key) = object_key(bucket, name);
        match self.client.get_object().bucket(&bucket).key(&key).send().await {
            Ok(output) => {
                let content_type = output
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let stream = output.body.into_async_read();
                Ok(Some((Box::new(stream), ObjectMeta { size, content_type })))
            }
            Err(err) => {
                if err.as_service_error().map(|e| e.is_no_such_key()) == Some(true) {
                    Ok(None)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn exists(&self, bucket: &str, name: &str) -> Result<bool> {
        let (bucket, key) = object_key(bucket, name);
        match self.client.head_object().bucket(&bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().map(|e| e.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn copy(&self, src: (&str, &str), dst: (&str, &str)) -> Result<()> {
        let (src_bucket, src_key) = object_key(src.0, src.1);
        let (dst_bucket, dst_key) = object_key(dst.0, dst.1);
        self.client
            .copy_object()
            .bucket(&dst_bucket)
            .key(&dst_key)
            .copy_source(format!("{src_bucket}/{src_key}"))
            .send()
            .await
            .context("failed to copy object")?;
        Ok(())
    }

    async fn remove(&self, bucket: &str, name: &str) -> Result<()> {
        let (bucket, key) = object_key(bucket, name);
        self.client
            .delete_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .context("failed to delete object")?;
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, name: &str, ttl: Duration) -> Result<String> {
        let (bucket, key) = object_key(bucket, name);
        let presigned = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .context("failed to presign object")?;
        Ok(presigned.uri().to_string())
    }
}
