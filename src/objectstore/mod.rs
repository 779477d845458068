//! The object-store gateway: streaming put/get/copy/stat/presign
//! against whatever bucket a caller names. Generalizes the teacher's
//! `storage::StorageOperations` trait from a local/S3/memory backend
//! abstraction into a single S3-only gateway, since this service only
//! ever talks to one kind of durable object storage (see DESIGN.md for
//! why the other backends were dropped).

mod hashing;
mod s3;

pub use s3::S3ObjectStore;

use anyhow::Result;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Bytes plus the metadata recorded as a side effect of streaming them
/// in: the hash is produced by the same pass that uploads the content,
/// never a second read over the bytes.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub size: u64,
    pub sha256_hex: String,
}

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: String,
}

/// Splits a `"bucket/prefix"` string into the bucket name and a key
/// prefix: the gateway splits on the first `/` and joins the prefix to
/// the object name.
pub fn split_bucket(bucket: &str) -> (&str, Option<&str>) {
    match bucket.split_once('/') {
        Some((bucket, prefix)) if !prefix.is_empty() => (bucket, Some(prefix)),
        _ => (bucket.trim_end_matches('/'), None),
    }
}

pub fn object_key(bucket: &str, name: &str) -> (String, String) {
    let (bucket, prefix) = split_bucket(bucket);
    let key = match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), name),
        None => name.to_string(),
    };
    (bucket.to_string(), key)
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams `reader` into `(bucket, name)`, hashing as it goes.
    /// `size` bounds how much will be read; `content_type` becomes the
    /// stored object's content type.
    async fn store(
        &self,
        bucket: &str,
        name: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        size: u64,
        content_type: &str,
    ) -> Result<StoredObject>;

    async fn get(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Option<(Box<dyn AsyncRead + Send + Unpin>, ObjectMeta)>>;

    async fn exists(&self, bucket: &str, name: &str) -> Result<bool>;

    async fn copy(&self, src: (&str, &str), dst: (&str, &str)) -> Result<()>;

    async fn remove(&self, bucket: &str, name: &str) -> Result<()>;

    async fn presign_get(&self, bucket: &str, name: &str, ttl: Duration) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bucket_and_prefix_on_first_slash() {
        assert_eq!(split_bucket("avatars/users"), ("avatars", Some("users")));
        assert_eq!(split_bucket("avatars/users/nested"), ("avatars", Some("users/nested")));
        assert_eq!(split_bucket("avatars"), ("avatars", None));
    }

    #[test]
    fn joins_prefix_into_object_key() {
        let (bucket, key) = object_key("avatars/users", "abc123");
        assert_eq!(bucket, "avatars");
        assert_eq!(key, "users/abc123");

        let (bucket, key) = object_key("avatars", "abc123");
        assert_eq!(bucket, "avatars");
        assert_eq!(key, "abc123");
    }
}
