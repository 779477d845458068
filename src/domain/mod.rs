//! Domain types: the pure, I/O-free records that the upload
//! lifecycle and ownership model are built from, plus the [`FileDomain`]
//! constructors that stamp them with fresh tokens, ids, and expiry
//! times.

mod classify;
mod snowflake;

pub use classify::classify_bucket;
pub use snowflake::SnowflakeGenerator;

use chrono::{DateTime, Utc};
use mime_guess::Mime;
use rand::distr::{Alphanumeric, SampleString};
use std::sync::Arc;
use std::time::Duration;

/// Random opaque token used as a capability (upload token, policy
/// session token, temporary-file token). 32 URL-safe characters gives
/// ~190 bits of entropy, comfortably single-shot-safe.
fn random_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 32)
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub token: String,
    pub user_id: i64,
    pub allowed_types: Vec<Mime>,
    pub max_size: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub r#type: Mime,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadSession {
    pub token: String,
    pub policy_source: String,
    pub policy_metadata: String,
    pub file_metadata: FileMetadata,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TemporaryFileSession {
    pub token: String,
    pub upload_session_info: UploadSession,
    pub file_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub id: String,
    pub bucket: String,
    pub r#type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileOwnership {
    pub id: i64,
    pub file_id: String,
    pub user_id: i64,
    pub refcount: i64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileToken {
    pub id: i64,
    pub ownership_id: i64,
    pub file_id: String,
    pub user_id: i64,
    pub bucket: String,
    pub r#type: String,
    pub size: i64,
    pub expires_at: i64,
}

/// Default upload policy a policy source starts from before the
/// external issuer's override is applied.
#[derive(Debug, Clone)]
pub struct DefaultPolicy {
    pub allowed_types: Vec<Mime>,
    pub max_size: u64,
}

/// Owns the business rules that are pure functions of the domain's own
/// config: default policies, classification, and fresh-record
/// construction. Holds no connections besides the snowflake generator's
/// in-memory counter — it is cloned freely (`Arc` inside).
#[derive(Debug, Clone)]
pub struct FileDomain {
    default_image_allowed_types: Vec<Mime>,
    default_max_file_size: u64,
    upload_ttl: Duration,
    upload_session_ttl: Duration,
    temporary_file_ttl: Duration,
    ids: Arc<SnowflakeGenerator>,
}

impl FileDomain {
    pub fn new(
        default_image_allowed_types: Vec<Mime>,
        default_max_file_size: u64,
        upload_ttl: Duration,
        upload_session_ttl: Duration,
        temporary_file_ttl: Duration,
        snowflake_node: u16,
    ) -> Self {
        Self {
            default_image_allowed_types,
            default_max_file_size,
            upload_ttl,
            upload_session_ttl,
            temporary_file_ttl,
            ids: Arc::new(SnowflakeGenerator::new(snowflake_node)),
        }
    }

    /// Classification is pure: it depends only on the content type.
    pub fn classify_bucket<'a>(&self, t: &Mime, image_bucket: &'a str, other_bucket: &'a str) -> &'a str {
        classify_bucket(t, image_bucket, other_bucket)
    }

    pub fn default_avatar_upload_policy(&self) -> DefaultPolicy {
        DefaultPolicy {
            allowed_types: self.default_image_allowed_types.clone(),
            max_size: self.default_max_file_size,
        }
    }

    pub fn new_upload_policy(&self, user_id: i64, allowed_types: Vec<Mime>, max_size: u64) -> UploadPolicy {
        UploadPolicy {
            token: random_token(),
            user_id,
            allowed_types,
            max_size,
            expires_at: Utc::now() + self.upload_ttl,
        }
    }

    pub fn new_upload_session(
        &self,
        policy_source: String,
        policy_metadata: String,
        file_metadata: FileMetadata,
    ) -> UploadSession {
        UploadSession {
            token: random_token(),
            policy_source,
            policy_metadata,
            file_metadata,
            expires_at: Utc::now() + self.upload_session_ttl,
        }
    }

    pub fn new_temporary_file_session(
        &self,
        upload_session_info: UploadSession,
        file_hash: String,
    ) -> TemporaryFileSession {
        TemporaryFileSession {
            token: random_token(),
            upload_session_info,
            file_hash,
            expires_at: Utc::now() + self.temporary_file_ttl,
        }
    }

    pub fn new_file_info(&self, id: String, bucket: String, r#type: String, size: i64) -> FileInfo {
        FileInfo {
            id,
            bucket,
            r#type,
            size,
            created_at: Utc::now(),
        }
    }

    pub fn new_file_ownership(&self, file_id: String, user_id: i64) -> FileOwnership {
        FileOwnership {
            id: self.ids.next_id(),
            file_id,
            user_id,
            refcount: 0,
        }
    }

    pub fn new_file_token(&self, file: &FileInfo, ownership: &FileOwnership, ttl: Duration) -> FileToken {
        FileToken {
            id: self.ids.next_id(),
            ownership_id: ownership.id,
            file_id: file.id.clone(),
            user_id: ownership.user_id,
            bucket: file.bucket.clone(),
            r#type: file.r#type.clone(),
            size: file.size,
            expires_at: (Utc::now() + ttl).timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn domain() -> FileDomain {
        FileDomain::new(
            vec![mime_guess::mime::IMAGE_STAR],
            1024,
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(60),
            1,
        )
    }

    #[test]
    fn fresh_ownerships_start_at_zero_refcount() {
        let d = domain();
        let ownership = d.new_file_ownership("abc".into(), 42);
        assert_eq!(ownership.refcount, 0);
        assert_eq!(ownership.user_id, 42);
    }

    #[test]
    fn default_avatar_policy_mirrors_config() {
        let d = domain();
        let policy = d.default_avatar_upload_policy();
        assert_eq!(policy.max_size, 1024);
        assert_eq!(policy.allowed_types, vec![mime_guess::mime::IMAGE_STAR]);
    }

    #[test]
    fn upload_policy_expires_in_the_future() {
        let d = domain();
        let policy = d.new_upload_policy(1, vec![Mime::from_str("image/png").unwrap()], 10);
        assert!(policy.expires_at > Utc::now());
    }
}
