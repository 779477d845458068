use crate::domain::{FileMetadata, TemporaryFileSession, UploadPolicy, UploadSession};
use chrono::{DateTime, TimeZone, Utc};
use mime_guess::Mime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// On-disk shape of an [`UploadPolicy`], with short field names to keep
/// stored values compact.
#[derive(Serialize, Deserialize)]
pub struct UploadPolicyRecord {
    pub uid: i64,
    pub ats: Vec<String>,
    pub msz: u64,
    pub exp: i64,
}

impl UploadPolicyRecord {
    pub fn from_domain(policy: &UploadPolicy) -> Self {
        Self {
            uid: policy.user_id,
            ats: policy.allowed_types.iter().map(|m| m.essence_str().to_string()).collect(),
            msz: policy.max_size,
            exp: policy.expires_at.timestamp(),
        }
    }

    pub fn into_domain(self, token: String) -> UploadPolicy {
        UploadPolicy {
            token,
            user_id: self.uid,
            allowed_types: self.ats.iter().filter_map(|t| Mime::from_str(t).ok()).collect(),
            max_size: self.msz,
            expires_at: Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct UploadSessionRecord {
    pub src: String,
    pub pmd: String,
    pub ftype: String,
    pub fsize: u64,
    pub exp: i64,
}

impl UploadSessionRecord {
    pub fn from_domain(session: &UploadSession) -> Self {
        Self {
            src: session.policy_source.clone(),
            pmd: session.policy_metadata.clone(),
            ftype: session.file_metadata.r#type.essence_str().to_string(),
            fsize: session.file_metadata.size,
            exp: session.expires_at.timestamp(),
        }
    }

    pub fn into_domain(self, token: String) -> UploadSession {
        UploadSession {
            token,
            policy_source: self.src,
            policy_metadata: self.pmd,
            file_metadata: FileMetadata {
                r#type: Mime::from_str(&self.ftype).unwrap_or(mime_guess::mime::APPLICATION_OCTET_STREAM),
                size: self.fsize,
            },
            expires_at: Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct TemporaryFileSessionRecord {
    pub upl: UploadSessionRecord,
    pub upl_token: String,
    pub hash: String,
    pub exp: i64,
}

impl TemporaryFileSessionRecord {
    pub fn from_domain(session: &TemporaryFileSession) -> Self {
        Self {
            upl: UploadSessionRecord::from_domain(&session.upload_session_info),
            upl_token: session.upload_session_info.token.clone(),
            hash: session.file_hash.clone(),
            exp: session.expires_at.timestamp(),
        }
    }

    pub fn into_domain(self, token: String) -> TemporaryFileSession {
        TemporaryFileSession {
            token,
            upload_session_info: self.upl.into_domain(self.upl_token),
            file_hash: self.hash,
            expires_at: Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now),
        }
    }
}

/// Returns `true` once `expires_at` has passed, for the defense-in-depth
/// recheck every reader performs.
pub fn is_expired(expires_at: DateTime<Utc>) -> bool {
    expires_at <= Utc::now()
}
