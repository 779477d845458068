use super::{SessionStore, UploadPolicyStore, records::UploadPolicyRecord, records::is_expired, upload_policy_key};
use crate::domain::UploadPolicy;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

/// Flow A's policy store: consumed exactly once by the first *upload*
/// that presents the token (load-and-delete).
#[derive(Clone)]
pub struct UploadPolicyRepository {
    store: SessionStore,
}

impl UploadPolicyRepository {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UploadPolicyStore for UploadPolicyRepository {
    async fn save(&self, policy: &UploadPolicy) -> Result<()> {
        let record = UploadPolicyRecord::from_domain(policy);
        let json = serde_json::to_vec(&record).map_err(|e| AppError::server("serialize-upload-policy", e))?;
        let ttl_secs = (policy.expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;

        let mut conn = self.store.conn.clone();
        conn.set_ex::<_, _, ()>(upload_policy_key(&policy.token), json, ttl_secs)
            .await
            .map_err(|e| AppError::server("save-upload-policy", e))?;
        Ok(())
    }

    /// Loads and atomically deletes the policy keyed by `upload_token`.
    /// Missing/expired tokens surface as `NotFound` so the caller maps
    /// them to "invalid token".
    async fn load_and_delete(&self, upload_token: &str) -> Result<UploadPolicy> {
        let mut conn = self.store.conn.clone();
        let json: Option<Vec<u8>> = redis::cmd("GETDEL")
            .arg(upload_policy_key(upload_token))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::server("load-and-delete-upload-policy", e))?;

        let json = json.ok_or_else(|| AppError::NotFound("upload policy not found".into()))?;
        let record: UploadPolicyRecord =
            serde_json::from_slice(&json).map_err(|e| AppError::server("deserialize-upload-policy", e))?;
        let policy = record.into_domain(upload_token.to_string());

        if is_expired(policy.expires_at) {
            return Err(AppError::NotFound("upload policy expired".into()));
        }

        Ok(policy)
    }
}
