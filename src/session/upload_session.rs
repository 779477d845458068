use super::{SessionStore, UploadSessionStore, records::UploadSessionRecord, records::is_expired, upload_session_key};
use crate::domain::UploadSession;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

/// Flow B's upload session store: deleted on first redemption attempt
/// even if the upload itself later fails (best-effort). Unlike the
/// policy store of flow A, load and delete are separate calls here, the
/// same as `infras/database/redis/file_session_repository.go` in the
/// upstream Go service, which admits a double-redeem race window;
/// callers that need single-shot semantics should delete before
/// staging the upload, narrowing but not closing the window.
#[derive(Clone)]
pub struct UploadSessionRepository {
    store: SessionStore,
}

impl UploadSessionRepository {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UploadSessionStore for UploadSessionRepository {
    async fn save(&self, session: &UploadSession) -> Result<()> {
        let record = UploadSessionRecord::from_domain(session);
        let json = serde_json::to_vec(&record).map_err(|e| AppError::server("serialize-upload-session", e))?;
        let ttl_secs = (session.expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;

        let mut conn = self.store.conn.clone();
        conn.set_ex::<_, _, ()>(upload_session_key(&session.token), json, ttl_secs)
            .await
            .map_err(|e| AppError::server("save-upload-session", e))?;
        Ok(())
    }

    async fn load(&self, upload_token: &str) -> Result<UploadSession> {
        let mut conn = self.store.conn.clone();
        let json: Option<Vec<u8>> = conn
            .get(upload_session_key(upload_token))
            .await
            .map_err(|e| AppError::server("load-upload-session", e))?;

        let json = json.ok_or_else(|| AppError::Forbidden("upload session not found".into()))?;
        let record: UploadSessionRecord =
            serde_json::from_slice(&json).map_err(|e| AppError::server("deserialize-upload-session", e))?;
        let session = record.into_domain(upload_token.to_string());

        if is_expired(session.expires_at) {
            return Err(AppError::Forbidden("upload session expired".into()));
        }

        Ok(session)
    }

    /// Best-effort: the caller logs and ignores failures.
    async fn delete(&self, upload_token: &str) -> Result<()> {
        let mut conn = self.store.conn.clone();
        conn.del::<_, ()>(upload_session_key(upload_token))
            .await
            .map_err(|e| AppError::server("delete-upload-session", e))?;
        Ok(())
    }
}
