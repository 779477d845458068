use super::{
    SessionStore, TemporaryFileSessionStore, records::TemporaryFileSessionRecord, records::is_expired,
    temporary_session_key,
};
use crate::domain::TemporaryFileSession;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

/// Flow B's staged-file session store. `validate-temporary-file`
/// loads without deleting; `command-temporary-file` loads then
/// immediately deletes. An atomic load-and-delete would be preferable
/// here too; this repository exposes both primitives and lets the
/// usecase layer choose.
#[derive(Clone)]
pub struct TemporaryFileSessionRepository {
    store: SessionStore,
}

impl TemporaryFileSessionRepository {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TemporaryFileSessionStore for TemporaryFileSessionRepository {
    async fn save(&self, session: &TemporaryFileSession) -> Result<()> {
        let record = TemporaryFileSessionRecord::from_domain(session);
        let json = serde_json::to_vec(&record).map_err(|e| AppError::server("serialize-temporary-session", e))?;
        let ttl_secs = (session.expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;

        let mut conn = self.store.conn.clone();
        conn.set_ex::<_, _, ()>(temporary_session_key(&session.token), json, ttl_secs)
            .await
            .map_err(|e| AppError::server("save-temporary-session", e))?;
        Ok(())
    }

    async fn load(&self, token: &str) -> Result<TemporaryFileSession> {
        let mut conn = self.store.conn.clone();
        let json: Option<Vec<u8>> = conn
            .get(temporary_session_key(token))
            .await
            .map_err(|e| AppError::server("load-temporary-session", e))?;

        let json = json.ok_or_else(|| AppError::RequestInvalid("temporary file session not found".into()))?;
        let record: TemporaryFileSessionRecord =
            serde_json::from_slice(&json).map_err(|e| AppError::server("deserialize-temporary-session", e))?;
        let session = record.into_domain(token.to_string());

        if is_expired(session.expires_at) {
            return Err(AppError::RequestInvalid("temporary file session expired".into()));
        }

        Ok(session)
    }

    async fn delete(&self, token: &str) -> Result<()> {
        let mut conn = self.store.conn.clone();
        conn.del::<_, ()>(temporary_session_key(token))
            .await
            .map_err(|e| AppError::server("delete-temporary-session", e))?;
        Ok(())
    }
}
