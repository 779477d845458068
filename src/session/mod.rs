//! Session store: a TTL-keyed KV split into the three
//! namespaces `upload_policy:`, `upload_session:`, `temporary_session:`.
//! Grounded on the Go `infras/database/redis/*` repositories — every
//! record is written with `SETEX` using its own `expires_at` as the TTL,
//! and read back with an additional expiry check as a defense against
//! TTL drift between Redis and application clocks.

mod records;
mod temporary_session;
mod upload_policy;
mod upload_session;

pub use temporary_session::TemporaryFileSessionRepository;
pub use upload_policy::UploadPolicyRepository;
pub use upload_session::UploadSessionRepository;

use crate::domain::{TemporaryFileSession, UploadPolicy, UploadSession};
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;

/// Flow A's policy store, abstracted so the usecase layer can be tested
/// against an in-memory fake instead of a real Redis instance.
#[async_trait]
pub trait UploadPolicyStore: Send + Sync {
    async fn save(&self, policy: &UploadPolicy) -> Result<()>;
    async fn load_and_delete(&self, upload_token: &str) -> Result<UploadPolicy>;
}

/// Flow B's upload session store.
#[async_trait]
pub trait UploadSessionStore: Send + Sync {
    async fn save(&self, session: &UploadSession) -> Result<()>;
    async fn load(&self, upload_token: &str) -> Result<UploadSession>;
    async fn delete(&self, upload_token: &str) -> Result<()>;
}

/// Flow B's staged-file session store.
#[async_trait]
pub trait TemporaryFileSessionStore: Send + Sync {
    async fn save(&self, session: &TemporaryFileSession) -> Result<()>;
    async fn load(&self, token: &str) -> Result<TemporaryFileSession>;
    async fn delete(&self, token: &str) -> Result<()>;
}

/// Shared session-store handle: a cheap-to-clone connection manager that
/// transparently reconnects, the same role `redis.Client` plays in the
/// Go source.
#[derive(Clone)]
pub struct SessionStore {
    pub(crate) conn: ConnectionManager,
}

impl SessionStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

fn upload_policy_key(token: &str) -> String {
    format!("file:upload_policy:{token}")
}

fn upload_session_key(token: &str) -> String {
    format!("file:upload_session:{token}")
}

fn temporary_session_key(token: &str) -> String {
    format!("file:temporary_session:{token}")
}
