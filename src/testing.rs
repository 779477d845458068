//! In-memory fakes for the repository traits (`MetadataRepository`,
//! `UploadPolicyStore`, `UploadSessionStore`, `TemporaryFileSessionStore`,
//! `ObjectStore`), plus a [`harness`] that wires a [`FileUsecase`]
//! against them. Test-only: compiled under `#[cfg(test)]` from
//! `main.rs`, used by the usecase-level scenario tests.

use crate::domain::{FileDomain, FileInfo, FileOwnership, TemporaryFileSession, UploadPolicy, UploadSession};
use crate::error::{AppError, Result};
use crate::issuer::PolicyIssuerClient;
use crate::metadata::{FileInfoTransaction, MetadataRepository};
use crate::objectstore::{ObjectMeta, ObjectStore, StoredObject};
use crate::session::{TemporaryFileSessionStore, UploadPolicyStore, UploadSessionStore};
use crate::token::TokenEngine;
use crate::usecase::{FileUsecase, SessionRepositories, UsecaseConfig};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Default)]
struct MetadataState {
    files: HashMap<String, FileInfo>,
    ownerships: HashMap<i64, FileOwnership>,
    ownership_by_file_user: HashMap<(String, i64), i64>,
}

pub struct InMemoryMetadataRepository {
    state: Arc<Mutex<MetadataState>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MetadataState::default())),
        }
    }
}

struct InMemoryFileInfoTransaction {
    state: Arc<Mutex<MetadataState>>,
    inserted_id: Option<String>,
}

#[async_trait]
impl FileInfoTransaction for InMemoryFileInfoTransaction {
    async fn create_if_absent(&mut self, file: &FileInfo) -> Result<bool> {
        let mut state = self.state.lock().expect("metadata mutex poisoned");
        if state.files.contains_key(&file.id) {
            Ok(false)
        } else {
            state.files.insert(file.id.clone(), file.clone());
            self.inserted_id = Some(file.id.clone());
            Ok(true)
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if let Some(id) = &self.inserted_id {
            self.state.lock().expect("metadata mutex poisoned").files.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn begin_file_ingest(&self) -> Result<Box<dyn FileInfoTransaction>> {
        Ok(Box::new(InMemoryFileInfoTransaction {
            state: self.state.clone(),
            inserted_id: None,
        }))
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileInfo>> {
        Ok(self.state.lock().expect("metadata mutex poisoned").files.get(id).cloned())
    }

    async fn create_ownership_if_absent(&self, ownership: &FileOwnership) -> Result<bool> {
        let mut state = self.state.lock().expect("metadata mutex poisoned");
        let key = (ownership.file_id.clone(), ownership.user_id);
        if state.ownership_by_file_user.contains_key(&key) {
            Ok(false)
        } else {
            state.ownership_by_file_user.insert(key, ownership.id);
            state.ownerships.insert(ownership.id, ownership.clone());
            Ok(true)
        }
    }

    async fn get_ownership(&self, id: i64) -> Result<Option<FileOwnership>> {
        Ok(self.state.lock().expect("metadata mutex poisoned").ownerships.get(&id).cloned())
    }

    async fn get_ownership_by_file_and_user(&self, file_id: &str, user_id: i64) -> Result<Option<FileOwnership>> {
        let state = self.state.lock().expect("metadata mutex poisoned");
        let key = (file_id.to_string(), user_id);
        Ok(state.ownership_by_file_user.get(&key).and_then(|id| state.ownerships.get(id)).cloned())
    }

    async fn change_refcounts(&self, increments: &[i64], decrements: &[i64]) -> Result<()> {
        let mut state = self.state.lock().expect("metadata mutex poisoned");

        // Checked before any mutation: a batch with one unknown id
        // leaves every refcount untouched, mirroring the real store's
        // transactional all-or-nothing rollback.
        for ownership_id in increments.iter().chain(decrements.iter()) {
            if !state.ownerships.contains_key(ownership_id) {
                return Err(AppError::NotFound(format!("ownership {ownership_id} not found")));
            }
        }

        for ownership_id in increments {
            state.ownerships.get_mut(ownership_id).expect("checked above").refcount += 1;
        }
        for ownership_id in decrements {
            state.ownerships.get_mut(ownership_id).expect("checked above").refcount -= 1;
        }

        Ok(())
    }
}

pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<(String, String), (Vec<u8>, String)>>>,
    store_calls: Arc<Mutex<usize>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            store_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn contains(&self, bucket: &str, name: &str) -> bool {
        self.objects
            .lock()
            .expect("object mutex poisoned")
            .contains_key(&(bucket.to_string(), name.to_string()))
    }

    /// Number of times `store` has actually been invoked — lets a test
    /// assert that deduped content was only ever written once.
    pub fn store_call_count(&self) -> usize {
        *self.store_calls.lock().expect("store-call mutex poisoned")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn store(
        &self,
        bucket: &str,
        name: &str,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        _size: u64,
        content_type: &str,
    ) -> anyhow::Result<StoredObject> {
        *self.store_calls.lock().expect("store-call mutex poisoned") += 1;

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;

        let mut hasher = Sha256::new();
        hasher.update(&buf);
        let sha256_hex = hex::encode(hasher.finalize());
        let size = buf.len() as u64;

        self.objects
            .lock()
            .expect("object mutex poisoned")
            .insert((bucket.to_string(), name.to_string()), (buf, content_type.to_string()));

        Ok(StoredObject { size, sha256_hex })
    }

    async fn get(&self, bucket: &str, name: &str) -> anyhow::Result<Option<(Box<dyn AsyncRead + Send + Unpin>, ObjectMeta)>> {
        let objects = self.objects.lock().expect("object mutex poisoned");
        Ok(objects.get(&(bucket.to_string(), name.to_string())).map(|(bytes, content_type)| {
            let meta = ObjectMeta {
                size: bytes.len() as u64,
                content_type: content_type.clone(),
            };
            (Box::new(std::io::Cursor::new(bytes.clone())) as Box<dyn AsyncRead + Send + Unpin>, meta)
        }))
    }

    async fn exists(&self, bucket: &str, name: &str) -> anyhow::Result<bool> {
        Ok(self.contains(bucket, name))
    }

    async fn copy(&self, src: (&str, &str), dst: (&str, &str)) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().expect("object mutex poisoned");
        let value = objects
            .get(&(src.0.to_string(), src.1.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("source object {}/{} missing", src.0, src.1))?;
        objects.insert((dst.0.to_string(), dst.1.to_string()), value);
        Ok(())
    }

    async fn remove(&self, bucket: &str, name: &str) -> anyhow::Result<()> {
        self.objects.lock().expect("object mutex poisoned").remove(&(bucket.to_string(), name.to_string()));
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, name: &str, _ttl: Duration) -> anyhow::Result<String> {
        Ok(format!("https://fake-object-store.test/{bucket}/{name}"))
    }
}

pub struct InMemoryUploadPolicyStore {
    policies: Arc<Mutex<HashMap<String, UploadPolicy>>>,
}

impl InMemoryUploadPolicyStore {
    pub fn new() -> Self {
        Self {
            policies: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl UploadPolicyStore for InMemoryUploadPolicyStore {
    async fn save(&self, policy: &UploadPolicy) -> Result<()> {
        self.policies.lock().expect("policy mutex poisoned").insert(policy.token.clone(), policy.clone());
        Ok(())
    }

    async fn load_and_delete(&self, upload_token: &str) -> Result<UploadPolicy> {
        self.policies
            .lock()
            .expect("policy mutex poisoned")
            .remove(upload_token)
            .ok_or_else(|| AppError::NotFound("upload policy not found".into()))
    }
}

pub struct InMemoryUploadSessionStore {
    sessions: Arc<Mutex<HashMap<String, UploadSession>>>,
}

impl InMemoryUploadSessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl UploadSessionStore for InMemoryUploadSessionStore {
    async fn save(&self, session: &UploadSession) -> Result<()> {
        self.sessions.lock().expect("session mutex poisoned").insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, upload_token: &str) -> Result<UploadSession> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .get(upload_token)
            .cloned()
            .ok_or_else(|| AppError::Forbidden("upload session not found".into()))
    }

    async fn delete(&self, upload_token: &str) -> Result<()> {
        self.sessions.lock().expect("session mutex poisoned").remove(upload_token);
        Ok(())
    }
}

pub struct InMemoryTemporaryFileSessionStore {
    sessions: Arc<Mutex<HashMap<String, TemporaryFileSession>>>,
}

impl InMemoryTemporaryFileSessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl TemporaryFileSessionStore for InMemoryTemporaryFileSessionStore {
    async fn save(&self, session: &TemporaryFileSession) -> Result<()> {
        self.sessions.lock().expect("session mutex poisoned").insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, token: &str) -> Result<TemporaryFileSession> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::RequestInvalid("temporary file session not found".into()))
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.sessions.lock().expect("session mutex poisoned").remove(token);
        Ok(())
    }
}

/// A `FileUsecase` wired against every fake above, plus handles to the
/// fakes themselves so a test can seed state or inspect it directly.
pub struct TestHarness {
    pub usecase: FileUsecase,
    pub metadata: Arc<InMemoryMetadataRepository>,
    pub objects: Arc<InMemoryObjectStore>,
    pub upload_policy: Arc<InMemoryUploadPolicyStore>,
    pub upload_session: Arc<InMemoryUploadSessionStore>,
    pub temporary_session: Arc<InMemoryTemporaryFileSessionStore>,
    pub domain: FileDomain,
    pub config: UsecaseConfig,
}

pub fn harness() -> TestHarness {
    let metadata = Arc::new(InMemoryMetadataRepository::new());
    let objects = Arc::new(InMemoryObjectStore::new());
    let upload_policy = Arc::new(InMemoryUploadPolicyStore::new());
    let upload_session = Arc::new(InMemoryUploadSessionStore::new());
    let temporary_session = Arc::new(InMemoryTemporaryFileSessionStore::new());

    let domain = FileDomain::new(
        vec![mime_guess::mime::IMAGE_STAR],
        10 * 1024 * 1024,
        Duration::from_secs(600),
        Duration::from_secs(600),
        Duration::from_secs(1800),
        1,
    );
    let config = UsecaseConfig {
        max_in_memory: 8 * 1024 * 1024,
        max_upload_size: 10 * 1024 * 1024,
        image_bucket: "images".into(),
        other_bucket: "other".into(),
        temporary_bucket: "temporary".into(),
        token_ttl: Duration::from_secs(900),
    };

    let sessions = SessionRepositories {
        upload_policy: upload_policy.clone(),
        upload_session: upload_session.clone(),
        temporary_session: temporary_session.clone(),
    };

    let usecase = FileUsecase::new(
        metadata.clone(),
        sessions,
        objects.clone(),
        PolicyIssuerClient::offline_for_tests(),
        TokenEngine::new(b"test-signing-key"),
        domain.clone(),
        config.clone(),
    );

    TestHarness {
        usecase,
        metadata,
        objects,
        upload_policy,
        upload_session,
        temporary_session,
        domain,
        config,
    }
}
