//! Metadata store: a transactional Postgres database holding the two
//! persistent tables — `files` (by content hash) and `file_ownerships`
//! (by user × file). New relative to the teacher, which has no
//! database; the shape and the column names are grounded on
//! `infras/database/model/file_info.go` and
//! `infras/database/model/file_ownership.go` in the original source,
//! translated from `gorm` models to `sqlx` queries.
//!
//! [`MetadataRepository`] is the trait the usecase layer actually
//! depends on (`Arc<dyn MetadataRepository>`), so a test can substitute
//! an in-memory fake for [`MetadataStore`] without touching a real
//! database. The one operation that needs transactional rollback —
//! inserting a `FileInfo` row only if the content hash is new, rolled
//! back if the subsequent object-store write fails — is modeled as its
//! own [`FileInfoTransaction`] so the abstraction can be backed by a
//! real `sqlx::Transaction` or a fake's plain staged-insert.

mod file_info;
mod file_ownership;

pub use file_info::FileInfoRepository;
pub use file_ownership::FileOwnershipRepository;

use crate::domain::{FileInfo, FileOwnership};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::PgPool;

/// A single `FileInfo` insert-if-absent, held open until the caller
/// decides whether the matching object-store write succeeded.
#[async_trait]
pub trait FileInfoTransaction: Send {
    /// Returns `Ok(true)` when this call inserted the row (new content)
    /// and `Ok(false)` when the content hash already existed.
    async fn create_if_absent(&mut self, file: &FileInfo) -> Result<bool>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Opens the transaction that §4.3 step 6 needs: the `FileInfo`
    /// insert and the object-store write it gates must commit or roll
    /// back together.
    async fn begin_file_ingest(&self) -> Result<Box<dyn FileInfoTransaction>>;

    async fn get_file(&self, id: &str) -> Result<Option<FileInfo>>;

    /// Idempotent: a duplicate `(file_id, user_id)` pair is tolerated,
    /// not an error. Returns whether this call actually inserted the
    /// row — callers that need the (possibly pre-existing) row itself
    /// should follow up with `get_ownership_by_file_and_user`.
    async fn create_ownership_if_absent(&self, ownership: &FileOwnership) -> Result<bool>;

    async fn get_ownership(&self, id: i64) -> Result<Option<FileOwnership>>;

    async fn get_ownership_by_file_and_user(&self, file_id: &str, user_id: i64) -> Result<Option<FileOwnership>>;

    /// Applies every increment/decrement in one all-or-nothing batch.
    async fn change_refcounts(&self, increments: &[i64], decrements: &[i64]) -> Result<()>;
}

/// Sets up the two repositories over one shared pool.
#[derive(Clone)]
pub struct MetadataStore {
    pub files: FileInfoRepository,
    pub ownerships: FileOwnershipRepository,
    pool: PgPool,
}

impl MetadataStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            files: FileInfoRepository,
            ownerships: FileOwnershipRepository,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> sqlx::Result<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool.begin().await
    }
}

pub struct PgFileInfoTransaction {
    tx: Option<sqlx::Transaction<'static, sqlx::Postgres>>,
    repo: FileInfoRepository,
}

#[async_trait]
impl FileInfoTransaction for PgFileInfoTransaction {
    async fn create_if_absent(&mut self, file: &FileInfo) -> Result<bool> {
        let tx = self.tx.as_mut().expect("transaction already committed or rolled back");
        self.repo.create(&mut **tx, file).await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().expect("transaction already committed or rolled back");
        tx.commit().await.map_err(|e| AppError::server("commit-file-ingest-tx", e))
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().expect("transaction already committed or rolled back");
        tx.rollback().await.map_err(|e| AppError::server("rollback-file-ingest-tx", e))
    }
}

#[async_trait]
impl MetadataRepository for MetadataStore {
    async fn begin_file_ingest(&self) -> Result<Box<dyn FileInfoTransaction>> {
        let tx = self.begin().await.map_err(|e| AppError::server("begin-file-ingest-tx", e))?;
        Ok(Box::new(PgFileInfoTransaction { tx: Some(tx), repo: self.files }))
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileInfo>> {
        self.files.get_by_id(self.pool(), id).await
    }

    async fn create_ownership_if_absent(&self, ownership: &FileOwnership) -> Result<bool> {
        self.ownerships.create(self.pool(), ownership).await
    }

    async fn get_ownership(&self, id: i64) -> Result<Option<FileOwnership>> {
        self.ownerships.get_by_id(self.pool(), id).await
    }

    async fn get_ownership_by_file_and_user(&self, file_id: &str, user_id: i64) -> Result<Option<FileOwnership>> {
        self.ownerships.get_by_file_and_user(self.pool(), file_id, user_id).await
    }

    async fn change_refcounts(&self, increments: &[i64], decrements: &[i64]) -> Result<()> {
        let mut tx = self.begin().await.map_err(|e| AppError::server("begin-change-refcount-tx", e))?;

        for ownership_id in increments {
            if let Err(err) = self.ownerships.change_refcount(&mut *tx, *ownership_id, 1).await {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }
        for ownership_id in decrements {
            if let Err(err) = self.ownerships.change_refcount(&mut *tx, *ownership_id, -1).await {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }

        tx.commit().await.map_err(|e| AppError::server("commit-change-refcount-tx", e))?;
        Ok(())
    }
}
