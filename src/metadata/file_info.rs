use crate::domain::FileInfo;
use crate::error::{AppError, Result};
use sqlx::Row;

/// `files(id PK, bucket, type, size, created_at)`. Stateless —
/// every call takes its own executor (`&PgPool` or `&mut PgConnection`
/// from an open transaction), so the repository itself holds no
/// connection and is trivially `Clone`.
#[derive(Clone, Copy)]
pub struct FileInfoRepository;

impl FileInfoRepository {
    /// Inserts a new row. Returns `Ok(true)` when this call actually
    /// inserted it and `Ok(false)` — never an error — when the row
    /// already existed: a duplicate `FileInfo` insert is the normal
    /// content-dedup path, not an error, so the ingest flow simply
    /// branches on this boolean rather than matching on an error kind.
    pub async fn create<'e, E>(&self, executor: E, file: &FileInfo) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            "INSERT INTO files (id, bucket, type, size, created_at) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&file.id)
        .bind(&file.bucket)
        .bind(&file.r#type)
        .bind(file.size)
        .bind(file.created_at)
        .execute(executor)
        .await
        .map_err(|e| AppError::server("create-file-info", e))?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_by_id<'e, E>(&self, executor: E, id: &str) -> Result<Option<FileInfo>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query("SELECT id, bucket, type, size, created_at FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(|e| AppError::server("get-file-info", e))?;

        Ok(row.map(|row| FileInfo {
            id: row.get("id"),
            bucket: row.get("bucket"),
            r#type: row.get("type"),
            size: row.get("size"),
            created_at: row.get("created_at"),
        }))
    }
}
