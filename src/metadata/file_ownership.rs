use crate::domain::FileOwnership;
use crate::error::{AppError, Result};
use sqlx::Row;

/// `file_ownerships(id PK, file_id, user_id, refcount, UNIQUE(file_id, user_id))`.
#[derive(Clone, Copy)]
pub struct FileOwnershipRepository;

impl FileOwnershipRepository {
    /// Idempotent: a duplicate `(file_id, user_id)` pair is silently
    /// tolerated, not an error, so repeated uploads by the same user
    /// never fail here. Returns `Ok(true)` when this call actually
    /// inserted the row and `Ok(false)` when one already existed —
    /// callers that need the real, possibly pre-existing row (e.g. to
    /// return its id) should follow up with `get_by_file_and_user`.
    pub async fn create<'e, E>(&self, executor: E, ownership: &FileOwnership) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            "INSERT INTO file_ownerships (id, file_id, user_id, refcount) VALUES ($1, $2, $3, $4)
             ON CONFLICT (file_id, user_id) DO NOTHING",
        )
        .bind(ownership.id)
        .bind(&ownership.file_id)
        .bind(ownership.user_id)
        .bind(ownership.refcount)
        .execute(executor)
        .await
        .map_err(|e| AppError::server("create-file-ownership", e))?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_by_id<'e, E>(&self, executor: E, ownership_id: i64) -> Result<Option<FileOwnership>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query("SELECT id, file_id, user_id, refcount FROM file_ownerships WHERE id = $1")
            .bind(ownership_id)
            .fetch_optional(executor)
            .await
            .map_err(|e| AppError::server("get-file-ownership", e))?;

        Ok(row.map(Self::from_row))
    }

    pub async fn get_by_file_and_user<'e, E>(
        &self,
        executor: E,
        file_id: &str,
        user_id: i64,
    ) -> Result<Option<FileOwnership>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            "SELECT id, file_id, user_id, refcount FROM file_ownerships WHERE file_id = $1 AND user_id = $2",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| AppError::server("get-file-ownership-by-file-and-user", e))?;

        Ok(row.map(Self::from_row))
    }

    /// `change` is typically `1` or `-1`. The refcount may transiently
    /// reach 0 — purging is the external janitor's job, not this
    /// repository's.
    pub async fn change_refcount<'e, E>(&self, executor: E, ownership_id: i64, change: i64) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE file_ownerships SET refcount = refcount + $1 WHERE id = $2")
            .bind(change)
            .bind(ownership_id)
            .execute(executor)
            .await
            .map_err(|e| AppError::server("change-file-ownership-refcount", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("ownership {ownership_id} not found")));
        }

        Ok(())
    }

    fn from_row(row: sqlx::postgres::PgRow) -> FileOwnership {
        FileOwnership {
            id: row.get("id"),
            file_id: row.get("file_id"),
            user_id: row.get("user_id"),
            refcount: row.get("refcount"),
        }
    }
}
