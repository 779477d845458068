//! Flow A: a privileged caller issues an upload policy directly, the
//! bearer of that policy uploads once, and the resulting file is
//! retrievable as a signed [`crate::domain::FileToken`] or a presigned
//! URL. Grounded on `RegisterUpload`, `Upload`, `RetrieveFileToken`,
//! `CreatePresignedURL` and `ChangeRefCount` in `usecase/file.go`.

use super::{base64url_from_hex, materialize::sniff_and_ingest, FileUsecase};
use crate::auth::{scope, RequestContext};
use crate::error::{AppError, Result};
use mime_guess::Mime;
use std::time::Duration;
use tokio::io::AsyncRead;

pub struct RegisterUploadResult {
    pub upload_token: String,
}

pub struct UploadResult {
    pub file_id: String,
    pub bucket: String,
    pub ownership_id: i64,
    pub file_token: String,
}

pub struct RetrieveFileTokenResult {
    pub file_token: String,
}

pub struct CreatePresignedUrlResult {
    pub presigned_url: String,
}

impl FileUsecase {
    /// Issues a one-shot upload policy for `user_id`. Only a privileged
    /// caller (one holding `register-file-policy`) may mint these; the
    /// bearer of the resulting token still has to be the same user when
    /// they redeem it in [`FileUsecase::upload`].
    pub async fn register_upload(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        allowed_types: Vec<Mime>,
        max_size: u64,
    ) -> Result<RegisterUploadResult> {
        ctx.require_scope(scope::REGISTER_FILE_POLICY)?;

        if max_size > self.config.max_upload_size {
            return Err(AppError::RequestInvalid(format!(
                "max_size {max_size} exceeds this deployment's upload ceiling of {}",
                self.config.max_upload_size
            )));
        }

        let policy = self.domain.new_upload_policy(user_id, allowed_types, max_size);
        self.sessions.upload_policy.save(&policy).await?;

        Ok(RegisterUploadResult { upload_token: policy.token })
    }

    /// Redeems an upload policy token against a single streamed upload.
    /// `FileInfo` is keyed by content hash, so a second user uploading
    /// identical bytes shares the storage object and only gains a new
    /// `FileOwnership` row; the object store write only happens the
    /// first time this content hash is seen.
    pub async fn upload<R: AsyncRead + Unpin>(&self, ctx: &RequestContext, upload_token: &str, reader: R) -> Result<UploadResult> {
        if !ctx.is_authenticated() {
            return Err(AppError::Unauthenticated("authentication required".into()));
        }

        let policy = match self.sessions.upload_policy.load_and_delete(upload_token).await {
            Ok(policy) => policy,
            Err(AppError::NotFound(_)) => return Err(AppError::RequestInvalid("invalid or already-used upload token".into())),
            Err(err) => return Err(err),
        };

        if ctx.subject_id != policy.user_id {
            return Err(AppError::Forbidden("this upload token belongs to a different user".into()));
        }

        let (sniffed_type, content) = sniff_and_ingest(reader, &policy.allowed_types, policy.max_size, self.config.max_in_memory).await?;

        let file_hash_hex = content.sha256_hex().await?;
        let file_id = base64url_from_hex(&file_hash_hex)?;
        let bucket = self.domain.classify_bucket(&sniffed_type, &self.config.image_bucket, &self.config.other_bucket).to_string();
        let size = content.size() as i64;

        let file_info = self.domain.new_file_info(file_id.clone(), bucket.clone(), sniffed_type.to_string(), size);

        let mut tx = self.metadata.begin_file_ingest().await?;
        let inserted = tx.create_if_absent(&file_info).await?;

        if inserted {
            let store_reader = content.into_reader().await?;
            if let Err(err) = self
                .objects
                .store(&bucket, &file_id, store_reader, size as u64, sniffed_type.essence_str())
                .await
            {
                let _ = tx.rollback().await;
                return Err(AppError::server("store-uploaded-file", err));
            }
        } else {
            content.cleanup().await;
        }

        tx.commit().await?;

        let candidate_ownership = self.domain.new_file_ownership(file_id.clone(), ctx.subject_id);
        let inserted = self.metadata.create_ownership_if_absent(&candidate_ownership).await?;

        // A repeated upload of the same bytes by the same user hits the
        // `(file_id, user_id)` unique constraint: the insert above is a
        // no-op, so the real, already-existing row (and its id) has to
        // be fetched back rather than returning the fresh-but-unused
        // candidate's id, per spec.md §8 scenario 1.
        let ownership = if inserted {
            candidate_ownership
        } else {
            self.metadata
                .get_ownership_by_file_and_user(&file_id, ctx.subject_id)
                .await?
                .ok_or_else(|| AppError::server("reload-existing-file-ownership", anyhow::anyhow!("ownership for file {file_id} and user {} vanished after a conflicting insert", ctx.subject_id)))?
        };

        let file_token = self.domain.new_file_token(&file_info, &ownership, self.config.token_ttl);
        let file_token = self.tokens.generate(&file_token)?;

        Ok(UploadResult {
            file_id,
            bucket,
            ownership_id: ownership.id,
            file_token,
        })
    }

    /// Re-mints a `FileToken` for an existing ownership, e.g. after the
    /// original one expired. Only the owning user may do this.
    pub async fn retrieve_file_token(&self, ctx: &RequestContext, ownership_id: i64) -> Result<RetrieveFileTokenResult> {
        let ownership = self
            .metadata
            .get_ownership(ownership_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file ownership {ownership_id} not found")))?;

        if ownership.user_id != ctx.subject_id {
            return Err(AppError::Forbidden("this file is not owned by the caller".into()));
        }

        let file = self
            .metadata
            .get_file(&ownership.file_id)
            .await?
            .ok_or_else(|| AppError::server("dangling-file-ownership", anyhow::anyhow!("ownership {} references missing file {}", ownership.id, ownership.file_id)))?;

        let file_token = self.domain.new_file_token(&file, &ownership, self.config.token_ttl);
        let file_token = self.tokens.generate(&file_token)?;

        Ok(RetrieveFileTokenResult { file_token })
    }

    /// Mints a presigned GET URL for a stored file, named either
    /// directly (`file_id`) or via an ownership row, never both.
    pub async fn create_presigned_url(
        &self,
        ctx: &RequestContext,
        file_id: Option<String>,
        ownership_id: Option<i64>,
        expiration: Duration,
    ) -> Result<CreatePresignedUrlResult> {
        ctx.require_scope(scope::CREATE_PRESIGNED_FILE)?;

        if file_id.is_some() == ownership_id.is_some() {
            return Err(AppError::RequestInvalid("exactly one of file_id or ownership_id is required".into()));
        }
        if expiration.is_zero() {
            return Err(AppError::RequestInvalid("expiration is required".into()));
        }

        let file_id = match file_id {
            Some(id) => id,
            None => {
                let ownership_id = ownership_id.expect("checked above");
                let ownership = self
                    .metadata
                    .get_ownership(ownership_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("file ownership {ownership_id} not found")))?;
                ownership.file_id
            }
        };

        let file = self
            .metadata
            .get_file(&file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("file {file_id} not found")))?;

        let url = self
            .objects
            .presign_get(&file.bucket, &file.id, expiration)
            .await
            .map_err(|e| AppError::server("presign-file-url", e))?;

        Ok(CreatePresignedUrlResult { presigned_url: url })
    }

    /// Applies a batch of refcount deltas atomically: either every
    /// increment and decrement lands, or none does.
    pub async fn change_refcount(&self, ctx: &RequestContext, increment: Vec<i64>, decrement: Vec<i64>) -> Result<()> {
        ctx.require_scope(scope::CHANGE_REFCOUNT)?;

        self.metadata.change_refcounts(&increment, &decrement).await
    }
}

#[cfg(test)]
mod tests {
    use mime_guess::mime;

    #[test]
    fn sniffed_type_essence_matches_expected_store_content_type() {
        assert_eq!(mime::IMAGE_PNG.essence_str(), "image/png");
    }
}
