//! Flow B: a caller presents a policy token minted by an external
//! policy issuer (e.g. the avatar service), this service validates it
//! against that issuer over gRPC, stages the upload to a temporary
//! bucket, and the issuing service later commands what becomes of the
//! staged file. Reconstructs the brokered path implied by
//! `infras/service/grpc/user_repository.go`'s `ValidateAvatarPolicyToken`
//! and `domain/file.go`'s `TemporaryFileSession`, since the retrieved
//! Go usecase layer only covers flow A directly.

use super::{base64url_from_hex, materialize::sniff_and_ingest, FileUsecase};
use crate::auth::{scope, RequestContext};
use crate::domain::FileMetadata;
use crate::error::{AppError, Result};
use crate::imaging;
use mime_guess::Mime;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

pub struct ValidatePolicyResult {
    pub upload_token: String,
}

pub struct UploadBrokeredResult {
    pub temporary_token: String,
    pub file_hash: String,
}

pub struct ValidateTemporaryFileResult {
    pub policy_metadata: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub enum TemporaryFileCommand {
    Delete,
    SaveAsImage,
    ImageMetadata,
    ChangeImageType { target_type: String },
}

#[derive(Debug, Clone)]
pub enum CommandTemporaryFileResult {
    Deleted,
    Saved { persistent_url: String },
    Metadata { file_hash: String, size: u64, width: u32, height: u32, format: String },
    ImageReencoded { next_temporary_file_token: String },
}

/// Splits a policy token into its source tag and the opaque remainder
/// the issuer itself is responsible for interpreting, per §4.4 step 2
/// ("parse `policy_token` into `(source_tag, …)`"). The wire format is
/// `"{source}:{opaque}"`, e.g. `"avatar:eyJhbGciOi..."`.
fn parse_policy_token_source(policy_token: &str) -> Result<&str> {
    policy_token
        .split_once(':')
        .map(|(source, _)| source)
        .filter(|source| !source.is_empty())
        .ok_or_else(|| AppError::RequestInvalid("malformed policy token".into()))
}

impl FileUsecase {
    /// Validates `policy_token` against the issuer named by `source`,
    /// applies the issuer's overrides on top of this service's default
    /// policy for that source, and — if the caller's declared upload
    /// fits — registers an upload session the caller redeems next.
    pub async fn validate_policy(
        &self,
        ctx: &RequestContext,
        policy_token: String,
        requested_type: Mime,
        requested_size: u64,
    ) -> Result<ValidatePolicyResult> {
        if !ctx.is_authenticated() {
            return Err(AppError::Unauthenticated("authentication required".into()));
        }
        if requested_size == 0 {
            return Err(AppError::RequestInvalid("declared size must be greater than zero".into()));
        }

        let source = parse_policy_token_source(&policy_token)?.to_string();

        let (allowed_types, max_size) = match source.as_str() {
            "avatar" => {
                let overridden = self.issuer.validate_avatar_policy_token(&policy_token).await?;
                if overridden.user_id != ctx.subject_id {
                    return Err(AppError::Forbidden("this policy token was not issued to the caller".into()));
                }
                apply_override(self.domain.default_avatar_upload_policy(), overridden, self.config.max_upload_size)
            }
            other => return Err(AppError::RequestInvalid(format!("unsupported policy source: {other}"))),
        };

        if !allowed_types.iter().any(|allowed| mime_matches(allowed, &requested_type)) {
            return Err(AppError::FileMismatchedType(format!("{requested_type} is not allowed by this policy")));
        }
        if requested_size > max_size {
            return Err(AppError::FileMismatchedSize(format!("requested size {requested_size} exceeds policy limit {max_size}")));
        }

        let session = self.domain.new_upload_session(
            source,
            policy_token,
            FileMetadata {
                r#type: requested_type,
                size: requested_size,
            },
        );
        self.sessions.upload_session.save(&session).await?;

        Ok(ValidatePolicyResult { upload_token: session.token })
    }

    /// Stages a validated upload into the temporary bucket. The upload
    /// session is deleted as soon as it is loaded, narrowing (though
    /// not closing, see [`crate::session::UploadSessionRepository`]) the
    /// window for a double redemption, and the session's own token
    /// doubles as the temporary object's name.
    ///
    /// `size_hint` is whatever size the caller declared alongside the
    /// body, or `-1` if it didn't declare one (e.g. a client that can't
    /// know the exact byte count up front, such as a chunked body).
    /// Per §4.4 step 2/5: a given hint must match the validated
    /// session's size immediately; an absent hint defers that check
    /// until the actual byte count is known post-ingest, and a mismatch
    /// there removes the object that was just staged.
    pub async fn upload_brokered<R: AsyncRead + Unpin>(
        &self,
        ctx: &RequestContext,
        upload_token: &str,
        size_hint: i64,
        reader: R,
    ) -> Result<UploadBrokeredResult> {
        if !ctx.is_authenticated() {
            return Err(AppError::Unauthenticated("authentication required".into()));
        }

        let session = self.sessions.upload_session.load(upload_token).await?;
        if let Err(err) = self.sessions.upload_session.delete(upload_token).await {
            tracing::warn!(%err, "failed to delete redeemed upload session");
        }

        if size_hint != -1 && size_hint as u64 != session.file_metadata.size {
            return Err(AppError::FileMismatchedSize(format!(
                "declared size {size_hint} does not match the validated policy size {}",
                session.file_metadata.size
            )));
        }

        let (sniffed_type, content) = sniff_and_ingest(
            reader,
            std::slice::from_ref(&session.file_metadata.r#type),
            session.file_metadata.size,
            self.config.max_in_memory,
        )
        .await?;

        let size = content.size();
        let object_name = session.token.clone();
        let store_reader = content.into_reader().await?;
        let stored = self
            .objects
            .store(&self.config.temporary_bucket, &object_name, store_reader, size, sniffed_type.essence_str())
            .await
            .map_err(|e| AppError::server("stage-temporary-file", e))?;

        if size_hint == -1 && stored.size != session.file_metadata.size {
            if let Err(err) = self.objects.remove(&self.config.temporary_bucket, &object_name).await {
                tracing::warn!(%err, "failed to remove staged temporary file after a post-ingest size mismatch");
            }
            return Err(AppError::FileMismatchedSize(format!(
                "uploaded size {} does not match the validated policy size {}",
                stored.size, session.file_metadata.size
            )));
        }

        let file_hash = base64url_from_hex(&stored.sha256_hex)?;
        let temporary_session = self.domain.new_temporary_file_session(session, file_hash.clone());
        if let Err(err) = self.sessions.temporary_session.save(&temporary_session).await {
            if let Err(remove_err) = self.objects.remove(&self.config.temporary_bucket, &object_name).await {
                tracing::warn!(%remove_err, "failed to remove staged temporary file after a session-save failure");
            }
            return Err(err);
        }

        Ok(UploadBrokeredResult {
            temporary_token: temporary_session.token,
            file_hash,
        })
    }

    /// Reports what a staged temporary file is, without consuming it.
    /// Unlike [`FileUsecase::command_temporary_file`], §4.4 does not ask
    /// this read-only inspection to guard against cross-issuer access —
    /// only the terminal command needs the single-issuer confusion guard.
    pub async fn validate_temporary_file(&self, ctx: &RequestContext, temporary_token: &str) -> Result<ValidateTemporaryFileResult> {
        ctx.require_scope(scope::COMMAND_TEMPORARY_FILE)?;

        let session = self.sessions.temporary_session.load(temporary_token).await?;

        Ok(ValidateTemporaryFileResult {
            policy_metadata: session.upload_session_info.policy_metadata,
            content_type: session.upload_session_info.file_metadata.r#type.to_string(),
            size: session.upload_session_info.file_metadata.size,
        })
    }

    /// Consumes a staged temporary file by dispatching one of
    /// `delete` / `save-as-image` / `image-metadata` / `change-image-type`.
    /// Single-use: the session is deleted as soon as it is loaded, same
    /// as [`FileUsecase::upload_brokered`].
    pub async fn command_temporary_file(
        &self,
        ctx: &RequestContext,
        temporary_token: &str,
        expected_source: &str,
        command: TemporaryFileCommand,
    ) -> Result<CommandTemporaryFileResult> {
        ctx.require_scope(scope::COMMAND_TEMPORARY_FILE)?;

        let session = self.sessions.temporary_session.load(temporary_token).await?;
        if let Err(err) = self.sessions.temporary_session.delete(temporary_token).await {
            tracing::warn!(%err, "failed to delete commanded temporary file session");
        }

        if session.upload_session_info.policy_source != expected_source {
            return Err(AppError::Forbidden("temporary file was not staged for this issuer".into()));
        }

        let object_name = session.upload_session_info.token.clone();
        let temp_bucket = self.config.temporary_bucket.clone();

        match command {
            TemporaryFileCommand::Delete => {
                self.objects
                    .remove(&temp_bucket, &object_name)
                    .await
                    .map_err(|e| AppError::server("delete-temporary-file", e))?;
                Ok(CommandTemporaryFileResult::Deleted)
            }

            TemporaryFileCommand::SaveAsImage => {
                let image_bucket = self.config.image_bucket.clone();
                let already_exists = self
                    .objects
                    .exists(&image_bucket, &session.file_hash)
                    .await
                    .map_err(|e| AppError::server("check-saved-image-exists", e))?;

                if !already_exists {
                    self.objects
                        .copy((&temp_bucket, &object_name), (&image_bucket, &session.file_hash))
                        .await
                        .map_err(|e| AppError::server("copy-temporary-file-to-image-bucket", e))?;
                }
                if let Err(err) = self.objects.remove(&temp_bucket, &object_name).await {
                    tracing::warn!(%err, "failed to remove staged temporary file after saving");
                }

                let persistent_url = self
                    .objects
                    .presign_get(&image_bucket, &session.file_hash, self.config.token_ttl)
                    .await
                    .map_err(|e| AppError::server("presign-saved-image", e))?;

                Ok(CommandTemporaryFileResult::Saved { persistent_url })
            }

            TemporaryFileCommand::ImageMetadata => {
                if session.upload_session_info.file_metadata.r#type.type_() != mime_guess::mime::IMAGE {
                    return Err(AppError::RequestInvalid("staged file is not an image".into()));
                }

                let bytes = self.read_temporary_object(&temp_bucket, &object_name).await?;
                let decoded = imaging::decode(&bytes)?;
                Ok(CommandTemporaryFileResult::Metadata {
                    file_hash: session.file_hash.clone(),
                    size: session.upload_session_info.file_metadata.size,
                    width: decoded.width,
                    height: decoded.height,
                    format: decoded.format.to_mime_type().to_string(),
                })
            }

            TemporaryFileCommand::ChangeImageType { target_type } => {
                let target_mime = Mime::from_str(&target_type)
                    .map_err(|_| AppError::RequestInvalid(format!("not a mime type: {target_type}")))?;
                let target_format = imaging::format_from_mime(&target_type)?;

                let bytes = self.read_temporary_object(&temp_bucket, &object_name).await?;
                let decoded = imaging::decode(&bytes)?;
                let reencoded = if decoded.format == target_format {
                    bytes
                } else {
                    imaging::reencode(&decoded.image, target_format)?
                };

                // New content means a new staged object under a fresh
                // temporary-file token, per §4.4: the old object/session
                // is only removed once the new one is durably saved.
                let size = reencoded.len() as u64;
                let mut next_upload_info = session.upload_session_info.clone();
                next_upload_info.file_metadata.r#type = target_mime;
                next_upload_info.file_metadata.size = size;
                // placeholder hash, replaced below with the one the
                // object-store gateway produces as a side effect of `store`
                let next_session = self.domain.new_temporary_file_session(next_upload_info, String::new());

                let stored = self
                    .objects
                    .store(&temp_bucket, &next_session.token, Box::new(std::io::Cursor::new(reencoded)), size, &target_type)
                    .await
                    .map_err(|e| AppError::server("store-reencoded-temporary-file", e))?;
                let next_session = crate::domain::TemporaryFileSession {
                    file_hash: base64url_from_hex(&stored.sha256_hex)?,
                    ..next_session
                };
                self.sessions.temporary_session.save(&next_session).await?;

                if let Err(err) = self.objects.remove(&temp_bucket, &object_name).await {
                    tracing::warn!(%err, "failed to remove staged temporary file after re-encoding");
                }

                Ok(CommandTemporaryFileResult::ImageReencoded { next_temporary_file_token: next_session.token })
            }
        }
    }

    async fn read_temporary_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>> {
        let (mut reader, _meta) = self
            .objects
            .get(bucket, name)
            .await
            .map_err(|e| AppError::server("read-temporary-file", e))?
            .ok_or_else(|| AppError::NotFound("staged temporary file is gone".into()))?;

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.map_err(|e| AppError::server("read-temporary-file-bytes", e))?;
        Ok(bytes)
    }
}

fn mime_matches(allowed: &Mime, candidate: &Mime) -> bool {
    (allowed.type_() == mime_guess::mime::STAR || allowed.type_() == candidate.type_())
        && (allowed.subtype() == mime_guess::mime::STAR || allowed.subtype() == candidate.subtype())
}

/// `max_upload_size` is the deployment's absolute ceiling — the same
/// one the REST body limit is sized off of — so an issuer override
/// can never hand out a size this service couldn't actually receive.
fn apply_override(default: crate::domain::DefaultPolicy, overridden: crate::issuer::PolicyOverride, max_upload_size: u64) -> (Vec<Mime>, u64) {
    let allowed_types = if overridden.allowed_types.is_empty() {
        default.allowed_types
    } else {
        overridden.allowed_types.iter().filter_map(|t| Mime::from_str(t).ok()).collect()
    };
    let max_size = if overridden.max_size == 0 { default.max_size } else { overridden.max_size };
    (allowed_types, max_size.min(max_upload_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DefaultPolicy;
    use crate::issuer::PolicyOverride;

    #[test]
    fn empty_override_falls_back_to_defaults() {
        let default = DefaultPolicy {
            allowed_types: vec![mime_guess::mime::IMAGE_PNG],
            max_size: 1024,
        };
        let overridden = PolicyOverride {
            user_id: 1,
            allowed_types: vec![],
            max_size: 0,
        };
        let (types, max_size) = apply_override(default, overridden, 1_000_000);
        assert_eq!(types, vec![mime_guess::mime::IMAGE_PNG]);
        assert_eq!(max_size, 1024);
    }

    #[test]
    fn non_empty_override_replaces_defaults() {
        let default = DefaultPolicy {
            allowed_types: vec![mime_guess::mime::IMAGE_PNG],
            max_size: 1024,
        };
        let overridden = PolicyOverride {
            user_id: 1,
            allowed_types: vec!["image/jpeg".to_string()],
            max_size: 2048,
        };
        let (types, max_size) = apply_override(default, overridden, 1_000_000);
        assert_eq!(types, vec![mime_guess::mime::IMAGE_JPEG]);
        assert_eq!(max_size, 2048);
    }

    #[test]
    fn override_max_size_is_clamped_to_the_deployment_ceiling() {
        let default = DefaultPolicy {
            allowed_types: vec![mime_guess::mime::IMAGE_PNG],
            max_size: 1024,
        };
        let overridden = PolicyOverride {
            user_id: 1,
            allowed_types: vec![],
            max_size: 50_000,
        };
        let (_, max_size) = apply_override(default, overridden, 4096);
        assert_eq!(max_size, 4096);
    }

    #[test]
    fn mime_matches_respects_wildcards() {
        assert!(mime_matches(&mime_guess::mime::IMAGE_STAR, &mime_guess::mime::IMAGE_PNG));
        assert!(!mime_matches(&mime_guess::mime::IMAGE_PNG, &mime_guess::mime::IMAGE_JPEG));
    }

    #[test]
    fn parses_the_source_tag_off_a_policy_token() {
        assert_eq!(parse_policy_token_source("avatar:eyJhbGciOi").unwrap(), "avatar");
    }

    #[test]
    fn rejects_a_policy_token_with_no_source_tag() {
        assert!(parse_policy_token_source("no-colon-here").is_err());
        assert!(parse_policy_token_source(":missing-source").is_err());
    }
}
