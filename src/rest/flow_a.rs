//! REST handlers for flow A. Grounded on the teacher's
//! `routes/uploads/post.rs` (multipart upload handling) and
//! `routes/uploads/get.rs` (single-resource GET), generalized from a
//! fully-buffered `field.bytes()` read into a true streaming one via
//! `tokio_util`'s `StreamReader`, since this service's upload sizes are
//! no longer bounded by a single in-memory `Bytes` buffer.

use super::{AppState, close_on_upload_error};
use crate::auth::{RequestContext, RequestContextExtractor};
use crate::error::{AppError, Result};
use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use futures::TryStreamExt;
use serde::Serialize;
use std::io;
use tokio_util::io::StreamReader;

#[derive(Serialize)]
pub struct CreateFileResponse {
    file_id: String,
    bucket: String,
    ownership_id: i64,
    file_token: String,
}

#[derive(Serialize)]
pub struct RetrieveFileTokenResponse {
    file_token: String,
}

/// `POST /files`. Expects a multipart body with an `upload_token` text
/// field followed by a `file` field — the token must arrive first since
/// the upload is redeemed as soon as the file field is read.
pub async fn create_file_handler(
    State(state): State<AppState>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    mut multipart: Multipart,
) -> Response {
    close_on_upload_error(handle(&state, &ctx, &mut multipart).await)
}

async fn handle(
    state: &AppState,
    ctx: &RequestContext,
    multipart: &mut Multipart,
) -> Result<(StatusCode, Json<CreateFileResponse>)> {
    let mut upload_token: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::RequestInvalid(e.to_string()))? {
        match field.name() {
            Some("upload_token") => {
                upload_token = Some(field.text().await.map_err(|e| AppError::RequestInvalid(e.to_string()))?);
            }
            Some("file") => {
                let upload_token = upload_token
                    .clone()
                    .ok_or_else(|| AppError::RequestInvalid("the upload_token field must precede the file field".into()))?;

                let stream = field.map_err(io::Error::other);
                let reader = StreamReader::new(stream);
                let result = state.usecase.upload(ctx, &upload_token, reader).await?;

                return Ok((
                    StatusCode::CREATED,
                    Json(CreateFileResponse {
                        file_id: result.file_id,
                        bucket: result.bucket,
                        ownership_id: result.ownership_id,
                        file_token: result.file_token,
                    }),
                ));
            }
            _ => {}
        }
    }

    Err(AppError::RequestInvalid("multipart body is missing the upload_token and/or file fields".into()))
}

/// `GET /files/token/{ownership_id}`.
pub async fn retrieve_file_token_handler(
    State(state): State<AppState>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    Path(ownership_id): Path<i64>,
) -> Result<Json<RetrieveFileTokenResponse>> {
    let result = state.usecase.retrieve_file_token(&ctx, ownership_id).await?;
    Ok(Json(RetrieveFileTokenResponse { file_token: result.file_token }))
}
