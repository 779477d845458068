//! REST handlers for flow B: validating a broker-issued policy token and
//! staging the subsequent upload. `validate_policy_handler` takes a
//! small JSON body, the same shape the teacher never needed (its one
//! flow has no out-of-band token to validate first) but which mirrors
//! `upload_brokered_handler`'s own multipart shape closely enough to
//! share the streaming approach of [`super::flow_a::create_file_handler`].

use super::{AppState, close_on_upload_error};
use crate::auth::{RequestContext, RequestContextExtractor};
use crate::error::{AppError, Result};
use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Response;
use futures::TryStreamExt;
use mime_guess::Mime;
use serde::{Deserialize, Serialize};
use std::io;
use std::str::FromStr;
use tokio_util::io::StreamReader;

#[derive(Deserialize)]
pub struct ValidatePolicyRequest {
    policy_token: String,
    r#type: String,
    size: u64,
}

#[derive(Serialize)]
pub struct ValidatePolicyResponse {
    upload_token: String,
}

#[derive(Serialize)]
pub struct UploadBrokeredResponse {
    temporary_token: String,
    file_hash: String,
}

/// `POST /files/policy/validate`.
pub async fn validate_policy_handler(
    State(state): State<AppState>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    Json(body): Json<ValidatePolicyRequest>,
) -> Result<(StatusCode, Json<ValidatePolicyResponse>)> {
    let requested_type = Mime::from_str(&body.r#type).map_err(|_| AppError::RequestInvalid(format!("not a mime type: {}", body.r#type)))?;

    let result = state.usecase.validate_policy(&ctx, body.policy_token, requested_type, body.size).await?;

    Ok((StatusCode::CREATED, Json(ValidatePolicyResponse { upload_token: result.upload_token })))
}

/// `POST /files/upload`. Same `upload_token`-then-`file` multipart shape
/// as [`super::flow_a::create_file_handler`], redeeming an upload
/// session rather than an upload policy.
pub async fn upload_brokered_handler(
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
) -> Result<(StatusCode, Json<UploadBrokeredResponse>)> {
    let mut upload_token: Option<String> = None;
    let mut size_hint: i64 = -1;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::RequestInvalid(e.to_string()))? {
        match field.name() {
            Some("upload_token") => {
                upload_token = Some(field.text().await.map_err(|e| AppError::RequestInvalid(e.to_string()))?);
            }
            Some("size") => {
                let text = field.text().await.map_err(|e| AppError::RequestInvalid(e.to_string()))?;
                size_hint = text.parse().map_err(|_| AppError::RequestInvalid("size must be an integer".into()))?;
            }
            Some("file") => {
                let upload_token = upload_token
                    .clone()
                    .ok_or_else(|| AppError::RequestInvalid("the upload_token field must precede the file field".into()))?;

                let stream = field.map_err(io::Error::other);
                let reader = StreamReader::new(stream);
                let result = state.usecase.upload_brokered(ctx, &upload_token, size_hint, reader).await?;

                return Ok((
                    StatusCode::CREATED,
                    Json(UploadBrokeredResponse {
                        temporary_token: result.temporary_token,
                        file_hash: result.file_hash,
                    }),
                ));
            }
            _ => {}
        }
    }

    Err(AppError::RequestInvalid("multipart body is missing the upload_token and/or file fields".into()))
}
