//! The REST surface: four routes over the same [`crate::usecase::FileUsecase`]
//! the RPC surface also drives. Generalizes the teacher's single
//! `routes` module (`routes/mod.rs`, `routes/uploads/*.rs`) into a
//! router that serves both upload flows instead of one.

mod flow_a;
mod flow_b;

use crate::error::AppError;
use crate::usecase::FileUsecase;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::handler::Handler;
use axum::http::{HeaderValue, header};
use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    normalize_path::NormalizePathLayer,
    trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info_span};

#[derive(Clone)]
pub struct AppState {
    pub usecase: Arc<FileUsecase>,
}

/// Builds the REST router. `max_body_size` caps both upload routes at
/// the transport level — the same two-layers-of-limit shape the
/// teacher's `DefaultBodyLimit::max` on `/upload` already had, with a
/// per-token `max_size` enforced underneath by the usecase layer. The
/// caller must pass the deployment's absolute upload ceiling here (see
/// `UsecaseConfig::max_upload_size`), not a smaller "default" policy
/// size: flow A policies and flow B issuer overrides are both clamped
/// to that same ceiling, so sizing this limit off anything smaller
/// would 413 a request the usecase layer would otherwise have allowed.
pub fn router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/files", post(flow_a::create_file_handler.layer(DefaultBodyLimit::max(max_body_size))))
        .route("/files/token/{ownership_id}", get(flow_a::retrieve_file_token_handler))
        .route("/files/policy/validate", post(flow_b::validate_policy_handler))
        .route("/files/upload", post(flow_b::upload_brokered_handler.layer(DefaultBodyLimit::max(max_body_size))))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let uri = request.uri().to_string();
                    let path_without_query = match uri.find('?') {
                        Some(query_start) => &uri[..query_start],
                        None => &uri,
                    };
                    info_span!("request", method = ?request.method(), path = path_without_query)
                })
                .on_request(DefaultOnRequest::default().level(Level::INFO))
                .on_response(DefaultOnResponse::default().level(Level::INFO))
                .on_failure(DefaultOnFailure::default()),
        )
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(CatchPanicLayer::new())
        .layer(axum_middleware::from_fn(crate::middleware::header_middleware))
        .with_state(state)
}

/// Upload-path responses carry `Connection: close` on failure, per §5's
/// cancellation rule: a caller that aborts mid-upload must not have the
/// connection silently reused for an unrelated request afterwards.
fn close_on_upload_error<T: IntoResponse>(result: Result<T, AppError>) -> Response {
    match result {
        Ok(ok) => ok.into_response(),
        Err(err) => {
            let mut response = err.into_response();
            response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}
