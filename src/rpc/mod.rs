//! The RPC surface: `File` (flow A) and `Image` (flow B) gRPC services
//! over the same [`crate::usecase::FileUsecase`] the REST surface
//! drives. Generalizes the Go source's `adapter/grpc/app.go` wiring: one
//! interceptor populates `RequestContext` from call metadata, and the
//! request-scoped deadline plus round-trip logging are carried by
//! `tower`/`tower_http` layers on the `tonic::transport::Server` itself
//! (`main.rs`), the same split the REST router already uses.

mod file_service;
mod image_service;

pub use file_service::FileServiceImpl;
pub use image_service::ImageServiceImpl;

use crate::auth::{RequestContext, context_from_metadata};
use crate::usecase::FileUsecase;
use std::sync::Arc;
use tonic::{Request, Status};

#[derive(Clone)]
pub struct RpcState {
    pub usecase: Arc<FileUsecase>,
}

/// Populates a [`RequestContext`] extension from `x-test-user`/
/// `x-test-scope` metadata on every call, so handlers pull it back out
/// with [`RequestContext::from_request`] instead of re-parsing metadata
/// themselves. Mirrors the teacher's single-pluggable-`AuthProvider`
/// shape, generalized to gRPC's metadata map.
#[derive(Clone, Default)]
pub struct AuthInterceptor;

impl tonic::service::Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let ctx = context_from_metadata(request.metadata());
        request.extensions_mut().insert(ctx);
        Ok(request)
    }
}

impl RequestContext {
    /// Reads back the context an [`AuthInterceptor`] attached. Falls
    /// back to an unauthenticated context if the interceptor wasn't
    /// installed in front of this call, the same permissive default
    /// `context_from_metadata` already produces for a missing header.
    pub fn from_request<T>(request: &Request<T>) -> Self {
        request.extensions().get::<RequestContext>().cloned().unwrap_or_default()
    }
}
