//! `File` gRPC service: flow A's `RegisterUpload`, `CreatePresignedURL`
//! and `ChangeRefcount`. Upload itself has no RPC — only REST streams
//! bytes — so this surface only covers the policy/admin operations
//! `usecase/file.go`'s Go RPC adapter exposes over the wire.

use super::RpcState;
use crate::auth::RequestContext;
use crate::proto::file::file_server::File;
use crate::proto::file::{
    FileChangeRefcountRequest, FileChangeRefcountResponse, FileCreatePresignedURLRequest, FileCreatePresignedURLResponse,
    FileRegisterUploadRequest, FileRegisterUploadResponse,
};
use mime_guess::Mime;
use std::str::FromStr;
use std::time::Duration;
use tonic::{Request, Response, Status};

pub struct FileServiceImpl {
    pub state: RpcState,
}

#[tonic::async_trait]
impl File for FileServiceImpl {
    async fn register_upload(&self, request: Request<FileRegisterUploadRequest>) -> Result<Response<FileRegisterUploadResponse>, Status> {
        let ctx = RequestContext::from_request(&request);
        let req = request.into_inner();

        let allowed_types: Vec<Mime> = req.allowed_types.iter().filter_map(|t| Mime::from_str(t).ok()).collect();

        let result = self
            .state
            .usecase
            .register_upload(&ctx, req.user_id, allowed_types, req.max_size.max(0) as u64)
            .await?;

        Ok(Response::new(FileRegisterUploadResponse { upload_token: result.upload_token }))
    }

    async fn create_presigned_url(&self, request: Request<FileCreatePresignedURLRequest>) -> Result<Response<FileCreatePresignedURLResponse>, Status> {
        let ctx = RequestContext::from_request(&request);
        let req = request.into_inner();

        let file_id = (!req.file_id.is_empty()).then_some(req.file_id);
        let ownership_id = (req.ownership_id != 0).then_some(req.ownership_id);
        let expiration = Duration::from_secs(req.expiration.max(0) as u64);

        let result = self.state.usecase.create_presigned_url(&ctx, file_id, ownership_id, expiration).await?;

        Ok(Response::new(FileCreatePresignedURLResponse { presigned_url: result.presigned_url }))
    }

    async fn change_refcount(&self, request: Request<FileChangeRefcountRequest>) -> Result<Response<FileChangeRefcountResponse>, Status> {
        let ctx = RequestContext::from_request(&request);
        let req = request.into_inner();

        self.state.usecase.change_refcount(&ctx, req.inc_ownership_id, req.dec_ownership_id).await?;

        Ok(Response::new(FileChangeRefcountResponse {}))
    }
}
