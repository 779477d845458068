//! `Image` gRPC service: flow B's `ValidateTemporaryFile` and
//! `CommandTemporaryFile`, the two operations the external policy-issuer
//! service drives after staging an upload via REST. Converts between the
//! wire-level `TemporaryFileCommand` enum and the usecase layer's own,
//! and serializes `image-metadata`'s result into the opaque `result`
//! JSON string the proto message reserves for it.

use super::RpcState;
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::proto::file::image_server::Image;
use crate::proto::file::{
    FileCommandTemporaryFileRequest, FileCommandTemporaryFileResponse, FileValidateTemporaryFileRequest, FileValidateTemporaryFileResponse,
    TemporaryFileCommand as ProtoCommand,
};
use crate::usecase::{CommandTemporaryFileResult, TemporaryFileCommand};
use tonic::{Request, Response, Status};

pub struct ImageServiceImpl {
    pub state: RpcState,
}

#[tonic::async_trait]
impl Image for ImageServiceImpl {
    async fn validate_temporary_file(&self, request: Request<FileValidateTemporaryFileRequest>) -> Result<Response<FileValidateTemporaryFileResponse>, Status> {
        let ctx = RequestContext::from_request(&request);
        let req = request.into_inner();

        let result = self.state.usecase.validate_temporary_file(&ctx, &req.temporary_file_token).await?;

        Ok(Response::new(FileValidateTemporaryFileResponse {
            policy_metadata: result.policy_metadata,
            r#type: result.content_type,
            size: result.size as i64,
        }))
    }

    async fn command_temporary_file(&self, request: Request<FileCommandTemporaryFileRequest>) -> Result<Response<FileCommandTemporaryFileResponse>, Status> {
        let ctx = RequestContext::from_request(&request);
        let req = request.into_inner();

        let proto_command = ProtoCommand::try_from(req.command).unwrap_or(ProtoCommand::Unspecified);
        let command = match proto_command {
            ProtoCommand::Delete => TemporaryFileCommand::Delete,
            ProtoCommand::SaveAsImage => TemporaryFileCommand::SaveAsImage,
            ProtoCommand::ImageMetadata => TemporaryFileCommand::ImageMetadata,
            ProtoCommand::ChangeImageType => TemporaryFileCommand::ChangeImageType { target_type: req.metadata.clone() },
            ProtoCommand::Unspecified => return Err(Status::from(AppError::RequestInvalid("temporary file command must be specified".into()))),
        };

        let result = self
            .state
            .usecase
            .command_temporary_file(&ctx, &req.temporary_file_token, &req.policy_source, command)
            .await?;

        let mut response = FileCommandTemporaryFileResponse::default();
        match result {
            CommandTemporaryFileResult::Deleted => {}
            CommandTemporaryFileResult::Saved { persistent_url } => response.persistent_url = persistent_url,
            CommandTemporaryFileResult::ImageReencoded { next_temporary_file_token } => response.next_temporary_file_token = next_temporary_file_token,
            CommandTemporaryFileResult::Metadata { file_hash, size, width, height, format } => {
                response.result = serde_json::json!({
                    "sha256": file_hash,
                    "size": size,
                    "width": width,
                    "height": height,
                    "type": format,
                })
                .to_string();
            }
        }

        Ok(Response::new(response))
    }
}
