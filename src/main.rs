mod auth;
mod domain;
mod elapsed;
mod error;
mod imaging;
mod issuer;
mod metadata;
mod middleware;
mod mime;
mod objectstore;
mod proto;
mod rest;
mod rpc;
mod session;
#[cfg(test)]
mod testing;
mod token;
mod usecase;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::Parser;
use clap_duration::duration_range_value_parse;
use domain::FileDomain;
use dotenvy::dotenv;
use duration_human::{DurationHuman, DurationHumanValidator};
use issuer::PolicyIssuerClient;
use metadata::{MetadataRepository, MetadataStore};
use mime_guess::{Mime, mime::IMAGE_STAR};
use objectstore::{ObjectStore, S3ObjectStore};
use proto::file::file_server::FileServer;
use proto::file::image_server::ImageServer;
use rpc::{AuthInterceptor, FileServiceImpl, ImageServiceImpl, RpcState};
use session::{SessionStore, TemporaryFileSessionRepository, UploadPolicyRepository, UploadSessionRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use token::TokenEngine;
use tokio::net::TcpListener;
use tokio::signal;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Server as TonicServer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use usecase::{FileUsecase, SessionRepositories, UsecaseConfig};

#[derive(Debug, Clone, Parser)]
#[clap(author, about, version)]
struct Arguments {
    /// Socket address the REST listener binds to.
    #[arg(long, env = "FILE_SERVICE_REST_ADDRESS", default_value = "127.0.0.1:8731")]
    rest_address: SocketAddr,

    /// Socket address the gRPC listener binds to.
    #[arg(long, env = "FILE_SERVICE_RPC_ADDRESS", default_value = "127.0.0.1:8732")]
    rpc_address: SocketAddr,

    /// Postgres connection string for the metadata store.
    #[arg(long, env = "FILE_SERVICE_DATABASE_URL")]
    database_url: String,

    /// Redis connection string for the session store.
    #[arg(long, env = "FILE_SERVICE_REDIS_URL")]
    redis_url: String,

    /// Lifetime of a minted `FileToken`.
    #[clap(long, env = "FILE_SERVICE_TOKEN_TTL", default_value = "15min", value_parser = duration_range_value_parse!(min: 1min, max: 100years))]
    token_ttl: DurationHuman,

    /// Lifetime of a flow A upload policy.
    #[clap(long, env = "FILE_SERVICE_UPLOAD_TTL", default_value = "10min", value_parser = duration_range_value_parse!(min: 1min, max: 100years))]
    upload_ttl: DurationHuman,

    /// Lifetime of a flow B upload session.
    #[clap(long, env = "FILE_SERVICE_UPLOAD_SESSION_TTL", default_value = "10min", value_parser = duration_range_value_parse!(min: 1min, max: 100years))]
    upload_session_ttl: DurationHuman,

    /// Lifetime of a staged flow B temporary file.
    #[clap(long, env = "FILE_SERVICE_TEMPORARY_FILE_TTL", default_value = "30min", value_parser = duration_range_value_parse!(min: 1min, max: 100years))]
    temporary_file_ttl: DurationHuman,

    /// Upload content is buffered in memory up to this size before
    /// spilling to a temp file.
    #[arg(long, env = "FILE_SERVICE_MAX_IN_MEMORY", default_value = "8MB")]
    max_in_memory: ByteSize,

    /// Default MIME types flow B's seed policy allows before the
    /// issuer's override is applied.
    #[arg(
        long,
        env = "FILE_SERVICE_DEFAULT_IMAGE_ALLOWED_TYPES",
        default_values_t = [IMAGE_STAR],
        value_delimiter = ','
    )]
    default_image_allowed_types: Vec<Mime>,

    /// Default max upload size flow B's seed policy allows before the
    /// issuer's override is applied.
    #[arg(long, env = "FILE_SERVICE_DEFAULT_MAX_FILE_SIZE", default_value = "10MB")]
    default_max_file_size: ByteSize,

    /// Absolute ceiling on any single upload, whether declared by a
    /// privileged caller's flow A policy or handed back by a flow B
    /// issuer's override. Both REST upload routes' body limits are
    /// sized off this value, so it must be at least as large as the
    /// largest policy this deployment intends to ever issue.
    #[arg(long, env = "FILE_SERVICE_MAX_UPLOAD_SIZE", default_value = "100MB")]
    max_upload_size: ByteSize,

    /// Bucket (optionally `bucket/prefix`) holding files classified as
    /// images.
    #[arg(long, env = "FILE_SERVICE_IMAGE_BUCKET")]
    image_bucket: String,

    /// Bucket (optionally `bucket/prefix`) holding every other file.
    #[arg(long, env = "FILE_SERVICE_OTHER_BUCKET")]
    other_bucket: String,

    /// Bucket (optionally `bucket/prefix`) holding flow B's staged
    /// files, pending a terminal command from the issuer.
    #[arg(long, env = "FILE_SERVICE_TEMPORARY_BUCKET")]
    temporary_bucket: String,

    /// This node's id in the Snowflake id space ownership/file-token ids
    /// are drawn from.
    #[arg(long, env = "FILE_SERVICE_SNOWFLAKE_NODE", default_value = "1")]
    snowflake_node: u16,

    /// HMAC signing key backing the token engine.
    #[arg(long, env = "FILE_SERVICE_SIGNING_KEY")]
    signing_key: String,

    /// gRPC endpoint of the avatar policy-issuer service.
    #[arg(long, env = "FILE_SERVICE_ISSUER_ENDPOINT")]
    issuer_endpoint: String,

    /// OAuth2 client-credentials token endpoint for authenticating calls
    /// to the issuer.
    #[arg(long, env = "FILE_SERVICE_M2M_TOKEN_URL")]
    m2m_token_url: String,

    /// OAuth2 client id used against `m2m_token_url`.
    #[arg(long, env = "FILE_SERVICE_M2M_CLIENT_ID")]
    m2m_client_id: String,

    /// OAuth2 client secret used against `m2m_token_url`.
    #[arg(long, env = "FILE_SERVICE_M2M_CLIENT_SECRET")]
    m2m_client_secret: String,

    /// Deadline attached to every inbound gRPC call.
    #[clap(long, env = "FILE_SERVICE_REQUEST_TIMEOUT", default_value = "30s", value_parser = duration_range_value_parse!(min: 1s, max: 1hour))]
    request_timeout: DurationHuman,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();
    let args = Arguments::parse();

    let metadata_store: Arc<dyn MetadataRepository> =
        Arc::new(MetadataStore::connect(&args.database_url).await.context("failed to connect to the metadata store")?);
    let session_store = SessionStore::connect(&args.redis_url).await.context("failed to connect to the session store")?;
    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::from_env().await.context("failed to build the object-store gateway")?);
    let issuer = PolicyIssuerClient::connect(
        args.issuer_endpoint.clone(),
        args.m2m_token_url.clone(),
        args.m2m_client_id.clone(),
        args.m2m_client_secret.clone(),
    )
    .await
    .context("failed to connect to the policy-issuer service")?;
    let tokens = TokenEngine::new(args.signing_key.as_bytes());
    let domain = FileDomain::new(
        args.default_image_allowed_types.clone(),
        args.default_max_file_size.0,
        Duration::from(&args.upload_ttl),
        Duration::from(&args.upload_session_ttl),
        Duration::from(&args.temporary_file_ttl),
        args.snowflake_node,
    );

    let sessions = SessionRepositories {
        upload_policy: Arc::new(UploadPolicyRepository::new(session_store.clone())),
        upload_session: Arc::new(UploadSessionRepository::new(session_store.clone())),
        temporary_session: Arc::new(TemporaryFileSessionRepository::new(session_store.clone())),
    };

    let usecase_config = UsecaseConfig {
        max_in_memory: args.max_in_memory.0,
        max_upload_size: args.max_upload_size.0,
        image_bucket: args.image_bucket.clone(),
        other_bucket: args.other_bucket.clone(),
        temporary_bucket: args.temporary_bucket.clone(),
        token_ttl: Duration::from(&args.token_ttl),
    };

    let usecase = Arc::new(FileUsecase::new(metadata_store, sessions, objects, issuer, tokens, domain, usecase_config));

    let rest_router = rest::router(rest::AppState { usecase: usecase.clone() }, args.max_upload_size.0 as usize);
    let rpc_state = RpcState { usecase: usecase.clone() };

    let rest_listener = TcpListener::bind(args.rest_address).await.context("failed to bind the REST listener")?;
    let rest_server = axum::serve(rest_listener, rest_router).with_graceful_shutdown(shutdown_signal());

    let file_service = InterceptedService::new(FileServer::new(FileServiceImpl { state: rpc_state.clone() }), AuthInterceptor);
    let image_service = InterceptedService::new(ImageServer::new(ImageServiceImpl { state: rpc_state }), AuthInterceptor);

    let rpc_server = TonicServer::builder()
        .timeout(Duration::from(&args.request_timeout))
        .layer(tower_http::trace::TraceLayer::new_for_grpc())
        .add_service(file_service)
        .add_service(image_service)
        .serve_with_shutdown(args.rpc_address, shutdown_signal());

    info!(
        rest_address = %args.rest_address,
        rpc_address = %args.rpc_address,
        image_bucket = %args.image_bucket,
        other_bucket = %args.other_bucket,
        temporary_bucket = %args.temporary_bucket,
        "file service starting"
    );

    tokio::try_join!(async { rest_server.await.context("REST listener failed") }, async {
        rpc_server.await.context("gRPC listener failed")
    })?;

    Ok(())
}

// https://github.com/tokio-rs/axum/blob/15917c6dbcb4a48707a20e9cfd021992a279a662/examples/graceful-shutdown/src/main.rs#L55
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
