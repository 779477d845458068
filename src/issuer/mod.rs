//! Client for the external policy-issuing services (e.g. the avatar
//! policy issuer) consulted during flow B's `validate-policy` step.
//! Grounded on `infras/service/grpc/user_repository.go`: a thin wrapper
//! around the generated `User` gRPC client, with every call
//! authenticated by a cached machine-to-machine OAuth2 token instead of
//! the Go source's `authentication.GrpcAuthorization` helper.

use crate::error::{AppError, Result};
use crate::proto::user::user_client::UserClient;
use crate::proto::user::UserValidateAvatarPolicyTokenRequest;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tonic::transport::Channel;
use tonic::Request;

const M2M_SCOPE: &str = "admin/validate-file-policy";

/// The issuer's response to validating a policy token, before the
/// usecase layer applies it as an override on top of a default policy.
#[derive(Debug, Clone)]
pub struct PolicyOverride {
    pub user_id: i64,
    pub allowed_types: Vec<String>,
    pub max_size: u64,
}

struct CachedToken {
    secret: String,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct PolicyIssuerClient {
    client: UserClient<Channel>,
    oauth: BasicClient,
    cached_token: Arc<Mutex<Option<CachedToken>>>,
}

impl PolicyIssuerClient {
    pub async fn connect(issuer_endpoint: String, m2m_token_url: String, client_id: String, client_secret: String) -> Result<Self> {
        let channel = Channel::from_shared(issuer_endpoint)
            .map_err(|e| AppError::server("build-issuer-channel", e))?
            .connect()
            .await
            .map_err(|e| AppError::server("connect-issuer-channel", e))?;

        let token_url = TokenUrl::new(m2m_token_url.clone()).map_err(|e| AppError::server("parse-m2m-token-url", e))?;
        let auth_url = AuthUrl::new(m2m_token_url).map_err(|e| AppError::server("parse-m2m-auth-url", e))?;
        let oauth = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            client: UserClient::new(channel),
            oauth,
            cached_token: Arc::new(Mutex::new(None)),
        })
    }

    /// Builds a client over a lazily-connecting channel that never
    /// dials out, for usecase tests that exercise flows which don't
    /// call the issuer. Calling `validate_avatar_policy_token` on one
    /// of these will fail when the lazy channel actually tries to
    /// connect.
    #[cfg(test)]
    pub fn offline_for_tests() -> Self {
        let channel = Channel::from_static("http://[::1]:1").connect_lazy();
        let oauth = BasicClient::new(
            ClientId::new("test".to_string()),
            Some(ClientSecret::new("test".to_string())),
            AuthUrl::new("http://[::1]:1/auth".to_string()).expect("static url parses"),
            Some(TokenUrl::new("http://[::1]:1/token".to_string()).expect("static url parses")),
        );
        Self {
            client: UserClient::new(channel),
            oauth,
            cached_token: Arc::new(Mutex::new(None)),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.secret.clone());
            }
        }

        let response = self
            .oauth
            .exchange_client_credentials()
            .add_scope(Scope::new(M2M_SCOPE.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| AppError::server("fetch-m2m-token", anyhow::anyhow!("{e}")))?;

        let secret = response.access_token().secret().clone();
        let ttl = response.expires_in().unwrap_or(Duration::from_secs(60));
        *cached = Some(CachedToken {
            secret: secret.clone(),
            expires_at: Instant::now() + ttl,
        });

        Ok(secret)
    }

    pub async fn validate_avatar_policy_token(&self, policy_token: &str) -> Result<PolicyOverride> {
        let token = self.access_token().await?;
        let mut request = Request::new(UserValidateAvatarPolicyTokenRequest {
            policy_token: policy_token.to_string(),
        });
        request.metadata_mut().insert(
            "authorization",
            format!("Bearer {token}").parse().map_err(|e| AppError::server("build-issuer-auth-header", anyhow::anyhow!("{e}")))?,
        );

        let mut client = self.client.clone();
        let response = client.validate_avatar_policy_token(request).await.map_err(|status| match status.code() {
            tonic::Code::PermissionDenied => AppError::Forbidden("invalid policy token".into()),
            _ => AppError::server("validate-avatar-policy-token", anyhow::anyhow!("{status}")),
        })?;
        let response = response.into_inner();

        Ok(PolicyOverride {
            user_id: response.user_id,
            allowed_types: response.allowed_types,
            max_size: response.max_size.max(0) as u64,
        })
    }
}
