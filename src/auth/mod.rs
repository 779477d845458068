//! Request-scoped identity: who is calling, and with what admin scopes.
//! Subject/scope extraction from the platform's own auth service is out
//! of scope here; this module only defines the shape every usecase
//! method consumes and a test-mode implementation trusting
//! `X-Test-User` / `X-Test-Scope` headers, the same single-pluggable-
//! provider shape the teacher's `AuthProvider` already used.

mod grpc;
mod rest;

pub use grpc::context_from_metadata;
pub use rest::RequestContextExtractor;

use std::collections::HashSet;

pub mod scope {
    pub const REGISTER_FILE_POLICY: &str = "admin/register-file-policy";
    pub const CREATE_PRESIGNED_FILE: &str = "admin/create-presigned-file";
    pub const CHANGE_REFCOUNT: &str = "admin/change-refcount";
    pub const COMMAND_TEMPORARY_FILE: &str = "admin/command-temporary-file";
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub subject_id: i64,
    pub scopes: HashSet<String>,
}

impl RequestContext {
    pub fn new(subject_id: i64, scopes: impl IntoIterator<Item = String>) -> Self {
        Self {
            subject_id,
            scopes: scopes.into_iter().collect(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject_id != 0
    }

    pub fn require_scope(&self, scope: &str) -> crate::error::Result<()> {
        if self.scopes.contains(scope) {
            Ok(())
        } else {
            Err(crate::error::AppError::Forbidden("insufficient scope".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_scope_is_forbidden() {
        let ctx = RequestContext::new(1, []);
        assert!(ctx.require_scope(scope::CHANGE_REFCOUNT).is_err());
    }

    #[test]
    fn present_scope_is_allowed() {
        let ctx = RequestContext::new(1, [scope::CHANGE_REFCOUNT.to_string()]);
        assert!(ctx.require_scope(scope::CHANGE_REFCOUNT).is_ok());
    }

    #[test]
    fn zero_subject_is_unauthenticated() {
        assert!(!RequestContext::new(0, []).is_authenticated());
    }
}
