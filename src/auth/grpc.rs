use super::RequestContext;
use tonic::metadata::MetadataMap;

/// Mirrors [`super::rest::RequestContextExtractor`] for the RPC surface:
/// trusts `x-test-user` / `x-test-scope` metadata entries.
pub fn context_from_metadata(metadata: &MetadataMap) -> RequestContext {
    let subject_id = metadata
        .get("x-test-user")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    let scopes = metadata
        .get("x-test-scope")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    RequestContext::new(subject_id, scopes)
}
