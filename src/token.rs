//! Token engine: a pure function over a signing key that turns
//! any serializable payload into an opaque capability string and back.
//! Generalizes the teacher's `cryptography.rs`, which encrypted opaque
//! file blobs for a client to decrypt — this service's `FileToken` is
//! instead a *signed, readable* capability downstream services consume
//! directly, so signing (HMAC-SHA256) replaces encryption.
//!
//! Envelope: `base64url(json(payload)) + "." + base64url(hmac_sha256)`.

use base64ct::Encoding;
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("invalid signing key")]
    InvalidKey,
}

/// Signs and verifies opaque capability tokens. Cheap to clone; the key
/// is held as a `Vec<u8>` behind an `Arc` so cloning never re-copies it.
#[derive(Clone)]
pub struct TokenEngine {
    key: std::sync::Arc<Vec<u8>>,
}

impl TokenEngine {
    pub fn new(signing_key: impl AsRef<[u8]>) -> Self {
        Self {
            key: std::sync::Arc::new(signing_key.as_ref().to_vec()),
        }
    }

    pub fn generate<T: Serialize>(&self, payload: &T) -> Result<String, TokenError> {
        let json = serde_json::to_vec(payload).map_err(|_| TokenError::Malformed)?;
        let encoded_payload = base64ct::Base64UrlUnpadded::encode_string(&json);

        let tag = self.tag(encoded_payload.as_bytes())?;
        let encoded_tag = base64ct::Base64UrlUnpadded::encode_string(&tag);

        Ok(format!("{encoded_payload}.{encoded_tag}"))
    }

    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let (encoded_payload, encoded_tag) = token.split_once('.').ok_or(TokenError::Malformed)?;

        let given_tag =
            base64ct::Base64UrlUnpadded::decode_vec(encoded_tag).map_err(|_| TokenError::Malformed)?;
        let expected_tag = self.tag(encoded_payload.as_bytes())?;

        if given_tag.ct_eq(&expected_tag).unwrap_u8() != 1 {
            return Err(TokenError::BadSignature);
        }

        let json = base64ct::Base64UrlUnpadded::decode_vec(encoded_payload)
            .map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)
    }

    fn tag(&self, message: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::InvalidKey)?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileToken;

    fn sample_token() -> FileToken {
        FileToken {
            id: 1,
            ownership_id: 2,
            file_id: "abc".into(),
            user_id: 42,
            bucket: "images".into(),
            r#type: "image/png".into(),
            size: 1024,
            expires_at: 1_700_000_000,
        }
    }

    #[test]
    fn generate_then_verify_round_trips() {
        let engine = TokenEngine::new(b"top-secret");
        let token = sample_token();

        let encoded = engine.generate(&token).unwrap();
        let decoded: FileToken = engine.verify(&encoded).unwrap();

        assert_eq!(decoded.id, token.id);
        assert_eq!(decoded.file_id, token.file_id);
        assert_eq!(decoded.expires_at, token.expires_at);
    }

    #[test]
    fn rejects_tokens_signed_by_a_different_key() {
        let a = TokenEngine::new(b"key-a");
        let b = TokenEngine::new(b"key-b");

        let encoded = a.generate(&sample_token()).unwrap();
        let result = b.verify::<FileToken>(&encoded);

        assert!(matches!(result, Err(TokenError::BadSignature)));
    }

    #[test]
    fn rejects_tampered_payloads() {
        let engine = TokenEngine::new(b"top-secret");
        let mut encoded = engine.generate(&sample_token()).unwrap();
        encoded.insert(0, 'x');

        let result = engine.verify::<FileToken>(&encoded);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_tokens_without_a_separator() {
        let engine = TokenEngine::new(b"top-secret");
        assert!(matches!(
            engine.verify::<FileToken>("not-a-token"),
            Err(TokenError::Malformed)
        ));
    }
}
