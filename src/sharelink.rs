use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum ShareLinkError {
    #[error("malformed share token: {0}")]
    Malformed(String),
    #[error("share token signature mismatch")]
    BadSignature,
    #[error("share token expired")]
    Expired,
}

/// Payload carried inside a share link. `expires` is a millisecond epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePayload {
    pub document_id: Option<i64>,
    pub user_id: i64,
    pub action: String,
    pub expires: i64,
}

/// The three URL path segments of a share link:
/// `/share/<payload>/<expires>/<signature>`.
#[derive(Debug, Clone)]
pub struct ShareToken {
    pub payload: String,
    pub expires: i64,
    pub signature: String,
}

#[derive(Clone)]
pub struct ShareLinkService {
    key: Vec<u8>,
}

impl ShareLinkService {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    pub fn generate(
        &self,
        document_id: Option<i64>,
        user_id: i64,
        action: &str,
        ttl_ms: i64,
    ) -> Result<ShareToken, ShareLinkError> {
        let expires = Utc::now().timestamp_millis() + ttl_ms;
        let payload = SharePayload {
            document_id,
            user_id,
            action: action.to_string(),
            expires,
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|err| ShareLinkError::Malformed(err.to_string()))?;

        Ok(ShareToken {
            payload: URL_SAFE_NO_PAD.encode(json),
            expires,
            signature: self.sign(expires),
        })
    }

    pub fn validate(
        &self,
        encoded_payload: &str,
        expires: i64,
        signature: &str,
    ) -> Result<SharePayload, ShareLinkError> {
        self.validate_at(encoded_payload, expires, signature, Utc::now().timestamp_millis())
    }

    /// Validation with an explicit clock. The signature covers the expiry
    /// instant, so tampering with either segment fails the check.
    pub fn validate_at(
        &self,
        encoded_payload: &str,
        expires: i64,
        signature: &str,
        now_ms: i64,
    ) -> Result<SharePayload, ShareLinkError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| ShareLinkError::Malformed(err.to_string()))?;
        mac.update(expires.to_string().as_bytes());
        let raw_signature =
            hex::decode(signature).map_err(|_| ShareLinkError::BadSignature)?;
        mac.verify_slice(&raw_signature)
            .map_err(|_| ShareLinkError::BadSignature)?;

        if now_ms >= expires {
            return Err(ShareLinkError::Expired);
        }

        let json = URL_SAFE_NO_PAD
            .decode(encoded_payload)
            .map_err(|err| ShareLinkError::Malformed(err.to_string()))?;
        let payload: SharePayload = serde_json::from_slice(&json)
            .map_err(|err| ShareLinkError::Malformed(err.to_string()))?;

        if payload.expires != expires {
            return Err(ShareLinkError::BadSignature);
        }

        Ok(payload)
    }

    fn sign(&self, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    #[test]
    fn fresh_link_validates() {
        let service = ShareLinkService::new("test-secret");
        let token = service.generate(Some(42), 7, "download", HOUR_MS).unwrap();

        let payload = service
            .validate(&token.payload, token.expires, &token.signature)
            .unwrap();
        assert_eq!(payload.document_id, Some(42));
        assert_eq!(payload.user_id, 7);
        assert_eq!(payload.action, "download");
    }

    #[test]
    fn link_fails_after_expiry_even_with_valid_signature() {
        let service = ShareLinkService::new("test-secret");
        let token = service.generate(None, 7, "download", HOUR_MS).unwrap();

        let after_expiry = token.expires + 1;
        let err = service
            .validate_at(&token.payload, token.expires, &token.signature, after_expiry)
            .unwrap_err();
        assert!(matches!(err, ShareLinkError::Expired));
    }

    #[test]
    fn tampered_expiry_fails_signature_check() {
        let service = ShareLinkService::new("test-secret");
        let token = service.generate(Some(1), 7, "download", HOUR_MS).unwrap();

        let err = service
            .validate(&token.payload, token.expires + HOUR_MS, &token.signature)
            .unwrap_err();
        assert!(matches!(err, ShareLinkError::BadSignature));
    }

    #[test]
    fn wrong_key_rejects() {
        let service = ShareLinkService::new("test-secret");
        let token = service.generate(Some(1), 7, "download", HOUR_MS).unwrap();

        let other = ShareLinkService::new("other-secret");
        assert!(other
            .validate(&token.payload, token.expires, &token.signature)
            .is_err());
    }
}
