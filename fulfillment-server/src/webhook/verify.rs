//! Webhook signature verification
//!
//! Both partners sign the raw request body with HMAC-SHA256 over a shared
//! secret and send the hex digest in a signature header. Verification is
//! constant-time via `ring::hmac::verify`.

use super::WebhookError;
use ring::hmac;

/// Verify a hex-encoded HMAC-SHA256 signature over the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<(), WebhookError> {
    let sig_bytes = hex::decode(signature.trim()).map_err(|_| WebhookError::InvalidSignature)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, body, &sig_bytes).map_err(|_| WebhookError::InvalidSignature)
}

/// Sign a payload the way the partners do (test support and docs)
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hex::encode(hmac::sign(&key, body).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_verifies() {
        let sig = sign_payload("secret", b"payload");
        assert!(verify_signature("secret", b"payload", &sig).is_ok());
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        assert!(verify_signature("secret", b"payload", "zz-not-hex").is_err());
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let sig = sign_payload("secret", b"payload");
        assert!(verify_signature("secret", b"payload", &format!(" {sig}\n")).is_ok());
    }
}
