//! Inbound HMAC-SHA256 signature verification for `X-{Host}-Signature-256`
//! headers, the mirror image of outbound webhook signing: instead of
//! producing a hex digest to send, we recompute it and let `hmac`'s
//! `verify_slice` do the constant-time comparison.

use gitaudit_core::{GitopsError, GitopsResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `header` is the full `X-{Host}-Signature-256` value, e.g.
/// `sha256=5f6e...`. Returns `Err(AuthFailed)` on any mismatch, missing
/// prefix, or malformed hex — the caller should not distinguish these
/// to avoid leaking which part of the check failed.
pub fn verify(secret: &str, body: &[u8], header: &str) -> GitopsResult<()> {
    let hex_digest = header
        .strip_prefix("sha256=")
        .ok_or_else(|| GitopsError::auth_failed("webhook signature header missing sha256= prefix"))?;
    let expected = hex::decode(hex_digest).map_err(|_| GitopsError::auth_failed("webhook signature is not valid hex"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| GitopsError::internal("webhook secret has invalid length for hmac-sha256"))?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| GitopsError::auth_failed("webhook signature mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn a_correctly_signed_body_verifies() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let header = sign("shared-secret", body);
        assert!(verify("shared-secret", body, &header).is_ok());
    }

    #[test]
    fn a_tampered_body_fails_verification() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let header = sign("shared-secret", body);
        assert!(verify("shared-secret", br#"{"ref":"refs/heads/evil"}"#, &header).is_err());
    }

    #[test]
    fn the_wrong_secret_fails_verification() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let header = sign("shared-secret", body);
        assert!(verify("wrong-secret", body, &header).is_err());
    }

    #[test]
    fn a_missing_prefix_is_rejected() {
        assert!(verify("shared-secret", b"{}", "5f6e").is_err());
    }

    #[test]
    fn non_hex_is_rejected() {
        assert!(verify("shared-secret", b"{}", "sha256=not-hex!!").is_err());
    }
}
