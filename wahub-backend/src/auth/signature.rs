use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Verify a hex HMAC-SHA256 of `body` (optionally prefixed `sha256=`).
/// Comparison is constant time.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_signature() {
        let body = br#"{"event":"qr"}"#;
        let signature = sign("secret", body);

        assert!(verify_webhook_signature("secret", body, &signature));
        assert!(verify_webhook_signature("secret", body, &format!("sha256={}", signature)));
        assert!(!verify_webhook_signature("other", body, &signature));
        assert!(!verify_webhook_signature("secret", b"tampered", &signature));
        assert!(!verify_webhook_signature("secret", body, "zz-not-hex"));
    }
}
