//! HMAC-SHA256 signature verification for inbound webhooks, grounded in the `ring::hmac` usage
//! pattern for provider signature checks.

use ring::hmac;

/// Verifies `X-Hub-Signature-256: sha256=<hex(HMAC-SHA256(body, app_secret))>`.
pub fn verify_whatsapp_signature(body: &[u8], header_value: &str, app_secret: &str) -> bool {
    let Some(hex_sig) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected_bytes) = hex::decode(hex_sig) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, app_secret.as_bytes());
    hmac::verify(&key, body, &expected_bytes).is_ok()
}

/// Verifies a `stripe-signature` header of the form `t=<ts>,v1=<hex hmac>`. Stripe's own
/// verification additionally binds the timestamp into the signed payload; we follow that shape
/// here since we don't depend on the Stripe SDK for this check.
pub fn verify_stripe_signature(body: &[u8], header_value: &str, webhook_secret: &str) -> bool {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header_value.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = Some(v),
            (Some("v1"), Some(v)) => v1 = Some(v),
            _ => {}
        }
    }
    let (Some(timestamp), Some(v1)) = (timestamp, v1) else {
        return false;
    };
    let Ok(expected_bytes) = hex::decode(v1) else {
        return false;
    };

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(body);

    let key = hmac::Key::new(hmac::HMAC_SHA256, webhook_secret.as_bytes());
    hmac::verify(&key, &signed_payload, &expected_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let tag = hmac::sign(&key, body);
        hex::encode(tag.as_ref())
    }

    #[test]
    fn whatsapp_signature_roundtrip() {
        let body = b"{\"hello\":true}";
        let secret = "app-secret";
        let sig = sign(body, secret);
        let header = format!("sha256={sig}");
        assert!(verify_whatsapp_signature(body, &header, secret));
        assert!(!verify_whatsapp_signature(body, &header, "wrong-secret"));
    }

    #[test]
    fn stripe_signature_roundtrip() {
        let body = b"{\"id\":\"evt_1\"}";
        let secret = "whsec_test";
        let timestamp = "1700000000";
        let mut signed_payload = Vec::new();
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(body);
        let sig = sign(&signed_payload, secret);
        let header = format!("t={timestamp},v1={sig}");
        assert!(verify_stripe_signature(body, &header, secret));
    }
}
