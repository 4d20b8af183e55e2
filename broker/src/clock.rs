//! Clock & ID (C1): monotonic-safe UTC timestamps and opaque token generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use time::OffsetDateTime;

/// All timestamps are stored and compared in UTC; any naive timestamp read from storage is
/// treated as UTC (Diesel's `Timestamptz` round-trips this for us).
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Returns a URL-safe opaque token with `>= 256` bits of entropy. Default `n_bytes=48` gives
/// 384 bits.
pub fn new_token(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn new_action_token() -> String {
    new_token(48)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_expected_entropy() {
        let token = new_token(48);
        // 48 bytes base64url-no-pad encodes to 64 chars.
        assert_eq!(token.len(), 64);
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(new_token(48), new_token(48));
    }
}
