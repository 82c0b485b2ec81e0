//! Signed token for time-limited artifact access.
//!
//! Payload: expiry_ts (u64 BE) || artifact key (UTF-8).
//! Token = base64url(payload || HMAC-SHA256(secret, payload)).
//!
//! The scan message carries one of these so an out-of-process scanner can
//! fetch the upload without holding store credentials, mirroring a
//! shared-access URL. The in-process stages read the store directly and
//! skip the token; `verify` is the half a remote consumer runs against the
//! `sasUrl` it was handed.

use crate::traits::{StorageError, StorageResult};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const EXPIRY_LEN: usize = 8;
const MAC_LEN: usize = 32; // SHA256

/// Build a signed token granting access to `key` until `expires_in` from now.
pub fn create(key: &str, expires_in: Duration, secret: &[u8]) -> String {
    let expiry_ts = SystemTime::now()
        .checked_add(expires_in)
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut payload = Vec::with_capacity(EXPIRY_LEN + key.len());
    payload.extend_from_slice(&expiry_ts.to_be_bytes());
    payload.extend_from_slice(key.as_bytes());

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(&payload);
    let tag = mac.finalize().into_bytes();

    payload.extend_from_slice(&tag);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload)
}

/// Verify a token and return the artifact key it grants access to. This is
/// the consumer-side check for tokens minted by [`create`]; a service that
/// receives a `sasUrl` runs it before serving or fetching the bytes.
pub fn verify(token: &str, secret: &[u8]) -> StorageResult<String> {
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| StorageError::InvalidToken("malformed token".to_string()))?;
    if decoded.len() < EXPIRY_LEN + MAC_LEN {
        return Err(StorageError::InvalidToken("token too short".to_string()));
    }

    let (payload, tag) = decoded.split_at(decoded.len() - MAC_LEN);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(payload);
    mac.verify_slice(tag)
        .map_err(|_| StorageError::InvalidToken("signature mismatch".to_string()))?;

    let expiry_ts = u64::from_be_bytes(
        payload[0..EXPIRY_LEN]
            .try_into()
            .expect("slice length checked above"),
    );
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    if now > expiry_ts {
        return Err(StorageError::InvalidToken("token has expired".to_string()));
    }

    String::from_utf8(payload[EXPIRY_LEN..].to_vec())
        .map_err(|_| StorageError::InvalidToken("key is not valid UTF-8".to_string()))
}

/// Canonical signed-access URL for an artifact key.
pub fn access_url(key: &str, expires_in: Duration, secret: &[u8]) -> String {
    format!("{}?token={}", key, create(key, expires_in, secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";

    #[test]
    fn create_verify_roundtrip() {
        let token = create("incoming/a.png", Duration::from_secs(300), SECRET);
        let key = verify(&token, SECRET).unwrap();
        assert_eq!(key, "incoming/a.png");
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = create("incoming/a.png", Duration::from_secs(300), SECRET);
        assert!(verify(&token, b"other-secret").is_err());
    }

    #[test]
    fn tampered_key_rejected() {
        let token = create("incoming/a.png", Duration::from_secs(300), SECRET);
        let mut decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&token)
            .unwrap();
        decoded[EXPIRY_LEN] ^= 0x01;
        let tampered = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(decoded);
        assert!(verify(&tampered, SECRET).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = create("incoming/a.png", Duration::ZERO, SECRET);
        // Issued with zero TTL, so expiry is at or before now.
        std::thread::sleep(Duration::from_millis(1100));
        assert!(verify(&token, SECRET).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(verify("not-base64!!!", SECRET).is_err());
        assert!(verify("", SECRET).is_err());
        assert!(verify("AAAA", SECRET).is_err());
    }
}
