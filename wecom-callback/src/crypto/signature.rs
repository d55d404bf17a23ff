//! WeCom callback signature computation.
//!
//! WeCom signs every callback with a SHA-1 digest over the callback token,
//! the request timestamp and nonce, and the encrypted payload.
//! Reference: https://developer.work.weixin.qq.com/document/path/90968

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Compute a WeCom `msg_signature`.
///
/// The four inputs are sorted lexicographically, concatenated, and hashed
/// with SHA-1. The digest is rendered as lowercase hex.
///
/// # Arguments
///
/// * `token` - The callback token configured in the WeCom admin console
/// * `timestamp` - The `timestamp` query parameter
/// * `nonce` - The `nonce` query parameter
/// * `encrypted` - The base64 ciphertext (`echostr` or the `<Encrypt>` element)
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str, encrypted: &str) -> String {
    let mut parts = [token, timestamp, nonce, encrypted];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Constant-time comparison of an expected signature with a supplied one.
pub fn signatures_match(expected: &str, supplied: &str) -> bool {
    let valid: bool = expected.as_bytes().ct_eq(supplied.as_bytes()).into();

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = supplied.len(),
            "callback_signature_mismatch"
        );
    }

    valid
}
