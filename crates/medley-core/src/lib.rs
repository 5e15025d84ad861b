#![forbid(unsafe_code)]

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const CRATE_NAME: &str = "medley-core";

pub const ENV_MEDLEY_LOG_LEVEL: &str = "MEDLEY_LOG_LEVEL";
pub const ENV_MEDLEY_DB_PATH: &str = "MEDLEY_DB_PATH";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Validation = 3,
    DependencyFailure = 4,
    Internal = 10,
}

/// HMAC-SHA256 of `payload` under `secret`, hex-encoded.
#[must_use]
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time equality for hex signatures. Length mismatch
/// short-circuits; the attacker already knows the expected length.
#[must_use]
pub fn signatures_match(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .bytes()
        .zip(provided.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Mints an opaque token with a short scheme prefix, e.g. `apt_1f3c...`.
#[must_use]
pub fn opaque_token(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
