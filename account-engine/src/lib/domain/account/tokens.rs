use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::account::ports::TokenRng;

/// Hours until an issued single-use token expires.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// 384 bits of entropy per single-use token, above the 256-bit floor and
/// a multiple of 3 bytes so the encoded form has a fixed length (64 chars).
const SINGLE_USE_TOKEN_BYTES: usize = 48;

/// Refresh tokens carry 64 random bytes.
const REFRESH_TOKEN_BYTES: usize = 64;

/// Draw a fresh single-use token (email verification, password reset).
///
/// Uniqueness against the store is the caller's job; see the retry loops in
/// `service::AccountEngine`.
pub fn single_use(rng: &dyn TokenRng) -> String {
    let mut bytes = [0u8; SINGLE_USE_TOKEN_BYTES];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Draw a fresh opaque refresh token.
pub fn refresh(rng: &dyn TokenRng) -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
