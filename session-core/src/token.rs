// ABOUTME: Opaque, URL-safe, unguessable session tokens.
// ABOUTME: 128 bits of CSPRNG entropy, base64url without padding, single-use by construction.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Number of random bytes backing a token — 128 bits, well above the 64-bit floor.
const TOKEN_BYTES: usize = 16;

/// Generate a new opaque session token.
pub fn generate() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
