//! Salt generation and secret derivation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Random bytes behind every generated salt or challenge.
const SALT_BYTES: usize = 32;

/// Generate a random salt: 32 bytes of OS entropy, base64-encoded.
///
/// Per-session challenges use the same generator; both are single-use
/// random values with identical shape.
#[must_use]
pub fn generate_salt() -> String {
    let bytes: [u8; SALT_BYTES] = rand::random();
    STANDARD.encode(bytes)
}

/// Derive the authentication secret from a password and salt.
///
/// Computed as base64(SHA-256(password, salt)). Deterministic, one-way, and
/// collision-resistant. Deployments that must match an existing dispatcher's
/// verification rule replace this function.
#[must_use]
pub fn derive_secret(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Per-start authentication state owned by the lifecycle manager.
///
/// A fresh salt and derived secret are generated on every server start and
/// live for that generation only; restarting the server rotates both.
#[derive(Debug, Clone)]
pub struct ServerAuth {
    /// Whether clients must authenticate before identifying.
    pub required: bool,
    /// Process-wide salt for this server generation.
    pub salt: String,
    /// Secret derived from the configured password and the salt.
    pub secret: String,
}

impl ServerAuth {
    /// Generate the authentication state for one server start.
    #[must_use]
    pub fn generate(password: &str, required: bool) -> Self {
        let salt = generate_salt();
        let secret = derive_secret(password, &salt);
        Self {
            required,
            salt,
            secret,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
