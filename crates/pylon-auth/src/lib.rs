//! # pylon-auth
//!
//! Crypto provider for the pylon gateway handshake:
//!
//! - **Salts and challenges**: single-use random values with the same shape
//! - **Secret derivation**: the one-way function the external identify step
//!   verifies proofs against
//! - **`ServerAuth`**: the per-start bundle of salt, secret, and the
//!   auth-required flag, owned by the lifecycle manager

#![deny(unsafe_code)]

pub mod crypto;

pub use crypto::{derive_secret, generate_salt, ServerAuth};
