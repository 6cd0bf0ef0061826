//! Cryptographic primitives for download links
//!
//! This module provides:
//! - The process-wide link secret (zeroized on drop, never logged)
//! - Capability tokens: SHA-256 over `"{id}-{secret}"`, hex encoded
//! - Constant-time token verification

mod secret;
mod token;

pub use secret::{generate_secret, LinkSecret};
pub use token::{issue, verify, CapabilityToken, TokenError};

/// Length of a capability token in characters (hex-encoded SHA-256)
pub const TOKEN_LEN: usize = 64;

/// Size of a freshly generated link secret in bytes
pub const SECRET_SIZE: usize = 32;

/// Separator between the identifier and the secret in the digest payload.
/// Never part of the canonical decimal form of an identifier.
pub const TOKEN_SEPARATOR: u8 = b'-';
