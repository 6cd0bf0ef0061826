//! Capability tokens for download links
//!
//! A token is `hex(SHA-256("{id}-{secret}"))`. It never encodes the
//! identifier: the caller always presents the identifier alongside the
//! token, and verification re-derives the token and compares.

use crate::crypto::{LinkSecret, TOKEN_LEN, TOKEN_SEPARATOR};
use crate::storage::StorageId;
use ring::digest::{Context, SHA256};
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Opaque, fixed-length proof that a link to a storage identifier was issued
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityToken(String);

impl CapabilityToken {
    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CapabilityToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Why a presented (token, identifier) pair was rejected
///
/// Both variants must look identical to the outside world.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("identifier is not a canonical non-negative integer")]
    MalformedIdentifier,

    #[error("token does not match identifier")]
    TokenMismatch,
}

/// Issue the capability token for a storage identifier
pub fn issue(id: StorageId, secret: &LinkSecret) -> CapabilityToken {
    let mut ctx = Context::new(&SHA256);
    ctx.update(id.to_string().as_bytes());
    ctx.update(&[TOKEN_SEPARATOR]);
    ctx.update(secret.as_bytes());

    let token = hex::encode(ctx.finish());
    debug_assert_eq!(token.len(), TOKEN_LEN);
    CapabilityToken(token)
}

/// Verify an untrusted (token, identifier) pair
///
/// Returns the identifier only if `token` is exactly the token that
/// [`issue`] produces for it under `secret`.
pub fn verify(token: &str, id: &str, secret: &LinkSecret) -> Result<StorageId, TokenError> {
    let id = parse_identifier(id).ok_or(TokenError::MalformedIdentifier)?;
    let expected = issue(id, secret);

    // Length is public (always TOKEN_LEN); only the content comparison must be constant time
    if bool::from(expected.as_str().as_bytes().ct_eq(token.as_bytes())) {
        Ok(id)
    } else {
        Err(TokenError::TokenMismatch)
    }
}

/// Parse the canonical decimal form: ASCII digits, no sign, no leading zeros
fn parse_identifier(s: &str) -> Option<StorageId> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    s.parse::<u64>().ok().map(StorageId::new)
}
