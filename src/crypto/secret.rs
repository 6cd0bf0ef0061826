//! Link secret handling

use crate::crypto::SECRET_SIZE;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Process-wide secret that keys every capability token
///
/// Must stay stable across restarts: changing it invalidates every link
/// issued so far.
#[derive(Clone)]
pub struct LinkSecret {
    /// Secret bytes (zeroized on drop)
    bytes: Zeroizing<Vec<u8>>,
}

impl LinkSecret {
    /// Create a secret from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        LinkSecret {
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    /// Get the secret bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<&str> for LinkSecret {
    fn from(s: &str) -> Self {
        LinkSecret::new(s.as_bytes())
    }
}

impl fmt::Debug for LinkSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSecret")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Generate a random secret, hex encoded for storage in the config file
pub fn generate_secret() -> String {
    let mut bytes = Zeroizing::new([0u8; SECRET_SIZE]);
    rand::thread_rng().fill_bytes(bytes.as_mut());
    hex::encode(bytes.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_does_not_leak() {
        let secret = LinkSecret::from("hunter2-very-secret");
        let rendered = format!("{:?}", secret);

        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("len"));
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        let b = generate_secret();

        assert_eq!(a.len(), SECRET_SIZE * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
