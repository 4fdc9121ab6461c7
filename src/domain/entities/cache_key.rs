//! Content-addressed cache keys.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const CACHE_KEY_LEN: usize = 64;

/// Hash-derived, filesystem-safe identifier for a cached image.
///
/// Both cache tiers key on this value. It is the lowercase hex encoding of the
/// SHA-256 digest of the source identifier, so it never leaks raw URLs into
/// file names and always has the same length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a resource identifier (usually a URL).
    #[must_use]
    pub fn digest(identifier: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Recognises a previously derived key, e.g. a cache file name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == CACHE_KEY_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_owned()))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
