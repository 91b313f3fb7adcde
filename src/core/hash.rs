//! Log Digests
//!
//! SHA-256 fingerprints of archived tournament logs, so a downloaded log
//! file can be checked against the archive it came from.
//! Order of updates is part of the digest.

use sha2::{Sha256, Digest};

/// Digest output type (256 bits / 32 bytes)
pub type LogDigest = [u8; 32];

/// Domain separator for tournament log digests.
pub const LOG_DOMAIN: &[u8] = b"KOTH_TOURNAMENT_LOG_V1";

/// Incremental hasher for log records.
///
/// Wraps SHA-256 with helpers for the field types found in a log.
/// Strings are length-prefixed so adjacent fields cannot collide.
pub struct LogHasher {
    hasher: Sha256,
}

impl LogHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for tournament logs.
    pub fn for_tournament_log() -> Self {
        Self::new(LOG_DOMAIN)
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i64 value (little-endian).
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a length-prefixed UTF-8 string.
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Update with an optional value, tagged by presence.
    pub fn update_option<T, F>(&mut self, value: Option<T>, add: F)
    where
        F: FnOnce(&mut Self, T),
    {
        match value {
            Some(v) => {
                self.update_u8(1);
                add(self, v);
            }
            None => self.update_u8(0),
        }
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> LogDigest {
        self.hasher.finalize().into()
    }
}

/// Render a digest as lowercase hex.
pub fn digest_hex(digest: &LogDigest) -> String {
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_determinism() {
        let mut a = LogHasher::for_tournament_log();
        a.update_u64(7);
        a.update_str("Fighting Spirit");

        let mut b = LogHasher::for_tournament_log();
        b.update_u64(7);
        b.update_str("Fighting Spirit");

        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_string_boundaries_matter() {
        let mut a = LogHasher::for_tournament_log();
        a.update_str("ab");
        a.update_str("c");

        let mut b = LogHasher::for_tournament_log();
        b.update_str("a");
        b.update_str("bc");

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_option_presence_matters() {
        let mut a = LogHasher::for_tournament_log();
        a.update_option(None::<u32>, |h, v| h.update_u32(v));

        let mut b = LogHasher::for_tournament_log();
        b.update_option(Some(0u32), |h, v| h.update_u32(v));

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_domain_separation() {
        let a = LogHasher::new(b"DOMAIN_A").finalize();
        let b = LogHasher::new(b"DOMAIN_B").finalize();
        assert_ne!(a, b);
        assert_eq!(digest_hex(&a).len(), 64);
    }
}
