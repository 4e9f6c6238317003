// src/utils/hash.rs

//! Content hashing for records without a natural key.

use sha2::{Digest, Sha256};

/// Hex SHA-256 over `parts`, each part terminated by a unit separator.
///
/// The separator keeps `["ab", "c"]` and `["a", "bc"]` apart.
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(&["a", "b"]), content_hash(&["a", "b"]));
        assert_eq!(content_hash(&["a"]).len(), 64);
    }

    #[test]
    fn test_content_hash_respects_boundaries() {
        assert_ne!(content_hash(&["ab", "c"]), content_hash(&["a", "bc"]));
    }
}
