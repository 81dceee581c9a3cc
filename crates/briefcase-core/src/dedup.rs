//! Duplicate detection for ingested submission payloads.
//!
//! The fingerprint is a fast, non-cryptographic hash and is NOT authoritative:
//! two different payloads may share a fingerprint. A payload is a duplicate
//! only when its fingerprint matches and its bytes are exactly equal.

use xxhash_rust::xxh3::xxh3_64;

/// Fingerprint of a payload, used as a lookup pre-filter only.
///
/// Stored as `i64` so it fits an `SQLite` integer column.
pub fn fingerprint(bytes: &[u8]) -> i64 {
    i64::from_ne_bytes(xxh3_64(bytes).to_ne_bytes())
}

/// A previously stored payload that may match a candidate.
pub trait StoredPayload {
    /// Fingerprint recorded when the payload was stored.
    fn fingerprint(&self) -> i64;

    /// Exact stored bytes.
    fn bytes(&self) -> &[u8];
}

impl StoredPayload for (i64, Vec<u8>) {
    fn fingerprint(&self) -> i64 {
        self.0
    }

    fn bytes(&self) -> &[u8] {
        &self.1
    }
}

/// Return the first stored payload identical to `candidate`.
///
/// `wanted` is the candidate's fingerprint, computed by the same function
/// that fingerprinted the stored payloads.
pub fn find_duplicate<'a, S, I>(candidate: &[u8], wanted: i64, stored: I) -> Option<&'a S>
where
    S: StoredPayload + 'a,
    I: IntoIterator<Item = &'a S>,
{
    stored
        .into_iter()
        .find(|entry| entry.fingerprint() == wanted && entry.bytes() == candidate)
}
