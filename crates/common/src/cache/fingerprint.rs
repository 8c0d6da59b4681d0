//! Stable cache keys for outbound requests
//!
//! The same logical request must map to the same key across processes, so
//! keys are a BLAKE3 digest over the request's parts. Each part is prefixed
//! with its length, which keeps `["ab", "c"]` and `["a", "bc"]` distinct.

/// Hex-encoded BLAKE3 fingerprint of an ordered list of request parts
///
/// # Example
/// ```
/// use healer_common::cache::fingerprint;
///
/// let a = fingerprint(["anthropic", "diagnose", "job 42 failed: exit code 1"]);
/// let b = fingerprint(["anthropic", "diagnose", "job 42 failed: exit code 1"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn fingerprint<I, P>(parts: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        let bytes = part.as_ref();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize().as_bytes())
}
