//! # Hashing Utilities
//!
//! BLAKE3 is the identifier hash of the client: block ids, transaction ids,
//! Ed25519 address hashes, the inputs commitment and the PoW digest all come
//! from here. SHA-512 only appears inside HMAC for SLIP-10 derivation.

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use iota_client::crypto::hash::blake3_hash;
///
/// assert_eq!(blake3_hash(b"iota"), blake3_hash(b"iota"));
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash several byte slices as if they were concatenated, without
/// allocating the concatenation.
pub fn blake3_hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Count leading zero bits of a digest. Used as the PoW difficulty measure.
pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut zeros = 0;
    for byte in digest {
        if *byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }
    zeros
}
