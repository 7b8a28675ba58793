//! Blake2b hashing for proofs, headers and proof-of-work.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Work value of `header || nonce`: the first 8 bytes of its Blake2b hash,
/// little-endian. Work is sufficient when this is `>=` the difficulty.
pub fn work_value(header: &[u8; 32], nonce: u64) -> u64 {
    let mut input = [0u8; 40];
    input[0..32].copy_from_slice(header);
    input[32..40].copy_from_slice(&nonce.to_le_bytes());
    let hash = blake2b_256(&input);
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        let h1 = blake2b_256(b"hello helix");
        let h2 = blake2b_256(b"hello helix");
        assert_eq!(h1, h2);
    }

    #[test]
    fn blake2b_different_inputs() {
        assert_ne!(blake2b_256(b"hello"), blake2b_256(b"world"));
    }

    #[test]
    fn blake2b_multi_equivalent() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn work_value_depends_on_nonce() {
        let header = [0x42; 32];
        assert_eq!(work_value(&header, 7), work_value(&header, 7));
        assert_ne!(work_value(&header, 7), work_value(&header, 8));
    }
}
