use helix_crypto::work_value;
use helix_types::BlockHash;

/// Check that `nonce` meets `min_difficulty` for the given header hash.
pub fn validate_work(header: &BlockHash, nonce: u64, min_difficulty: u64) -> bool {
    work_value(header.as_bytes(), nonce) >= min_difficulty
}
