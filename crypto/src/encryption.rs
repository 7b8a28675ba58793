//! Per-component encryption of ledger entries.
//!
//! Every supervisory component writes to the ledger with its own key,
//! derived from the node's master key and the component name. Entries are
//! sealed with ChaCha20-Poly1305 under a fresh random nonce.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{blake2b_256_multi, CryptoError};

/// Domain separator for component key derivation.
const KEY_DOMAIN: &[u8] = b"helix-ledger-entry";

/// Nonce and ciphertext (including the 16-byte Poly1305 tag).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Symmetric cipher bound to one component's key.
#[derive(Clone)]
pub struct EntryCipher {
    key: [u8; 32],
}

impl EntryCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the key for `component` from the node's master key.
    pub fn for_component(master_key: &[u8; 32], component: &str) -> Self {
        let key = blake2b_256_multi(&[master_key, KEY_DOMAIN, component.as_bytes()]);
        Self { key }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedPayload, CryptoError> {
        let mut nonce_bytes = [0u8; 12];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| CryptoError::Randomness(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(SealedPayload {
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    /// Decrypt and authenticate a payload sealed with the same key.
    pub fn open(&self, sealed: &SealedPayload) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl fmt::Debug for EntryCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntryCipher(..)")
    }
}
