//! PoW nonce search (multi-threaded CPU).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rayon::prelude::*;

use crate::{WorkError, WorkNonce};
use helix_crypto::work_value;
use helix_types::BlockHash;

/// Searches for a nonce using all available CPU cores.
pub struct WorkGenerator;

/// Batch size per thread before checking the found flag.
const BATCH_SIZE: u64 = 4096;

impl WorkGenerator {
    /// Find a nonce whose work value meets `min_difficulty`.
    ///
    /// The nonce space is split across rayon threads by stride; the first
    /// thread to find a valid nonce signals the others to stop. When several
    /// threads succeed in the same batch the smallest nonce wins, so results
    /// are reproducible for a given thread count.
    pub fn generate(&self, header: &BlockHash, min_difficulty: u64) -> Result<WorkNonce, WorkError> {
        if min_difficulty == 0 {
            return Ok(WorkNonce(0));
        }

        let header_bytes: [u8; 32] = *header.as_bytes();
        let found = AtomicU64::new(u64::MAX);
        let done = AtomicBool::new(false);
        let num_threads = rayon::current_num_threads().max(1);

        (0..num_threads).into_par_iter().for_each(|thread_id| {
            let stride = num_threads as u64;
            let mut nonce = thread_id as u64;

            loop {
                if done.load(Ordering::Relaxed) {
                    return;
                }

                for _ in 0..BATCH_SIZE {
                    if work_value(&header_bytes, nonce) >= min_difficulty {
                        found.fetch_min(nonce, Ordering::Relaxed);
                        done.store(true, Ordering::Relaxed);
                        return;
                    }
                    nonce = match nonce.checked_add(stride) {
                        Some(next) => next,
                        None => return,
                    };
                }
            }
        });

        let result = found.load(Ordering::Relaxed);
        if done.load(Ordering::Relaxed) {
            Ok(WorkNonce(result))
        } else {
            Err(WorkError::Exhausted(min_difficulty))
        }
    }
}
