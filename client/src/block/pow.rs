//! # Proof of Work
//!
//! A block's score for a nonce is
//!
//! ```text
//! digest = BLAKE3(packed block without the nonce)
//! score  = 2^leading_zero_bits(BLAKE3(digest ++ nonce_le)) / packed_block_len
//! ```
//!
//! so larger blocks need proportionally more work for the same score. A
//! minimum score of 0 accepts every nonce.
//!
//! Mining splits the nonce space across worker threads (worker `i` tries
//! `i, i + n, i + 2n, …`) and stops all of them at the first hit.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::crypto::hash::{blake3_hash, blake3_hash_parts, leading_zero_bits};

/// Digest of the block bytes that precede the nonce.
pub fn pow_digest(bytes_without_nonce: &[u8]) -> [u8; 32] {
    blake3_hash(bytes_without_nonce)
}

/// Leading zero bits produced by `nonce` for `digest`.
pub fn nonce_zeros(digest: &[u8; 32], nonce: u64) -> u32 {
    leading_zero_bits(&blake3_hash_parts(&[digest.as_slice(), nonce.to_le_bytes().as_slice()]))
}

/// Score of `nonce` for a block of `block_len` packed bytes.
pub fn score(digest: &[u8; 32], nonce: u64, block_len: usize) -> f64 {
    2f64.powi(nonce_zeros(digest, nonce) as i32) / block_len as f64
}

/// Leading zero bits needed to reach `min_score` for a block of `block_len`
/// bytes.
pub fn required_zeros(min_score: u32, block_len: usize) -> u32 {
    if min_score == 0 {
        return 0;
    }
    ((min_score as f64) * (block_len as f64)).log2().ceil() as u32
}

/// Multi-threaded nonce search.
#[derive(Debug, Clone)]
pub struct Miner {
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Self {
        Self::new(thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    /// A handle that aborts a running [`mine`](Self::mine) call.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Finds a nonce giving the block at least `min_score`. Returns `None`
    /// only when cancelled.
    pub fn mine(&self, bytes_without_nonce: &[u8], min_score: u32) -> Option<u64> {
        let block_len = bytes_without_nonce.len() + std::mem::size_of::<u64>();
        let target = required_zeros(min_score, block_len);
        if target == 0 {
            return Some(0);
        }
        let digest = pow_digest(bytes_without_nonce);
        debug!(target, workers = self.workers, "mining block nonce");

        let found = AtomicBool::new(false);
        let nonce = AtomicU64::new(0);
        thread::scope(|scope| {
            for worker in 0..self.workers as u64 {
                let (found, nonce, digest) = (&found, &nonce, &digest);
                let cancel = &self.cancel;
                let step = self.workers as u64;
                scope.spawn(move || {
                    let mut candidate = worker;
                    loop {
                        if found.load(Ordering::Relaxed) || cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        if nonce_zeros(digest, candidate) >= target {
                            if !found.swap(true, Ordering::AcqRel) {
                                nonce.store(candidate, Ordering::Release);
                            }
                            return;
                        }
                        candidate = candidate.wrapping_add(step);
                    }
                });
            }
        });

        found
            .load(Ordering::Acquire)
            .then(|| nonce.load(Ordering::Acquire))
    }
}

/// Whether `nonce` gives the block at least `min_score`.
pub fn verify_nonce(bytes_without_nonce: &[u8], nonce: u64, min_score: u32) -> bool {
    let block_len = bytes_without_nonce.len() + std::mem::size_of::<u64>();
    let target = required_zeros(min_score, block_len);
    target == 0 || nonce_zeros(&pow_digest(bytes_without_nonce), nonce) >= target
}
