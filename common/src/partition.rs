use std::hash::Hasher;
use std::num::NonZeroUsize;

use fnv::FnvHasher;

/// Bucket index for an intermediate key.
///
/// FNV over the key bytes, modulo the bucket count. Every map task of a run
/// must use this same function so that a key lands in one bucket only.
pub fn partition(key: &str, n_reduce: NonZeroUsize) -> usize {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % n_reduce.get() as u64) as usize
}
