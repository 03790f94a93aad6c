use rand::Rng;
use std::collections::HashMap;
use std::hash::BuildHasher;

/// Positive ids live in `1..=2^31-1`, matching the source's
/// `random.randint(1, 2**31-1)`.
const ID_MAX: u32 = (1u32 << 31) - 1;

/// Collisions at small registry sizes are vanishingly rare; this bounds the
/// reject-on-collision loop so a pathologically full registry fails loudly
/// with `IdExhausted` instead of spinning forever (spec §9 "Random id
/// allocation").
pub const ID_ALLOC_MAX_ATTEMPTS: usize = 1000;

/// Samples a fresh id uniformly from `1..=2^31-1`, rejecting collisions with
/// any key already present in `registry`. Returns `None` once
/// `ID_ALLOC_MAX_ATTEMPTS` is exceeded. Generic over the hasher so it works
/// equally with the standard map and `ahash`'s (both are a `HashMap<K, V,
/// S>` underneath).
pub fn alloc_id<V, S: BuildHasher>(registry: &HashMap<u32, V, S>) -> Option<u32> {
    let mut rng = rand::thread_rng();
    for _ in 0..ID_ALLOC_MAX_ATTEMPTS {
        let candidate = rng.gen_range(1..=ID_MAX);
        if !registry.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    None
}
