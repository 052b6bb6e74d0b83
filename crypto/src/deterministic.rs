use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

/// ChaCha20 RNG seeded via SHA-256 over a domain separated label.
///
/// Only for reproducible tests and vectors; production providers use the OS RNG.
pub fn seeded_rng(seed: &[u8]) -> ChaCha20Rng {
    let mut hasher = Sha256::new();
    hasher.update(b"icarus-drg");
    hasher.update(seed);
    ChaCha20Rng::from_seed(hasher.finalize().into())
}
