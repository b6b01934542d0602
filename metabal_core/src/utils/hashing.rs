//! Hashing helpers used to derive identifiers for generated species
use std::hash::{DefaultHasher, Hash, Hasher};

pub(crate) fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

pub(crate) fn hash_as_hex_string<T: Hash>(t: &T) -> String {
    format!("{:x}", calculate_hash(t))
}

/// Identifier for a species created on demand in `compartment`
///
/// The id is `M_{hex hash of the seed}_{compartment}`, so the same seed in the same
/// compartment always yields the same id.
pub(crate) fn generated_species_id(seed: &str, compartment: &str) -> String {
    format!("M_{}_{}", hash_as_hex_string(&(seed, compartment)), compartment)
}
