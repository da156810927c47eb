//! Bucket assignment.
//!
//! Maps an entity to a coarse bucket of a layer. With an entity id the mapping is a pure function
//! of `(entity_id, layer.name, layer.version)`; without one a random bucket is drawn.
use std::io::Cursor;

use rand::{thread_rng, Rng};

use crate::snapshot::{LayerIdentity, COARSE_BUCKET_COUNT};

/// Maps arbitrary input onto `0..total_shards`.
pub trait Sharder {
    /// Shard for `input`. Must be deterministic.
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u32) -> u32;
}

/// MurmurHash3 (x86, 32-bit, seed 0) sharder. This is the default (and only) sharder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3Sharder;

impl Sharder for Murmur3Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u32) -> u32 {
        let hash = murmur3::murmur3_32(&mut Cursor::new(input.as_ref()), 0)
            .expect("reading from an in-memory buffer should not fail");
        hash % total_shards
    }
}

/// Hash input for an entity in a layer: `"{entity_id}-{layer_name}-{layer_version}"`.
fn hash_input(entity_id: &str, layer: &LayerIdentity) -> String {
    format!("{}-{}-{}", entity_id, layer.name, layer.version)
}

/// Assign `entity_id` to one of [`COARSE_BUCKET_COUNT`] buckets of `layer`.
///
/// Anonymous evaluations (`entity_id` is `None`) get a uniformly random bucket.
pub fn assign(entity_id: Option<&str>, layer: &LayerIdentity, sharder: &impl Sharder) -> u32 {
    match entity_id {
        Some(entity_id) => sharder.get_shard(hash_input(entity_id, layer), COARSE_BUCKET_COUNT),
        None => thread_rng().gen_range(0..COARSE_BUCKET_COUNT),
    }
}
