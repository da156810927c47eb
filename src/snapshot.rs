//! In-memory configuration model.
//!
//! A [`ConfigSnapshot`] is produced by [`ConfigSnapshot::build`] and never mutated afterwards.
//! Readers share it behind an `Arc`, so a snapshot that has been replaced stays valid for every
//! evaluation that already holds it.
use std::{collections::HashMap, ops::Range};

use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of fine-grained slots in every layer. Allocations are expressed in per-mille of this
/// space: one percentage point is [`SLOTS_PER_BUCKET`] slots.
pub const BUCKET_COUNT: usize = 1000;

/// Fine slots per coarse bucket.
pub const SLOTS_PER_BUCKET: usize = 10;

/// Number of coarse buckets an entity can be hashed into.
pub const COARSE_BUCKET_COUNT: u32 = (BUCKET_COUNT / SLOTS_PER_BUCKET) as u32;

/// A concrete value a feature resolves to.
///
/// The empty value is the "unassigned" sentinel returned for buckets no variant claimed.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Display,
)]
#[serde(transparent)]
pub struct VariantValue(String);

impl VariantValue {
    /// Sentinel for slots that were never written.
    pub fn unassigned() -> VariantValue {
        VariantValue::default()
    }

    /// Returns `true` if no variant has been assigned to the bucket this value came from.
    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for VariantValue {
    fn from(value: &str) -> Self {
        VariantValue(value.to_owned())
    }
}

impl PartialEq<str> for VariantValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for VariantValue {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Name and version of a layer. Both participate in the bucket hash, so bumping the version
/// reshuffles every entity in the layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerIdentity {
    /// Layer name, unique within a snapshot.
    pub name: String,
    /// Layer version.
    pub version: i64,
}

impl LayerIdentity {
    /// Create an identity.
    pub fn new(name: impl Into<String>, version: i64) -> LayerIdentity {
        LayerIdentity {
            name: name.into(),
            version,
        }
    }
}

/// A versioned bucket space shared by features that must not statistically interact.
#[derive(Debug, Clone)]
pub struct Layer {
    identity: LayerIdentity,
    /// Always `BUCKET_COUNT` long. Indexed directly, which is much cheaper than a map lookup.
    buckets: Box<[VariantValue]>,
    /// Number of slots written so far. Never exceeds `BUCKET_COUNT`.
    filled: usize,
}

impl Layer {
    pub(crate) fn new(identity: LayerIdentity) -> Layer {
        Layer {
            identity,
            buckets: vec![VariantValue::unassigned(); BUCKET_COUNT].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Name and version, as hashed.
    pub fn identity(&self) -> &LayerIdentity {
        &self.identity
    }

    /// Layer name.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Layer version.
    pub fn version(&self) -> i64 {
        self.identity.version
    }

    /// Number of slots claimed by variants.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Number of slots still free.
    pub fn available(&self) -> usize {
        BUCKET_COUNT - self.filled
    }

    /// Claim the next `slots` contiguous slots for `variant`, returning the claimed range.
    pub(crate) fn fill(&mut self, variant: &VariantValue, slots: usize) -> Result<Range<usize>> {
        if slots > self.available() {
            return Err(Error::CapacityExceeded {
                layer: self.identity.name.clone(),
                requested: slots,
                available: self.available(),
            });
        }

        let range = self.filled..self.filled + slots;
        for slot in &mut self.buckets[range.clone()] {
            slot.clone_from(variant);
        }
        self.filled = range.end;
        Ok(range)
    }

    /// Value held by a coarse bucket (see [`COARSE_BUCKET_COUNT`]).
    pub fn variant_for_bucket(&self, bucket: u32) -> &VariantValue {
        let coarse = (bucket % COARSE_BUCKET_COUNT) as usize;
        &self.buckets[coarse * SLOTS_PER_BUCKET]
    }
}

/// Share of a layer owned by one variant of a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAllocation {
    /// Value returned for entities in this share.
    pub variant: VariantValue,
    /// Percentage points of the layer, `0..=100`.
    pub percentage: u32,
}

impl VariantAllocation {
    /// Number of fine slots this allocation occupies.
    pub fn slots(&self) -> usize {
        self.percentage as usize * SLOTS_PER_BUCKET
    }
}

/// A named decision point and the variants it can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub(crate) key: String,
    pub(crate) layer: String,
    pub(crate) variants: HashMap<VariantValue, VariantAllocation>,
}

impl Feature {
    /// Feature key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the layer this feature draws buckets from.
    pub fn layer_name(&self) -> &str {
        &self.layer
    }

    /// Allocations keyed by variant.
    pub fn variants(&self) -> &HashMap<VariantValue, VariantAllocation> {
        &self.variants
    }

    /// Sum of the percentages of all variants.
    pub fn total_percentage(&self) -> u32 {
        self.variants.values().map(|v| v.percentage).sum()
    }
}

/// A fully validated configuration state.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub(crate) features: HashMap<String, Feature>,
    pub(crate) layers: HashMap<String, Layer>,
    pub(crate) fetched_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Look up a feature by key.
    pub fn feature(&self, key: &str) -> Option<&Feature> {
        self.features.get(key)
    }

    /// Look up a layer by name.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// Keys of every feature in the snapshot, in no particular order.
    pub fn feature_keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Number of features.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Time at which the rows this snapshot was built from were pulled.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_layer_is_unassigned() {
        let layer = Layer::new(LayerIdentity::new("signup", 1));
        assert_eq!(layer.filled(), 0);
        assert_eq!(layer.available(), BUCKET_COUNT);
        assert!((0..COARSE_BUCKET_COUNT).all(|b| layer.variant_for_bucket(b).is_unassigned()));
    }

    #[test]
    fn fill_claims_contiguous_ranges() {
        let mut layer = Layer::new(LayerIdentity::new("signup", 1));

        assert_eq!(layer.fill(&"red".into(), 300).unwrap(), 0..300);
        assert_eq!(layer.fill(&"blue".into(), 700).unwrap(), 300..1000);
        assert_eq!(layer.available(), 0);

        assert_eq!(layer.variant_for_bucket(0), "red");
        assert_eq!(layer.variant_for_bucket(29), "red");
        assert_eq!(layer.variant_for_bucket(30), "blue");
        assert_eq!(layer.variant_for_bucket(99), "blue");
    }

    #[test]
    fn fill_rejects_overflow_without_writing() {
        let mut layer = Layer::new(LayerIdentity::new("signup", 1));
        layer.fill(&"red".into(), 600).unwrap();

        let err = layer.fill(&"blue".into(), 500).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                requested: 500,
                available: 400,
                ..
            }
        ));
        assert_eq!(layer.filled(), 600);
        assert!(layer.variant_for_bucket(60).is_unassigned());
    }

    #[test]
    fn allocation_slots_are_per_mille() {
        let allocation = VariantAllocation {
            variant: "red".into(),
            percentage: 35,
        };
        assert_eq!(allocation.slots(), 350);
    }
}
