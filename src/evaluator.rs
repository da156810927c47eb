use std::sync::Arc;

use crate::{
    sharder::Murmur3Sharder,
    snapshot::{ConfigSnapshot, VariantValue},
    snapshot_store::SnapshotStore,
    Result,
};

/// Anything that can resolve a feature for an entity: a local [`Evaluator`], a remote service, or
/// a cache in front of either.
pub trait Evaluate {
    /// Resolve the variant of `feature_key` for `entity_id`.
    ///
    /// When `entity_id` is `None`, a random bucket is used and the result is not reproducible.
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue>;
}

impl<T: Evaluate + ?Sized> Evaluate for &T {
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
        (**self).evaluate(feature_key, entity_id)
    }
}

impl<T: Evaluate + ?Sized> Evaluate for Arc<T> {
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
        (**self).evaluate(feature_key, entity_id)
    }
}

/// Evaluates features against the currently active snapshot.
///
/// Cloning is cheap; clones share the same active snapshot, so a [`swap`](Evaluator::swap) through
/// one clone is observed by all of them.
#[derive(Debug, Clone)]
pub struct Evaluator {
    store: Arc<SnapshotStore>,
}

impl Evaluator {
    /// Create an evaluator serving `snapshot`.
    pub fn new(snapshot: ConfigSnapshot) -> Evaluator {
        Evaluator {
            store: Arc::new(SnapshotStore::new(Arc::new(snapshot))),
        }
    }

    /// Currently active snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.store.get_snapshot()
    }

    /// Install `snapshot` as the active snapshot, returning the previous one.
    ///
    /// No validation happens here: snapshots are validated when they are built. Evaluations that
    /// already picked up the previous snapshot finish against it.
    pub fn swap(&self, snapshot: Arc<ConfigSnapshot>) -> Arc<ConfigSnapshot> {
        self.store.set_snapshot(snapshot)
    }
}

impl Evaluate for Evaluator {
    /// # Errors
    ///
    /// - [`Error::FeatureNotFound`](crate::Error::FeatureNotFound) if the feature is not in the
    ///   active snapshot.
    /// - [`Error::LayerNotFound`](crate::Error::LayerNotFound) if the feature's layer is missing.
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
        let snapshot = self.store.get_snapshot();

        let variant = snapshot
            .eval_feature(feature_key, entity_id, &Murmur3Sharder)
            .inspect_err(|err| {
                log::warn!(target: "featuresheet",
                    feature_key,
                    entity_id:?;
                    "error occurred while evaluating a feature: {:?}", err,
                );
            })?;

        log::trace!(target: "featuresheet",
                    feature_key,
                    entity_id:?,
                    variant:display;
                    "evaluated a feature");

        Ok(variant)
    }
}
