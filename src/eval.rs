use crate::{
    sharder::{self, Sharder},
    snapshot::{ConfigSnapshot, VariantValue},
    Error, Result,
};

impl ConfigSnapshot {
    /// Resolve the variant of `feature_key` for `entity_id` against this snapshot.
    ///
    /// Buckets that no variant claimed resolve to [`VariantValue::unassigned`].
    pub fn eval_feature(
        &self,
        feature_key: &str,
        entity_id: Option<&str>,
        sharder: &impl Sharder,
    ) -> Result<VariantValue> {
        let feature = self
            .feature(feature_key)
            .ok_or_else(|| Error::FeatureNotFound(feature_key.to_owned()))?;

        // Guaranteed by the builder, but snapshots are swapped independently of any caller, so
        // this is still a recoverable error.
        let layer = self
            .layer(feature.layer_name())
            .ok_or_else(|| Error::LayerNotFound(feature.layer_name().to_owned()))?;

        let bucket = sharder::assign(entity_id, layer.identity(), sharder);
        Ok(layer.variant_for_bucket(bucket).clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{
        builder::tests::rows,
        sharder::Murmur3Sharder,
        snapshot::{ConfigSnapshot, Feature},
        Error,
    };

    #[test]
    fn same_entity_gets_same_variant() {
        let snapshot = ConfigSnapshot::build(&rows(
            &[("signup", "1")],
            &[
                ("cta_color", "signup", "red", "50"),
                ("cta_color", "signup", "blue", "50"),
            ],
        ))
        .unwrap();

        let first = snapshot
            .eval_feature("cta_color", Some("user-42"), &Murmur3Sharder)
            .unwrap();
        assert!(first == "red" || first == "blue");
        for _ in 0..50 {
            assert_eq!(
                snapshot
                    .eval_feature("cta_color", Some("user-42"), &Murmur3Sharder)
                    .unwrap(),
                first
            );
        }
    }

    #[test]
    fn unassigned_bucket_is_not_an_error() {
        let snapshot = ConfigSnapshot::build(&rows(
            &[("signup", "1")],
            &[("cta_color", "signup", "red", "0")],
        ))
        .unwrap();
        let variant = snapshot
            .eval_feature("cta_color", Some("user-42"), &Murmur3Sharder)
            .unwrap();
        assert!(variant.is_unassigned());
    }

    #[test]
    fn missing_feature() {
        let snapshot = ConfigSnapshot::build(&rows(&[("signup", "1")], &[])).unwrap();
        let err = snapshot
            .eval_feature("cta_color", Some("user-42"), &Murmur3Sharder)
            .unwrap_err();
        assert!(matches!(err, Error::FeatureNotFound(ref key) if key == "cta_color"));
    }

    #[test]
    fn missing_layer_is_recoverable() {
        let mut snapshot = ConfigSnapshot::build(&rows(&[], &[])).unwrap();
        snapshot.features.insert(
            "orphan".to_owned(),
            Feature {
                key: "orphan".to_owned(),
                layer: "gone".to_owned(),
                variants: HashMap::new(),
            },
        );
        let err = snapshot
            .eval_feature("orphan", Some("user-42"), &Murmur3Sharder)
            .unwrap_err();
        assert!(matches!(err, Error::LayerNotFound(ref layer) if layer == "gone"));
    }

    #[test]
    fn anonymous_evaluation_returns_configured_variant() {
        let snapshot = ConfigSnapshot::build(&rows(
            &[("signup", "1")],
            &[("cta_color", "signup", "red", "100")],
        ))
        .unwrap();
        for _ in 0..100 {
            assert_eq!(
                snapshot
                    .eval_feature("cta_color", None, &Murmur3Sharder)
                    .unwrap(),
                "red"
            );
        }
    }
}
