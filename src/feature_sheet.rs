use std::sync::Arc;

use crate::{
    evaluator::{Evaluate, Evaluator},
    refresher::{Refresher, RefresherConfig, Reloader},
    sheets_fetcher::SheetsFetcher,
    snapshot::{ConfigSnapshot, VariantValue},
    source::ConfigurationSource,
    FeatureSheetConfig, Result,
};

/// Feature flags served from a configuration source.
///
/// Construction pulls the source once and fails if that first snapshot cannot be built: there is
/// nothing to fall back to. Afterwards a [`Refresher`] (unless disabled) keeps the snapshot up to
/// date in the background while evaluations continue against the last good snapshot.
///
/// Call [`FeatureSheet::shutdown`] to stop background refresh and wait for it. Dropping a
/// `FeatureSheet` also signals the refresher to stop, without waiting.
///
/// # Examples
/// ```
/// # use featuresheet::{Evaluate, FeatureSheet, RefresherConfig, Result, SheetRows};
/// # fn row(cells: &[&str]) -> Vec<String> { cells.iter().map(|c| c.to_string()).collect() }
/// let source = || -> Result<SheetRows> {
///     Ok(SheetRows::new(
///         vec![
///             row(&["feature_key", "layer_name", "variant_key", "percentage"]),
///             row(&["cta_color", "signup", "red", "50"]),
///             row(&["cta_color", "signup", "blue", "50"]),
///         ],
///         vec![row(&["layer_name", "layer_version"]), row(&["signup", "1"])],
///     ))
/// };
/// let feature_sheet = FeatureSheet::new(source, RefresherConfig::default())?;
/// let variant = feature_sheet.evaluate("cta_color", Some("user-42"))?;
/// assert!(variant == "red" || variant == "blue");
/// feature_sheet.shutdown()?;
/// # Ok::<(), featuresheet::Error>(())
/// ```
pub struct FeatureSheet {
    evaluator: Evaluator,
    reloader: Arc<Reloader>,
    refresher: Option<Refresher>,
}

impl FeatureSheet {
    /// Create a `FeatureSheet` pulling from `source`.
    ///
    /// # Errors
    ///
    /// Any error from the initial pull or build is returned, see [`ConfigSnapshot::build`] and
    /// [`ConfigurationSource::fetch_rows`]. [`Error::Io`](crate::Error::Io) if the refresher
    /// thread could not be started.
    pub fn new(
        source: impl ConfigurationSource + Send + Sync + 'static,
        config: RefresherConfig,
    ) -> Result<FeatureSheet> {
        let source: Arc<dyn ConfigurationSource + Send + Sync> = Arc::new(source);

        let rows = source.fetch_rows()?;
        let snapshot = ConfigSnapshot::build(&rows)?;
        log::debug!(target: "featuresheet",
                    features = snapshot.feature_count(),
                    layers = snapshot.layer_count();
                    "loaded initial configuration snapshot");
        let evaluator = Evaluator::new(snapshot);
        let reloader = Arc::new(Reloader::new(source, evaluator.clone()));

        let refresher = if config.is_enabled() {
            Some(Refresher::with_reloader(reloader.clone(), config)?)
        } else {
            log::debug!(target: "featuresheet", "background refresh is disabled");
            None
        };

        Ok(FeatureSheet {
            evaluator,
            reloader,
            refresher,
        })
    }

    /// Create a `FeatureSheet` backed by the Google Sheets document described by `config`.
    pub fn from_config(config: FeatureSheetConfig) -> Result<FeatureSheet> {
        FeatureSheet::new(SheetsFetcher::new(config.fetcher), config.refresher)
    }

    /// A cloneable handle evaluating against the same active snapshot.
    pub fn evaluator(&self) -> Evaluator {
        self.evaluator.clone()
    }

    /// Currently active snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.evaluator.snapshot()
    }

    /// Pull the source and install a new snapshot now, independently of the background refresh.
    ///
    /// Waits for an in-flight background refresh to finish first, so snapshots are always
    /// installed in the order they were pulled. On error the active snapshot is left untouched.
    pub fn refresh(&self) -> Result<Arc<ConfigSnapshot>> {
        self.reloader.reload()
    }

    /// Returns `true` if a background refresher was started.
    pub fn is_refreshing(&self) -> bool {
        self.refresher.is_some()
    }

    /// Stop background refresh and block waiting for the refresher thread to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::RefresherPanicked`](crate::Error::RefresherPanicked) if the refresher thread
    ///   has panicked.
    pub fn shutdown(mut self) -> Result<()> {
        match self.refresher.take() {
            Some(refresher) => refresher.shutdown(),
            None => Ok(()),
        }
    }
}

impl Evaluate for FeatureSheet {
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
        self.evaluator.evaluate(feature_key, entity_id)
    }
}
