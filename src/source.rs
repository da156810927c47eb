//! Where raw configuration rows come from.
use crate::{builder::SheetRows, Result};

/// A pull-based configuration source.
///
/// Implemented by [`SheetsFetcher`](crate::SheetsFetcher) and by any closure returning
/// `Result<SheetRows>`, which is handy for tests and for sources backed by other storage.
///
/// ```
/// # use featuresheet::{ConfigurationSource, Result, SheetRows};
/// let source = || -> Result<SheetRows> {
///     Ok(SheetRows::new(
///         vec![vec!["feature_key".into(), "layer_name".into(), "variant_key".into(), "percentage".into()]],
///         vec![vec!["layer_name".into(), "layer_version".into()]],
///     ))
/// };
/// assert!(source.fetch_rows().is_ok());
/// ```
pub trait ConfigurationSource {
    /// Pull the flags and layers sheets, header rows included.
    fn fetch_rows(&self) -> Result<SheetRows>;
}

impl<T: Fn() -> Result<SheetRows>> ConfigurationSource for T {
    fn fetch_rows(&self) -> Result<SheetRows> {
        self()
    }
}
