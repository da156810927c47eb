//! Spreadsheet-driven feature flags with deterministic percentage bucketing.
//!
//! # Overview
//!
//! Features and their variant allocations live in a spreadsheet with two sheets: `flags` and
//! `layers`. The rows are compiled into an immutable [`ConfigSnapshot`], where every layer is a
//! table of [`BUCKET_COUNT`] slots claimed by the variants of the features it holds. Evaluating a
//! feature for an entity hashes `"{entity}-{layer}-{version}"` with MurmurHash3 to pick a bucket,
//! so the same entity keeps the same variant until the layer version changes.
//!
//! The [`FeatureSheet`] ties it together: it pulls the spreadsheet through a
//! [`ConfigurationSource`] (by default [`SheetsFetcher`]), builds the initial snapshot, and starts a
//! [`Refresher`] thread that keeps swapping in fresh snapshots. A snapshot that fails to build is
//! never installed: evaluations keep using the last good one.
//!
//! [`EvaluateService`] and [`RemoteEvaluator`] expose evaluation as an RPC, and
//! [`CachedEvaluator`] memoizes results in front of any [`Evaluate`] implementation.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Build errors ([`Error::is_build_error`]) point at the offending sheet row and usually need an
//! editor's attention. Evaluation errors ([`Error::is_not_found`]) indicate that the caller asked
//! for a feature the active snapshot does not know about.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, all
//! under the `featuresheet` target. Consider integrating a `log`-compatible logger implementation
//! for better visibility into refreshes and evaluations.
//!
//! # Examples
//!
//! See `demos/simple` in the crate repository.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod builder;
mod cache;
mod config;
mod error;
mod eval;
mod evaluator;
mod feature_sheet;
mod refresher;
pub mod rpc;
mod sharder;
mod sheets_fetcher;
mod snapshot;
mod snapshot_store;
mod source;

pub use builder::{Row, SheetRows};
pub use cache::CachedEvaluator;
pub use config::{
    FeatureSheetConfig, ACCESS_TOKEN_ENV, API_KEY_ENV, BASE_URL_ENV, REFRESH_SECS_ENV,
    SPREADSHEET_ID_ENV,
};
pub use error::{Error, Result};
pub use evaluator::{Evaluate, Evaluator};
pub use feature_sheet::FeatureSheet;
pub use refresher::{Refresher, RefresherConfig};
pub use rpc::{EvaluateService, RemoteEvaluator};
pub use sharder::{assign, Murmur3Sharder, Sharder};
pub use sheets_fetcher::{SheetsFetcher, SheetsFetcherConfig};
pub use snapshot::{
    ConfigSnapshot, Feature, Layer, LayerIdentity, VariantAllocation, VariantValue, BUCKET_COUNT,
    COARSE_BUCKET_COUNT, SLOTS_PER_BUCKET,
};
pub use snapshot_store::SnapshotStore;
pub use source::ConfigurationSource;
