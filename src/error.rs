use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building, refreshing, or evaluating feature configuration.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A cell in the source rows could not be parsed (missing column or malformed integer).
    #[error("failed to parse {sheet} row {row}, column `{column}`: {reason}")]
    Parse {
        /// Sheet the row came from ("flags" or "layers").
        sheet: &'static str,
        /// 1-based row number, header included.
        row: usize,
        /// Column name.
        column: &'static str,
        /// Human-readable cause.
        reason: String,
    },

    /// A feature row references a layer that is not defined in the layers sheet.
    #[error("layer {layer} does not exist (referenced by feature {feature})")]
    MissingLayer {
        /// Feature that referenced the layer.
        feature: String,
        /// Name of the missing layer.
        layer: String,
    },

    /// A layer ran out of bucket slots.
    #[error("layer {layer} does not have enough buckets: {requested} requested, {available} available")]
    CapacityExceeded {
        /// Name of the over-allocated layer.
        layer: String,
        /// Slots requested by the offending row.
        requested: usize,
        /// Slots still free in the layer before the offending row.
        available: usize,
    },

    /// A feature is assigned to more than one layer.
    #[error("feature {feature} is assigned to layer {first} and to layer {second}")]
    FeatureLayerConflict {
        /// Conflicting feature.
        feature: String,
        /// Layer named by the first row of the feature.
        first: String,
        /// Layer named by a later row of the feature.
        second: String,
    },

    /// Evaluated feature is not present in the active snapshot.
    #[error("feature {0} not found")]
    FeatureNotFound(String),

    /// Evaluated feature refers to a layer that is not present in the active snapshot.
    #[error("layer {0} not found")]
    LayerNotFound(String),

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The configuration source rejected our credentials.
    #[error("unauthorized, api key or access token is likely invalid")]
    Unauthorized,

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The configuration source answered with something we cannot interpret.
    #[error("malformed response from configuration source: {0}")]
    MalformedResponse(String),

    /// The remote evaluation service returned an error we cannot map to a local one.
    #[error("evaluate rpc failed with {code}: {message}")]
    Rpc {
        /// Connect error code.
        code: String,
        /// Error message sent by the server.
        message: String,
    },

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Indicates that the refresher thread panicked.
    #[error("refresher thread panicked")]
    RefresherPanicked,

    /// A required environment variable is not set.
    #[error("{0} env var must be set")]
    MissingEnvVar(&'static str),

    /// An environment variable is set to a value we cannot use.
    #[error("{name} env var is invalid: {value:?}")]
    InvalidEnvVar {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

impl Error {
    /// Returns `true` for errors that abort snapshot construction.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. }
                | Error::MissingLayer { .. }
                | Error::CapacityExceeded { .. }
                | Error::FeatureLayerConflict { .. }
        )
    }

    /// Returns `true` for errors that mean the configuration pull itself failed.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            Error::InvalidBaseUrl(_)
                | Error::Unauthorized
                | Error::Network(_)
                | Error::MalformedResponse(_)
                | Error::Io(_)
        )
    }

    /// Returns `true` for evaluation-time lookup misses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FeatureNotFound(_) | Error::LayerNotFound(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
