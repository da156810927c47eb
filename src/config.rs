use std::time::Duration;

use crate::{
    refresher::RefresherConfig,
    sheets_fetcher::{SheetsFetcherConfig, DEFAULT_BASE_URL},
    Error, FeatureSheet, Result,
};

/// Configuration for a [`FeatureSheet`] backed by a Google Sheets document.
///
/// # Examples
/// ```no_run
/// # use std::time::Duration;
/// # use featuresheet::FeatureSheetConfig;
/// let feature_sheet = FeatureSheetConfig::from_sheet_id("15_oV5NcvYK7wK3VVD5ol6KVkWHzPLFl22c1QyLYplpU")
///     .api_key("api-key")
///     .refresh_interval(Duration::from_secs(30))
///     .to_feature_sheet()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FeatureSheetConfig {
    pub(crate) fetcher: SheetsFetcherConfig,
    pub(crate) refresher: RefresherConfig,
}

/// Environment variable holding the spreadsheet id. Required by [`FeatureSheetConfig::from_env`].
pub const SPREADSHEET_ID_ENV: &str = "SPREADSHEET_ID";
/// Environment variable holding a Sheets API key.
pub const API_KEY_ENV: &str = "SHEETS_API_KEY";
/// Environment variable holding an OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "SHEETS_ACCESS_TOKEN";
/// Environment variable overriding the Sheets API base URL.
pub const BASE_URL_ENV: &str = "SHEETS_BASE_URL";
/// Environment variable holding the refresh interval in whole seconds. `0` disables refresh.
pub const REFRESH_SECS_ENV: &str = "FEATURESHEET_REFRESH_SECS";

impl FeatureSheetConfig {
    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = DEFAULT_BASE_URL;

    /// Create a default configuration for the given spreadsheet.
    ///
    /// ```
    /// # use featuresheet::FeatureSheetConfig;
    /// FeatureSheetConfig::from_sheet_id("sheet-id");
    /// ```
    pub fn from_sheet_id(spreadsheet_id: impl Into<String>) -> Self {
        FeatureSheetConfig {
            fetcher: SheetsFetcherConfig::new(spreadsheet_id),
            refresher: RefresherConfig::default(),
        }
    }

    /// Load configuration from process environment.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingEnvVar`] if `SPREADSHEET_ID` is not set.
    /// - [`Error::InvalidEnvVar`] if `FEATURESHEET_REFRESH_SECS` is not a whole number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self> {
        let spreadsheet_id = lookup(SPREADSHEET_ID_ENV)
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingEnvVar(SPREADSHEET_ID_ENV))?;

        let mut config = FeatureSheetConfig::from_sheet_id(spreadsheet_id);
        if let Some(api_key) = lookup(API_KEY_ENV) {
            config = config.api_key(api_key);
        }
        if let Some(token) = lookup(ACCESS_TOKEN_ENV) {
            config = config.access_token(token);
        }
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            config = config.base_url(base_url);
        }
        if let Some(secs) = lookup(REFRESH_SECS_ENV) {
            let secs: u64 = secs.parse().map_err(|_| Error::InvalidEnvVar {
                name: REFRESH_SECS_ENV,
                value: secs.clone(),
            })?;
            config = config.refresh_interval(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Set the Sheets API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.fetcher.api_key = Some(api_key.into());
        self
    }

    /// Set an OAuth access token to read private documents.
    pub fn access_token(mut self, access_token: impl Into<String>) -> Self {
        self.fetcher.access_token = Some(access_token.into());
        self
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.fetcher.base_url = base_url.into();
        self
    }

    /// Override the range (usually a sheet name) holding feature rows.
    ///
    /// Defaults to `"flags"`.
    pub fn flags_range(mut self, range: impl Into<String>) -> Self {
        self.fetcher.flags_range = range.into();
        self
    }

    /// Override the range (usually a sheet name) holding layer rows.
    ///
    /// Defaults to `"layers"`.
    pub fn layers_range(mut self, range: impl Into<String>) -> Self {
        self.fetcher.layers_range = range.into();
        self
    }

    /// Interval between background refreshes. [`Duration::ZERO`] disables background refresh.
    ///
    /// Defaults to [`RefresherConfig::DEFAULT_INTERVAL`].
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresher.interval = interval;
        self
    }

    /// Randomized amount subtracted from every refresh interval.
    pub fn refresh_jitter(mut self, jitter: Duration) -> Self {
        self.refresher.jitter = jitter;
        self
    }

    /// Create a new [`FeatureSheet`], fetching the initial configuration.
    ///
    /// See [`FeatureSheet::from_config`].
    pub fn to_feature_sheet(self) -> Result<FeatureSheet> {
        FeatureSheet::from_config(self)
    }
}
