//! An HTTP client that pulls configuration rows from a Google Sheets document.
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{builder::SheetRows, source::ConfigurationSource, Error, Result};

/// Default base URL of the Sheets API.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Default range (sheet name) holding feature rows.
pub const DEFAULT_FLAGS_RANGE: &str = "flags";

/// Default range (sheet name) holding layer rows.
pub const DEFAULT_LAYERS_RANGE: &str = "layers";

/// Connection settings for [`SheetsFetcher`].
#[derive(Debug, Clone)]
pub struct SheetsFetcherConfig {
    /// Sheets API root, e.g. `https://sheets.googleapis.com`.
    pub base_url: String,
    /// Document id from the spreadsheet URL.
    pub spreadsheet_id: String,
    /// API key, sent as the `key` query parameter. Enough for link-shared documents.
    pub api_key: Option<String>,
    /// OAuth access token, sent as a bearer token. Needed for private documents.
    pub access_token: Option<String>,
    /// Range holding feature rows.
    pub flags_range: String,
    /// Range holding layer rows.
    pub layers_range: String,
}

impl SheetsFetcherConfig {
    /// Settings for `spreadsheet_id` with default base URL and ranges and no credentials.
    pub fn new(spreadsheet_id: impl Into<String>) -> SheetsFetcherConfig {
        SheetsFetcherConfig {
            base_url: DEFAULT_BASE_URL.to_owned(),
            spreadsheet_id: spreadsheet_id.into(),
            api_key: None,
            access_token: None,
            flags_range: DEFAULT_FLAGS_RANGE.to_owned(),
            layers_range: DEFAULT_LAYERS_RANGE.to_owned(),
        }
    }
}

/// A client that fetches configuration rows from the Sheets API.
pub struct SheetsFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    config: SheetsFetcherConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    // The API omits `values` for empty ranges.
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsFetcher {
    /// Create a fetcher for the document described by `config`.
    pub fn new(config: SheetsFetcherConfig) -> SheetsFetcher {
        SheetsFetcher {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    fn url(&self) -> Result<Url> {
        let mut params = vec![
            ("ranges", self.config.flags_range.as_str()),
            ("ranges", self.config.layers_range.as_str()),
            ("majorDimension", "ROWS"),
            ("valueRenderOption", "FORMATTED_VALUE"),
        ];
        if let Some(api_key) = &self.config.api_key {
            params.push(("key", api_key.as_str()));
        }

        Url::parse_with_params(
            &format!(
                "{}/v4/spreadsheets/{}/values:batchGet",
                self.config.base_url.trim_end_matches('/'),
                self.config.spreadsheet_id
            ),
            &params,
        )
        .map_err(Error::InvalidBaseUrl)
    }

    /// Fetch both sheets in a single request.
    pub fn fetch(&self) -> Result<SheetRows> {
        let url = self.url()?;

        log::debug!(target: "featuresheet", spreadsheet_id = self.config.spreadsheet_id.as_str(); "fetching configuration rows");
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;

        let response = response.error_for_status().map_err(|err| {
            if matches!(
                err.status(),
                Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            ) {
                log::warn!(target: "featuresheet", "configuration source is not authorized. Check your API key or access token");
                Error::Unauthorized
            } else {
                log::warn!(target: "featuresheet", "received non-200 response while fetching configuration: {:?}", err);
                Error::from(err)
            }
        })?;

        let body = response.text()?;
        let rows = parse_batch_get(&body)?;

        log::debug!(target: "featuresheet",
                    flag_rows = rows.flags.len(),
                    layer_rows = rows.layers.len();
                    "successfully fetched configuration rows");

        Ok(rows)
    }
}

impl ConfigurationSource for SheetsFetcher {
    fn fetch_rows(&self) -> Result<SheetRows> {
        self.fetch()
    }
}

/// Parse a `values:batchGet` response whose first range is the flags sheet and second range is
/// the layers sheet.
fn parse_batch_get(body: &str) -> Result<SheetRows> {
    let response: BatchGetResponse = serde_json::from_str(body)
        .map_err(|err| Error::MalformedResponse(format!("invalid batchGet body: {err}")))?;

    let mut ranges = response.value_ranges.into_iter();
    let (Some(flags), Some(layers), None) = (ranges.next(), ranges.next(), ranges.next()) else {
        return Err(Error::MalformedResponse(
            "expected exactly two value ranges (flags, layers)".to_owned(),
        ));
    };

    Ok(SheetRows::new(flags.values, layers.values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_get_response() {
        let body = r#"{
            "spreadsheetId": "sheet-id",
            "valueRanges": [
                {
                    "range": "flags!A1:D3",
                    "majorDimension": "ROWS",
                    "values": [
                        ["feature_key", "layer_name", "variant_key", "percentage"],
                        ["cta_color", "signup", "red", "50"],
                        ["cta_color", "signup", "blue", "50"]
                    ]
                },
                {
                    "range": "layers!A1:B2",
                    "majorDimension": "ROWS",
                    "values": [["layer_name", "layer_version"], ["signup", "1"]]
                }
            ]
        }"#;

        let rows = parse_batch_get(body).unwrap();
        assert_eq!(rows.flags.len(), 3);
        assert_eq!(rows.flags[1], vec!["cta_color", "signup", "red", "50"]);
        assert_eq!(rows.layers, vec![vec!["layer_name", "layer_version"], vec!["signup", "1"]]);
    }

    #[test]
    fn empty_range_has_no_rows() {
        let body = r#"{"valueRanges": [{"range": "flags!A1:D1"}, {"range": "layers!A1:B1"}]}"#;
        let rows = parse_batch_get(body).unwrap();
        assert!(rows.flags.is_empty());
        assert!(rows.layers.is_empty());
    }

    #[test]
    fn rejects_wrong_range_count() {
        let body = r#"{"valueRanges": [{"range": "flags!A1:D1", "values": []}]}"#;
        assert!(matches!(
            parse_batch_get(body),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_batch_get("<html>quota exceeded</html>").unwrap_err();
        assert!(err.is_source_unavailable());
    }

    #[test]
    fn builds_request_url() {
        let mut config = SheetsFetcherConfig::new("abc123");
        config.base_url = "http://localhost:8080/".to_owned();
        config.api_key = Some("secret".to_owned());
        let url = SheetsFetcher::new(config).url().unwrap();

        assert_eq!(url.path(), "/v4/spreadsheets/abc123/values:batchGet");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("ranges".to_owned(), "flags".to_owned()),
                ("ranges".to_owned(), "layers".to_owned()),
                ("majorDimension".to_owned(), "ROWS".to_owned()),
                ("valueRenderOption".to_owned(), "FORMATTED_VALUE".to_owned()),
                ("key".to_owned(), "secret".to_owned()),
            ]
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let mut config = SheetsFetcherConfig::new("abc123");
        config.base_url = "not a url".to_owned();
        assert!(matches!(
            SheetsFetcher::new(config).url(),
            Err(Error::InvalidBaseUrl(_))
        ));
    }
}
