//! The `Evaluate` RPC, mapped onto the Connect protocol's unary JSON encoding.
//!
//! [`EvaluateService`] is the transport-agnostic server side: hand it a request body and write
//! back the [`RpcResponse`] with whatever HTTP server hosts it. [`RemoteEvaluator`] is the client
//! side and implements [`Evaluate`], so it can sit behind a
//! [`CachedEvaluator`](crate::CachedEvaluator).
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::{evaluator::Evaluate, snapshot::VariantValue, Error, Result};

/// HTTP path of the `Evaluate` procedure on `featuresheet.v1.FeatureSheetService`.
pub const EVALUATE_PROCEDURE: &str = "/featuresheet.v1.FeatureSheetService/Evaluate";

/// Response header carrying the evaluation contract version.
pub const VERSION_HEADER: &str = "FeatureSheet-Version";

/// Current evaluation contract version.
pub const VERSION: &str = "v1";

const CONTENT_TYPE: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of an `Evaluate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    /// Feature key to evaluate.
    #[serde(default)]
    pub feature: String,
    /// Always hashed, so an empty (or omitted) id is a deterministic entity of its own.
    #[serde(default)]
    pub entity_id: String,
}

/// Successful `Evaluate` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    /// Assigned variant. Empty when the entity's bucket is unallocated.
    #[serde(default)]
    pub variant: String,
}

/// Connect error body. `feature`/`layer` name what was missing for `not_found` errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    /// Connect error code, e.g. `not_found`.
    pub code: String,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
    /// Feature that does not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Layer that does not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

impl RpcError {
    fn new(code: &str, message: impl Into<String>) -> RpcError {
        RpcError {
            code: code.to_owned(),
            message: message.into(),
            feature: None,
            layer: None,
        }
    }

    fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_argument" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&Error> for RpcError {
    fn from(err: &Error) -> RpcError {
        let mut rpc_error = match err {
            Error::FeatureNotFound(_) | Error::LayerNotFound(_) => {
                RpcError::new("not_found", err.to_string())
            }
            _ => RpcError::new("internal", err.to_string()),
        };
        match err {
            Error::FeatureNotFound(feature) => rpc_error.feature = Some(feature.clone()),
            Error::LayerNotFound(layer) => rpc_error.layer = Some(layer.clone()),
            _ => {}
        }
        rpc_error
    }
}

impl From<RpcError> for Error {
    fn from(rpc_error: RpcError) -> Error {
        match rpc_error {
            RpcError {
                layer: Some(layer), ..
            } => Error::LayerNotFound(layer),
            RpcError {
                feature: Some(feature),
                ..
            } => Error::FeatureNotFound(feature),
            RpcError { code, message, .. } => Error::Rpc { code, message },
        }
    }
}

/// A response ready to be written by an HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers as `(name, value)` pairs.
    pub headers: Vec<(&'static str, &'static str)>,
    /// JSON body.
    pub body: Vec<u8>,
}

impl RpcResponse {
    fn json(status: StatusCode, body: &impl Serialize) -> RpcResponse {
        match serde_json::to_vec(body) {
            Ok(body) => RpcResponse {
                status,
                headers: vec![
                    (CONTENT_TYPE, JSON_CONTENT_TYPE),
                    (VERSION_HEADER, VERSION),
                ],
                body,
            },
            Err(err) => {
                log::error!(target: "featuresheet", "failed to serialize rpc response: {:?}", err);
                RpcResponse {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    headers: vec![(VERSION_HEADER, VERSION)],
                    body: Vec::new(),
                }
            }
        }
    }
}

/// Server side of the `Evaluate` RPC.
#[derive(Debug, Clone)]
pub struct EvaluateService<E> {
    evaluator: E,
}

impl<E: Evaluate> EvaluateService<E> {
    /// Serve evaluations from `evaluator`.
    pub fn new(evaluator: E) -> EvaluateService<E> {
        EvaluateService { evaluator }
    }

    /// Evaluate a decoded request.
    ///
    /// # Errors
    ///
    /// Whatever the inner evaluator returns, typically [`Error::FeatureNotFound`] or
    /// [`Error::LayerNotFound`].
    pub fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluateResponse> {
        let variant = self
            .evaluator
            .evaluate(&request.feature, Some(request.entity_id.as_str()))?;
        Ok(EvaluateResponse {
            variant: variant.into_string(),
        })
    }

    /// Handle a JSON-encoded [`EvaluateRequest`].
    pub fn handle(&self, body: &[u8]) -> RpcResponse {
        let request: EvaluateRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                log::debug!(target: "featuresheet", "rejecting malformed evaluate request: {}", err);
                let rpc_error = RpcError::new("invalid_argument", "invalid request body format");
                return RpcResponse::json(rpc_error.status(), &rpc_error);
            }
        };

        match self.evaluate(&request) {
            Ok(response) => RpcResponse::json(StatusCode::OK, &response),
            Err(err) => {
                let rpc_error = RpcError::from(&err);
                RpcResponse::json(rpc_error.status(), &rpc_error)
            }
        }
    }
}

/// Client side of the `Evaluate` RPC.
pub struct RemoteEvaluator {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    url: Url,
}

impl RemoteEvaluator {
    /// Create a client for the service at `base_url`, e.g. `http://localhost:8080`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`] if `base_url` is not a valid URL.
    pub fn new(base_url: &str) -> Result<RemoteEvaluator> {
        RemoteEvaluator::with_client(base_url, reqwest::blocking::Client::new())
    }

    /// Same as [`RemoteEvaluator::new`] but sends requests through a preconfigured `client`
    /// (timeouts, proxies, TLS).
    pub fn with_client(
        base_url: &str,
        client: reqwest::blocking::Client,
    ) -> Result<RemoteEvaluator> {
        let url = Url::parse(&format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            EVALUATE_PROCEDURE
        ))
        .map_err(Error::InvalidBaseUrl)?;

        Ok(RemoteEvaluator { client, url })
    }

    /// Full URL of the `Evaluate` procedure.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Evaluate for RemoteEvaluator {
    /// The wire format has no absent entity: `None` is sent as an empty id, which the service
    /// hashes like any other.
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
        let request = EvaluateRequest {
            feature: feature_key.to_owned(),
            entity_id: entity_id.unwrap_or_default().to_owned(),
        };

        let response = self.client.post(self.url.clone()).json(&request).send()?;

        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok());
        if version != Some(VERSION) {
            log::warn!(target: "featuresheet", version:?; "unexpected evaluation contract version");
        }

        let status = response.status();
        if status.is_success() {
            let response: EvaluateResponse = response.json()?;
            return Ok(response.variant.into());
        }

        let body = response.bytes()?;
        let rpc_error = serde_json::from_slice::<RpcError>(&body).unwrap_or_else(|_| {
            RpcError::new(
                "unknown",
                format!("unexpected {} response", status.as_u16()),
            )
        });
        Err(rpc_error.into())
    }
}
