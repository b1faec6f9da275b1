//! Error handling for catalog API operations.

use http::StatusCode;
use thiserror::Error;

/// Common error type for catalog API operations.
///
/// The three fetch failures ([CatalogClientError::MalformedRequest],
/// [CatalogClientError::TransportFailure] and [CatalogClientError::DecodeFailure])
/// are handled identically by consumers: the operation is abandoned and
/// previously loaded state is kept.
#[derive(Debug, Error)]
pub enum CatalogClientError {
    /// A valid request URL could not be built,
    /// e.g. a related search without a product id.
    #[error("malformed catalog request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    TransportFailure(#[from] TransportError),
    /// The response body did not match the expected schema.
    #[error("could not decode catalog response")]
    DecodeFailure(#[source] serde_json::Error),
    /// The HTTP client could not be constructed from its configuration.
    #[error("invalid catalog client configuration: {0}")]
    Configuration(String),
}

impl CatalogClientError {
    /// Whether this error is one of the failures of a single fetch,
    /// as opposed to a setup error.
    pub fn is_fetch_failure(&self) -> bool {
        !matches!(self, CatalogClientError::Configuration(_))
    }
}

/// Failures below the payload level.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach catalog")]
    Network(#[source] reqwest::Error),
    #[error("catalog responded with {0}")]
    Status(StatusCode),
}
