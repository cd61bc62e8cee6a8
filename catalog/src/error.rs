use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http {status}: {body:?}")]
    Http {
        status: StatusCode,
        url: Option<String>,
        headers: Option<HeaderMap>,
        body: Option<String>,
    },
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("request build error: {0}")]
    Build(String),
}

/// Failure talking to the catalog.
///
/// Every variant is a per-item failure for the reconciliation loop; none of
/// them should stop the worker.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("edition {0} not found")]
    NotFound(String),
    #[error("invalid edition id {0:?}")]
    InvalidId(String),
    #[error("catalog rejected credentials: {0}")]
    Unauthorized(String),
    #[error("catalog returned http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("catalog request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode catalog response: {0}")]
    Decode(String),
    #[error("failed to build catalog request: {0}")]
    Build(String),
}

impl CatalogError {
    /// Lookup-style failures: the record could not be read at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }

    pub(crate) fn from_transport(err: TransportError, edition_id: &str) -> Self {
        match err {
            TransportError::Http { status, .. } if status == StatusCode::NOT_FOUND => {
                CatalogError::NotFound(edition_id.to_string())
            }
            TransportError::Http { status, body, .. }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                CatalogError::Unauthorized(body.unwrap_or_else(|| status.to_string()))
            }
            TransportError::Http { status, body, .. } => CatalogError::Http {
                status,
                body: body.unwrap_or_default(),
            },
            TransportError::Timeout => CatalogError::Timeout,
            TransportError::Network(message) => CatalogError::Network(message),
            TransportError::Build(message) => CatalogError::Build(message),
        }
    }
}
