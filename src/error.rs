//! Error type returned by [`WebService`](crate::web_service::WebService) calls.

use thiserror::Error;

/// Failures surfaced to the awaiting caller.
///
/// A non-success HTTP status is not an error: the response is handed back
/// untouched and the caller decides what it means.
#[derive(Debug, Error)]
pub enum WebServiceError {
    /// The token provider could not produce a valid bearer token.
    #[error("failed to acquire OAuth token: {0:#}")]
    TokenAcquisition(#[source] anyhow::Error),

    /// Connection, DNS, TLS or timeout failure inside the transport.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The caller's cancellation token fired while the request was in flight.
    #[error("request was cancelled")]
    Cancelled,

    /// Params or a form body that cannot be form-encoded.
    #[error("payload cannot be form-encoded: {0}")]
    InvalidPayload(String),

    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },
}

pub type Result<T> = std::result::Result<T, WebServiceError>;
