//! Network seam between the sync engine and the secrets service.

mod endpoints;
mod http;

use std::time::Duration;

use thiserror::Error;

pub use endpoints::{Endpoints, PAGE_SIZE};
pub use http::HttpTransport;

/// Timeout for the revision-date probe.
pub const REVISION_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout for list, count and profile fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for create and update writes.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Write methods used against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Transport-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("error executing HTTP request: {0}")]
    Network(String),

    /// The service answered with an unexpected status. `message` is the
    /// service's error message when the body carried one.
    #[error("HTTP failure: {status}, {message}")]
    Status { status: u16, message: String },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Network(_) => None,
            TransportError::Status { status, .. } => Some(*status),
        }
    }
}

/// Blocking request/response transport.
///
/// Implementations authenticate every request and turn non-2xx responses
/// into [`TransportError::Status`] via [`server_error_message`].
pub trait Transport: Send + Sync {
    /// GET `url`, returning the response body.
    fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Send a JSON `body` with `method`, returning the body and status.
    fn send(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<(Vec<u8>, u16), TransportError>;
}

/// Extract the service's error message from a non-2xx body.
///
/// Falls back to the raw body text when it is not a `{code, message}` object.
pub fn server_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<crate::types::ServerErrorMessage>(body) {
        Ok(err) if !err.message.is_empty() => err.message,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}
