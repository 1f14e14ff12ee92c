//! [`Transport`] over `reqwest::blocking`.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use super::{server_error_message, Method, Transport, TransportError};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Authenticated HTTP transport for the secrets service.
pub struct HttpTransport {
    client: Client,
    bearer: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::InvalidInput(format!("invalid user agent: {}", e)))?,
        );
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidInput(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidInput(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::HttpFailure {
                status: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            bearer: config.credential.access_key_id().to_string(),
        })
    }

    fn execute(
        &self,
        request: RequestBuilder,
        accept: &[StatusCode],
    ) -> std::result::Result<(Vec<u8>, u16), TransportError> {
        let response = request
            .bearer_auth(&self.bearer)
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| TransportError::Network(e.to_string()))?
            .to_vec();

        if !accept.contains(&status) {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: server_error_message(&body),
            });
        }
        Ok((body, status.as_u16()))
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, timeout: Duration) -> std::result::Result<Vec<u8>, TransportError> {
        debug!(url, "GET");
        let request = self.client.get(url).timeout(timeout);
        self.execute(request, &[StatusCode::OK]).map(|(body, _)| body)
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> std::result::Result<(Vec<u8>, u16), TransportError> {
        debug!(url, method = method.as_str(), "send");
        let request = match method {
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        }
        .timeout(timeout)
        .header(CONTENT_TYPE, "application/json")
        .body(body.to_vec());
        self.execute(request, &[StatusCode::OK, StatusCode::CREATED])
    }
}
