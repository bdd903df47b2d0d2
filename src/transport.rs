//! HTTP transport to the UCS management endpoint.
//!
//! One blocking XML-in, XML-out exchange per call. No retry logic lives
//! here; auth retries are the client's job.

use crate::error::UcsError;
use std::time::Duration;
use tracing::debug;

/// A single request/response exchange with a controller.
///
/// Implemented over HTTPS in production and scripted in tests.
pub trait UcsTransport: Send + Sync {
    fn call(&self, host: &str, body: &str) -> Result<String, UcsError>;
}

/// Blocking HTTPS transport. UCS controllers ship self-signed
/// certificates, so certificate validation is disabled.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, UcsError> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl UcsTransport for HttpTransport {
    fn call(&self, host: &str, body: &str) -> Result<String, UcsError> {
        let url = format!("https://{host}/nuova");
        debug!(host, bytes = body.len(), "UCS API call");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml")
            .body(body.to_string())
            .send()?;
        Ok(response.text()?)
    }
}
