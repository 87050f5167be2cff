//! Network transport for queued actions.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::item::ApiRequest;
use crate::config::ServerConfig;
use crate::error::SyncError;

/// Sends one request and returns the decoded response body.
pub trait Transport {
    /// Perform `request`.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, non-2xx status or an
    /// undecodable body.
    fn send(&self, request: &ApiRequest) -> Result<Value, SyncError>;
}

/// Blocking HTTP transport against the case-management API.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport from server settings.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        }
    }

    /// Absolute URL of `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<Value, SyncError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, %url, "sending request");

        let mut req = self
            .agent
            .request(request.method.as_str(), &url)
            .set("Accept", "application/json");
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }

        let response = match &request.body {
            Some(body) => req.send_json(body),
            None => req.call(),
        }
        .map_err(|e| SyncError::Http(format!("{} {url} failed: {e}", request.method)))?;

        let body = response
            .into_string()
            .map_err(|e| SyncError::Http(format!("Failed to read response from {url}: {e}")))?;

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| SyncError::Http(format!("Invalid JSON from {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new(&ServerConfig {
            base_url: "https://primero.example.org/api/v2/".to_string(),
            token: None,
            timeout_secs: 5,
        });

        assert_eq!(
            transport.url("/cases/c1"),
            "https://primero.example.org/api/v2/cases/c1"
        );
        assert_eq!(
            transport.url("cases"),
            "https://primero.example.org/api/v2/cases"
        );
    }
}
