//! The blocking HTTP seam.
//!
//! [`Transport`] returns every HTTP response as data, including
//! non-2xx statuses; only connection-level failures are errors. The
//! content client and the incident resolver both branch on status
//! codes explicitly, so the transport must never turn a 404 or 403
//! into an `Err`.

use std::time::Duration;

use serde::de::DeserializeOwned;

/// Per-request timeout on the live transport. No retry or backoff is
/// applied at this layer; pass-level retry belongs to the scheduler
/// running the scraper.
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
}

/// One HTTP request. Bodies are always JSON, pre-serialized by the
/// caller.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Request {
        Request {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_json(
        method: Method,
        url: impl Into<String>,
        body: &serde_json::Value,
    ) -> Request {
        Request {
            method,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body.to_string().into_bytes()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Request {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A raw HTTP response: status plus body bytes.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A connection-level failure (DNS, refused, timeout, TLS).
#[derive(Debug, thiserror::Error)]
#[error("request to {url} failed: {message}")]
pub struct TransportError {
    pub url: String,
    pub message: String,
}

/// Blocking HTTP executor.
pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

// ─── Live transport ───────────────────────────────────────────────────────────

/// [`Transport`] backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> UreqTransport {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(TIMEOUT))
            .build();
        UreqTransport {
            agent: config.into(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        UreqTransport::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let failed = |e: ureq::Error| TransportError {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let response = match request.method {
            Method::Get => {
                let mut req = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    req = req.header(name, value);
                }
                req.call().map_err(failed)?
            }
            Method::Put | Method::Post | Method::Patch => {
                let mut req = match request.method {
                    Method::Put => self.agent.put(&request.url),
                    Method::Patch => self.agent.patch(&request.url),
                    _ => self.agent.post(&request.url),
                };
                for (name, value) in &request.headers {
                    req = req.header(name, value);
                }
                let body = request.body.as_deref().unwrap_or(&[]);
                req.send(body).map_err(failed)?
            }
        };

        let status = response.status().as_u16();
        let body = response.into_body().read_to_vec().map_err(|e| TransportError {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        Ok(Response { status, body })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders_set_method_and_headers() {
        let req = Request::get("https://example.com").header("Authorization", "Bearer x");
        assert_eq!(req.method, Method::Get);
        assert!(req.body.is_none());
        assert_eq!(req.headers[0].0, "Authorization");

        let body = serde_json::json!({"a": 1});
        let req = Request::with_json(Method::Put, "https://example.com", &body);
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));
    }

    #[test]
    fn response_success_range() {
        let ok = Response {
            status: 201,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        let not_found = Response {
            status: 404,
            body: Vec::new(),
        };
        assert!(!not_found.is_success());
    }
}
