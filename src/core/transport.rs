//! HTTP Transport
//!
//! HTTP client interface and implementations for authenticated requests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{AuthError, NetworkError, ProtocolError};
use crate::types::{ClientConfig, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_TIMEOUT};

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: String,
    /// Request headers, keyed by lower-cased name.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Set once the request has been replayed after a credential refresh.
    pub retried: bool,
}

impl HttpRequest {
    /// Create a request without headers or body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            retried: false,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set a text body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn with_json<B: serde::Serialize + ?Sized>(mut self, body: &B) -> Result<Self, AuthError> {
        let body = serde_json::to_string(body).map_err(|e| {
            AuthError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;
        self.set_header("content-type", "application/json");
        self.body = Some(body);
        Ok(self)
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any value stored under a differently-cased name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Remove every value stored under `name`, whatever its case.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let keys: Vec<String> = self
            .headers
            .keys()
            .filter(|k| k.eq_ignore_ascii_case(name))
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.headers.remove(&key))
            .last()
    }
}

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP response definition.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Status text.
    pub status_text: String,
    /// Response headers, keyed by lower-cased name.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Create an empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_str(&self.body).map_err(|e| {
            AuthError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })
    }
}

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError>;
}

/// Default reqwest-based HTTP transport.
///
/// The cookie store keeps the server's session cookie, which is what makes
/// refresh calls credentials-bearing.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
    max_response_size: usize,
}

impl ReqwestHttpTransport {
    /// Create new transport with default settings.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_options(DEFAULT_TIMEOUT, DEFAULT_MAX_RESPONSE_SIZE, true)
    }

    /// Create transport matching a client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, AuthError> {
        Self::with_options(
            config.timeout,
            config.max_response_size,
            config.cookie_store,
        )
    }

    /// Create transport with custom options.
    pub fn with_options(
        timeout: Duration,
        max_response_size: usize,
        cookie_store: bool,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(cookie_store)
            .build()
            .map_err(|e| {
                AuthError::Network(NetworkError::RequestFailed {
                    message: format!("failed to create HTTP client: {}", e),
                })
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
            max_response_size,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Patch => self.client.patch(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        let mut request_headers = HeaderMap::with_capacity(request.headers.len());
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| invalid_header(key, e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| invalid_header(key, e.to_string()))?;
            request_headers.insert(name, value);
        }
        req_builder = req_builder.headers(request_headers);

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        req_builder = req_builder.timeout(timeout);

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::Network(NetworkError::Timeout { timeout })
            } else if e.is_connect() {
                AuthError::Network(NetworkError::ConnectionFailed {
                    message: e.to_string(),
                })
            } else if e.is_builder() {
                AuthError::Protocol(ProtocolError::InvalidUrl {
                    url: request.url.clone(),
                })
            } else {
                AuthError::Network(NetworkError::RequestFailed {
                    message: e.to_string(),
                })
            }
        })?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();

        // Collect headers
        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_size {
                return Err(AuthError::Protocol(ProtocolError::ResponseTooLarge {
                    size: len as usize,
                }));
            }
        }

        let body = response.text().await.map_err(|e| {
            AuthError::Protocol(ProtocolError::InvalidResponse {
                message: e.to_string(),
            })
        })?;

        if body.len() > self.max_response_size {
            return Err(AuthError::Protocol(ProtocolError::ResponseTooLarge {
                size: body.len(),
            }));
        }

        Ok(HttpResponse {
            status,
            status_text,
            headers,
            body,
        })
    }
}

fn invalid_header(name: &str, message: String) -> AuthError {
    AuthError::Protocol(ProtocolError::InvalidHeader {
        name: name.to_string(),
        message,
    })
}

type MockHandler = dyn Fn(&HttpRequest) -> Result<HttpResponse, AuthError> + Send + Sync;

/// Mock HTTP transport for testing.
///
/// Queued responses are returned first, in FIFO order; after that the
/// handler (if any) answers. With neither, the call fails.
#[derive(Default)]
pub struct MockHttpTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    request_history: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Option<Duration>>,
    handler: Option<Box<MockHandler>>,
}

impl MockHttpTransport {
    /// Create new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock answering every request through `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, AuthError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::default()
        }
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Queue a JSON response.
    pub fn queue_json_response<T: serde::Serialize>(&self, status: u16, body: &T) -> &Self {
        let response = HttpResponse {
            status,
            status_text: if status == 200 { "OK" } else { "Error" }.to_string(),
            headers: [("content-type".to_string(), "application/json".to_string())]
                .into_iter()
                .collect(),
            body: serde_json::to_string(body).unwrap_or_default(),
        };
        self.queue_response(response)
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    /// Get request history.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.request_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get requests whose URL ends with `suffix`.
    pub fn get_requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        self.get_requests()
            .into_iter()
            .filter(|r| r.url.ends_with(suffix))
            .collect()
    }

    /// Get last request.
    pub fn get_last_request(&self) -> Option<HttpRequest> {
        self.request_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.request_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(response) = queued {
            return Ok(response);
        }

        if let Some(handler) = &self.handler {
            return handler(&request);
        }

        Err(AuthError::Network(NetworkError::ConnectionFailed {
            message: "No mock response available".to_string(),
        }))
    }
}

/// Create mock HTTP transport for testing.
pub fn create_mock_transport() -> MockHttpTransport {
    MockHttpTransport::new()
}
