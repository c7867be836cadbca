//! HTTP client abstraction for backend API communication.
//!
//! This module provides a trait-based abstraction over HTTP clients, enabling
//! dependency injection and easy mocking in tests. Unlike a bare text-returning
//! client, the trait surfaces the response status so callers can classify
//! failures (auth, rate limit, timeout) without string matching.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Per-request timeout for all backend exchanges.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A completed HTTP exchange: status code plus raw body text.
///
/// An `Err` from [`HttpClient::post_json`] means the exchange never completed
/// (connection reset, DNS failure, local timeout); a 4xx/5xx still comes back
/// as `Ok` with the status set.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP communication with backend APIs.
///
/// # Example
///
/// ```ignore
/// use cognate::http_client::{HttpClient, ReqwestHttpClient};
///
/// let client = ReqwestHttpClient::new();
/// let response = client.post_json(
///     "https://api.example.com/endpoint",
///     &[("Authorization", "Bearer sk-...")],
///     &serde_json::json!({"model": "m", "messages": []}),
/// ).await?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns status plus body.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport-level failures; HTTP error
    /// statuses are reported through [`HttpResponse::status`].
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse>;
}

/// HTTP client implementation using reqwest.
///
/// This is the default production implementation that makes real HTTP
/// requests, bounded by [`REQUEST_TIMEOUT`].
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Creates a new HTTP client with the standard request timeout.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
