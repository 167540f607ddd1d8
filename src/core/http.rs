//! HTTP client utilities.
//!
//! Provides a shared HTTP client for all provider fetchers and status probes.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, RequestBuilder};

use crate::error::{Result, VibeusageError};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for status page requests.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("vibeusage/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VibeusageError::Network(e.to_string()))
}

/// Map a reqwest transport error into the taxonomy.
#[must_use]
pub fn transport_error(e: &reqwest::Error) -> VibeusageError {
    if e.is_timeout() {
        VibeusageError::FetchTimeout {
            seconds: DEFAULT_TIMEOUT.as_secs(),
        }
    } else {
        VibeusageError::Network(e.to_string())
    }
}

/// Send a request expected to return JSON, classifying failures for the
/// executor.
///
/// Non-2xx statuses go through [`VibeusageError::from_status`] so auth
/// failures keep their refresh-and-retry semantics.
///
/// # Errors
///
/// Returns error on transport failure, error status, or JSON parse failure.
pub async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(VibeusageError::from_status(provider, status.as_u16()));
    }

    response
        .json()
        .await
        .map_err(|e| VibeusageError::ParseResponse(e.to_string()))
}

/// Fetch JSON from a URL with a plain GET.
///
/// # Errors
///
/// Returns error on network failure or JSON parse failure.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    client: &Client,
    url: &str,
) -> Result<T> {
    send_json(provider, client.get(url)).await
}
