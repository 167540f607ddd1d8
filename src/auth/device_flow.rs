//! OAuth 2.0 Device Authorization Grant.
//!
//! Shared by every provider that enrolls through a device code: request the
//! code, show `user_code` + `verification_uri` to the user, then poll the
//! token endpoint until the user approves, denies, or the code expires.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::oauth::OAuthCredentials;
use crate::core::clock::Clock;
use crate::error::{Result, VibeusageError};

/// Hard ceiling on polling attempts.
const MAX_POLL_ATTEMPTS: u32 = 120;

/// Consecutive transport errors tolerated before giving up.
const MAX_TRANSPORT_ERRORS: u32 = 5;

/// Endpoints and client id for one provider's device flow.
#[derive(Debug, Clone)]
pub struct DeviceFlowConfig {
    pub device_url: String,
    pub token_url: String,
    pub client_id: String,
    pub scope: Option<String>,
}

/// Response to the device-authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,

    #[serde(default)]
    pub verification_uri_complete: Option<String>,

    /// Polling interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default)]
    pub expires_in: Option<u64>,
}

const fn default_interval() -> u64 {
    5
}

impl DeviceAuthorization {
    /// URL the user should open, preferring the pre-filled variant.
    #[must_use]
    pub fn open_url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

/// Terminal outcome of the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Authorized(OAuthCredentials),
    Denied,
    Expired,
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenSuccessResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Request a device code.
///
/// # Errors
///
/// Returns a descriptive error on transport failure, error status, or an
/// unparseable response.
pub async fn request_device_code(
    client: &Client,
    config: &DeviceFlowConfig,
) -> Result<DeviceAuthorization> {
    let mut params = HashMap::new();
    params.insert("client_id", config.client_id.as_str());
    if let Some(scope) = &config.scope {
        params.insert("scope", scope.as_str());
    }

    let response = client
        .post(&config.device_url)
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await
        .map_err(|e| VibeusageError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(VibeusageError::Network(format!(
            "device authorization endpoint returned HTTP {status}"
        )));
    }

    let text = response
        .text()
        .await
        .map_err(|e| VibeusageError::Network(e.to_string()))?;

    serde_json::from_str(&text).map_err(|e| {
        VibeusageError::ParseResponse(format!("device authorization response: {e}"))
    })
}

/// Poll the token endpoint until a terminal outcome.
///
/// Honors the server's `interval`, stretches it by 5 s on `slow_down`,
/// tolerates a few consecutive transport errors, and stops on cancellation
/// or after [`MAX_POLL_ATTEMPTS`] attempts.
pub async fn poll_for_token(
    client: &Client,
    config: &DeviceFlowConfig,
    authorization: &DeviceAuthorization,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> Result<PollOutcome> {
    let mut interval = authorization.interval.max(1);
    let mut transport_errors: u32 = 0;

    for _ in 0..MAX_POLL_ATTEMPTS {
        tokio::select! {
            () = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            () = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }

        match poll_once(client, config, &authorization.device_code).await {
            Ok(PollStep::Authorized(response)) => {
                let expires_at = response
                    .expires_in
                    .map(|secs| clock.now() + ChronoDuration::seconds(secs));
                return Ok(PollOutcome::Authorized(OAuthCredentials::new(
                    response.access_token,
                    response.refresh_token,
                    expires_at,
                )));
            }
            Ok(PollStep::Pending) => {
                transport_errors = 0;
            }
            Ok(PollStep::SlowDown) => {
                transport_errors = 0;
                interval += 5;
            }
            Ok(PollStep::Denied) => return Ok(PollOutcome::Denied),
            Ok(PollStep::Expired) => return Ok(PollOutcome::Expired),
            Err(e) => {
                transport_errors += 1;
                if transport_errors >= MAX_TRANSPORT_ERRORS {
                    return Err(e);
                }
                tracing::debug!(error = %e, "device flow poll failed, retrying");
            }
        }
    }

    Ok(PollOutcome::Expired)
}

enum PollStep {
    Authorized(TokenSuccessResponse),
    Pending,
    SlowDown,
    Denied,
    Expired,
}

async fn poll_once(client: &Client, config: &DeviceFlowConfig, device_code: &str) -> Result<PollStep> {
    let mut params = HashMap::new();
    params.insert("client_id", config.client_id.as_str());
    params.insert("device_code", device_code);
    params.insert("grant_type", "urn:ietf:params:oauth:grant-type:device_code");

    let response = client
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await
        .map_err(|e| VibeusageError::Network(e.to_string()))?;

    let text = response
        .text()
        .await
        .map_err(|e| VibeusageError::Network(e.to_string()))?;

    // Providers answer errors with 200 or 4xx interchangeably; the body's
    // `error` field is authoritative.
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(&text) {
        return Ok(match err.error.as_str() {
            "authorization_pending" => PollStep::Pending,
            "slow_down" => PollStep::SlowDown,
            "access_denied" => PollStep::Denied,
            "expired_token" => PollStep::Expired,
            other => {
                return Err(VibeusageError::AuthFailed {
                    provider: config.client_id.clone(),
                    reason: err.error_description.unwrap_or_else(|| other.to_string()),
                });
            }
        });
    }

    serde_json::from_str::<TokenSuccessResponse>(&text)
        .map(PollStep::Authorized)
        .map_err(|e| VibeusageError::ParseResponse(format!("token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_applies_when_missing() {
        let auth: DeviceAuthorization = serde_json::from_str(
            r#"{"device_code":"d","user_code":"ABCD-1234","verification_uri":"https://example.com/device"}"#,
        )
        .unwrap();
        assert_eq!(auth.interval, 5);
        assert_eq!(auth.open_url(), "https://example.com/device");
    }

    #[test]
    fn complete_uri_preferred() {
        let auth: DeviceAuthorization = serde_json::from_str(
            r#"{
                "device_code":"d",
                "user_code":"ABCD-1234",
                "verification_uri":"https://example.com/device",
                "verification_uri_complete":"https://example.com/device?user_code=ABCD-1234",
                "interval":7,
                "expires_in":900
            }"#,
        )
        .unwrap();
        assert_eq!(auth.interval, 7);
        assert_eq!(
            auth.open_url(),
            "https://example.com/device?user_code=ABCD-1234"
        );
    }

    #[test]
    fn error_body_parses_before_success_body() {
        // Both shapes can arrive with HTTP 200; the error field wins.
        let err: TokenErrorResponse =
            serde_json::from_str(r#"{"error":"authorization_pending"}"#).unwrap();
        assert_eq!(err.error, "authorization_pending");

        let ok: TokenSuccessResponse = serde_json::from_str(
            r#"{"access_token":"tok","refresh_token":"ref","expires_in":3600}"#,
        )
        .unwrap();
        assert_eq!(ok.access_token, "tok");
        assert_eq!(ok.expires_in, Some(3600));
    }
}
