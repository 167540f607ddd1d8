//! Token refresh: HTTP `refresh_token` grant and the CLI shell-out fallback.
//!
//! Some providers' tokens are owned by a sibling CLI (the Codex CLI keeps
//! its own `auth.json`). When the HTTP refresh fails for those, we invoke
//! the CLI non-interactively and watch its credential file for a freshly
//! written token instead of parsing CLI output, which is unstable.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;

use super::oauth::OAuthCredentials;
use crate::core::clock::Clock;

/// Hard timeout for the CLI shell-out refresh.
pub const CLI_REFRESH_TIMEOUT: Duration = Duration::from_secs(2);

/// Cadence at which the credential file is re-read during a shell-out.
const CLI_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Refresh an access token over HTTP.
///
/// Returns `None` when the refresh failed for any reason (non-200, missing
/// `access_token`, JSON error); the caller decides whether to escalate to a
/// CLI shell-out. On success the previous refresh token is preserved if the
/// server did not rotate it.
pub async fn refresh_access_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    credentials: &OAuthCredentials,
    extra_params: &[(&str, &str)],
    clock: &dyn Clock,
) -> Option<OAuthCredentials> {
    let refresh_token = credentials.refresh_token.as_deref()?;

    let mut params = HashMap::new();
    params.insert("grant_type", "refresh_token");
    params.insert("refresh_token", refresh_token);
    params.insert("client_id", client_id);
    for &(key, value) in extra_params {
        params.insert(key, value);
    }

    let response = match client
        .post(token_url)
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "token refresh request failed");
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), "token refresh rejected");
        return None;
    }

    let parsed: RefreshResponse = match response.json().await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "token refresh response unparseable");
            return None;
        }
    };

    if parsed.access_token.is_empty() {
        return None;
    }

    Some(OAuthCredentials::new(
        parsed.access_token,
        parsed
            .refresh_token
            .or_else(|| credentials.refresh_token.clone()),
        parsed
            .expires_in
            .map(|secs| clock.now() + ChronoDuration::seconds(secs)),
    ))
}

/// Refresh by invoking a sibling CLI and polling its credential file.
///
/// The command is spawned with stdio detached and killed as soon as a new,
/// unexpired token appears on disk or [`CLI_REFRESH_TIMEOUT`] elapses. The
/// CLI hanging after it has written fresh credentials must not delay the
/// return.
pub async fn refresh_via_cli(
    program: &str,
    args: &[&str],
    credential_file: &Path,
    clock: &dyn Clock,
    timeout: Duration,
) -> Option<OAuthCredentials> {
    let previous_token = read_credential_file(credential_file).map(|c| c.access_token);

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program, error = %e, "failed to spawn CLI for refresh");
            return None;
        }
    };

    let deadline = tokio::time::Instant::now() + timeout;
    let fresh = loop {
        if tokio::time::Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(CLI_POLL_INTERVAL).await;

        if let Some(creds) = read_credential_file(credential_file) {
            let is_new = previous_token.as_deref() != Some(creds.access_token.as_str());
            if is_new && !creds.is_expired(clock.now()) {
                break Some(creds);
            }
        }
    };

    let _ = child.kill().await;
    let _ = child.wait().await;
    fresh
}

fn read_credential_file(path: &Path) -> Option<OAuthCredentials> {
    let bytes = std::fs::read(path).ok()?;
    OAuthCredentials::from_json_bytes(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use chrono::Utc;

    #[tokio::test]
    async fn cli_refresh_returns_none_for_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = refresh_via_cli(
            "definitely-not-a-real-binary-vibeusage",
            &[],
            &dir.path().join("auth.json"),
            &SystemClock,
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cli_refresh_times_out_when_nothing_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();
        let result = refresh_via_cli(
            "sleep",
            &["10"],
            &dir.path().join("auth.json"),
            &SystemClock,
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cli_refresh_ignores_stale_token_already_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let existing = OAuthCredentials::new(
            "old-token".to_string(),
            None,
            Some(Utc::now() + chrono::Duration::hours(1)),
        );
        std::fs::write(&path, existing.to_json_bytes().unwrap()).unwrap();

        // The CLI never writes anything new, so the unchanged token must not
        // be reported as a successful refresh.
        let result = refresh_via_cli(
            "sleep",
            &["10"],
            &path,
            &SystemClock,
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_none());
    }
}
