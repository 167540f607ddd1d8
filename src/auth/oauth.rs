//! OAuth credential records and expiry policy.
//!
//! On disk a credential is JSON
//! `{access_token, refresh_token?, expires_at?}` with an RFC3339 expiry.
//! Earlier releases (and some sibling CLIs) stored the expiry as a unix
//! timestamp in seconds or milliseconds; those are detected and migrated on
//! read. An expiry that cannot be interpreted at all maps to the epoch so
//! the token is treated as needing refresh.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VibeusageError};

/// Tokens are refreshed this long before their stated expiry.
pub const REFRESH_BUFFER_SECONDS: i64 = 5 * 60;

/// Stored OAuth credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub access_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Missing expiry means a non-expiring token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthCredentials {
    #[must_use]
    pub const fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Whether the token should be refreshed before use.
    ///
    /// `now + buffer >= expires_at` counts as needing refresh; a missing
    /// expiry never does.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expiry| now + chrono::Duration::seconds(REFRESH_BUFFER_SECONDS) >= expiry)
    }

    /// Whether the token is already past its expiry (no buffer applied).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Parse a credential file, migrating legacy expiry encodings.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let obj = value
            .as_object()
            .ok_or_else(|| VibeusageError::ParseResponse("credential file is not an object".to_string()))?;

        let access_token = obj
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VibeusageError::ParseResponse("credential file has no access_token".to_string()))?
            .to_string();

        let refresh_token = obj
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string);

        let expires_at = obj.get("expires_at").and_then(parse_expiry);

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Serialize for the credential store.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Interpret an `expires_at` value.
///
/// RFC3339 strings and unix timestamps (seconds or milliseconds) are
/// accepted; anything else becomes the epoch, which forces a refresh.
fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
        ),
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            // Millisecond timestamps are unambiguously larger than any
            // plausible second timestamp.
            let secs = if raw > 100_000_000_000 { raw / 1000 } else { raw };
            Utc.timestamp_opt(secs, 0).single()
        }
        _ => Some(Utc.timestamp_opt(0, 0).unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expires_at: Option<DateTime<Utc>>) -> OAuthCredentials {
        OAuthCredentials::new("token".to_string(), Some("refresh".to_string()), expires_at)
    }

    #[test]
    fn missing_expiry_never_needs_refresh() {
        let now = Utc::now();
        assert!(!creds(None).needs_refresh(now));
        assert!(!creds(None).is_expired(now));
    }

    #[test]
    fn refresh_buffer_boundaries() {
        let now = Utc::now();
        let buffer = chrono::Duration::seconds(REFRESH_BUFFER_SECONDS);

        // now + buffer == expiry: refresh.
        assert!(creds(Some(now + buffer)).needs_refresh(now));
        // now + buffer == expiry - 1s: no refresh yet.
        assert!(!creds(Some(now + buffer + chrono::Duration::seconds(1))).needs_refresh(now));
        // Long-lived token.
        assert!(!creds(Some(now + chrono::Duration::days(30))).needs_refresh(now));
        // Already expired.
        assert!(creds(Some(now - chrono::Duration::hours(1))).needs_refresh(now));
    }

    #[test]
    fn parse_rfc3339_expiry() {
        let parsed = OAuthCredentials::from_json_bytes(
            br#"{"access_token":"abc","refresh_token":"r","expires_at":"2026-08-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert_eq!(parsed.refresh_token.as_deref(), Some("r"));
        assert_eq!(
            parsed.expires_at.unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_legacy_unix_seconds() {
        let parsed = OAuthCredentials::from_json_bytes(
            br#"{"access_token":"abc","expires_at":1767225600}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.expires_at.unwrap(),
            Utc.timestamp_opt(1_767_225_600, 0).unwrap()
        );
    }

    #[test]
    fn parse_legacy_unix_milliseconds() {
        let parsed = OAuthCredentials::from_json_bytes(
            br#"{"access_token":"abc","expires_at":1767225600000}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.expires_at.unwrap(),
            Utc.timestamp_opt(1_767_225_600, 0).unwrap()
        );
    }

    #[test]
    fn unparseable_expiry_needs_refresh() {
        let parsed = OAuthCredentials::from_json_bytes(
            br#"{"access_token":"abc","expires_at":"not a timestamp"}"#,
        )
        .unwrap();
        assert!(parsed.needs_refresh(Utc::now()));
    }

    #[test]
    fn null_or_empty_expiry_is_non_expiring() {
        let parsed =
            OAuthCredentials::from_json_bytes(br#"{"access_token":"abc","expires_at":null}"#)
                .unwrap();
        assert_eq!(parsed.expires_at, None);

        let parsed =
            OAuthCredentials::from_json_bytes(br#"{"access_token":"abc","expires_at":""}"#)
                .unwrap();
        assert_eq!(parsed.expires_at, None);
    }

    #[test]
    fn missing_access_token_is_an_error() {
        assert!(OAuthCredentials::from_json_bytes(br#"{"refresh_token":"r"}"#).is_err());
        assert!(OAuthCredentials::from_json_bytes(br#"{"access_token":""}"#).is_err());
        assert!(OAuthCredentials::from_json_bytes(b"[]").is_err());
        assert!(OAuthCredentials::from_json_bytes(b"not json").is_err());
    }

    #[test]
    fn json_roundtrip() {
        let original = creds(Some(Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()));
        let bytes = original.to_json_bytes().unwrap();
        let back = OAuthCredentials::from_json_bytes(&bytes).unwrap();
        assert_eq!(back, original);
    }
}
