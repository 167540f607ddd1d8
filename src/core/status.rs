//! Provider status probes.
//!
//! Two concrete shapes behind one interface: statuspage.io-style summary
//! endpoints and incident-feed endpoints. Every probe runs under a short
//! timeout and answers `unknown` on any transport or parse error; status is
//! never retried at this layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::STATUS_TIMEOUT;

// =============================================================================
// Status Levels
// =============================================================================

/// Provider health as reported by its status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusLevel {
    Operational,
    Degraded,
    PartialOutage,
    MajorOutage,
    #[default]
    Unknown,
}

impl StatusLevel {
    /// Map a statuspage.io `indicator` value.
    #[must_use]
    pub fn from_statuspage_indicator(indicator: &str) -> Self {
        match indicator.to_lowercase().as_str() {
            "none" => Self::Operational,
            "minor" => Self::Degraded,
            "major" => Self::PartialOutage,
            "critical" => Self::MajorOutage,
            _ => Self::Unknown,
        }
    }

    /// Map an incident-feed `severity` value.
    #[must_use]
    pub fn from_incident_severity(severity: &str) -> Self {
        match severity.to_lowercase().as_str() {
            "low" | "medium" => Self::Degraded,
            "high" => Self::PartialOutage,
            "critical" | "severe" => Self::MajorOutage,
            _ => Self::Degraded,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::Degraded => "degraded",
            Self::PartialOutage => "partial outage",
            Self::MajorOutage => "major outage",
            Self::Unknown => "unknown",
        }
    }
}

/// Probe result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub level: StatusLevel,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    /// Status for an unreachable or unparseable endpoint.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            level: StatusLevel::Unknown,
            description: None,
            updated_at: None,
        }
    }

    /// All-clear status.
    #[must_use]
    pub const fn operational() -> Self {
        Self {
            level: StatusLevel::Operational,
            description: None,
            updated_at: None,
        }
    }
}

// =============================================================================
// Probe Trait
// =============================================================================

/// A provider health check.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn fetch(&self, client: &Client) -> ProviderStatus;
}

// =============================================================================
// Statuspage-style Probe
// =============================================================================

#[derive(Debug, Deserialize)]
struct StatuspageResponse {
    status: StatuspageStatus,
    #[serde(default)]
    page: Option<StatuspagePage>,
}

#[derive(Debug, Deserialize)]
struct StatuspageStatus {
    indicator: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatuspagePage {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Probe for statuspage.io-compatible JSON endpoints.
pub struct StatuspageProbe {
    url: String,
}

impl StatuspageProbe {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl StatusProbe for StatuspageProbe {
    async fn fetch(&self, client: &Client) -> ProviderStatus {
        let request = client.get(&self.url).timeout(STATUS_TIMEOUT);
        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(url = %self.url, status = %r.status(), "status probe rejected");
                return ProviderStatus::unknown();
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "status probe unreachable");
                return ProviderStatus::unknown();
            }
        };

        match response.json::<StatuspageResponse>().await {
            Ok(data) => ProviderStatus {
                level: StatusLevel::from_statuspage_indicator(&data.status.indicator),
                description: data.status.description,
                updated_at: data.page.and_then(|p| p.updated_at),
            },
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "status probe unparseable");
                ProviderStatus::unknown()
            }
        }
    }
}

// =============================================================================
// Incident-feed-style Probe
// =============================================================================

#[derive(Debug, Deserialize)]
struct Incident {
    #[serde(default)]
    title: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl Incident {
    fn is_active(&self) -> bool {
        self.end_time.as_deref().is_none_or(str::is_empty)
    }
}

/// Probe for JSON incident feeds.
///
/// Reports the worst active incident whose title matches any keyword;
/// no matching incident means operational.
pub struct IncidentFeedProbe {
    url: String,
    keywords: Vec<String>,
}

impl IncidentFeedProbe {
    #[must_use]
    pub fn new(url: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            url: url.into(),
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, incident: &Incident) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = incident.title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k))
    }
}

#[async_trait]
impl StatusProbe for IncidentFeedProbe {
    async fn fetch(&self, client: &Client) -> ProviderStatus {
        let request = client.get(&self.url).timeout(STATUS_TIMEOUT);
        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(_) | Err(_) => return ProviderStatus::unknown(),
        };

        let incidents: Vec<Incident> = match response.json().await {
            Ok(list) => list,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "incident feed unparseable");
                return ProviderStatus::unknown();
            }
        };

        let mut worst: Option<(StatusLevel, &Incident)> = None;
        for incident in incidents.iter().filter(|i| i.is_active() && self.matches(i)) {
            let level = incident
                .severity
                .as_deref()
                .map_or(StatusLevel::Degraded, StatusLevel::from_incident_severity);
            let replace = match &worst {
                None => true,
                Some((current, _)) => severity_rank(level) > severity_rank(*current),
            };
            if replace {
                worst = Some((level, incident));
            }
        }

        worst.map_or_else(ProviderStatus::operational, |(level, incident)| ProviderStatus {
            level,
            description: Some(incident.title.clone()),
            updated_at: incident.updated_at,
        })
    }
}

const fn severity_rank(level: StatusLevel) -> u8 {
    match level {
        StatusLevel::Operational => 0,
        StatusLevel::Unknown => 1,
        StatusLevel::Degraded => 2,
        StatusLevel::PartialOutage => 3,
        StatusLevel::MajorOutage => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuspage_indicator_mapping() {
        assert_eq!(
            StatusLevel::from_statuspage_indicator("none"),
            StatusLevel::Operational
        );
        assert_eq!(
            StatusLevel::from_statuspage_indicator("minor"),
            StatusLevel::Degraded
        );
        assert_eq!(
            StatusLevel::from_statuspage_indicator("major"),
            StatusLevel::PartialOutage
        );
        assert_eq!(
            StatusLevel::from_statuspage_indicator("CRITICAL"),
            StatusLevel::MajorOutage
        );
        assert_eq!(
            StatusLevel::from_statuspage_indicator("maintenance"),
            StatusLevel::Unknown
        );
    }

    #[test]
    fn incident_severity_mapping() {
        assert_eq!(
            StatusLevel::from_incident_severity("low"),
            StatusLevel::Degraded
        );
        assert_eq!(
            StatusLevel::from_incident_severity("medium"),
            StatusLevel::Degraded
        );
        assert_eq!(
            StatusLevel::from_incident_severity("high"),
            StatusLevel::PartialOutage
        );
        assert_eq!(
            StatusLevel::from_incident_severity("severe"),
            StatusLevel::MajorOutage
        );
        assert_eq!(
            StatusLevel::from_incident_severity("weird"),
            StatusLevel::Degraded
        );
    }

    #[test]
    fn incident_active_and_keyword_filters() {
        let probe = IncidentFeedProbe::new("https://example.com", vec!["api".to_string()]);

        let active_match = Incident {
            title: "API latency".to_string(),
            severity: Some("high".to_string()),
            end_time: None,
            updated_at: None,
        };
        assert!(active_match.is_active());
        assert!(probe.matches(&active_match));

        let resolved = Incident {
            title: "API outage".to_string(),
            severity: Some("critical".to_string()),
            end_time: Some("2026-07-01T00:00:00Z".to_string()),
            updated_at: None,
        };
        assert!(!resolved.is_active());

        let unrelated = Incident {
            title: "Dashboard styling glitch".to_string(),
            severity: Some("low".to_string()),
            end_time: None,
            updated_at: None,
        };
        assert!(!probe.matches(&unrelated));
    }

    #[test]
    fn status_level_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&StatusLevel::PartialOutage).unwrap(),
            "\"partial-outage\""
        );
        assert_eq!(
            serde_json::to_string(&StatusLevel::MajorOutage).unwrap(),
            "\"major-outage\""
        );
    }
}
