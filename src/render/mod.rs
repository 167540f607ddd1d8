//! Output rendering.
//!
//! Two surfaces: a plain human formatter with light color accents, and a
//! stable JSON envelope for robot mode. Anything richer (tables, spinners)
//! is out of scope by design.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::core::router::Recommendation;
use crate::core::status::{ProviderStatus, StatusLevel};
use crate::core::strategy::FetchOutcome;

// =============================================================================
// Robot envelope
// =============================================================================

/// Top-level JSON envelope for `--json` output.
#[derive(Debug, Serialize)]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: &'static str,
    pub data: T,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl<T: Serialize> RobotOutput<T> {
    #[must_use]
    pub fn new(command: &'static str, data: T, errors: Vec<String>) -> Self {
        Self {
            schema_version: "vibeusage.v1",
            generated_at: Utc::now(),
            command,
            data,
            errors,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self, pretty: bool) -> crate::error::Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }
}

// =============================================================================
// Human rendering
// =============================================================================

fn utilization_colored(utilization: u8, no_color: bool) -> String {
    let text = format!("{utilization:>3}%");
    if no_color {
        return text;
    }
    match utilization {
        0..=59 => text.green().to_string(),
        60..=84 => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}

/// One line per provider outcome.
#[must_use]
pub fn usage_lines(outcomes: &[&FetchOutcome], no_color: bool) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        let mut line = format!("{:<12}", outcome.provider_id);
        if let Some(snapshot) = &outcome.snapshot {
            line.push_str(&format!("{:<10}", outcome.source));
            for period in &snapshot.periods {
                line.push_str(&format!(
                    " {} {}",
                    period.name,
                    utilization_colored(period.utilization, no_color)
                ));
            }
            if let Some(plan) = snapshot.plan() {
                line.push_str(&format!("  ({plan})"));
            }
            if outcome.cached {
                let tag = if no_color {
                    " [cached]".to_string()
                } else {
                    " [cached]".dimmed().to_string()
                };
                line.push_str(&tag);
            }
        } else {
            let error = outcome.error.as_deref().unwrap_or("unavailable");
            let rendered = if no_color {
                error.to_string()
            } else {
                error.red().to_string()
            };
            line.push_str(&format!("{:<10} {rendered}", "-"));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Recommendation as readable lines, best candidate first.
#[must_use]
pub fn recommendation_lines(rec: &Recommendation, no_color: bool) -> String {
    let mut out = format!("{} ({})\n", rec.model_name, rec.model_id);

    for (i, candidate) in rec.candidates.iter().enumerate() {
        let marker = if i == 0 { "→" } else { " " };
        let mut line = format!(
            "{marker} {:<12} headroom {:>3}",
            candidate.provider_id, candidate.headroom
        );
        if let Some(model) = &candidate.model_id {
            line.push_str(&format!("  model {model}"));
        }
        if let Some(multiplier) = candidate.multiplier {
            line.push_str(&format!("  x{multiplier}"));
        }
        if let Some(resets_at) = candidate.resets_at {
            line.push_str(&format!("  resets {}", resets_at.format("%Y-%m-%d %H:%M")));
        }
        if candidate.cached {
            line.push_str(" [cached]");
        }
        out.push_str(&line);
        out.push('\n');
    }

    if !rec.unavailable.is_empty() {
        let line = format!("unavailable: {}", rec.unavailable.join(", "));
        out.push_str(&if no_color { line } else { line.dimmed().to_string() });
        out.push('\n');
    }
    out
}

/// One line per provider status.
#[must_use]
pub fn status_line(provider_id: &str, status: &ProviderStatus, no_color: bool) -> String {
    let label = status.level.label();
    let rendered = if no_color {
        label.to_string()
    } else {
        match status.level {
            StatusLevel::Operational => label.green().to_string(),
            StatusLevel::Degraded => label.yellow().to_string(),
            StatusLevel::PartialOutage | StatusLevel::MajorOutage => label.red().to_string(),
            StatusLevel::Unknown => label.dimmed().to_string(),
        }
    };
    let mut line = format!("{provider_id:<12}{rendered}");
    if let Some(description) = &status.description {
        line.push_str(&format!("  {description}"));
    }
    line
}
