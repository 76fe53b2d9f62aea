//! Export requests: wire body, caller identity, and validation.
//!
//! Validation happens once, at the boundary. A [`PackRequest`] that exists is
//! well-formed: its time range is resolved to concrete instants and its
//! filters are parsed into typed values, so generators never see raw input.

use crate::error::{PackError, Result};
use crate::rows::{ControlStatus, Severity};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted free-text filter value.
const MAX_FILTER_LEN: usize = 200;

/// Longest accepted identifier (organization, pack, run).
pub const MAX_IDENTIFIER_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRangePreset {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "custom")]
    Custom,
}

impl TimeRangePreset {
    fn days(self) -> Option<i64> {
        match self {
            Self::Last7Days => Some(7),
            Self::Last30Days => Some(30),
            Self::Last90Days => Some(90),
            Self::Custom => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
            Self::Custom => "custom",
        }
    }
}

impl std::str::FromStr for TimeRangePreset {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "7d" => Ok(Self::Last7Days),
            "30d" => Ok(Self::Last30Days),
            "90d" => Ok(Self::Last90Days),
            "custom" => Ok(Self::Custom),
            other => Err(PackError::Validation(format!(
                "time_range must be one of 7d, 30d, 90d, custom (got '{other}')"
            ))),
        }
    }
}

/// Raw filter values as they arrive on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub status: Option<String>,
    pub risk_level: Option<String>,
    pub assigned_to: Option<String>,
    pub job_type: Option<String>,
    pub overdue_only: Option<bool>,
    pub high_severity_only: Option<bool>,
    pub pending_only: Option<bool>,
}

/// Body of `POST /api/audit/export/pack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPackBody {
    pub time_range: TimeRangePreset,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub filters: Option<FilterParams>,
}

/// Validated filters, echoed into the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ControlStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overdue_only: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub high_severity_only: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending_only: bool,
}

impl PackFilters {
    /// Parse wire filters strictly.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Validation`] for an unknown status or risk level,
    /// or an oversized free-text value.
    pub fn parse(params: FilterParams) -> Result<Self> {
        let status = params
            .status
            .as_deref()
            .map(|raw| {
                ControlStatus::parse_filter(raw)
                    .ok_or_else(|| PackError::Validation(format!("unknown status filter '{raw}'")))
            })
            .transpose()?;

        let risk_level = params
            .risk_level
            .as_deref()
            .map(|raw| {
                Severity::parse_filter(raw)
                    .ok_or_else(|| PackError::Validation(format!("unknown risk_level filter '{raw}'")))
            })
            .transpose()?;

        Ok(Self {
            status,
            risk_level,
            assigned_to: clean_text("assigned_to", params.assigned_to)?,
            job_type: clean_text("job_type", params.job_type)?,
            overdue_only: params.overdue_only.unwrap_or(false),
            high_severity_only: params.high_severity_only.unwrap_or(false),
            pending_only: params.pending_only.unwrap_or(false),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// One-line human description for report headers.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status={}", status.label()));
        }
        if let Some(level) = self.risk_level {
            parts.push(format!("risk_level={}", level.label()));
        }
        if let Some(who) = &self.assigned_to {
            parts.push(format!("assigned_to={who}"));
        }
        if let Some(job_type) = &self.job_type {
            parts.push(format!("job_type={job_type}"));
        }
        if self.overdue_only {
            parts.push("overdue_only".to_owned());
        }
        if self.high_severity_only {
            parts.push("high_severity_only".to_owned());
        }
        if self.pending_only {
            parts.push("pending_only".to_owned());
        }

        if parts.is_empty() {
            "none".to_owned()
        } else {
            parts.join(", ")
        }
    }
}

fn clean_text(field: &str, value: Option<String>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_FILTER_LEN {
        return Err(PackError::Validation(format!(
            "{field} filter exceeds {MAX_FILTER_LEN} characters"
        )));
    }
    Ok(Some(trimmed.to_owned()))
}

/// Caller role as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    SafetyLead,
    Executive,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::SafetyLead => "safety_lead",
            Self::Executive => "executive",
            Self::Member => "member",
        }
    }

    pub fn can_export(self) -> bool {
        !matches!(self, Self::Member)
    }
}

impl std::str::FromStr for Role {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "safety_lead" => Ok(Self::SafetyLead),
            "executive" => Ok(Self::Executive),
            "member" => Ok(Self::Member),
            other => Err(PackError::Forbidden(format!("unrecognized role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub name: String,
    pub role: Role,
}

impl Requester {
    /// # Errors
    ///
    /// Returns [`PackError::Forbidden`] unless the role may export packs.
    pub fn ensure_can_export(&self) -> Result<()> {
        if self.role.can_export() {
            Ok(())
        } else {
            Err(PackError::Forbidden(format!(
                "role '{}' may not export audit packs",
                self.role
            )))
        }
    }
}

/// Resolved reporting window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub preset: TimeRangePreset,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Resolve a preset or custom range against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Validation`] when a custom range is missing a
    /// bound, a date does not parse, or the start is after the end.
    pub fn resolve(
        preset: TimeRangePreset,
        start_date: Option<&str>,
        end_date: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if let Some(days) = preset.days() {
            return Ok(Self {
                preset,
                start: now - Duration::days(days),
                end: now,
            });
        }

        let (Some(start), Some(end)) = (start_date, end_date) else {
            return Err(PackError::Validation(
                "custom time_range requires both start_date and end_date".to_owned(),
            ));
        };

        let start = parse_bound("start_date", start, NaiveTime::MIN)?;
        let end = parse_bound(
            "end_date",
            end,
            NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        )?;

        if start > end {
            return Err(PackError::Validation(format!(
                "start_date {} is after end_date {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            )));
        }

        Ok(Self { preset, start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Label for report headers. Presets omit the concrete dates so reports
    /// built on the same day from the same data render identically.
    pub fn label(&self) -> String {
        match self.preset.days() {
            Some(days) => format!("Last {days} days"),
            None => format!(
                "{} to {}",
                self.start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            ),
        }
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates; bare dates take
/// `time_of_day`.
fn parse_bound(field: &str, raw: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(time_of_day).and_utc())
        .map_err(|e| PackError::Validation(format!("{field} '{raw}' is not a valid date: {e}")))
}

/// Reject identifiers that could escape a storage path or header.
///
/// # Errors
///
/// Returns [`PackError::InvalidFormat`] unless `value` is 1 to
/// [`MAX_IDENTIFIER_LEN`] characters of ASCII letters, digits, `-` or `_`.
pub fn validate_identifier(what: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(PackError::InvalidFormat(format!("malformed {what}: '{value}'")))
    }
}

/// A validated export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackRequest {
    pub organization_id: String,
    pub requested_by: Requester,
    pub time_range: TimeRange,
    pub filters: PackFilters,
}

impl PackRequest {
    /// Validate an export body for `requester` in `organization_id`.
    ///
    /// # Errors
    ///
    /// - [`PackError::InvalidFormat`] for a malformed organization id
    /// - [`PackError::Forbidden`] if the role may not export
    /// - [`PackError::Validation`] for bad time ranges or filters
    pub fn validate(
        organization_id: &str,
        requester: Requester,
        body: ExportPackBody,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_identifier("organization id", organization_id)?;
        requester.ensure_can_export()?;

        let time_range = TimeRange::resolve(
            body.time_range,
            body.start_date.as_deref(),
            body.end_date.as_deref(),
            now,
        )?;
        let filters = PackFilters::parse(body.filters.unwrap_or_default())?;

        Ok(Self {
            organization_id: organization_id.to_owned(),
            requested_by: requester,
            time_range,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn admin() -> Requester {
        Requester {
            user_id: "u-1".to_owned(),
            name: "Avery Admin".to_owned(),
            role: Role::Admin,
        }
    }

    fn body(time_range: TimeRangePreset) -> ExportPackBody {
        ExportPackBody {
            time_range,
            start_date: None,
            end_date: None,
            filters: None,
        }
    }

    #[test]
    fn test_preset_resolves_against_now() {
        let req = PackRequest::validate("org-1", admin(), body(TimeRangePreset::Last30Days), now())
            .unwrap();
        assert_eq!(req.time_range.end, now());
        assert_eq!(req.time_range.start, now() - Duration::days(30));
        assert_eq!(req.time_range.label(), "Last 30 days");
        assert!(req.filters.is_empty());
    }

    #[test]
    fn test_custom_requires_both_dates() {
        let mut b = body(TimeRangePreset::Custom);
        b.start_date = Some("2026-01-01".to_owned());
        let err = PackRequest::validate("org-1", admin(), b, now()).unwrap_err();
        assert!(matches!(err, PackError::Validation(_)));
    }

    #[test]
    fn test_custom_rejects_inverted_range() {
        let mut b = body(TimeRangePreset::Custom);
        b.start_date = Some("2026-02-01".to_owned());
        b.end_date = Some("2026-01-01".to_owned());
        let err = PackRequest::validate("org-1", admin(), b, now()).unwrap_err();
        assert!(err.to_string().contains("after end_date"));
    }

    #[test]
    fn test_custom_dates_accept_both_formats() {
        let range = TimeRange::resolve(
            TimeRangePreset::Custom,
            Some("2026-01-01"),
            Some("2026-01-31T18:00:00+02:00"),
            now(),
        )
        .unwrap();
        assert_eq!(range.start.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2026-01-31T16:00:00+00:00");
        assert_eq!(range.label(), "2026-01-01 to 2026-01-31");
    }

    #[test]
    fn test_unknown_filter_values_rejected() {
        let mut b = body(TimeRangePreset::Last7Days);
        b.filters = Some(FilterParams {
            status: Some("sideways".to_owned()),
            ..FilterParams::default()
        });
        let err = PackRequest::validate("org-1", admin(), b, now()).unwrap_err();
        assert!(matches!(err, PackError::Validation(ref m) if m.contains("sideways")));
    }

    #[test]
    fn test_filters_parse_case_insensitively() {
        let filters = PackFilters::parse(FilterParams {
            status: Some("COMPLETED".to_owned()),
            risk_level: Some("High".to_owned()),
            job_type: Some("  ".to_owned()),
            overdue_only: Some(true),
            ..FilterParams::default()
        })
        .unwrap();
        assert_eq!(filters.status, Some(ControlStatus::Completed));
        assert_eq!(filters.risk_level, Some(Severity::High));
        assert_eq!(filters.job_type, None);
        assert_eq!(filters.describe(), "status=completed, risk_level=high, overdue_only");
    }

    #[test]
    fn test_member_cannot_export() {
        let mut requester = admin();
        requester.role = Role::Member;
        let err = PackRequest::validate("org-1", requester, body(TimeRangePreset::Last7Days), now())
            .unwrap_err();
        assert!(matches!(err, PackError::Forbidden(_)));
        assert!("janitor".parse::<Role>().is_err());
        assert_eq!("Safety-Lead".parse::<Role>().unwrap(), Role::SafetyLead);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("pack id", "pack-20260310-abc").is_ok());
        assert!(validate_identifier("pack id", "../etc").is_err());
        assert!(validate_identifier("pack id", "").is_err());
        assert!(validate_identifier("pack id", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_filters_serialize_compactly() {
        let json = serde_json::to_string(&PackFilters::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
