//! Typed row schema for upstream query results.
//!
//! The query layer hands back loosely-typed JSON. Rows are decoded here,
//! once, into a tagged [`Row`] enum; everything downstream works with
//! [`ControlRow`] and [`AttestationRow`] only.
//!
//! Status and severity strings are kept as delivered and classified through
//! `normalize`, which is case-insensitive and falls back to a safe default
//! (`Pending` / `Info`) so upstream data variance never breaks a document.

use crate::error::{PackError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

/// Lifecycle status of a mitigation control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl ControlStatus {
    /// Strict parse used for request filters.
    pub fn parse_filter(raw: &str) -> Option<Self> {
        match normalize_key(raw).as_str() {
            "pending" | "open" | "todo" => Some(Self::Pending),
            "in_progress" | "active" => Some(Self::InProgress),
            "completed" | "complete" | "done" | "closed" | "resolved" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Lenient classification of upstream values.
    pub fn normalize(raw: &str) -> Self {
        Self::parse_filter(raw).unwrap_or(Self::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }
}

/// Hazard severity / risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn parse_filter(raw: &str) -> Option<Self> {
        match normalize_key(raw).as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "info" | "informational" => Some(Self::Info),
            _ => None,
        }
    }

    pub fn normalize(raw: &str) -> Self {
        Self::parse_filter(raw).unwrap_or(Self::Info)
    }

    pub fn is_high(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }
}

/// Sign-off state of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    Pending,
    Signed,
    Rejected,
}

impl AttestationStatus {
    pub fn parse_filter(raw: &str) -> Option<Self> {
        match normalize_key(raw).as_str() {
            "pending" | "requested" | "awaiting_signature" => Some(Self::Pending),
            "signed" | "completed" | "complete" | "attested" | "approved" => Some(Self::Signed),
            "rejected" | "declined" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn normalize(raw: &str) -> Self {
        Self::parse_filter(raw).unwrap_or(Self::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::Rejected => "rejected",
        }
    }
}

/// A mitigation control attached to a job's hazard checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
}

impl ControlRow {
    pub fn status(&self) -> ControlStatus {
        ControlStatus::normalize(&self.status)
    }

    pub fn severity(&self) -> Severity {
        Severity::normalize(&self.severity)
    }

    /// Overdue if flagged upstream, or open past its due date as of `as_of`.
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        match self.status() {
            ControlStatus::Overdue => true,
            ControlStatus::Completed => false,
            ControlStatus::Pending | ControlStatus::InProgress => {
                self.due_date.is_some_and(|due| due < as_of)
            }
        }
    }
}

/// A recorded sign-off tied to a job or report run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub signer_role: Option<String>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
}

impl AttestationRow {
    pub fn status(&self) -> AttestationStatus {
        AttestationStatus::normalize(&self.status)
    }

    /// Timestamp used for most-recent-first ordering.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.signed_at.unwrap_or(self.created_at)
    }
}

/// One upstream row, discriminated by its `kind` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    Control(ControlRow),
    Attestation(AttestationRow),
}

impl Row {
    fn id(&self) -> &str {
        match self {
            Self::Control(c) => &c.id,
            Self::Attestation(a) => &a.id,
        }
    }
}

/// Decoded rows for one pack, partitioned by document type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub controls: Vec<ControlRow>,
    pub attestations: Vec<AttestationRow>,
}

impl RowSet {
    /// Decode and validate raw query results.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Query`] naming the offending row index when a row
    /// has an unknown `kind`, a missing field, an unparseable date, or an
    /// empty id.
    pub fn decode(values: Vec<Value>) -> Result<Self> {
        let mut set = Self::default();

        for (index, value) in values.into_iter().enumerate() {
            let row: Row = serde_json::from_value(value)
                .map_err(|e| PackError::Query(format!("row {index} has unexpected shape: {e}")))?;

            if row.id().trim().is_empty() {
                return Err(PackError::Query(format!("row {index} has an empty id")));
            }

            match row {
                Row::Control(c) => set.controls.push(c),
                Row::Attestation(a) => set.attestations.push(a),
            }
        }

        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty() && self.attestations.is_empty()
    }
}
