//! Document generators for proof packs.
//!
//! Each generator turns a decoded [`RowSet`] into the finished bytes of one
//! artifact. Generators are pure: the clock, the organization name, the
//! sanitization policy and the PDF theme all arrive through
//! [`GenerationContext`], so identical inputs always produce identical bytes.
//!
//! Filtering, de-duplication and ordering are shared here so the CSV exports
//! and the PDF report agree row for row.

pub mod attestations;
pub mod controls;
pub mod evidence_index;
pub mod report_pdf;
mod table;

pub use attestations::AttestationsCsv;
pub use controls::ControlsCsv;
pub use evidence_index::{EvidenceIndex, IndexEntry};
pub use report_pdf::ComplianceReportPdf;

use crate::config::PdfTheme;
use crate::error::Result;
use crate::pack::request::PackFilters;
use crate::rows::{AttestationRow, AttestationStatus, ControlRow, ControlStatus, RowSet};
use crate::sanitize::Sanitizer;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Line written to an otherwise empty export.
pub const EMPTY_MARKER: &str = "No records for this filter";

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Controls,
    Attestations,
    ComplianceReport,
    EvidenceIndex,
    /// File uploaded to a report run.
    Attachment,
}

impl ArtifactKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Controls => "controls",
            Self::Attestations => "attestations",
            Self::ComplianceReport => "compliance_report",
            Self::EvidenceIndex => "evidence_index",
            Self::Attachment => "attachment",
        }
    }
}

/// Serialized file format, the manifest's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Pdf,
    Csv,
    Json,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Everything a generator needs besides the rows.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub organization_name: String,
    pub filters: PackFilters,
    pub time_range_label: String,
    /// Reference date for overdue classification.
    pub as_of: NaiveDate,
    pub sanitizer: Sanitizer,
    pub theme: PdfTheme,
}

/// Output of one generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub kind: ArtifactKind,
    pub format: ArtifactFormat,
    pub bytes: Vec<u8>,
    /// Rows actually written, after filtering.
    pub record_count: u64,
    /// Named tallies feeding the manifest summary.
    pub metrics: BTreeMap<String, u64>,
}

impl GeneratedDocument {
    pub fn metric(&self, name: &str) -> u64 {
        self.metrics.get(name).copied().unwrap_or(0)
    }
}

/// A generator of one pack artifact.
pub trait DocumentGenerator: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    fn format(&self) -> ArtifactFormat;

    /// Render the artifact.
    ///
    /// # Errors
    ///
    /// Fails on sanitization or serialization errors; a failure aborts the
    /// whole pack.
    fn generate(&self, rows: &RowSet, ctx: &GenerationContext) -> Result<GeneratedDocument>;
}

/// The generators every pack runs, in manifest order.
pub fn standard_generators() -> Vec<Box<dyn DocumentGenerator>> {
    vec![
        Box::new(ComplianceReportPdf),
        Box::new(ControlsCsv),
        Box::new(AttestationsCsv),
    ]
}

/// Status after applying the due-date rule.
pub fn effective_status(row: &ControlRow, as_of: NaiveDate) -> ControlStatus {
    if row.is_overdue(as_of) {
        ControlStatus::Overdue
    } else {
        row.status()
    }
}

fn matches_text(filter: Option<&String>, value: Option<&String>) -> bool {
    match filter {
        None => true,
        Some(wanted) => value.is_some_and(|v| v.trim().eq_ignore_ascii_case(wanted.trim())),
    }
}

/// Filter, de-duplicate and order controls for export.
///
/// Duplicates by id keep the most recently updated row. Ordering is overdue
/// first, then critical/high severity, then everything else; ties break on
/// ascending due date (undated last) and then id.
pub fn select_controls(
    rows: &[ControlRow],
    filters: &PackFilters,
    as_of: NaiveDate,
) -> Vec<ControlRow> {
    let mut latest: HashMap<&str, &ControlRow> = HashMap::new();
    for row in rows {
        latest
            .entry(row.id.as_str())
            .and_modify(|kept| {
                if row.updated_at > kept.updated_at {
                    *kept = row;
                }
            })
            .or_insert(row);
    }

    let mut selected: Vec<ControlRow> = latest
        .into_values()
        .filter(|row| {
            let status = effective_status(row, as_of);
            filters.status.is_none_or(|s| s == status)
                && filters.risk_level.is_none_or(|s| s == row.severity())
                && matches_text(filters.assigned_to.as_ref(), row.owner.as_ref())
                && matches_text(filters.job_type.as_ref(), row.job_type.as_ref())
                && (!filters.overdue_only || status == ControlStatus::Overdue)
                && (!filters.high_severity_only || row.severity().is_high())
        })
        .cloned()
        .collect();

    selected.sort_by(|a, b| control_sort_key(a, as_of).cmp(&control_sort_key(b, as_of)));
    selected
}

fn control_sort_key(row: &ControlRow, as_of: NaiveDate) -> (u8, bool, Option<NaiveDate>, &str) {
    let rank = if row.is_overdue(as_of) {
        0
    } else if row.severity().is_high() {
        1
    } else {
        2
    };
    (rank, row.due_date.is_none(), row.due_date, row.id.as_str())
}

/// Filter, de-duplicate and order attestations for export.
///
/// Pending sign-offs come first, then most recent activity first, then id.
pub fn select_attestations(rows: &[AttestationRow], filters: &PackFilters) -> Vec<AttestationRow> {
    let mut latest: HashMap<&str, &AttestationRow> = HashMap::new();
    for row in rows {
        latest
            .entry(row.id.as_str())
            .and_modify(|kept| {
                if row.activity_at() > kept.activity_at() {
                    *kept = row;
                }
            })
            .or_insert(row);
    }

    let mut selected: Vec<AttestationRow> = latest
        .into_values()
        .filter(|row| {
            matches_text(filters.job_type.as_ref(), row.job_type.as_ref())
                && (!filters.pending_only || row.status() == AttestationStatus::Pending)
        })
        .cloned()
        .collect();

    selected.sort_by(|a, b| {
        let a_key = (a.status() != AttestationStatus::Pending, Reverse(a.activity_at()), &a.id);
        let b_key = (b.status() != AttestationStatus::Pending, Reverse(b.activity_at()), &b.id);
        a_key.cmp(&b_key)
    });
    selected
}

/// KPI tallies over selected controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlTally {
    pub total: u64,
    pub completed: u64,
    pub overdue: u64,
    pub high_severity: u64,
}

impl ControlTally {
    pub fn of(rows: &[ControlRow], as_of: NaiveDate) -> Self {
        rows.iter().fold(Self::default(), |mut t, row| {
            t.total += 1;
            match effective_status(row, as_of) {
                ControlStatus::Completed => t.completed += 1,
                ControlStatus::Overdue => t.overdue += 1,
                ControlStatus::Pending | ControlStatus::InProgress => {}
            }
            if row.severity().is_high() {
                t.high_severity += 1;
            }
            t
        })
    }

    pub fn metrics(self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("completed".to_owned(), self.completed),
            ("overdue".to_owned(), self.overdue),
            ("high_severity".to_owned(), self.high_severity),
        ])
    }
}

/// KPI tallies over selected attestations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttestationTally {
    pub total: u64,
    pub signed: u64,
    pub pending: u64,
}

impl AttestationTally {
    pub fn of(rows: &[AttestationRow]) -> Self {
        rows.iter().fold(Self::default(), |mut t, row| {
            t.total += 1;
            match row.status() {
                AttestationStatus::Signed => t.signed += 1,
                AttestationStatus::Pending => t.pending += 1,
                AttestationStatus::Rejected => {}
            }
            t
        })
    }

    pub fn metrics(self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("signed".to_owned(), self.signed),
            ("pending".to_owned(), self.pending),
        ])
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::rows::{AttestationRow, ControlRow};
    use chrono::{DateTime, Utc};

    pub fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    pub fn control(id: &str, status: &str, severity: &str, due: Option<&str>) -> ControlRow {
        ControlRow {
            id: id.to_owned(),
            title: format!("Control {id}"),
            status: status.to_owned(),
            severity: severity.to_owned(),
            owner: Some("Dana Ortiz".to_owned()),
            due_date: due.map(|d| d.parse().unwrap()),
            updated_at: ts("2026-03-01T08:00:00Z"),
            job_id: Some("job-1".to_owned()),
            job_type: Some("roofing".to_owned()),
        }
    }

    pub fn attestation(id: &str, status: &str, created: &str) -> AttestationRow {
        AttestationRow {
            id: id.to_owned(),
            title: format!("Attestation {id}"),
            status: status.to_owned(),
            signer: Some("Sam Lee".to_owned()),
            signer_role: Some("foreman".to_owned()),
            signed_at: None,
            created_at: ts(created),
            job_id: Some("job-1".to_owned()),
            job_type: Some("roofing".to_owned()),
        }
    }

    pub fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    pub fn context() -> GenerationContext {
        GenerationContext {
            organization_name: "Northwind Roofing".to_owned(),
            filters: PackFilters::default(),
            time_range_label: "Last 30 days".to_owned(),
            as_of: as_of(),
            sanitizer: Sanitizer::default(),
            theme: PdfTheme::default(),
        }
    }

    pub fn sample_rows() -> RowSet {
        RowSet {
            controls: vec![
                control("c-1", "completed", "low", Some("2026-03-20")),
                control("c-2", "COMPLETED", "high", Some("2026-02-01")),
                control("c-3", "pending", "medium", Some("2026-03-01")),
            ],
            attestations: vec![
                attestation("a-1", "signed", "2026-03-02T09:00:00Z"),
                attestation("a-2", "pending", "2026-03-01T09:00:00Z"),
            ],
        }
    }
}
