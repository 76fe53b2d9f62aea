//! Attestations CSV export.

use super::table::write_csv;
use super::{
    select_attestations, ArtifactFormat, ArtifactKind, AttestationTally, DocumentGenerator,
    GeneratedDocument, GenerationContext,
};
use crate::error::Result;
use crate::rows::RowSet;
use chrono::SecondsFormat;

pub const HEADER: [&str; 7] = [
    "Attestation ID",
    "Title",
    "Status",
    "Signer",
    "Signer Role",
    "Signed At",
    "Job ID",
];

/// One row per sign-off; outstanding signatures lead.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttestationsCsv;

impl DocumentGenerator for AttestationsCsv {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Attestations
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Csv
    }

    fn generate(&self, rows: &RowSet, ctx: &GenerationContext) -> Result<GeneratedDocument> {
        let selected = select_attestations(&rows.attestations, &ctx.filters);
        let s = &ctx.sanitizer;

        let mut records = Vec::with_capacity(selected.len());
        for row in &selected {
            records.push(vec![
                s.sanitize("attestation.id", &row.id)?,
                s.sanitize("attestation.title", &row.title)?,
                row.status().label().to_owned(),
                s.sanitize_opt("attestation.signer", row.signer.as_deref())?,
                s.sanitize_opt("attestation.signer_role", row.signer_role.as_deref())?,
                row.signed_at
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
                s.sanitize_opt("attestation.job_id", row.job_id.as_deref())?,
            ]);
        }

        let tally = AttestationTally::of(&selected);

        Ok(GeneratedDocument {
            kind: self.kind(),
            format: self.format(),
            bytes: write_csv(&HEADER, records, s)?,
            record_count: tally.total,
            metrics: tally.metrics(),
        })
    }
}
