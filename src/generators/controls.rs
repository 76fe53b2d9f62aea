//! Controls CSV export.

use super::table::write_csv;
use super::{
    effective_status, select_controls, ArtifactFormat, ArtifactKind, ControlTally,
    DocumentGenerator, GeneratedDocument, GenerationContext,
};
use crate::error::Result;
use crate::rows::RowSet;
use chrono::SecondsFormat;

pub const HEADER: [&str; 7] = [
    "Control ID",
    "Title",
    "Status",
    "Severity",
    "Owner",
    "Due Date",
    "Last Updated",
];

/// One row per mitigation control, overdue and high-risk work first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlsCsv;

impl DocumentGenerator for ControlsCsv {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Controls
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Csv
    }

    fn generate(&self, rows: &RowSet, ctx: &GenerationContext) -> Result<GeneratedDocument> {
        let selected = select_controls(&rows.controls, &ctx.filters, ctx.as_of);
        let s = &ctx.sanitizer;

        let mut records = Vec::with_capacity(selected.len());
        for row in &selected {
            records.push(vec![
                s.sanitize("control.id", &row.id)?,
                s.sanitize("control.title", &row.title)?,
                effective_status(row, ctx.as_of).label().to_owned(),
                row.severity().label().to_owned(),
                s.sanitize_opt("control.owner", row.owner.as_deref())?,
                row.due_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                row.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ]);
        }

        let tally = ControlTally::of(&selected, ctx.as_of);
        tracing::debug!(
            rows = tally.total,
            overdue = tally.overdue,
            "rendered controls export"
        );

        Ok(GeneratedDocument {
            kind: self.kind(),
            format: self.format(),
            bytes: write_csv(&HEADER, records, s)?,
            record_count: tally.total,
            metrics: tally.metrics(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::sanitize::SanitizeMode;
    use crate::sanitize::Sanitizer;

    fn data_lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .skip(1)
            .filter(|l| !l.starts_with('#'))
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_sample_rows_render_in_priority_order() {
        let doc = ControlsCsv.generate(&sample_rows(), &context()).unwrap();
        assert_eq!(doc.record_count, 3);
        assert_eq!(doc.metric("completed"), 2);
        assert_eq!(doc.metric("overdue"), 1);
        assert_eq!(doc.metric("high_severity"), 1);

        let lines = data_lines(&doc.bytes);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("c-3,Control c-3,overdue,medium"));
        assert!(lines[1].starts_with("c-2,Control c-2,completed,high"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let a = ControlsCsv.generate(&sample_rows(), &context()).unwrap();
        let b = ControlsCsv.generate(&sample_rows(), &context()).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_empty_selection_keeps_header_and_marker() {
        let doc = ControlsCsv.generate(&RowSet::default(), &context()).unwrap();
        let text = String::from_utf8(doc.bytes).unwrap();
        assert_eq!(doc.record_count, 0);
        assert!(text.starts_with("Control ID,Title,Status,Severity,Owner,Due Date,Last Updated\n"));
        assert!(text.contains("No records for this filter"));
    }

    #[test]
    fn test_strict_sanitizer_cleans_titles() {
        let mut rows = sample_rows();
        rows.controls[0].title = "=HYPERLINK(\"x\")\u{200B}".to_owned();
        let mut ctx = context();
        ctx.sanitizer = Sanitizer::new(SanitizeMode::Strict);

        let doc = ControlsCsv.generate(&rows, &ctx).unwrap();
        let text = String::from_utf8(doc.bytes).unwrap();
        assert!(text.contains("'=HYPERLINK"));
        assert!(!text.contains('\u{200B}'));
    }
}
