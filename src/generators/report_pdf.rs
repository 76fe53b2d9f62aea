//! Compliance report PDF.
//!
//! A plain, paginated text report: header metadata, a KPI block, then the
//! controls and attestations tables in the same order as the CSV exports.
//! Rendering uses the built-in Courier face so no font program is embedded
//! and the output depends only on the rows and the theme.

use super::{
    effective_status, select_attestations, select_controls, ArtifactFormat, ArtifactKind,
    AttestationTally, ControlTally, DocumentGenerator, GeneratedDocument, GenerationContext,
    EMPTY_MARKER,
};
use crate::config::PdfTheme;
use crate::error::{PackError, Result};
use crate::rows::RowSet;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;

/// Courier advance width as a fraction of the font size.
const COURIER_ADVANCE: f32 = 0.6;

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceReportPdf;

impl DocumentGenerator for ComplianceReportPdf {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::ComplianceReport
    }

    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Pdf
    }

    fn generate(&self, rows: &RowSet, ctx: &GenerationContext) -> Result<GeneratedDocument> {
        let controls = select_controls(&rows.controls, &ctx.filters, ctx.as_of);
        let attestations = select_attestations(&rows.attestations, &ctx.filters);
        let control_tally = ControlTally::of(&controls, ctx.as_of);
        let attestation_tally = AttestationTally::of(&attestations);
        let s = &ctx.sanitizer;

        let mut lines = vec![
            format!("Organization: {}", s.sanitize("organization", &ctx.organization_name)?),
            format!("Time range:   {}", s.sanitize("time_range", &ctx.time_range_label)?),
            format!("Filters:      {}", s.sanitize("filters", &ctx.filters.describe())?),
            format!("As of:        {}", ctx.as_of.format("%Y-%m-%d")),
            String::new(),
            "SUMMARY".to_owned(),
            format!(
                "  Controls: {}   Completed: {}   Overdue: {}   High severity: {}",
                control_tally.total,
                control_tally.completed,
                control_tally.overdue,
                control_tally.high_severity
            ),
            format!(
                "  Attestations: {}   Signed: {}   Pending: {}",
                attestation_tally.total, attestation_tally.signed, attestation_tally.pending
            ),
            String::new(),
            "CONTROLS".to_owned(),
        ];

        if controls.is_empty() {
            lines.push(format!("  {EMPTY_MARKER}"));
        } else {
            lines.push(table_row(&[
                ("ID", 12),
                ("Title", 30),
                ("Status", 12),
                ("Severity", 9),
                ("Due", 10),
            ]));
            for row in &controls {
                let id = s.sanitize("control.id", &row.id)?;
                let title = s.sanitize("control.title", &row.title)?;
                let due = row
                    .due_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_owned());
                lines.push(table_row(&[
                    (id.as_str(), 12),
                    (title.as_str(), 30),
                    (effective_status(row, ctx.as_of).label(), 12),
                    (row.severity().label(), 9),
                    (due.as_str(), 10),
                ]));
            }
        }

        lines.push(String::new());
        lines.push("ATTESTATIONS".to_owned());

        if attestations.is_empty() {
            lines.push(format!("  {EMPTY_MARKER}"));
        } else {
            lines.push(table_row(&[("ID", 12), ("Title", 30), ("Status", 9), ("Signer", 20)]));
            for row in &attestations {
                let id = s.sanitize("attestation.id", &row.id)?;
                let title = s.sanitize("attestation.title", &row.title)?;
                let signer = s.sanitize_opt("attestation.signer", row.signer.as_deref())?;
                lines.push(table_row(&[
                    (id.as_str(), 12),
                    (title.as_str(), 30),
                    (row.status().label(), 9),
                    (signer.as_str(), 20),
                ]));
            }
        }

        let lines = lines
            .into_iter()
            .map(|line| s.check("report.line", line))
            .collect::<Result<Vec<_>>>()?;
        let bytes = render(&ctx.theme, &lines)?;

        let mut metrics = BTreeMap::new();
        metrics.insert("controls".to_owned(), control_tally.total);
        metrics.insert("attestations".to_owned(), attestation_tally.total);

        Ok(GeneratedDocument {
            kind: self.kind(),
            format: self.format(),
            bytes,
            record_count: control_tally.total + attestation_tally.total,
            metrics,
        })
    }
}

/// Lay out fixed-width columns.
fn table_row(cells: &[(&str, usize)]) -> String {
    let mut line = String::from(" ");
    for (text, width) in cells {
        line.push(' ');
        line.push_str(&fit(text, *width));
        line.push(' ');
    }
    line.trim_end().to_owned()
}

fn fit(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count > width {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    } else {
        format!("{text:<width$}")
    }
}

/// Map text onto WinAnsi single bytes; anything outside Latin-1 becomes `?`.
fn encode_line(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            cp @ (0x20..=0x7E | 0xA0..=0xFF) => u8::try_from(cp).unwrap_or(b'?'),
            _ => b'?',
        })
        .collect()
}

fn max_chars(theme: &PdfTheme) -> usize {
    let usable = theme.page_width - 2.0 * theme.margin;
    let per_char = theme.font_size * COURIER_ADVANCE;
    if per_char <= 0.0 || usable <= 0.0 {
        return 1;
    }
    // Truncates toward zero.
    let chars = (usable / per_char) as usize;
    chars.max(1)
}

fn lines_per_page(theme: &PdfTheme) -> usize {
    // Title and footer take two lines of every page.
    let usable = theme.page_height - 2.0 * theme.margin - 2.0 * theme.line_height;
    if theme.line_height <= 0.0 || usable <= 0.0 {
        return 1;
    }
    let lines = (usable / theme.line_height) as usize;
    lines.max(1)
}

/// Render pre-formatted lines into a paginated PDF.
///
/// # Errors
///
/// Returns [`PackError::Pdf`] if content encoding or serialization fails.
pub fn render(theme: &PdfTheme, lines: &[String]) -> Result<Vec<u8>> {
    let width = max_chars(theme);
    let clipped: Vec<String> = lines.iter().map(|l| fit(l, width).trim_end().to_owned()).collect();
    let pages: Vec<&[String]> = if clipped.is_empty() {
        vec![&[]]
    } else {
        clipped.chunks(lines_per_page(theme)).collect()
    };
    let page_count = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    for (index, body) in pages.into_iter().enumerate() {
        let footer = format!("Page {} of {page_count}", index + 1);
        let page_id = add_page(&mut doc, pages_id, theme, body, &footer)?;
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => i64::try_from(page_count).unwrap_or(i64::MAX),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            theme.page_width.into(),
            theme.page_height.into(),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PackError::Pdf(format!("failed to serialize report: {e}")))?;
    Ok(out)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    theme: &PdfTheme,
    body: &[String],
    footer: &str,
) -> Result<ObjectId> {
    let top = theme.page_height - theme.margin;

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), theme.title_font_size.into()]),
        Operation::new("Td", vec![theme.margin.into(), top.into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_line(&theme.title))]),
        Operation::new("Tf", vec!["F1".into(), theme.font_size.into()]),
        Operation::new("TL", vec![theme.line_height.into()]),
        Operation::new("T*", vec![]),
        Operation::new("T*", vec![]),
    ];
    for line in body {
        operations.push(Operation::new("Tj", vec![Object::string_literal(encode_line(line))]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    operations.extend([
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), theme.font_size.into()]),
        Operation::new("Td", vec![theme.margin.into(), (theme.margin / 2.0).into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_line(footer))]),
        Operation::new("ET", vec![]),
    ]);

    let content = Content { operations };
    let encoded = content
        .encode()
        .map_err(|e| PackError::Pdf(format!("failed to encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::pack::{FilterParams, PackFilters};

    #[test]
    fn test_report_counts_both_sections() {
        let doc = ComplianceReportPdf
            .generate(&sample_rows(), &context())
            .unwrap();
        assert_eq!(doc.record_count, 5);
        assert!(doc.bytes.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn test_report_is_deterministic() {
        let a = ComplianceReportPdf.generate(&sample_rows(), &context()).unwrap();
        let b = ComplianceReportPdf.generate(&sample_rows(), &context()).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_empty_report_mentions_marker() {
        let doc = ComplianceReportPdf
            .generate(&RowSet::default(), &context())
            .unwrap();
        assert_eq!(doc.record_count, 0);

        // Content streams are stored uncompressed.
        let marker = EMPTY_MARKER.as_bytes();
        let hits = doc
            .bytes
            .windows(marker.len())
            .filter(|w| *w == marker)
            .count();
        assert_eq!(hits, 2, "one marker per empty section");
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_filter_text_is_sanitized_before_rendering() {
        let mut ctx = context();
        ctx.filters = PackFilters::parse(FilterParams {
            assigned_to: Some("Dana\u{AD}Ortiz".to_owned()),
            job_type: Some("roof\u{200B}ing".to_owned()),
            ..FilterParams::default()
        })
        .unwrap();

        let doc = ComplianceReportPdf.generate(&RowSet::default(), &ctx).unwrap();
        assert!(!contains(&doc.bytes, b"Dana\xADOrtiz"), "soft hyphen reached the PDF");
        assert!(contains(&doc.bytes, b"assigned_to=DanaOrtiz, job_type=roofing"));
    }

    #[test]
    fn test_long_reports_paginate() {
        let lines: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        let bytes = render(&PdfTheme::default(), &lines).unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        assert!(parsed.get_pages().len() > 1);
    }

    #[test]
    fn test_fit_and_encoding() {
        assert_eq!(fit("abcdef", 4), "abc~");
        assert_eq!(fit("ab", 4), "ab  ");
        assert_eq!(encode_line("Gerüst ✓"), b"Ger\xFCst ?".to_vec());
    }
}
