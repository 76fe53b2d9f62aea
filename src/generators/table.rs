//! Shared CSV writing for the tabular exports.

use super::EMPTY_MARKER;
use crate::error::{PackError, Result};
use crate::sanitize::Sanitizer;
use csv::{Terminator, WriterBuilder};

/// Prefix cells a spreadsheet would evaluate as a formula.
pub(super) fn guard_formula(cell: String) -> String {
    if cell.starts_with(['=', '+', '-', '@']) {
        format!("'{cell}")
    } else {
        cell
    }
}

/// Write `header` and `rows` as CSV with `\n` line endings.
///
/// Every cell is rechecked against `sanitizer` after the formula guard.
///
/// An empty `rows` still yields the header, followed by a comment-style
/// marker line so the file is never mistaken for a truncated export.
pub(super) fn write_csv(
    header: &[&str],
    rows: Vec<Vec<String>>,
    sanitizer: &Sanitizer,
) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(header)?;

    if rows.is_empty() {
        writer.write_record([format!("# {EMPTY_MARKER}")])?;
    }

    for row in rows {
        let cells = row
            .into_iter()
            .map(|cell| sanitizer.check("csv.cell", guard_formula(cell)))
            .collect::<Result<Vec<_>>>()?;
        writer.write_record(&cells)?;
    }

    writer
        .into_inner()
        .map_err(|e| PackError::Other(format!("CSV flush failed: {}", e.error())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::SanitizeMode;

    #[test]
    fn test_formula_cells_are_neutralized() {
        assert_eq!(guard_formula("=SUM(A1)".to_owned()), "'=SUM(A1)");
        assert_eq!(guard_formula("@cmd".to_owned()), "'@cmd");
        assert_eq!(guard_formula("2026-03-01".to_owned()), "2026-03-01");
    }

    #[test]
    fn test_empty_table_has_header_and_marker() {
        let bytes = write_csv(&["A", "B"], Vec::new(), &Sanitizer::default()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "A,B\n# No records for this filter\n"
        );
    }

    #[test]
    fn test_quoting_of_embedded_commas() {
        let bytes = write_csv(&["A"], vec![vec!["x, y".to_owned()]], &Sanitizer::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "A\n\"x, y\"\n");
    }

    #[test]
    fn test_unclean_cell_fails_strict_and_drops_relaxed() {
        let rows = || vec![vec!["Dana\u{AD}Ortiz".to_owned()]];

        let err = write_csv(&["Owner"], rows(), &Sanitizer::new(SanitizeMode::Strict)).unwrap_err();
        assert!(matches!(err, PackError::Sanitization(_)));

        let bytes = write_csv(&["Owner"], rows(), &Sanitizer::new(SanitizeMode::Relaxed)).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Owner\nDanaOrtiz\n");
    }
}
