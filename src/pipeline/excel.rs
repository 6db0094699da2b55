//! Spreadsheet → PDF conversion via `calamine`.
//!
//! Each worksheet becomes a titled table section. Formula cells render the
//! value cached in the file at last save; nothing is recalculated.
//! Date-formatted cells are rendered as ISO 8601 (`2024-01-01`,
//! `2024-02-01T12:00:00`), durations as `h:mm:ss`, never as the raw serial
//! number Excel stores.

use crate::error::ConversionError;
use crate::pipeline::pdf_writer::{write_pdf, Block, TextDocument};
use crate::pipeline::registry::{ConversionDetails, ConvertedPdf, Converter};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{Duration, Timelike};
use std::path::Path;
use tracing::{debug, info};

/// Rows per table block; long sheets are split so headers repeat.
const ROWS_PER_TABLE: usize = 60;

/// Converts xlsx/xlsm/xlsb/xls/ods workbooks.
#[derive(Debug, Clone, Default)]
pub struct ExcelConverter {
    /// Worksheets to render, by name. `None` renders every sheet.
    sheets: Option<Vec<String>>,
}

impl ExcelConverter {
    pub fn new(sheets: Option<Vec<String>>) -> Self {
        Self { sheets }
    }

    fn selected(&self, available: &[String]) -> Result<Vec<String>, ConversionError> {
        let Some(wanted) = &self.sheets else {
            return Ok(available.to_vec());
        };
        for name in wanted {
            if !available.iter().any(|s| s == name) {
                return Err(ConversionError::Engine(format!(
                    "sheet '{name}' not found (available: {})",
                    available.join(", ")
                )));
            }
        }
        Ok(wanted.clone())
    }
}

impl Converter for ExcelConverter {
    fn name(&self) -> &'static str {
        "excel"
    }

    fn convert(&self, input: &Path, out_dir: &Path) -> Result<ConvertedPdf, ConversionError> {
        std::fs::metadata(input).map_err(|e| ConversionError::SourceUnreadable(e.to_string()))?;

        let mut workbook = open_workbook_auto(input)
            .map_err(|e| ConversionError::Engine(format!("cannot open workbook: {e}")))?;

        let available: Vec<String> = workbook.sheet_names().to_vec();
        let sheets = self.selected(&available)?;
        debug!("Workbook {} has sheets {:?}", input.display(), available);

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook".to_string());
        let mut doc = TextDocument::new(stem.clone());
        let mut total_rows = 0usize;

        for name in &sheets {
            let range = workbook
                .worksheet_range(name)
                .map_err(|e| ConversionError::Engine(format!("sheet '{name}': {e}")))?;

            let rows = sheet_rows(&range);
            total_rows += rows.len();

            doc.push(Block::Heading(1, format!("Sheet: {name}")));
            push_sheet(&mut doc, rows);
        }

        let out = out_dir.join(format!("{stem}.pdf"));
        let summary = write_pdf(&doc, &out)?;
        info!(
            "Converted {} ({} sheets, {} rows) to {} pages",
            input.display(),
            sheets.len(),
            total_rows,
            summary.pages
        );

        let details = ConversionDetails {
            pages: summary.pages,
            ..Default::default()
        }
        .fact("sheets", sheets.len())
        .fact("sheet_names", sheets.join(", "))
        .fact("rows", total_rows);

        Ok(ConvertedPdf { path: out, details })
    }
}

/// Render a worksheet as text rows, blank rows and trailing columns dropped.
fn sheet_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let rows = range
        .rows()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();
    trim_empty(rows)
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) if dt.is_duration() => dt
            .as_duration()
            .map(format_duration)
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            // Serials below one day carry a time of day only.
            Some(ts) if dt.as_f64() < 1.0 => ts.format("%H:%M:%S").to_string(),
            Some(ts) if ts.time().num_seconds_from_midnight() == 0 => {
                ts.format("%Y-%m-%d").to_string()
            }
            Some(ts) => ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.unsigned_abs();
    format!("{sign}{}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

fn push_sheet(doc: &mut TextDocument, rows: Vec<Vec<String>>) {
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        doc.push(Block::Paragraph("(empty sheet)".into()));
        return;
    };
    let body: Vec<Vec<String>> = rows.collect();
    if body.is_empty() {
        doc.push(Block::Table(vec![header]));
        return;
    }
    for chunk in body.chunks(ROWS_PER_TABLE) {
        let mut table = Vec::with_capacity(chunk.len() + 1);
        table.push(header.clone());
        table.extend(chunk.iter().cloned());
        doc.push(Block::Table(table));
    }
}

/// Drop fully empty rows and trailing empty columns.
fn trim_empty(rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .collect();
    let width = rows
        .iter()
        .filter_map(|r| r.iter().rposition(|c| !c.trim().is_empty()))
        .max()
        .map(|i| i + 1)
        .unwrap_or(0);
    rows.into_iter()
        .map(|mut r| {
            r.truncate(width);
            r
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Two sheets: `Invoices` (date, datetime and duration cells, accented
    /// text) and `Notes` (Cyrillic text).
    fn ledger() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ledger.xlsx")
    }

    fn fact<'a>(details: &'a ConversionDetails, key: &str) -> Option<&'a str> {
        details
            .facts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn trims_blank_rows_and_columns() {
        let rows = vec![
            row(&["Name", "Qty", "", ""]),
            row(&["", "", "", ""]),
            row(&["Bolt", "4", "", ""]),
        ];
        assert_eq!(
            trim_empty(rows),
            vec![row(&["Name", "Qty"]), row(&["Bolt", "4"])]
        );
    }

    #[test]
    fn long_sheets_repeat_the_header() {
        let mut rows = vec![row(&["h"])];
        rows.extend((0..ROWS_PER_TABLE + 5).map(|i| vec![i.to_string()]));
        let mut doc = TextDocument::new("t");
        push_sheet(&mut doc, rows);

        assert_eq!(doc.blocks.len(), 2);
        for block in &doc.blocks {
            match block {
                Block::Table(t) => assert_eq!(t[0], row(&["h"])),
                other => panic!("unexpected block {other:?}"),
            }
        }
    }

    #[test]
    fn empty_sheet_gets_a_placeholder() {
        let mut doc = TextDocument::new("t");
        push_sheet(&mut doc, Vec::new());
        assert_eq!(doc.blocks, vec![Block::Paragraph("(empty sheet)".into())]);
    }

    #[test]
    fn unknown_sheet_selection_is_rejected() {
        let conv = ExcelConverter::new(Some(vec!["Missing".into()]));
        let err = conv.selected(&["Data".to_string()]).unwrap_err();
        assert!(matches!(err, ConversionError::Engine(m) if m.contains("Missing")));

        let all = ExcelConverter::default()
            .selected(&["A".to_string(), "B".to_string()])
            .unwrap();
        assert_eq!(all, vec!["A", "B"]);
    }

    #[test]
    fn date_cells_render_as_iso_dates() {
        let mut workbook = open_workbook_auto(ledger()).unwrap();
        let range = workbook.worksheet_range("Invoices").unwrap();
        assert_eq!(
            sheet_rows(&range),
            vec![
                row(&["Due", "Client", "Amount", "Billed at", "Hours"]),
                row(&["2024-01-01", "Société Générale", "1200", "2024-02-01T12:00:00", "36:00:00"]),
                row(&["2024-02-29", "Acme GmbH", "310.25", "2024-03-01T06:00:00", "18:00:00"]),
            ]
        );
    }

    #[test]
    fn iso_cells_pass_through() {
        assert_eq!(
            render_cell(&Data::DateTimeIso("2024-05-01T08:30:00".into())),
            "2024-05-01T08:30:00"
        );
        assert_eq!(render_cell(&Data::DurationIso("PT1H30M".into())), "PT1H30M");
        assert_eq!(render_cell(&Data::Float(12.5)), "12.5");
        assert_eq!(format_duration(Duration::seconds(-90)), "-0:01:30");
    }

    #[test]
    fn converts_every_sheet_of_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let out = ExcelConverter::default().convert(&ledger(), dir.path()).unwrap();

        assert!(std::fs::read(&out.path).unwrap().starts_with(b"%PDF"));
        assert!(out.details.pages >= 1);
        assert_eq!(fact(&out.details, "sheets"), Some("2"));
        assert_eq!(fact(&out.details, "sheet_names"), Some("Invoices, Notes"));
        assert_eq!(fact(&out.details, "rows"), Some("6"));
    }

    #[test]
    fn converts_only_the_selected_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let out = ExcelConverter::new(Some(vec!["Notes".into()]))
            .convert(&ledger(), dir.path())
            .unwrap();

        assert_eq!(fact(&out.details, "sheets"), Some("1"));
        assert_eq!(fact(&out.details, "sheet_names"), Some("Notes"));
        assert_eq!(fact(&out.details, "rows"), Some("3"));
    }

    #[test]
    fn corrupt_workbook_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.xlsx");
        std::fs::write(&input, b"not a zip archive").unwrap();

        let err = ExcelConverter::default()
            .convert(&input, dir.path())
            .unwrap_err();
        assert!(matches!(err, ConversionError::Engine(_)), "got {err:?}");
    }

    #[test]
    fn missing_workbook_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExcelConverter::default()
            .convert(&dir.path().join("gone.xlsx"), dir.path())
            .unwrap_err();
        assert!(matches!(err, ConversionError::SourceUnreadable(_)));
    }
}
