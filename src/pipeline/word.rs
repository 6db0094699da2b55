//! Word (.docx) → PDF conversion via `docx-rs`.
//!
//! Structure survives the trip: heading and title styles become headings,
//! dash/bullet paragraphs become list items and tables become aligned rows.
//! Legacy binary `.doc` files are not readable by `docx-rs` and fail with an
//! engine error.

use crate::error::ConversionError;
use crate::pipeline::pdf_writer::{write_pdf, Block, TextDocument};
use crate::pipeline::registry::{ConversionDetails, ConvertedPdf, Converter};
use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct WordConverter;

impl Converter for WordConverter {
    fn name(&self) -> &'static str {
        "word"
    }

    fn convert(&self, input: &Path, out_dir: &Path) -> Result<ConvertedPdf, ConversionError> {
        let bytes =
            std::fs::read(input).map_err(|e| ConversionError::SourceUnreadable(e.to_string()))?;
        if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            return Err(ConversionError::Engine(
                "legacy binary .doc is not supported; save as .docx".into(),
            ));
        }
        let docx = docx_rs::read_docx(&bytes)
            .map_err(|e| ConversionError::Engine(format!("cannot parse docx: {e}")))?;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let mut doc = TextDocument::new(stem.clone());
        let stats = collect_blocks(&docx.document.children, &mut doc);

        let out = out_dir.join(format!("{stem}.pdf"));
        let summary = write_pdf(&doc, &out)?;
        info!(
            "Converted {} ({} paragraphs, {} tables) to {} pages",
            input.display(),
            stats.paragraphs,
            stats.tables,
            summary.pages
        );

        let details = ConversionDetails {
            pages: summary.pages,
            ..Default::default()
        }
        .fact("paragraphs", stats.paragraphs)
        .fact("tables", stats.tables)
        .fact("words", stats.words);

        Ok(ConvertedPdf { path: out, details })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DocStats {
    paragraphs: usize,
    tables: usize,
    words: usize,
}

fn collect_blocks(children: &[DocumentChild], doc: &mut TextDocument) -> DocStats {
    let mut stats = DocStats::default();
    for child in children {
        match child {
            DocumentChild::Paragraph(para) => {
                let text = paragraph_text(&para.children);
                let text = text.trim();
                if text.is_empty() {
                    doc.push(Block::Spacer);
                    continue;
                }
                stats.paragraphs += 1;
                stats.words += text.split_whitespace().count();
                let style = para.property.style.as_ref().map(|s| s.val.as_str());
                doc.push(paragraph_block(style, text));
            }
            DocumentChild::Table(table) => {
                stats.tables += 1;
                let mut rows = Vec::new();
                for row in &table.rows {
                    let docx_rs::TableChild::TableRow(tr) = row;
                    let mut cells = Vec::new();
                    for cell in &tr.cells {
                        let docx_rs::TableRowChild::TableCell(tc) = cell;
                        let mut cell_text = Vec::new();
                        for content in &tc.children {
                            if let docx_rs::TableCellContent::Paragraph(p) = content {
                                let t = paragraph_text(&p.children);
                                if !t.trim().is_empty() {
                                    cell_text.push(t.trim().to_string());
                                }
                            }
                        }
                        let joined = cell_text.join(" ");
                        stats.words += joined.split_whitespace().count();
                        cells.push(joined);
                    }
                    rows.push(cells);
                }
                if !rows.is_empty() {
                    doc.push(Block::Table(rows));
                }
            }
            _ => {}
        }
    }
    stats
}

fn paragraph_text(children: &[ParagraphChild]) -> String {
    let mut out = String::new();
    for child in children {
        match child {
            ParagraphChild::Run(run) => push_run(&run.children, &mut out),
            ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let ParagraphChild::Run(run) = inner {
                        push_run(&run.children, &mut out);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn push_run(children: &[RunChild], out: &mut String) {
    for child in children {
        match child {
            RunChild::Text(text) => out.push_str(&text.text),
            RunChild::Tab(_) => out.push(' '),
            _ => {}
        }
    }
}

/// Map a paragraph style id (`Heading1`, `Title`, …) and its text to a block.
fn paragraph_block(style: Option<&str>, text: &str) -> Block {
    if let Some(style) = style {
        let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        let lower = compact.to_ascii_lowercase();
        if lower.contains("title") && !lower.contains("subtitle") {
            return Block::Heading(1, text.to_string());
        }
        if let Some(level) = lower.strip_prefix("heading") {
            let level = level.parse::<u8>().unwrap_or(2).clamp(1, 3);
            return Block::Heading(level, text.to_string());
        }
        if lower.contains("listbullet") || lower.contains("listparagraph") {
            return Block::Bullet(text.to_string());
        }
    }
    if text.starts_with('-') || text.starts_with('•') {
        return Block::Bullet(text.to_string());
    }
    if text.chars().count() < 100
        && text.chars().any(char::is_alphabetic)
        && !text.chars().any(char::is_lowercase)
    {
        return Block::Heading(2, text.to_string());
    }
    Block::Paragraph(text.to_string())
}
