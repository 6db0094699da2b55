//! Text-extraction fallback: any file → PDF of whatever text it holds.
//!
//! Used when the primary converter for a category is unavailable and the
//! fallback is enabled. The character encoding is detected before decoding
//! (BOM first, then `chardetng`), so legacy Windows-1252 or Latin-1 exports
//! keep their accents. When the bytes are clearly binary (zip containers,
//! OLE) only printable runs are kept, which is the same trick `strings(1)`
//! plays.

use crate::error::ConversionError;
use crate::pipeline::classify::extension_of;
use crate::pipeline::pdf_writer::{write_pdf, Block, TextDocument};
use crate::pipeline::registry::{ConversionDetails, ConvertedPdf, Converter};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::path::Path;
use tracing::info;

/// Shortest printable run kept from binary input.
const MIN_RUN: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter;

impl Converter for TextConverter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn convert(&self, input: &Path, out_dir: &Path) -> Result<ConvertedPdf, ConversionError> {
        let bytes =
            std::fs::read(input).map_err(|e| ConversionError::SourceUnreadable(e.to_string()))?;
        let (content, encoding) = decode(&bytes);
        if content.trim().is_empty() {
            return Err(ConversionError::Engine("no extractable text".into()));
        }

        let ext = extension_of(input).unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let mut doc = TextDocument::new(stem.clone());
        layout(&content, &ext, &mut doc);

        let out = out_dir.join(format!("{stem}.pdf"));
        let summary = write_pdf(&doc, &out)?;

        let stats = TextStats::of(&content);
        info!(
            "Extracted text from {} ({} lines, {} words) into {} pages",
            input.display(),
            stats.lines,
            stats.words,
            summary.pages
        );

        let mut details = ConversionDetails {
            pages: summary.pages,
            ..Default::default()
        }
        .fact("lines", stats.lines)
        .fact("words", stats.words)
        .fact("characters", stats.characters)
        .fact("encoding", encoding);
        if ext == "csv" {
            if let Some((delimiter, columns)) = guess_delimiter(&content) {
                details = details
                    .fact("csv_delimiter", delimiter.escape_default())
                    .fact("csv_columns", columns);
            }
        }

        Ok(ConvertedPdf { path: out, details })
    }
}

/// Decode text in whatever encoding it was saved with.
///
/// Returns the text and the name of the encoding used. A BOM wins; valid
/// UTF-8 is taken as is; anything else goes through `chardetng`.
pub(crate) fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), encoding.name());
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), encoding_rs::UTF_8.name());
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, used, _) = encoding.decode(bytes);
    (text.into_owned(), used.name())
}

/// Decode bytes as text, falling back to printable runs for binary data.
fn decode(bytes: &[u8]) -> (String, &'static str) {
    let binary = bytes.iter().take(8192).any(|&b| b == 0);
    if !binary || Encoding::for_bom(bytes).is_some() {
        return decode_text(bytes);
    }
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            current.push(b as char);
        } else {
            if current.trim().len() >= MIN_RUN {
                runs.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.trim().len() >= MIN_RUN {
        runs.push(current);
    }
    (runs.join("\n"), "binary")
}

fn layout(content: &str, ext: &str, doc: &mut TextDocument) {
    if matches!(ext, "json" | "xml") {
        doc.push(Block::Preformatted(content.to_string()));
        return;
    }
    for para in content.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            doc.push(Block::Spacer);
            continue;
        }
        if matches!(ext, "md" | "markdown") && para.starts_with('#') {
            let level = para.chars().take_while(|&c| c == '#').count();
            let (heading, rest) = para.split_once('\n').unwrap_or((para, ""));
            let heading = heading.trim_start_matches('#').trim();
            doc.push(Block::Heading(level.min(3) as u8, heading.to_string()));
            if !rest.trim().is_empty() {
                doc.push(Block::Paragraph(rest.trim().to_string()));
            }
            continue;
        }
        if matches!(ext, "csv" | "tsv" | "log") {
            doc.push(Block::Preformatted(para.to_string()));
        } else {
            doc.push(Block::Paragraph(para.to_string()));
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct TextStats {
    lines: usize,
    words: usize,
    characters: usize,
}

impl TextStats {
    fn of(content: &str) -> Self {
        Self {
            lines: content.lines().count(),
            words: content.split_whitespace().count(),
            characters: content.chars().count(),
        }
    }
}

/// Most frequent delimiter on the first line, with the implied column count.
fn guess_delimiter(content: &str) -> Option<(char, usize)> {
    let first = content.lines().next()?;
    [',', ';', '\t', '|']
        .into_iter()
        .map(|d| (d, first.matches(d).count()))
        .filter(|&(_, n)| n > 0)
        .max_by_key(|&(_, n)| n)
        .map(|(d, n)| (d, n + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_input_keeps_printable_runs() {
        let bytes = b"PK\x03\x04\x00\x00ab\x00Quarterly totals\x01\x02xyz\x00Revenue";
        assert_eq!(decode(bytes), ("Quarterly totals\nRevenue".to_string(), "binary"));
    }

    #[test]
    fn windows_1252_text_keeps_its_accents() {
        let bytes = b"R\xE9sum\xE9 des d\xE9penses\nCaf\xE9 du march\xE9 f\xFCr Z\xFCrich\n";
        let (text, encoding) = decode(bytes);
        assert!(text.contains("Résumé des dépenses"), "got {text:?}");
        assert!(text.contains("für Zürich"), "got {text:?}");
        assert!(!text.contains('\u{FFFD}'));
        assert_ne!(encoding, "UTF-8");
    }

    #[test]
    fn utf8_and_bom_marked_text_decode_exactly() {
        assert_eq!(decode_text("Итого 1200".as_bytes()), ("Итого 1200".to_string(), "UTF-8"));

        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "Total €5".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&utf16), ("Total €5".to_string(), "UTF-16LE"));
    }

    #[test]
    fn markdown_headings_become_headings() {
        let mut doc = TextDocument::new("t");
        layout("# Title\n\nBody text.\n\n## Part\nmore", "md", &mut doc);
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading(1, "Title".into()),
                Block::Paragraph("Body text.".into()),
                Block::Heading(2, "Part".into()),
                Block::Paragraph("more".into()),
            ]
        );
    }

    #[test]
    fn structured_text_is_preformatted() {
        let mut doc = TextDocument::new("t");
        layout("{\n  \"a\": 1\n}", "json", &mut doc);
        assert_eq!(doc.blocks, vec![Block::Preformatted("{\n  \"a\": 1\n}".into())]);
    }

    #[test]
    fn csv_delimiter_guess() {
        assert_eq!(guess_delimiter("a;b;c\n1;2;3"), Some((';', 3)));
        assert_eq!(guess_delimiter("a,b\n1,2"), Some((',', 2)));
        assert_eq!(guess_delimiter("single"), None);
    }

    #[test]
    fn converts_a_csv_with_details() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("stock.csv");
        std::fs::write(&input, "sku,qty\nA1,4\nB2,7\n").unwrap();

        let out = TextConverter.convert(&input, dir.path()).unwrap();
        assert!(std::fs::read(&out.path).unwrap().starts_with(b"%PDF"));
        let facts = &out.details.facts;
        assert!(facts.contains(&("lines".to_string(), "3".to_string())));
        assert!(facts.contains(&("csv_delimiter".to_string(), ",".to_string())));
        assert!(facts.contains(&("csv_columns".to_string(), "2".to_string())));
        assert!(facts.contains(&("encoding".to_string(), "UTF-8".to_string())));
    }

    #[test]
    fn latin1_csv_converts_without_replacement_characters() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ledger.csv");
        std::fs::write(&input, b"fournisseur;montant\nSoci\xE9t\xE9 G\xE9n\xE9rale;1200\n").unwrap();

        let out = TextConverter.convert(&input, dir.path()).unwrap();
        let facts = &out.details.facts;
        let encoding = facts.iter().find(|(k, _)| k == "encoding").map(|(_, v)| v.as_str());
        assert!(matches!(encoding, Some(e) if e != "UTF-8"), "got {encoding:?}");
        assert!(facts.contains(&("csv_delimiter".to_string(), ";".to_string())));
    }

    #[test]
    fn empty_file_has_nothing_to_extract() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blank.xlsx");
        std::fs::write(&input, b"\x00\x00\x01").unwrap();
        assert!(matches!(
            TextConverter.convert(&input, dir.path()),
            Err(ConversionError::Engine(_))
        ));
    }
}
