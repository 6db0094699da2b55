//! Minimal text-layout PDF writer shared by every converter.
//!
//! Converters reduce their input to a [`TextDocument`] (title plus a flat
//! list of [`Block`]s) and this module lays it out on A4 pages.
//!
//! Documents whose text fits the WinAnsi (Windows-1252) character set use the
//! built-in Helvetica/Courier fonts, so nothing is embedded and the PDF stays
//! small. Anything else (Cyrillic, Greek, Arabic, …) is set in the bundled
//! DejaVu fonts, embedded in the file. Built-in fonts silently drop what they
//! cannot encode, and so do embedded fonts without a glyph; characters that
//! no available font covers (CJK, for one) therefore fail the conversion
//! instead of vanishing from the output.

use crate::error::ConversionError;
use printpdf::lopdf::Document as LoDocument;
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use std::collections::BTreeSet;
use std::io::BufWriter;
use std::path::Path;

static SANS: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static SANS_BOLD: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");
static MONO: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono.ttf");

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 18.0;
/// Points → millimetres.
const PT: f32 = 0.3528;
/// Widest column rendered for tables, in characters.
const MAX_COLUMN_CHARS: usize = 28;

/// One layout unit of a converted document.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Heading; level 1 is the largest.
    Heading(u8, String),
    Paragraph(String),
    Bullet(String),
    /// Monospaced text with line breaks preserved.
    Preformatted(String),
    /// Rows of cells; the first row is rendered bold.
    Table(Vec<Vec<String>>),
    /// Vertical gap.
    Spacer,
}

/// A document reduced to blocks, ready for layout.
#[derive(Debug, Clone, Default)]
pub struct TextDocument {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl TextDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Every string that ends up on the page.
    fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.blocks.iter().flat_map(|block| {
            let texts: Vec<&str> = match block {
                Block::Heading(_, t)
                | Block::Paragraph(t)
                | Block::Bullet(t)
                | Block::Preformatted(t) => vec![t.as_str()],
                Block::Table(rows) => rows.iter().flatten().map(String::as_str).collect(),
                Block::Spacer => Vec::new(),
            };
            texts
        }))
    }
}

/// The three faces a layout uses, plus how wide they run.
struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
    /// Glyph-width multiplier relative to Helvetica/Courier.
    width: f32,
    /// Characters the regular face has but the bold one lacks.
    bold_gaps: BTreeSet<char>,
    /// Characters the regular face has but the mono one lacks.
    mono_gaps: BTreeSet<char>,
}

impl Fonts {
    fn load(pdf: &PdfDocumentReference, doc: &TextDocument) -> Result<Self, ConversionError> {
        let font_err =
            |e: printpdf::Error| ConversionError::Engine(format!("PDF font error: {e}"));

        let chars: BTreeSet<char> = doc
            .texts()
            .flat_map(str::chars)
            .filter(|c| !c.is_control() && !c.is_whitespace())
            .collect();

        if chars.iter().all(|&c| win_ansi(c)) {
            return Ok(Self {
                regular: pdf.add_builtin_font(BuiltinFont::Helvetica).map_err(font_err)?,
                bold: pdf.add_builtin_font(BuiltinFont::HelveticaBold).map_err(font_err)?,
                mono: pdf.add_builtin_font(BuiltinFont::Courier).map_err(font_err)?,
                width: 1.0,
                bold_gaps: BTreeSet::new(),
                mono_gaps: BTreeSet::new(),
            });
        }

        let missing = uncovered(&chars, SANS)?;
        if !missing.is_empty() {
            let sample: String = missing.iter().take(8).collect();
            return Err(ConversionError::Engine(format!(
                "{} distinct character(s) cannot be rendered by the PDF fonts (e.g. \"{sample}\")",
                missing.len()
            )));
        }

        Ok(Self {
            regular: pdf.add_external_font(SANS).map_err(font_err)?,
            bold: pdf.add_external_font(SANS_BOLD).map_err(font_err)?,
            mono: pdf.add_external_font(MONO).map_err(font_err)?,
            width: 1.12,
            bold_gaps: uncovered(&chars, SANS_BOLD)?,
            mono_gaps: uncovered(&chars, MONO)?,
        })
    }

    /// The bold face, unless `text` needs glyphs only the regular face has.
    fn bold_for(&self, text: &str) -> &IndirectFontRef {
        Self::unless_gaps(&self.bold, &self.regular, &self.bold_gaps, text)
    }

    /// The mono face, unless `text` needs glyphs only the regular face has.
    fn mono_for(&self, text: &str) -> &IndirectFontRef {
        Self::unless_gaps(&self.mono, &self.regular, &self.mono_gaps, text)
    }

    fn unless_gaps<'a>(
        preferred: &'a IndirectFontRef,
        fallback: &'a IndirectFontRef,
        gaps: &BTreeSet<char>,
        text: &str,
    ) -> &'a IndirectFontRef {
        if text.chars().any(|c| gaps.contains(&c)) {
            fallback
        } else {
            preferred
        }
    }
}

/// Whether the built-in fonts' WinAnsi encoding has a code for `c`.
fn win_ansi(c: char) -> bool {
    c.is_ascii()
        || LoDocument::encode_text(Some("WinAnsiEncoding"), c.encode_utf8(&mut [0; 4])).len() == 1
}

/// Characters of `chars` with no glyph in the TrueType font `data`.
fn uncovered(chars: &BTreeSet<char>, data: &[u8]) -> Result<BTreeSet<char>, ConversionError> {
    let face = ttf_parser::Face::parse(data, 0)
        .map_err(|e| ConversionError::Engine(format!("bundled font unreadable: {e}")))?;
    Ok(chars
        .iter()
        .copied()
        .filter(|&c| face.glyph_index(c).is_none())
        .collect())
}

/// Result of writing a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfSummary {
    pub pages: usize,
    pub bytes: u64,
}

/// Lay out `doc` and write it to `path`.
pub fn write_pdf(doc: &TextDocument, path: &Path) -> Result<PdfSummary, ConversionError> {
    let title = clean(&doc.title);
    let (pdf, page, layer) = PdfDocument::new(&title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let layer = pdf.get_page(page).get_layer(layer);

    let fonts = Fonts::load(&pdf, doc)?;
    let regular = &fonts.regular;

    let mut cursor = Cursor {
        pdf: &pdf,
        layer,
        y: PAGE_H - MARGIN,
        pages: 1,
        width: fonts.width,
    };

    cursor.text_block(&title, 16.0, fonts.bold_for(&title), 0.55, 0.0);
    cursor.gap(4.0);

    for block in &doc.blocks {
        match block {
            Block::Heading(level, text) => {
                let size = match level {
                    1 => 14.0,
                    2 => 12.5,
                    _ => 11.0,
                };
                cursor.gap(2.5);
                let text = clean(text);
                cursor.text_block(&text, size, fonts.bold_for(&text), 0.55, 0.0);
                cursor.gap(1.0);
            }
            Block::Paragraph(text) => {
                cursor.text_block(&clean(text), 10.0, regular, 0.5, 0.0);
                cursor.gap(1.5);
            }
            Block::Bullet(text) => {
                let text = clean(text.trim_start_matches(['-', '•', '*', ' ']));
                cursor.text_block(&format!("- {text}"), 10.0, regular, 0.5, 6.0);
            }
            Block::Preformatted(text) => {
                for line in text.lines() {
                    let line = clean(line);
                    cursor.text_block(&line, 8.5, fonts.mono_for(&line), 0.6, 0.0);
                }
                cursor.gap(1.5);
            }
            Block::Table(rows) => {
                let widths = column_widths(rows);
                for (i, row) in rows.iter().enumerate() {
                    let line = format_row(row, &widths);
                    let font = if i == 0 {
                        fonts.bold_for(&line)
                    } else {
                        fonts.mono_for(&line)
                    };
                    cursor.text_block(&line, 8.0, font, 0.6, 0.0);
                }
                cursor.gap(3.0);
            }
            Block::Spacer => cursor.gap(3.0),
        }
    }

    let pages = cursor.pages;
    let file = std::fs::File::create(path)
        .map_err(|e| ConversionError::Engine(format!("cannot create {}: {e}", path.display())))?;
    pdf.save(&mut BufWriter::new(file))
        .map_err(|e| ConversionError::Engine(format!("PDF save error: {e}")))?;

    let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    Ok(PdfSummary { pages, bytes })
}

struct Cursor<'a> {
    pdf: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
    width: f32,
}

impl Cursor<'_> {
    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn line_height(size: f32) -> f32 {
        size * PT * 1.4
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < MARGIN {
            let (page, layer) = self.pdf.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            self.layer = self.pdf.get_page(page).get_layer(layer);
            self.y = PAGE_H - MARGIN;
            self.pages += 1;
        }
    }

    /// Wrap and emit `text`; `em` is the average glyph width as a fraction
    /// of the font size.
    fn text_block(&mut self, text: &str, size: f32, font: &IndirectFontRef, em: f32, indent: f32) {
        let usable = PAGE_W - 2.0 * MARGIN - indent;
        let max_chars = ((usable / (size * PT * em * self.width)) as usize).max(10);
        let height = Self::line_height(size);
        for line in wrap_text(text, max_chars) {
            self.ensure_room(height);
            self.y -= height;
            self.layer
                .use_text(line, size, Mm(MARGIN + indent), Mm(self.y), font);
        }
    }
}

/// Strip control characters no font can show.
fn clean(text: &str) -> String {
    text.replace('\t', "    ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Greedy word wrap; words longer than a line are split hard.
pub(crate) fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        if current_len + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn column_widths(rows: &[Vec<String>]) -> Vec<usize> {
    let cols = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    (0..cols)
        .map(|c| {
            rows.iter()
                .filter_map(|r| r.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
                .clamp(1, MAX_COLUMN_CHARS)
        })
        .collect()
}

fn format_row(row: &[String], widths: &[usize]) -> String {
    widths
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let cell = clean(row.get(i).map(String::as_str).unwrap_or(""));
            let cell: String = cell.chars().take(w).collect();
            format!("{cell:<w$}")
        })
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}
