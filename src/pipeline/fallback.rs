//! Programmatic PDF writer used when no browser is available.
//!
//! Produces plain text pages with `lopdf`: a title line, a ` | `-joined
//! header line, then one line per record. Long lines are word-wrapped and
//! a new A4 page starts whenever the cursor reaches the bottom margin.
//! Output is always a structurally valid PDF, though not a faithful
//! rendering of the table.

use crate::error::RasterError;
use crate::pipeline::layout::RenderedDocument;
use crate::pipeline::raster::{CancelFlag, Rasterizer};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

pub const PAGE_WIDTH_PT: f32 = 595.28;
pub const PAGE_HEIGHT_PT: f32 = 842.0;
pub const MARGIN_PT: f32 = 40.0;
pub const LINE_HEIGHT_PT: f32 = 14.0;
pub const WRAP_CHARS: usize = 180;

const BODY_FONT_SIZE: i64 = 8;
const TITLE_FONT_SIZE: i64 = 11;
const ENGINE: &str = "fallback";

/// The always-available text renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackRasterizer;

impl FallbackRasterizer {
    pub fn new() -> Self {
        Self
    }
}

impl Rasterizer for FallbackRasterizer {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn rasterize(
        &self,
        doc: &RenderedDocument,
        _cancel: &CancelFlag,
    ) -> Result<Vec<u8>, RasterError> {
        let lines = document_lines(doc);
        let pages = paginate(&lines);
        debug!(
            "Fallback layout for '{}': {} lines on {} pages",
            doc.key,
            lines.len(),
            pages.len()
        );
        write_pdf(&pages)
    }
}

/// One wrapped output line; `title` lines use the larger bold font.
#[derive(Debug, Clone, PartialEq)]
struct Line {
    text: String,
    title: bool,
}

fn document_lines(doc: &RenderedDocument) -> Vec<Line> {
    let mut lines = Vec::new();
    let title = format!("{} ({} rows)", doc.key, doc.row_count());
    lines.extend(wrap(&title).into_iter().map(|text| Line { text, title: true }));

    let mut push_body = |logical: String| {
        lines.extend(wrap(&logical).into_iter().map(|text| Line { text, title: false }));
    };
    push_body(doc.columns.join(" | "));
    for row in &doc.cells {
        push_body(row.join(" | "));
    }
    lines
}

/// Word-wrap at [`WRAP_CHARS`] characters, hard-splitting overlong words.
fn wrap(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split(' ') {
        let word_len = word.chars().count();
        let needed = if current_len == 0 { word_len } else { current_len + 1 + word_len };

        if needed <= WRAP_CHARS {
            if current_len > 0 {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
            continue;
        }

        if current_len > 0 {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > WRAP_CHARS {
            let rest = chars.split_off(WRAP_CHARS);
            out.push(chars.into_iter().collect());
            chars = rest;
        }
        current = chars.into_iter().collect();
        current_len = current.chars().count();
    }

    if current_len > 0 || out.is_empty() {
        out.push(current);
    }
    out
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT_PT - 2.0 * MARGIN_PT) / LINE_HEIGHT_PT).floor() as usize
}

fn paginate(lines: &[Line]) -> Vec<&[Line]> {
    let per_page = lines_per_page().max(1);
    if lines.is_empty() {
        return vec![&[]];
    }
    lines.chunks(per_page).collect()
}

fn write_pdf(pages: &[&[Line]]) -> Result<Vec<u8>, RasterError> {
    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();

    let body_font = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let title_font = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => body_font,
            "F2" => title_font,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = page_content(page);
        let encoded = content.encode().map_err(|e| RasterError::Failed {
            engine: ENGINE,
            detail: e.to_string(),
        })?;
        let content_id = pdf.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(PAGE_WIDTH_PT),
            Object::Real(PAGE_HEIGHT_PT),
        ],
    };
    pdf.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.compress();

    let mut buf = Vec::new();
    pdf.save_to(&mut buf).map_err(|e| RasterError::Failed {
        engine: ENGINE,
        detail: e.to_string(),
    })?;
    Ok(buf)
}

fn page_content(lines: &[Line]) -> Content {
    let mut operations = Vec::with_capacity(lines.len() * 5);
    let mut y = PAGE_HEIGHT_PT - MARGIN_PT - LINE_HEIGHT_PT;

    for line in lines {
        let (font, size) = if line.title {
            ("F2", TITLE_FONT_SIZE)
        } else {
            ("F1", BODY_FONT_SIZE)
        };
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec![font.into(), size.into()]));
        operations.push(Operation::new(
            "Td",
            vec![Object::Real(MARGIN_PT), Object::Real(y)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(win_ansi(&line.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
        y -= LINE_HEIGHT_PT;
    }

    Content { operations }
}

/// Encode for the standard fonts; characters outside Latin-1 become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7E | 0xA0..=0xFF => u32::from(c) as u8,
            0x09 | 0x0A | 0x0D => b' ',
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::PageLayout;

    fn doc(rows: usize, cell: &str) -> RenderedDocument {
        RenderedDocument {
            key: "1001".into(),
            columns: vec!["Del.Challan".into(), "Item".into()],
            cells: (0..rows).map(|_| vec!["1001".into(), cell.to_string()]).collect(),
            html: String::new(),
            layout: PageLayout::for_row_count(rows),
        }
    }

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn small_group_fits_one_page() {
        let bytes = FallbackRasterizer.rasterize(&doc(3, "Bolts"), &CancelFlag::new()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(page_count(&bytes), 1);
    }

    #[test]
    fn long_group_spills_onto_more_pages() {
        // title + header + 200 rows = 202 lines at 54 lines per page
        let bytes = FallbackRasterizer.rasterize(&doc(200, "x"), &CancelFlag::new()).unwrap();
        assert_eq!(lines_per_page(), 54);
        assert_eq!(page_count(&bytes), 4);
    }

    #[test]
    fn title_names_key_and_row_count() {
        let lines = document_lines(&doc(2, "a"));
        assert_eq!(lines[0].text, "1001 (2 rows)");
        assert!(lines[0].title);
        assert_eq!(lines[1].text, "Del.Challan | Item");
        assert_eq!(lines[2].text, "1001 | a");
    }

    #[test]
    fn wrap_respects_limit_and_word_boundaries() {
        let words = vec!["word"; 100].join(" ");
        let wrapped = wrap(&words);
        assert!(wrapped.iter().all(|l| l.chars().count() <= WRAP_CHARS));
        assert!(wrapped.iter().all(|l| !l.starts_with(' ')));
        assert_eq!(wrapped.join(" "), words);
    }

    #[test]
    fn wrap_splits_overlong_words() {
        let long = "x".repeat(400);
        let wrapped = wrap(&long);
        assert_eq!(wrapped.len(), 3);
        assert_eq!(wrapped[0].len(), 180);
        assert_eq!(wrapped[2].len(), 40);
    }

    #[test]
    fn wrap_keeps_empty_line() {
        assert_eq!(wrap(""), vec![String::new()]);
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(win_ansi("Aé€"), vec![b'A', 0xE9, b'?']);
    }

    #[test]
    fn unicode_cells_still_produce_valid_pdf() {
        let bytes = FallbackRasterizer.rasterize(&doc(2, "数据 ✓"), &CancelFlag::new()).unwrap();
        assert_eq!(page_count(&bytes), 1);
    }
}
