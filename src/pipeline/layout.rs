//! Document layout: one group → an HTML table page plus its sizing.
//!
//! ## Sizing law
//!
//! | rows   | width                                   | height              | margins |
//! |--------|-----------------------------------------|---------------------|---------|
//! | ≤ 12   | 1450 px                                 | 500 px              | 20 px   |
//! | > 12   | 1450 + 8 px per row beyond 12, max 5000 | content + 200 px    | 0       |
//!
//! Content height is only known once an engine has laid the HTML out, so
//! tall pages carry a [`HeightPolicy::ContentPlus`] that is resolved into a
//! [`PageGeometry`] by the rasterizer.

use crate::pipeline::group::Group;
use indexmap::IndexMap;

pub const MIN_WIDTH_PX: u32 = 1450;
pub const MAX_WIDTH_PX: u32 = 5000;
pub const WIDTH_PER_EXTRA_ROW_PX: u32 = 8;
pub const COMPACT_ROW_LIMIT: usize = 12;
pub const COMPACT_HEIGHT_PX: u32 = 500;
pub const COMPACT_MARGIN_PX: u32 = 20;
pub const CONTENT_PADDING_PX: u32 = 200;
/// Initial browser viewport height before content is measured.
pub const VIEWPORT_HEIGHT_PX: u32 = 800;

/// CSS pixels per inch, used to convert page sizes for print.
const PX_PER_INCH: f64 = 96.0;

const STYLESHEET: &str = "\
body { font-family: Arial, sans-serif; margin: 20px; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 2px solid #000000; padding: 8px; text-align: left; }
th { background-color: rgb(255, 255, 255); font-weight: bold; }
tr:nth-child(even) { background-color: rgb(255, 255, 255); }";

/// How the final page height is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightPolicy {
    /// A fixed height in px.
    Fixed(u32),
    /// Measured content height plus this many px.
    ContentPlus(u32),
}

/// Page size rules for one rendered group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub width_px: u32,
    pub height: HeightPolicy,
    pub margin_px: u32,
}

impl PageLayout {
    /// Apply the sizing law for a group of `row_count` rows.
    pub fn for_row_count(row_count: usize) -> Self {
        let extra = u32::try_from(row_count.saturating_sub(COMPACT_ROW_LIMIT)).unwrap_or(u32::MAX);
        let width_px = MIN_WIDTH_PX
            .saturating_add(extra.saturating_mul(WIDTH_PER_EXTRA_ROW_PX))
            .clamp(MIN_WIDTH_PX, MAX_WIDTH_PX);

        if row_count <= COMPACT_ROW_LIMIT {
            Self {
                width_px,
                height: HeightPolicy::Fixed(COMPACT_HEIGHT_PX),
                margin_px: COMPACT_MARGIN_PX,
            }
        } else {
            Self {
                width_px,
                height: HeightPolicy::ContentPlus(CONTENT_PADDING_PX),
                margin_px: 0,
            }
        }
    }

    /// Whether the engine must measure content before printing.
    pub fn needs_measurement(&self) -> bool {
        matches!(self.height, HeightPolicy::ContentPlus(_))
    }

    /// Resolve the final page geometry from a measured content height.
    ///
    /// `content_height_px` is ignored for fixed-height pages.
    pub fn geometry(&self, content_height_px: u32) -> PageGeometry {
        let height_px = match self.height {
            HeightPolicy::Fixed(h) => h,
            HeightPolicy::ContentPlus(pad) => content_height_px.saturating_add(pad),
        };
        PageGeometry {
            width_px: self.width_px,
            height_px,
            margin_px: self.margin_px,
        }
    }
}

/// Final page size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    pub width_px: u32,
    pub height_px: u32,
    pub margin_px: u32,
}

impl PageGeometry {
    pub fn width_in(&self) -> f64 {
        f64::from(self.width_px) / PX_PER_INCH
    }

    pub fn height_in(&self) -> f64 {
        f64::from(self.height_px) / PX_PER_INCH
    }

    pub fn margin_in(&self) -> f64 {
        f64::from(self.margin_px) / PX_PER_INCH
    }
}

/// A group laid out as a table page, ready for rasterizing.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub key: String,
    /// Header labels as printed, one per column of the group's first record.
    pub columns: Vec<String>,
    /// Display text per cell, one inner vector per record.
    pub cells: Vec<Vec<String>>,
    pub html: String,
    pub layout: PageLayout,
}

impl RenderedDocument {
    pub fn row_count(&self) -> usize {
        self.cells.len()
    }
}

/// Lay out `group` as an HTML table with a bold header row.
///
/// Headers found in `labels` are printed under their label; cells are still
/// looked up by the source header.
pub fn render_group(group: &Group, labels: &IndexMap<String, String>) -> RenderedDocument {
    let columns: Vec<String> = group
        .rows
        .first()
        .map(|r| r.columns().map(str::to_string).collect())
        .unwrap_or_default();

    let cells: Vec<Vec<String>> = group
        .rows
        .iter()
        .map(|row| columns.iter().map(|c| row.display(c)).collect())
        .collect();

    let headers: Vec<String> = columns
        .iter()
        .map(|c| labels.get(c).cloned().unwrap_or_else(|| c.clone()))
        .collect();

    let html = build_html(&headers, &cells);
    let layout = PageLayout::for_row_count(cells.len());

    RenderedDocument {
        key: group.key.clone(),
        columns: headers,
        cells,
        html,
        layout,
    }
}

fn build_html(columns: &[String], cells: &[Vec<String>]) -> String {
    let mut html = String::with_capacity(512 + cells.len() * columns.len() * 24);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");
    html.push_str(STYLESHEET);
    html.push_str("\n</style>\n</head>\n<body>\n<table>\n<thead>\n<tr>");
    for col in columns {
        html.push_str("<th>");
        html.push_str(&escape_html(col));
        html.push_str("</th>");
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in cells {
        html.push_str("<tr>");
        for value in row {
            html.push_str("<td>");
            html.push_str(&escape_html(value));
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellValue, RowRecord};

    fn group_of(n: usize) -> Group {
        Group {
            key: "K".into(),
            rows: (0..n)
                .map(|i| {
                    RowRecord::from_pairs([
                        ("Del.Challan", CellValue::Text("K".into())),
                        ("Line", CellValue::Number(i as f64)),
                    ])
                })
                .collect(),
        }
    }

    #[test]
    fn compact_pages_use_fixed_height_and_margins() {
        for n in [1, 5, 12] {
            let l = PageLayout::for_row_count(n);
            assert_eq!(l.width_px, 1450);
            assert_eq!(l.height, HeightPolicy::Fixed(500));
            assert_eq!(l.margin_px, 20);
            assert!(!l.needs_measurement());
        }
    }

    #[test]
    fn tall_pages_grow_eight_px_per_extra_row() {
        let l = PageLayout::for_row_count(13);
        assert_eq!(l.width_px, 1458);
        assert_eq!(l.height, HeightPolicy::ContentPlus(200));
        assert_eq!(l.margin_px, 0);

        assert_eq!(PageLayout::for_row_count(100).width_px, 1450 + 88 * 8);
    }

    #[test]
    fn width_is_capped() {
        assert_eq!(PageLayout::for_row_count(455).width_px, 4994);
        assert_eq!(PageLayout::for_row_count(456).width_px, 5000);
        assert_eq!(PageLayout::for_row_count(10_000).width_px, 5000);
        assert_eq!(PageLayout::for_row_count(usize::MAX).width_px, 5000);
    }

    #[test]
    fn geometry_resolves_height() {
        let compact = PageLayout::for_row_count(3).geometry(9999);
        assert_eq!(compact.height_px, 500);

        let tall = PageLayout::for_row_count(40).geometry(1234);
        assert_eq!(tall.height_px, 1434);
        assert_eq!(tall.margin_px, 0);
        assert!((tall.width_in() - f64::from(tall.width_px) / 96.0).abs() < 1e-9);
    }

    #[test]
    fn html_has_bold_header_and_one_row_per_record() {
        let doc = render_group(&group_of(3), &IndexMap::new());
        assert_eq!(doc.columns, vec!["Del.Challan", "Line"]);
        assert_eq!(doc.row_count(), 3);
        assert!(doc.html.contains("font-weight: bold"));
        assert!(doc.html.contains("<th>Del.Challan</th><th>Line</th>"));
        assert_eq!(doc.html.matches("<tr>").count(), 4);
        assert!(doc.html.contains("<td>K</td><td>2</td>"));
    }

    #[test]
    fn header_labels_rename_printed_headers_only() {
        let mut labels = IndexMap::new();
        labels.insert("Line".to_string(), "Line No".to_string());
        labels.insert("Absent".to_string(), "Never shown".to_string());

        let doc = render_group(&group_of(2), &labels);
        assert_eq!(doc.columns, vec!["Del.Challan", "Line No"]);
        assert!(doc.html.contains("<th>Del.Challan</th><th>Line No</th>"));
        assert!(!doc.html.contains("Never shown"));
        assert_eq!(doc.cells[1], vec!["K", "1"]);
    }

    #[test]
    fn null_cells_render_empty_never_undefined() {
        let group = Group {
            key: "A".into(),
            rows: vec![RowRecord::from_pairs([
                ("Del.Challan", CellValue::Text("A".into())),
                ("Note", CellValue::Null),
            ])],
        };
        let doc = render_group(&group, &IndexMap::new());
        assert!(doc.html.contains("<td>A</td><td></td>"));
        assert!(!doc.html.contains("undefined"));
        assert_eq!(doc.cells[0][1], "");
    }

    #[test]
    fn cell_text_is_escaped() {
        let group = Group {
            key: "A".into(),
            rows: vec![RowRecord::from_pairs([(
                "<b>",
                CellValue::Text("Tom & \"Jerry\" <script>".into()),
            )])],
        };
        let doc = render_group(&group, &IndexMap::new());
        assert!(doc.html.contains("<th>&lt;b&gt;</th>"));
        assert!(doc
            .html
            .contains("<td>Tom &amp; &quot;Jerry&quot; &lt;script&gt;</td>"));
        assert_eq!(doc.cells[0][0], "Tom & \"Jerry\" <script>");
    }
}
