//! Tabular decoding: spreadsheet bytes → [`Dataset`].
//!
//! Workbook containers (xlsx/xlsm/xlsb via ZIP, legacy xls via OLE2, ods)
//! are read with `calamine`; any other UTF-8 payload is treated as CSV.
//! Both paths produce the same raw grid of [`CellValue`]s, which is then
//! turned into records the same way a spreadsheet library's
//! "sheet to JSON" conversion does:
//!
//! - the first non-empty row is the header row
//! - empty header cells are named `__EMPTY`, `__EMPTY_1`, …
//! - repeated header names get `_1`, `_2`, … suffixes
//! - fully blank rows below the header are dropped

use crate::dataset::{CellValue, Dataset, RowRecord};
use crate::error::SplitError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::collections::HashSet;
use std::io::Cursor;
use tracing::debug;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &str = "\u{FEFF}";

/// Container format detected from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// ZIP or OLE2 workbook, read with calamine.
    Workbook,
    /// Plain UTF-8 text, read as comma-separated values.
    Csv,
}

/// Detect the container format, or `None` for unrecognised binary data.
pub fn sniff_format(bytes: &[u8]) -> Option<SourceFormat> {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        Some(SourceFormat::Workbook)
    } else if std::str::from_utf8(bytes).is_ok() {
        Some(SourceFormat::Csv)
    } else {
        None
    }
}

/// Decode a spreadsheet byte buffer into a [`Dataset`].
///
/// `sheet` selects a worksheet by name; `None` means the first sheet.
///
/// # Errors
/// - [`SplitError::Decode`] — empty buffer, unknown format, corrupt workbook,
///   no sheets, or an unknown sheet name
/// - [`SplitError::EmptyDataset`] — the sheet has no data rows
pub fn decode(bytes: &[u8], sheet: Option<&str>) -> Result<Dataset, SplitError> {
    if bytes.is_empty() {
        return Err(SplitError::Decode {
            detail: "input is empty".to_string(),
        });
    }

    let grid = match sniff_format(bytes) {
        Some(SourceFormat::Workbook) => read_workbook(bytes, sheet)?,
        Some(SourceFormat::Csv) => read_csv(bytes)?,
        None => {
            return Err(SplitError::Decode {
                detail: "not a recognised spreadsheet format".to_string(),
            })
        }
    };

    build_dataset(grid)
}

// ── Format readers ───────────────────────────────────────────────────────

fn read_workbook(bytes: &[u8], sheet: Option<&str>) -> Result<Vec<Vec<CellValue>>, SplitError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| SplitError::Decode {
            detail: e.to_string(),
        })?;

    let names: Vec<String> = workbook.sheet_names().to_vec();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| SplitError::Decode {
                detail: format!("sheet '{wanted}' not found; available: {names:?}"),
            })?,
        None => names.first().cloned().ok_or_else(|| SplitError::Decode {
            detail: "workbook has no sheets".to_string(),
        })?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| SplitError::Decode {
            detail: format!("sheet '{name}': {e}"),
        })?;
    debug!("Sheet '{}' spans {:?}", name, range.get_size());

    Ok(range
        .rows()
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect())
}

fn workbook_cell(c: &Data) -> CellValue {
    match c {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        other => CellValue::Text(other.to_string()),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>, SplitError> {
    let text = std::str::from_utf8(bytes).map_err(|e| SplitError::Decode {
        detail: e.to_string(),
    })?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| SplitError::Decode {
            detail: format!("CSV line {}: {e}", idx + 1),
        })?;
        grid.push(record.iter().map(csv_cell).collect());
    }
    Ok(grid)
}

/// Numeric-looking CSV fields become numbers, as a spreadsheet would import them.
fn csv_cell(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Null;
    }
    let trimmed = raw.trim();
    let looks_numeric = trimmed
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if looks_numeric {
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
    }
    CellValue::Text(raw.to_string())
}

// ── Grid → records ───────────────────────────────────────────────────────

fn build_dataset(grid: Vec<Vec<CellValue>>) -> Result<Dataset, SplitError> {
    let mut rows = grid.into_iter();

    let header_cells = rows
        .by_ref()
        .find(|r| r.iter().any(|c| !c.is_null()))
        .ok_or(SplitError::EmptyDataset)?;
    let headers = unique_headers(&header_cells);

    let mut records = Vec::new();
    for row in rows {
        if row.iter().all(CellValue::is_null) {
            continue;
        }
        let mut cells = row.into_iter();
        let record = RowRecord::from_pairs(
            headers
                .iter()
                .map(|h| (h.clone(), cells.next().unwrap_or(CellValue::Null))),
        );
        records.push(record);
    }

    if records.is_empty() {
        return Err(SplitError::EmptyDataset);
    }

    debug!(
        "Decoded {} rows × {} columns",
        records.len(),
        headers.len()
    );
    Ok(Dataset::new(headers, records))
}

fn unique_headers(cells: &[CellValue]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(cells.len());
    let mut empty_count = 0usize;
    let mut out = Vec::with_capacity(cells.len());

    for cell in cells {
        let mut base = cell.to_display();
        if base.is_empty() {
            base = if empty_count == 0 {
                "__EMPTY".to_string()
            } else {
                format!("__EMPTY_{empty_count}")
            };
            empty_count += 1;
        }

        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
