//! Per-group XLSX re-encoding with `rust_xlsxwriter`.

use crate::dataset::CellValue;
use crate::pipeline::group::Group;
use rust_xlsxwriter::{Format, Workbook, XlsxError};

pub const SHEET_NAME: &str = "Sheet1";

/// Write one group as a single-sheet workbook: header row, then values.
///
/// Numbers stay numeric; nulls leave the cell empty.
pub fn encode_group(group: &Group) -> Result<Vec<u8>, XlsxError> {
    let columns: Vec<&str> = group
        .rows
        .first()
        .map(|r| r.columns().collect())
        .unwrap_or_default();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col_index(col)?, *name, &bold)?;
    }

    for (i, row) in group.rows.iter().enumerate() {
        let r = u32::try_from(i + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, name) in columns.iter().enumerate() {
            let c = col_index(col)?;
            match row.get(name) {
                Some(CellValue::Number(n)) => {
                    sheet.write_number(r, c, *n)?;
                }
                Some(CellValue::Text(s)) => {
                    sheet.write_string(r, c, s)?;
                }
                Some(CellValue::Null) | None => {}
            }
        }
    }

    workbook.save_to_buffer()
}

fn col_index(col: usize) -> Result<u16, XlsxError> {
    u16::try_from(col).map_err(|_| XlsxError::RowColumnLimitError)
}
