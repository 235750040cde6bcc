//! Spreadsheet rendering via calamine.
//!
//! Only the first sheet is read. The header row and every data row are
//! rendered as lines of cells separated by two spaces; empty cells render
//! as empty strings, dates as `YYYY-MM-DD` (with `HH:MM:SS` when the cell
//! carries a time of day) and error cells as their Excel code (`#DIV/0!`).
//! Exact layout is not load-bearing downstream (the text
//! is normalised and handed to the model), only that every cell survives.

use crate::error::Doc2JsonError;
use crate::format::DocumentFormat;
use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Range, Reader};
use std::io::Cursor;
use tracing::{debug, warn};

const CELL_SEPARATOR: &str = "  ";

/// Render one cell as text.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => e.to_string(),
        Data::DateTime(dt) => datetime_text(dt),
        Data::DateTimeIso(dt) => dt.clone(),
        Data::DurationIso(d) => d.clone(),
    }
}

/// Calendar value of a date-formatted cell. Durations and serials outside
/// the calendar fall back to the raw number.
fn datetime_text(dt: &ExcelDateTime) -> String {
    let serial = dt.as_f64();
    match dt.as_datetime() {
        Some(value) if dt.is_datetime() => {
            if serial.fract() == 0.0 {
                value.format("%Y-%m-%d").to_string()
            } else {
                value.format("%Y-%m-%d %H:%M:%S").to_string()
            }
        }
        _ => serial.to_string(),
    }
}

/// Render a sheet's used range as text, one line per row.
pub fn render_range(range: &Range<Data>) -> String {
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(cell_text)
                .collect::<Vec<_>>()
                .join(CELL_SEPARATOR)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Blocking: render the first sheet of an `.xlsx` / `.xls` workbook.
pub fn extract_text_blocking(bytes: &[u8]) -> Result<String, Doc2JsonError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        Doc2JsonError::extraction(DocumentFormat::Spreadsheet, format!("unreadable workbook: {e}"))
    })?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.len() > 1 {
        warn!(
            "Workbook has {} sheets; only '{}' is processed",
            sheet_names.len(),
            sheet_names[0]
        );
    }

    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            return Err(Doc2JsonError::extraction(
                DocumentFormat::Spreadsheet,
                format!("unreadable first sheet: {e}"),
            ))
        }
        None => {
            debug!("Workbook has no sheets");
            return Ok(String::new());
        }
    };

    let (rows, cols) = range.get_size();
    debug!("First sheet: {} rows × {} cols", rows, cols);
    Ok(render_range(&range))
}
