use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{Cell, ColumnMapping, RawRow};

/// Parse a trade history workbook (.xlsx/.xls/.ods)
///
/// Uses the first sheet that carries a header row with all required
/// columns. Rows above the header are ignored, fully empty rows skipped.
pub fn parse_trade_history_excel<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawRow>> {
    let path = file_path.as_ref();
    info!("Parsing trade history workbook: {:?}", path);

    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open Excel file {}", path.display()))?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.is_empty() {
        return Err(anyhow!("No sheets found in workbook"));
    }

    let mut first_error = None;

    for sheet_name in &sheet_names {
        let range = workbook
            .worksheet_range(sheet_name)
            .with_context(|| format!("Failed to read worksheet '{}'", sheet_name))?;

        let rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| row.iter().map(to_cell).collect())
            .collect();

        match find_header(&rows) {
            Ok((header_idx, mapping)) => {
                info!("Found trade history on sheet '{}'", sheet_name);
                debug!("Column mapping: {:?}", mapping);

                let parsed: Vec<RawRow> = rows
                    .iter()
                    .skip(header_idx + 1)
                    .filter(|row| !row.iter().all(Cell::is_empty))
                    .map(|row| mapping.extract(row))
                    .collect();

                info!("Read {} rows from workbook", parsed.len());
                return Ok(parsed);
            }
            Err(e) => {
                warn!("Sheet '{}' has no usable header: {}", sheet_name, e);
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.unwrap_or_else(|| anyhow!("Could not find header row with required columns")))
}

/// Locate the header row: the first row that maps every required column.
/// When none does, the error for the first non-empty row is returned.
fn find_header(rows: &[Vec<Cell>]) -> Result<(usize, ColumnMapping)> {
    let mut first_error = None;

    for (idx, row) in rows.iter().enumerate() {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        let labels: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        match ColumnMapping::from_header(&labels) {
            Ok(mapping) => return Ok((idx, mapping)),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.unwrap_or_else(|| anyhow!("Worksheet is empty")))
}

/// Convert a calamine cell into our loosely-typed cell
fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        _ => Cell::Empty,
    }
}

/// Excel serial day number (1900 date system) to a calendar date
pub(crate) fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    excel_epoch.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_serial_to_date() {
        // 36526 = 2000-01-01 in the 1900 date system
        assert_eq!(
            excel_serial_to_date(36526.0),
            NaiveDate::from_ymd_opt(2000, 1, 1)
        );
        // Time-of-day fraction is dropped
        assert_eq!(
            excel_serial_to_date(36526.75),
            NaiveDate::from_ymd_opt(2000, 1, 1)
        );
        assert_eq!(excel_serial_to_date(f64::NAN), None);
        assert_eq!(excel_serial_to_date(-1.0), None);
    }

    #[test]
    fn test_find_header_skips_title_rows() {
        let rows = vec![
            vec![Cell::Text("Trade History Export".into())],
            vec![Cell::Empty, Cell::Empty],
            ["Stock", "Ticker", "Trade", "Date", "Shares", "Price", "Value"]
                .iter()
                .map(|s| Cell::Text(s.to_string()))
                .collect(),
        ];
        let (idx, _) = find_header(&rows).unwrap();
        assert_eq!(idx, 2);
    }

    #[test]
    fn test_find_header_missing_columns() {
        let rows = vec![vec![Cell::Text("Stock".into()), Cell::Text("Date".into())]];
        let err = find_header(&rows).unwrap_err().to_string();
        assert!(err.contains("Missing required column(s)"));
    }

    #[test]
    fn test_to_cell_conversions() {
        assert_eq!(to_cell(&Data::Int(5)), Cell::Number(5.0));
        assert_eq!(to_cell(&Data::String("XOM".into())), Cell::Text("XOM".into()));
        assert_eq!(to_cell(&Data::Empty), Cell::Empty);
    }
}
