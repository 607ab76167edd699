use anyhow::{Context, Result};
use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{Cell, ColumnMapping, RawRow};

/// Parse a trade history CSV file
///
/// Accepts UTF-8 (with or without BOM) and falls back to Windows-1252,
/// which is what spreadsheet "Save as CSV" produces on most desktops.
/// The delimiter (`,`, `;` or tab) is sniffed from the header line.
pub fn parse_trade_history_csv<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawRow>> {
    let path = file_path.as_ref();
    info!("Parsing trade history CSV: {:?}", path);

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
    let content = decode(&bytes);

    parse_trade_history_str(&content)
}

/// Parse CSV content already decoded to text
pub fn parse_trade_history_str(content: &str) -> Result<Vec<RawRow>> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(content);
    debug!("CSV delimiter: {:?}", delimiter as char);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true) // Allow variable number of columns
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    debug!("CSV headers: {:?}", headers);

    let labels: Vec<&str> = headers.iter().collect();
    let mapping = ColumnMapping::from_header(&labels)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping CSV line {}: {}", idx + 2, e);
                continue;
            }
        };

        let cells: Vec<Cell> = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();

        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        rows.push(mapping.extract(&cells));
    }

    info!("Read {} rows from CSV", rows.len());
    Ok(rows)
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            debug!("CSV is not valid UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = WINDOWS_1252.decode(bytes);
            decoded
        }
    }
}

fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| header.matches(*d as char).count())
        .filter(|d| header.contains(*d as char))
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_separated() {
        let csv = "Stock,Ticker,Trade,Date,Shares,Price,Value\n\
                   EXXON MOBIL,XOM,BUY,2000-01-01,100,50,-5000\n\
                   ,,,,,,\n\
                   EXXON MOBIL,XOM,SELL,2010-01-01,-100,80,8000\n";
        let rows = parse_trade_history_str(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, Cell::Text("XOM".into()));
        assert_eq!(rows[1].value, Cell::Text("8000".into()));
    }

    #[test]
    fn test_parse_semicolon_with_padded_headers_and_bom() {
        let csv = "\u{feff} Stock ; Ticker ;Trade;Date;Shares;Price;Value\n\
                   WORLDCOM;;BUY;2001-05-02;10;20;-200\n";
        let rows = parse_trade_history_str(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stock, Cell::Text("WORLDCOM".into()));
        assert_eq!(rows[0].ticker, Cell::Empty);
    }

    #[test]
    fn test_missing_columns_is_an_error() {
        let csv = "Stock,Ticker,Date\nX,Y,2020-01-01\n";
        let err = parse_trade_history_str(csv).unwrap_err().to_string();
        assert!(err.contains("Missing required column(s)"));
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        // "CAFÉ" in Windows-1252
        let bytes = [b'C', b'A', b'F', 0xC9];
        assert_eq!(decode(&bytes), "CAFÉ");
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("single"), b',');
    }
}
