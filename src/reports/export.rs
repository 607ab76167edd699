use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::AuditError;
use crate::ledger::AuditRecord;
use crate::utils::{format_fixed, yes_no};

/// Output column order
pub const CSV_HEADERS: [&str; 12] = [
    "Ticker",
    "Initial_Year",
    "Avg_Price_Paid",
    "Current_Price",
    "Current_Shares",
    "Position_Size_USD",
    "Total_PL_USD",
    "CAGR_Pct",
    "Exited",
    "Re_Entered",
    "Bi_Annual_Periods",
    "Years_Held",
];

/// One audit record per ticker, in ticker order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub records: Vec<AuditRecord>,
}

/// Presentation row: numbers fixed at 2 decimals, flags as Yes/No
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    ticker: &'a str,
    initial_year: i32,
    avg_price_paid: String,
    current_price: String,
    current_shares: String,
    position_size_usd: String,
    total_pl_usd: String,
    cagr_pct: String,
    exited: &'static str,
    re_entered: &'static str,
    bi_annual_periods: String,
    years_held: String,
}

impl<'a> From<&'a AuditRecord> for CsvRow<'a> {
    fn from(r: &'a AuditRecord) -> Self {
        CsvRow {
            ticker: &r.ticker,
            initial_year: r.initial_year,
            avg_price_paid: format_fixed(r.avg_price_paid, 2),
            current_price: format_fixed(r.current_price, 2),
            current_shares: format_fixed(r.current_shares, 2),
            position_size_usd: format_fixed(r.position_size_usd, 2),
            total_pl_usd: format_fixed(r.total_pl_usd, 2),
            cagr_pct: format_fixed(r.cagr_pct, 2),
            exited: yes_no(r.exited),
            re_entered: yes_no(r.re_entered),
            bi_annual_periods: format_fixed(r.bi_annual_periods, 2),
            years_held: format_fixed(r.years_held, 2),
        }
    }
}

impl AuditReport {
    /// Assemble from per-ticker records; output is ordered by ticker
    pub fn from_records(mut records: Vec<AuditRecord>) -> Self {
        records.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render the report as CSV (header always present)
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(CSV_HEADERS)?;
        for record in &self.records {
            wtr.serialize(CsvRow::from(record))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv_to(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Write the report to `path` in one shot
    ///
    /// Content goes to a temporary file next to the destination, which is
    /// then renamed over it; a failed run leaves any previous file intact.
    /// A destination held open by another program, or marked read-only,
    /// surfaces as [`AuditError::OutputLocked`].
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        // rename() would replace a read-only file on Unix
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.permissions().readonly() {
                return Err(AuditError::OutputLocked {
                    path: path.display().to_string(),
                }
                .into());
            }
        }

        let tmp_path = temp_path_for(path);

        let result = (|| -> Result<()> {
            let file = File::create(&tmp_path).map_err(|e| classify_io_error(e, path))?;
            self.write_csv_to(io::BufWriter::new(file))
                .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
            std::fs::rename(&tmp_path, path).map_err(|e| classify_io_error(e, path))?;
            Ok(())
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        result?;

        info!("Wrote {} audit rows to {}", self.records.len(), path.display());
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audit.csv".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Sharing/lock violations on Windows (files open in Excel)
const WINDOWS_SHARING_VIOLATION: i32 = 32;
const WINDOWS_LOCK_VIOLATION: i32 = 33;

/// Map a write failure to the locked-output error when that's what it is
pub(crate) fn classify_io_error(err: io::Error, path: &Path) -> anyhow::Error {
    let locked = err.kind() == io::ErrorKind::PermissionDenied
        || (cfg!(windows)
            && matches!(
                err.raw_os_error(),
                Some(WINDOWS_SHARING_VIOLATION) | Some(WINDOWS_LOCK_VIOLATION)
            ));

    if locked {
        AuditError::OutputLocked {
            path: path.display().to_string(),
        }
        .into()
    } else {
        anyhow::Error::new(err).context(format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn record(ticker: &str) -> AuditRecord {
        AuditRecord {
            ticker: ticker.to_string(),
            initial_year: 2000,
            avg_price_paid: dec!(50),
            current_price: dec!(80.004),
            current_shares: Decimal::ZERO,
            position_size_usd: Decimal::ZERO,
            total_pl_usd: dec!(3000),
            cagr_pct: dec!(4.8116),
            exited: true,
            re_entered: false,
            bi_annual_periods: dec!(20.00),
            years_held: dec!(10.0013689),
        }
    }

    #[test]
    fn test_csv_header_and_formatting() {
        let report = AuditReport::from_records(vec![record("XOM")]);
        let csv = report.to_csv_string().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADERS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "XOM,2000,50.00,80.00,0.00,0.00,3000.00,4.81,Yes,No,20.00,10.00"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let csv = AuditReport::default().to_csv_string().unwrap();
        assert_eq!(csv.trim_end(), CSV_HEADERS.join(","));
    }

    #[test]
    fn test_records_sorted_by_ticker() {
        let report = AuditReport::from_records(vec![record("XOM"), record("AAPL"), record("META")]);
        let tickers: Vec<&str> = report.records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "META", "XOM"]);
    }

    #[test]
    fn test_write_csv_replaces_file_and_cleans_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.csv");
        std::fs::write(&path, "stale").unwrap();

        AuditReport::from_records(vec![record("XOM")]).write_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Ticker,Initial_Year"));
        assert!(!dir.path().join(".summary.csv.tmp").exists());
    }

    #[test]
    fn test_write_csv_missing_directory_is_generic_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("summary.csv");
        let err = AuditReport::default().write_csv(&path).unwrap_err();
        assert!(err.downcast_ref::<AuditError>().is_none());
    }

    #[test]
    fn test_read_only_destination_is_locked_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.csv");
        std::fs::write(&path, "previous report").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let err = AuditReport::from_records(vec![record("XOM")])
            .write_csv(&path)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuditError>(),
            Some(AuditError::OutputLocked { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous report");
        assert!(!dir.path().join(".summary.csv.tmp").exists());
    }

    #[test]
    fn test_permission_denied_is_locked_output() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let classified = classify_io_error(err, Path::new("HF_Audit_Summary.csv"));
        match classified.downcast_ref::<AuditError>() {
            Some(AuditError::OutputLocked { path }) => assert_eq!(path, "HF_Audit_Summary.csv"),
            other => panic!("expected OutputLocked, got {:?}", other),
        }
    }
}
