// Reports module - per-ticker position audit and CSV export

pub mod audit;
pub mod export;

pub use audit::{compute_cagr, summarize_position, PositionSummary, PriceSource};
pub use export::{AuditReport, CSV_HEADERS};
