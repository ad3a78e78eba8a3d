// Recaudo Insights - Core Library
// Loader → Normalizer → Cache → KPI aggregation for the BI dashboard exports

pub mod aging;       // Aging buckets (por vencer / 30 / 60 / 90 / +90)
pub mod cache;       // Per-file normalized snapshots
pub mod config;
pub mod domain;      // Domains, canonical schemas, periods
pub mod error;
pub mod export;      // CSV + JSON outputs
pub mod kpis;        // Recaudo, cartera, pipeline, colocación
pub mod loader;
pub mod normalizer;
pub mod spreadsheet; // xlsx/xls/ods/csv → raw cells
pub mod table;

// Re-export commonly used types
pub use aging::{AgingBucket, BucketCounts};
pub use cache::{CacheManager, CacheOutcome, SourceStamp};
pub use config::DashboardConfig;
pub use domain::{Domain, DomainSchema, Period};
pub use error::DashboardError;
pub use export::{export_file_name, format_cop, write_csv, write_kpis_json};
pub use kpis::{summarize, DomainKpis, KpiReport, PeriodDelta};
pub use loader::{discover_files, DomainLoad, Loader, SourceFile};
pub use normalizer::{normalize, NormalizeOptions, NormalizeReport, NormalizedTable};
pub use spreadsheet::{read_sheet, RawCell, RawSheet};
pub use table::{ColumnValues, Table};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
