// ⚠️ Dashboard errors - the four failure kinds the pages care about
// Everything else (I/O, CSV, JSON) travels as anyhow::Error with context.

use crate::domain::Domain;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    /// No source files for the requested domain/period. Non-fatal for the app.
    #[error("no {domain} files found in {}{}", dir.display(), period_suffix(period))]
    MissingData {
        domain: Domain,
        dir: PathBuf,
        period: Option<String>,
    },

    /// One source file could not be read; it is skipped and ingestion goes on.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// Expected columns are absent; affected KPIs come out null/zero.
    #[error("{domain}: expected columns missing: {}", columns.join(", "))]
    Schema {
        domain: Domain,
        columns: Vec<String>,
    },

    /// Snapshot unreadable; callers treat it as a cache miss.
    #[error("cache entry {} is unreadable: {reason}", path.display())]
    CacheCorruption { path: PathBuf, reason: String },
}

fn period_suffix(period: &Option<String>) -> String {
    match period {
        Some(p) => format!(" for period {p}"),
        None => String::new(),
    }
}

impl DashboardError {
    /// Short code for logs and JSON output
    pub fn code(&self) -> &'static str {
        match self {
            DashboardError::MissingData { .. } => "missing_data",
            DashboardError::Parse { .. } => "parse",
            DashboardError::Schema { .. } => "schema",
            DashboardError::CacheCorruption { .. } => "cache_corruption",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_data_message_mentions_period() {
        let err = DashboardError::MissingData {
            domain: Domain::Recaudo,
            dir: PathBuf::from("data/recaudo/raw"),
            period: Some("2024-10".to_string()),
        };

        let msg = err.to_string();
        assert!(msg.contains("recaudo"));
        assert!(msg.contains("2024-10"));
        assert_eq!(err.code(), "missing_data");
    }

    #[test]
    fn test_schema_message_lists_columns() {
        let err = DashboardError::Schema {
            domain: Domain::Cartera,
            columns: vec!["Placa".to_string(), "Vencimiento".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "cartera: expected columns missing: Placa, Vencimiento"
        );
    }
}
