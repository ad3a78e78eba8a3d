// ⚙️ Dashboard Config - JSON file + environment overrides
// Every field has a default, so a missing file is a valid configuration.

use crate::kpis::pipeline::normalize_state;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_VAR: &str = "DASHBOARD_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "dashboard.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Root holding `<domain>/raw` and `<domain>/cache`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Pipeline states left out of every pipeline KPI
    #[serde(default = "default_excluded_states")]
    pub excluded_states: Vec<String>,

    /// Drop cartera rows repeating (Vencimiento, Razon Social, Placa)
    #[serde(default = "default_true")]
    pub deduplicate_cartera: bool,

    #[serde(default)]
    pub ai_summary: AiSummaryConfig,
}

/// Settings for the executive-summary generator. Only carried, not used here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSummaryConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment only (GEMINI_API_KEY), never read from or written to the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_excluded_states() -> Vec<String> {
    ["SOLICITADO", "EN ANALISIS", "EXCEPCIONADO", "REPROCESO", "PRE-LEGALIZADO"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

impl Default for AiSummaryConfig {
    fn default() -> Self {
        AiSummaryConfig {
            model: default_model(),
            api_key: None,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_dir: default_data_dir(),
            excluded_states: default_excluded_states(),
            deduplicate_cartera: true,
            ai_summary: AiSummaryConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Load config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: DashboardConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// `$DASHBOARD_CONFIG` (or ./dashboard.json) if present, then environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            info!("⚙️  config: {}", path);
            DashboardConfig::from_file(&path)?
        } else {
            debug!("no config file at {}, using defaults", path);
            DashboardConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply DASHBOARD_DATA_DIR, GEMINI_API_KEY and GEMINI_MODEL. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DASHBOARD_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.ai_summary.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.ai_summary.model = model;
        }
    }

    /// Excluded states compared the way pipeline states are normalized
    pub fn is_excluded_state(&self, state: &str) -> bool {
        let state = normalize_state(state);
        self.excluded_states
            .iter()
            .any(|s| normalize_state(s) == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.deduplicate_cartera);
        assert_eq!(config.excluded_states.len(), 5);
        assert_eq!(config.ai_summary.model, "gemini-2.0-flash-lite");
        assert!(config.ai_summary.api_key.is_none());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        fs::write(
            &path,
            r#"{ "data_dir": "/srv/bi", "deduplicate_cartera": false, "ai_summary": { "api_key": "leak" } }"#,
        )
        .unwrap();

        let config = DashboardConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/bi"));
        assert!(!config.deduplicate_cartera);
        assert_eq!(config.excluded_states, default_excluded_states());
        // The key is never taken from the file
        assert!(config.ai_summary.api_key.is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        fs::write(&path, "{ data_dir: ").unwrap();
        assert!(DashboardConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DASHBOARD_DATA_DIR", "/tmp/exports"),
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_MODEL", " "),
        ]
        .into_iter()
        .collect();

        let mut config = DashboardConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(config.ai_summary.api_key.as_deref(), Some("secret"));
        assert_eq!(config.ai_summary.model, "gemini-2.0-flash-lite");

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_excluded_state_matching() {
        let config = DashboardConfig::default();
        assert!(config.is_excluded_state(" en análisis "));
        assert!(config.is_excluded_state("Pre-Legalizado"));
        assert!(!config.is_excluded_state("APROBADO"));
    }
}
