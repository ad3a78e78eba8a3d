// 📂 Loader - discover a domain's exports, read them through the cache, unify
// Layout: <data_dir>/<domain>/raw/<domain>-YYYY-MM.xlsx  (snapshots in .../cache/)

use crate::cache::{CacheManager, SourceStamp};
use crate::config::DashboardConfig;
use crate::domain::{Domain, Period};
use crate::error::DashboardError;
use crate::normalizer::{normalize, NormalizeOptions, NormalizeReport, NormalizedTable};
use crate::spreadsheet::{is_supported, read_sheet};
use crate::table::{ColumnValues, Table};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Extra column recording which file each row came from
pub const SOURCE_COLUMN: &str = "ARCHIVO_ORIGEN";

// ============================================================================
// SOURCE FILE
// ============================================================================

/// One export on disk: identity = (domain, path, modification time)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub domain: Domain,
    pub path: PathBuf,
    pub period: Option<Period>,
    pub modified: SourceStamp,
}

impl SourceFile {
    pub fn from_path(domain: Domain, path: &Path) -> Result<Self> {
        let modified = SourceStamp::of_path(path)?;
        let period = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(Period::from_file_stem);

        Ok(SourceFile {
            domain,
            path: path.to_path_buf(),
            period,
            modified,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// A yearly file also covers every month of its year
    pub fn covers(&self, period: &Period) -> bool {
        match self.period {
            Some(p) if p == *period => true,
            Some(p) => p.month.is_none() && p.year == period.year,
            None => false,
        }
    }
}

/// Files of `domain` under its raw dir, newest period first, then by name
pub fn discover_files(domain: Domain, data_dir: &Path) -> Result<Vec<SourceFile>> {
    let dir = domain.raw_dir(data_dir);
    if !dir.exists() {
        debug!("{}: raw dir {} does not exist", domain, dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() || Domain::detect(&path) != Some(domain) || !is_supported(&path) {
            continue;
        }

        let source = SourceFile::from_path(domain, &path)?;
        if source.period.is_none() {
            warn!("⚠️  {}: no valid period in file name, skipping", path.display());
            continue;
        }
        files.push(source);
    }

    files.sort_by(|a, b| b.period.cmp(&a.period).then_with(|| a.file_name().cmp(&b.file_name())));
    Ok(files)
}

// ============================================================================
// LOAD RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoadedFile {
    pub source: SourceFile,
    pub rows: usize,
    pub cache_hit: bool,
    pub report: NormalizeReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Unified table of a domain plus what happened to each file
#[derive(Debug, Clone, Serialize)]
pub struct DomainLoad {
    pub domain: Domain,
    pub table: Table,
    pub files: Vec<LoadedFile>,
    pub skipped: Vec<SkippedFile>,
}

impl DomainLoad {
    /// Schema warnings across all loaded files, one per distinct column set
    pub fn schema_errors(&self) -> Vec<DashboardError> {
        let mut seen: Vec<&Vec<String>> = Vec::new();
        let mut errors = Vec::new();
        for file in &self.files {
            let missing = &file.report.missing_columns;
            if missing.is_empty() || seen.contains(&missing) {
                continue;
            }
            seen.push(missing);
            if let Some(e) = file.report.schema_error(self.domain) {
                errors.push(e);
            }
        }
        errors
    }

    pub fn cache_hits(&self) -> usize {
        self.files.iter().filter(|f| f.cache_hit).count()
    }

    /// Newest period among the loaded files
    pub fn latest_period(&self) -> Option<Period> {
        self.files.iter().filter_map(|f| f.source.period).max()
    }
}

// ============================================================================
// LOADER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Loader {
    data_dir: PathBuf,
    deduplicate_cartera: bool,
    cache: CacheManager,
}

impl Loader {
    pub fn new(config: &DashboardConfig) -> Self {
        Loader {
            data_dir: config.data_dir.clone(),
            deduplicate_cartera: config.deduplicate_cartera,
            cache: CacheManager::new(&config.data_dir),
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Options a domain is normalized with unless the caller asks otherwise
    pub fn options_for(&self, domain: Domain) -> NormalizeOptions {
        let has_key = !domain.schema().dedup_key.is_empty();
        NormalizeOptions {
            deduplicate: has_key && self.deduplicate_cartera,
        }
    }

    pub fn discover(&self, domain: Domain) -> Result<Vec<SourceFile>> {
        discover_files(domain, &self.data_dir)
    }

    /// Periods with at least one file, newest first
    pub fn periods(&self, domain: Domain) -> Result<Vec<Period>> {
        let mut periods: Vec<Period> = self
            .discover(domain)?
            .into_iter()
            .filter_map(|f| f.period)
            .collect();
        periods.dedup();
        Ok(periods)
    }

    /// Normalized table of one file, from its snapshot when still valid
    pub fn ingest(
        &self,
        source: &SourceFile,
        options: NormalizeOptions,
    ) -> Result<(NormalizedTable, bool)> {
        let schema = source.domain.schema();

        let outcome = self.cache.get_or_load(source, &options, || {
            info!("📄 reading {}", source.path.display());
            let sheet = read_sheet(&source.path, schema.header_row)?;
            normalize(&sheet, &schema, &options)
        })?;

        Ok((outcome.data, outcome.hit))
    }

    /// Every file of the domain, unified into one table
    pub fn load_domain(&self, domain: Domain) -> Result<DomainLoad> {
        let files = self.discover(domain)?;
        if files.is_empty() {
            return Err(DashboardError::MissingData {
                domain,
                dir: domain.raw_dir(&self.data_dir),
                period: None,
            }
            .into());
        }
        Ok(self.load_files(domain, files, self.options_for(domain)))
    }

    /// Only the files covering `period`
    pub fn load_period(&self, domain: Domain, period: &Period) -> Result<DomainLoad> {
        self.load_period_with(domain, period, self.options_for(domain))
    }

    /// `load_period` with explicit normalization options
    pub fn load_period_with(
        &self,
        domain: Domain,
        period: &Period,
        options: NormalizeOptions,
    ) -> Result<DomainLoad> {
        let files: Vec<SourceFile> = self
            .discover(domain)?
            .into_iter()
            .filter(|f| f.covers(period))
            .collect();
        if files.is_empty() {
            return Err(DashboardError::MissingData {
                domain,
                dir: domain.raw_dir(&self.data_dir),
                period: Some(period.to_string()),
            }
            .into());
        }
        Ok(self.load_files(domain, files, options))
    }

    /// Per-file failures are collected as skipped, never abort the load
    fn load_files(
        &self,
        domain: Domain,
        sources: Vec<SourceFile>,
        options: NormalizeOptions,
    ) -> DomainLoad {
        let mut tables = Vec::new();
        let mut files = Vec::new();
        let mut skipped = Vec::new();

        for source in sources {
            let ingested = self.ingest(&source, options).and_then(|(normalized, hit)| {
                let NormalizedTable { mut table, report } = normalized;
                if !table.has_column(SOURCE_COLUMN) {
                    let origin = vec![Some(source.file_name()); table.len()];
                    table.push_column(SOURCE_COLUMN, ColumnValues::Text(origin))?;
                }
                Ok((table, report, hit))
            });

            match ingested {
                Ok((table, report, hit)) => {
                    files.push(LoadedFile {
                        rows: table.len(),
                        source,
                        cache_hit: hit,
                        report,
                    });
                    tables.push(table);
                }
                Err(e) => {
                    warn!("⚠️  skipping {}: {:#}", source.path.display(), e);
                    skipped.push(SkippedFile {
                        path: source.path.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        let table = match Table::concat(tables) {
            Ok(t) => t,
            Err(e) => {
                warn!("⚠️  {}: could not unify tables: {:#}", domain, e);
                Table::default()
            }
        };

        info!(
            "✓ {}: {} rows from {} files ({} cached, {} skipped)",
            domain,
            table.len(),
            files.len(),
            files.iter().filter(|f| f.cache_hit).count(),
            skipped.len()
        );

        DomainLoad {
            domain,
            table,
            files,
            skipped,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    const CARTERA_PREAMBLE: &str = "EMPRESA\nNIT 900123456\nREPORTE CARTERA\nCIUDAD\nFECHA CORTE\nUSUARIO\n,,,,\n";

    fn config(dir: &TempDir) -> DashboardConfig {
        DashboardConfig {
            data_dir: dir.path().to_path_buf(),
            ..DashboardConfig::default()
        }
    }

    fn write_raw(dir: &TempDir, domain: Domain, name: &str, content: &str) -> PathBuf {
        let raw = domain.raw_dir(dir.path());
        fs::create_dir_all(&raw).unwrap();
        let path = raw.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_discover_filters_and_sorts_newest_first() {
        let dir = tempdir().unwrap();
        write_raw(&dir, Domain::Recaudo, "recaudo-2024-9.csv", "A\n1\n");
        write_raw(&dir, Domain::Recaudo, "recaudo-2024-10.csv", "A\n1\n");
        write_raw(&dir, Domain::Recaudo, "recaudo-2023-12.csv", "A\n1\n");
        write_raw(&dir, Domain::Recaudo, "recaudo-2024-13.csv", "A\n1\n");
        write_raw(&dir, Domain::Recaudo, "recaudo-2024-8.txt", "A\n1\n");
        write_raw(&dir, Domain::Recaudo, "cartera-2024-10.csv", "A\n1\n");

        let files = discover_files(Domain::Recaudo, dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(
            names,
            vec!["recaudo-2024-10.csv", "recaudo-2024-9.csv", "recaudo-2023-12.csv"]
        );
    }

    #[test]
    fn test_missing_data_for_empty_domain_and_period() {
        let dir = tempdir().unwrap();
        let loader = Loader::new(&config(&dir));

        let err = loader.load_domain(Domain::Pipeline).unwrap_err();
        assert_eq!(err.downcast_ref::<DashboardError>().unwrap().code(), "missing_data");

        write_raw(&dir, Domain::Pipeline, "pipeline-2024-10.csv", "FECHA,ESTADO\n2024-10-01,APROBADO\n");
        let period = Period::month(2024, 9).unwrap();
        let err = loader.load_period(Domain::Pipeline, &period).unwrap_err();
        let typed = err.downcast_ref::<DashboardError>().unwrap();
        assert_eq!(typed.code(), "missing_data");
        assert!(typed.to_string().contains("2024-09"));
    }

    #[test]
    fn test_load_domain_unifies_files_and_uses_cache() {
        let dir = tempdir().unwrap();
        write_raw(
            &dir,
            Domain::Recaudo,
            "recaudo-2024-10.csv",
            "Fuente,Por Vencer,Dias Vencidos\nBANCO,\"$1,000\",45\nCAJA,500,0\n",
        );
        write_raw(
            &dir,
            Domain::Recaudo,
            "recaudo-2024-9.csv",
            "FUENTE,POR_VENCER,ZONA\nBANCO,200,NORTE\n",
        );
        let loader = Loader::new(&config(&dir));

        let first = loader.load_domain(Domain::Recaudo).unwrap();
        assert_eq!(first.table.len(), 3);
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.cache_hits(), 0);
        assert_eq!(first.table.sum("POR_VENCER"), Some(1700.0));
        assert_eq!(
            first.table.text(SOURCE_COLUMN).unwrap()[2],
            Some("recaudo-2024-9.csv".to_string())
        );
        assert_eq!(first.table.text("ZONA").unwrap()[0], None);
        assert_eq!(first.latest_period(), Period::month(2024, 10));

        let second = loader.load_domain(Domain::Recaudo).unwrap();
        assert_eq!(second.cache_hits(), 2);
        assert_eq!(second.table, first.table);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = tempdir().unwrap();
        write_raw(&dir, Domain::Pipeline, "pipeline-2024-10.xlsx", "definitely not a workbook");
        write_raw(&dir, Domain::Pipeline, "pipeline-2024-9.csv", "FECHA,ESTADO\n2024-09-03,RECHAZADO\n");
        let loader = Loader::new(&config(&dir));

        let load = loader.load_domain(Domain::Pipeline).unwrap();
        assert_eq!(load.table.len(), 1);
        assert_eq!(load.skipped.len(), 1);
        assert!(load.skipped[0].path.ends_with("pipeline-2024-10.xlsx"));
    }

    #[test]
    fn test_cartera_header_offset_and_dedup() {
        let dir = tempdir().unwrap();
        let body = "Cuenta,Razón Social,Placa,Vencimiento,Total Cuota\n\
                    130505010,ACME,ABC123,30/10/2024,100\n\
                    130505010,ACME,ABC123,30/10/2024,100\n\
                    130505011,BETA,XYZ999,30/10/2024,50\n";
        write_raw(
            &dir,
            Domain::Cartera,
            "cartera-2024-10.csv",
            &format!("{}{}", CARTERA_PREAMBLE, body),
        );
        let loader = Loader::new(&config(&dir));

        let period = Period::month(2024, 10).unwrap();
        let load = loader.load_period(Domain::Cartera, &period).unwrap();
        assert_eq!(load.table.len(), 2);
        assert_eq!(load.files[0].report.duplicates_removed, 1);
        assert_eq!(load.table.sum("Total Cuota"), Some(150.0));
        // Required bucket columns absent from this export
        assert_eq!(load.schema_errors().len(), 1);
    }

    #[test]
    fn test_same_stem_sources_each_keep_their_snapshot() {
        let dir = tempdir().unwrap();
        write_raw(&dir, Domain::Recaudo, "recaudo-2024-9.csv", "FUENTE,POR_VENCER\nBANCO,100\n");
        write_raw(&dir, Domain::Recaudo, "recaudo-2024-9.CSV", "FUENTE,POR_VENCER\nCAJA,50\n");
        let loader = Loader::new(&config(&dir));
        let period = Period::month(2024, 9).unwrap();

        let first = loader.load_period(Domain::Recaudo, &period).unwrap();
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.cache_hits(), 0);

        for _ in 0..2 {
            let again = loader.load_period(Domain::Recaudo, &period).unwrap();
            assert_eq!(again.cache_hits(), again.files.len());
            assert_eq!(again.table.sum("POR_VENCER"), Some(150.0));
        }
    }

    #[test]
    fn test_cartera_raw_and_dedup_loads_share_the_cache() {
        let dir = tempdir().unwrap();
        let body = "Cuenta,Razón Social,Placa,Vencimiento,Total Cuota\n\
                    130505010,ACME,ABC123,30/10/2024,100\n\
                    130505010,ACME,ABC123,30/10/2024,100\n";
        write_raw(
            &dir,
            Domain::Cartera,
            "cartera-2024-10.csv",
            &format!("{}{}", CARTERA_PREAMBLE, body),
        );
        let loader = Loader::new(&config(&dir));
        let period = Period::month(2024, 10).unwrap();
        let raw = NormalizeOptions { deduplicate: false };

        let dedup = loader.load_period(Domain::Cartera, &period).unwrap();
        let full = loader.load_period_with(Domain::Cartera, &period, raw).unwrap();
        assert_eq!(dedup.table.sum("Total Cuota"), Some(100.0));
        assert_eq!(full.table.sum("Total Cuota"), Some(200.0));
        assert_eq!(full.files[0].report.duplicates_removed, 0);

        assert_eq!(loader.load_period(Domain::Cartera, &period).unwrap().cache_hits(), 1);
        assert_eq!(
            loader
                .load_period_with(Domain::Cartera, &period, raw)
                .unwrap()
                .cache_hits(),
            1
        );
    }

    #[test]
    fn test_yearly_file_covers_its_months() {
        let dir = tempdir().unwrap();
        write_raw(
            &dir,
            Domain::Colocacion,
            "colocacion-2024.csv",
            "TOTALFAC,ANIO,MES\n1000,2024,10\n",
        );
        let loader = Loader::new(&config(&dir));

        let load = loader
            .load_period(Domain::Colocacion, &Period::month(2024, 3).unwrap())
            .unwrap();
        assert_eq!(load.table.len(), 1);
        assert_eq!(loader.periods(Domain::Colocacion).unwrap(), vec![Period::year(2024)]);
    }
}
