// 💾 Cache Manager - one columnar snapshot per source file
// A snapshot is valid only while the source file keeps the exact mtime it was built from.

use crate::domain::Domain;
use crate::error::DashboardError;
use crate::loader::SourceFile;
use crate::normalizer::{NormalizeOptions, NormalizedTable};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Bump when the snapshot layout or normalization output changes
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const SNAPSHOT_SUFFIX: &str = ".snapshot.json";

// ============================================================================
// SOURCE STAMP
// ============================================================================

/// Modification time of a source file, kept at full (nanosecond) precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceStamp {
    pub secs: i64,
    pub nanos: u32,
}

impl SourceStamp {
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => SourceStamp {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(e) => {
                let d = e.duration();
                SourceStamp {
                    secs: -(d.as_secs() as i64),
                    nanos: d.subsec_nanos(),
                }
            }
        }
    }

    pub fn of_path(path: &Path) -> Result<Self> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to read modification time of {}", path.display()))?;
        Ok(SourceStamp::from_system_time(modified))
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot<P> {
    format_version: u32,
    domain: Domain,
    source_name: String,
    source_modified: SourceStamp,
    options: NormalizeOptions,
    /// SHA-256 of the serialized payload
    checksum: String,
    payload: P,
}

fn checksum(payload_json: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_json);
    format!("{:x}", hasher.finalize())
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub data: NormalizedTable,
    /// true when served from the snapshot without calling the loader
    pub hit: bool,
}

// ============================================================================
// CACHE MANAGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct CacheManager {
    data_dir: PathBuf,
}

impl CacheManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        CacheManager {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data_dir>/<domain>/cache/<file_name>.<options tag>.snapshot.json`
    ///
    /// The full file name keeps `x.csv` and `x.xlsx` apart; the tag keeps
    /// deduplicated and raw builds of the same file side by side.
    pub fn snapshot_path(&self, source: &SourceFile, options: &NormalizeOptions) -> PathBuf {
        source.domain.cache_dir(&self.data_dir).join(format!(
            "{}.{}{}",
            source.file_name(),
            options.tag(),
            SNAPSHOT_SUFFIX
        ))
    }

    /// Return the cached table for `source`, or build it with `load` and store it.
    ///
    /// Unreadable snapshots are logged and treated as a miss. A snapshot that
    /// cannot be written only costs a warning; the loaded table is still returned.
    pub fn get_or_load<F>(
        &self,
        source: &SourceFile,
        options: &NormalizeOptions,
        load: F,
    ) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Result<NormalizedTable>,
    {
        let path = self.snapshot_path(source, options);

        match self.read_valid(&path, source, options) {
            Ok(Some(data)) => {
                debug!("💾 cache hit: {}", source.file_name());
                return Ok(CacheOutcome { data, hit: true });
            }
            Ok(None) => debug!("cache miss: {}", source.file_name()),
            Err(e) => warn!("⚠️  {} (rebuilding)", e),
        }

        let data = load()?;
        match self.write_snapshot(&path, source, options, &data) {
            Ok(()) => debug!("snapshot written: {}", path.display()),
            Err(e) => warn!("⚠️  could not write snapshot {}: {:#}", path.display(), e),
        }

        Ok(CacheOutcome { data, hit: false })
    }

    /// Ok(None) = absent or stale; Err = present but unusable
    fn read_valid(
        &self,
        path: &Path,
        source: &SourceFile,
        options: &NormalizeOptions,
    ) -> std::result::Result<Option<NormalizedTable>, DashboardError> {
        if !path.exists() {
            return Ok(None);
        }

        let corrupt = |reason: String| DashboardError::CacheCorruption {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let snapshot: Snapshot<NormalizedTable> =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let payload_json =
            serde_json::to_vec(&snapshot.payload).map_err(|e| corrupt(e.to_string()))?;
        if checksum(&payload_json) != snapshot.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let fresh = snapshot.domain == source.domain
            && snapshot.source_name == source.file_name()
            && snapshot.source_modified == source.modified
            && snapshot.options == *options;

        Ok(fresh.then_some(snapshot.payload))
    }

    /// Write to a temp file in the cache dir, fsync, then rename over the target
    fn write_snapshot(
        &self,
        path: &Path,
        source: &SourceFile,
        options: &NormalizeOptions,
        data: &NormalizedTable,
    ) -> Result<()> {
        let dir = path
            .parent()
            .context("snapshot path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache dir {}", dir.display()))?;

        let payload_json = serde_json::to_vec(data).context("Failed to serialize table")?;
        let snapshot = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            domain: source.domain,
            source_name: source.file_name(),
            source_modified: source.modified,
            options: *options,
            checksum: checksum(&payload_json),
            payload: data,
        };
        let bytes = serde_json::to_vec(&snapshot).context("Failed to serialize snapshot")?;

        let temp_path = dir.join(format!(".{}.{}.tmp", source.file_name(), Uuid::new_v4()));
        let written = (|| -> Result<()> {
            let mut file = File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        })();

        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written
    }

    /// Drop every snapshot of one source file. Returns whether any existed.
    pub fn invalidate(&self, source: &SourceFile) -> Result<bool> {
        let mut removed = false;
        for options in NormalizeOptions::ALL {
            let path = self.snapshot_path(source, &options);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Delete every snapshot (and leftover temp file) of a domain. Returns snapshots removed.
    pub fn clear(&self, domain: Domain) -> Result<usize> {
        let dir = domain.cache_dir(&self.data_dir);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if name.ends_with(SNAPSHOT_SUFFIX) {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            } else if name.starts_with('.') && name.ends_with(".tmp") {
                let _ = fs::remove_file(&path);
            }
        }

        info!("🗑️  {}: cleared {} snapshots", domain, removed);
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
