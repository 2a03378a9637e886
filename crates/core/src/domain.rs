use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A registered directory that is scanned as one catalog partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRoot {
    pub id: i64,
    pub path: PathBuf,
    pub added_at: i64,
}

/// Change-detection strategy for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    /// Content hash of every file compared to the stored hash.
    Integrity,
    /// Stored last-write-time compared to the current one.
    Date,
    /// Date comparison, newest first, stopping at the first unchanged file.
    Quick,
    /// Re-extract metadata for catalogued files without change detection.
    Reload,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Integrity => "normal",
            ScanMode::Date => "date",
            ScanMode::Quick => "quick",
            ScanMode::Reload => "reload",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "integrity" => Ok(ScanMode::Integrity),
            "date" => Ok(ScanMode::Date),
            "quick" => Ok(ScanMode::Quick),
            "reload" => Ok(ScanMode::Reload),
            other => Err(format!(
                "unknown scan mode `{other}` (expected normal, date, quick or reload)"
            )),
        }
    }
}

/// Per-batch outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errors: usize,
}

impl ScanCounters {
    /// Every enumerated file must end up added, updated, skipped or in error.
    pub fn is_consistent(&self) -> bool {
        self.found == self.added + self.updated + self.skipped + self.errors
    }
}

impl fmt::Display for ScanCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Files Found: {} Added: {} Updated: {} Skipped: {} Removed: {} Error: {}",
            self.found, self.added, self.updated, self.skipped, self.removed, self.errors
        )
    }
}

/// One run of the scan controller over one root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBatch {
    pub id: i64,
    pub root_id: i64,
    pub mode: ScanMode,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub counters: ScanCounters,
    pub elapsed_secs: Option<i64>,
    pub summary: Option<String>,
    /// Set when the counters did not reconcile at finalize time.
    pub warning: bool,
}

/// Normalized attributes resolved from the extracted metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rating: Option<String>,
    pub date_taken: Option<String>,
    pub date_taken_tz: Option<String>,
    pub device: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub creator: Option<String>,
    pub copyright: Option<String>,
}

/// One indexed file.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub id: i64,
    pub root_id: i64,
    /// Batch that first added the file.
    pub batch_id: i64,
    /// Batch that last modified the record.
    pub last_batch_id: i64,
    pub path: PathBuf,
    pub file_name: String,
    pub album: String,
    pub format: String,
    pub size: u64,
    pub file_created: Option<i64>,
    pub mtime: i64,
    pub sha256: String,
    /// Normalized general payload from the metadata tool.
    pub metadata: Option<String>,
    /// Structured (regions/collections/persons) payload, when present.
    pub structured: Option<String>,
    pub fields: AssetFields,
    pub thumbnail: Option<Vec<u8>>,
    pub fingerprint: Option<String>,
    pub record_added: i64,
    pub record_modified: Option<i64>,
}

/// Region geometry. Coordinates are fractions of the image, centre-origin, y-down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionArea {
    pub unit: Option<String>,
    pub h: Option<f64>,
    pub w: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub d: Option<f64>,
}

/// A region as reported by the metadata tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: Option<String>,
    pub region_type: Option<String>,
    pub area: RegionArea,
}

/// A region stored in the catalog, with its cached preview.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub id: i64,
    pub asset_id: i64,
    pub spec: RegionSpec,
    pub thumbnail: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Collection {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Person {
    pub name: String,
    pub identifier: String,
}

/// Prior metadata of an asset, captured just before it was overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSnapshot {
    pub id: i64,
    pub asset_id: i64,
    pub batch_id: Option<i64>,
    pub captured_at: i64,
    pub metadata: Option<String>,
    pub structured: Option<String>,
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: i64,
    pub batch_id: Option<i64>,
    pub path: PathBuf,
    pub message: String,
    pub logged_at: i64,
}

/// A candidate file found while walking a root.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub format: String,
    pub album: String,
    pub size: u64,
    pub mtime: i64,
    pub created: Option<i64>,
}

/// Catalog state needed to classify a file.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownAsset {
    pub id: i64,
    pub sha256: String,
    pub mtime: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub total_roots: usize,
    pub total_assets: usize,
    pub total_regions: usize,
    pub total_batches: usize,
}
