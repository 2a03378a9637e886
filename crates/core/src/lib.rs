pub mod cache;
pub mod catalog;
pub mod detector;
pub mod device;
pub mod domain;
pub mod error;
pub mod exiftool;
pub mod fields;
pub mod hasher;
pub mod reconcile;
pub mod retry;
pub mod scan;
pub mod scanner;
pub mod structured;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use catalog::{Catalog, Lookup, OrphanSweep};
use domain::*;
use error::{Error, Result};
use exiftool::{ExifTool, Transport};
use retry::RetryPolicy;

pub use scan::{FileOutcome, RootFailure, ScanOptions, ScanProgress, ScanReport};

/// Config key holding the ignore-folder deny-list, one entry per line.
pub const IGNORE_FOLDERS_KEY: &str = "ignore_folders";
/// Config key holding the metadata tool program.
pub const EXIFTOOL_PATH_KEY: &str = "exiftool_path";
pub const DEFAULT_EXIFTOOL: &str = "exiftool";

/// The main entry point for the photo index.
///
/// Holds only the catalog location: every unit of work opens its own short-lived
/// connection, so several invocations can share one catalog.
pub struct Library {
    catalog_path: PathBuf,
    retry: RetryPolicy,
}

impl Library {
    /// Open or create a catalog at the given path.
    pub fn open(catalog_path: &Path) -> Result<Self> {
        Catalog::open(catalog_path)?;
        Ok(Self {
            catalog_path: catalog_path.to_path_buf(),
            retry: RetryPolicy::default(),
        })
    }

    /// Retry policy used by the management operations (scans use `ScanOptions::retry`).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Catalog) -> Result<T>) -> Result<T> {
        let catalog = Catalog::connect(&self.catalog_path)?;
        f(&catalog)
    }

    /// One transaction on a fresh connection, retried while the store is busy.
    pub(crate) fn write_with<T>(
        &self,
        retry: RetryPolicy,
        mut f: impl FnMut(&Catalog) -> Result<T>,
    ) -> Result<T> {
        retry.run(|| {
            let catalog = Catalog::connect(&self.catalog_path)?;
            catalog.in_transaction(|c| f(c))
        })
    }

    fn write<T>(&self, f: impl FnMut(&Catalog) -> Result<T>) -> Result<T> {
        self.write_with(self.retry, f)
    }

    // ── Roots ────────────────────────────────────────────────────────

    /// Register a new library root.
    pub fn add_root(&self, path: &Path) -> Result<LibraryRoot> {
        if !path.exists() {
            return Err(Error::RootNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(Error::RootNotDirectory(path.to_path_buf()));
        }
        let now = chrono::Utc::now().timestamp();
        let root = self.write(|c| c.add_root(path, now))?;
        info!(root = %root.path.display(), "root registered");
        Ok(root)
    }

    /// Unregister a root and sweep everything that belonged to it.
    pub fn remove_root(&self, path: &Path) -> Result<(LibraryRoot, OrphanSweep)> {
        let root = self.write(|c| c.remove_root(path))?;
        let sweep = self.write(|c| c.sweep_orphans())?;
        info!(root = %root.path.display(), assets = sweep.assets, "root removed");
        Ok((root, sweep))
    }

    pub fn roots(&self) -> Result<Vec<LibraryRoot>> {
        self.read(|c| c.list_roots())
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn ignore_folders(&self) -> Result<Vec<String>> {
        let raw = self.read(|c| c.get_config(IGNORE_FOLDERS_KEY))?;
        Ok(reconcile::dedup_names(raw.unwrap_or_default().lines()))
    }

    /// Add an entry to the deny-list. Returns the updated list.
    pub fn add_ignore_folder(&self, entry: &str) -> Result<Vec<String>> {
        let mut folders = self.ignore_folders()?;
        folders.push(entry.to_string());
        let folders = reconcile::dedup_names(folders);
        self.write(|c| c.set_config(IGNORE_FOLDERS_KEY, &folders.join("\n")))?;
        Ok(folders)
    }

    /// Remove an entry from the deny-list (exact match). Returns the updated list.
    pub fn remove_ignore_folder(&self, entry: &str) -> Result<Vec<String>> {
        let folders: Vec<String> = self
            .ignore_folders()?
            .into_iter()
            .filter(|f| f != entry.trim())
            .collect();
        self.write(|c| c.set_config(IGNORE_FOLDERS_KEY, &folders.join("\n")))?;
        Ok(folders)
    }

    /// Metadata tool program, `exiftool` unless configured.
    pub fn exiftool_path(&self) -> Result<String> {
        Ok(self
            .read(|c| c.get_config(EXIFTOOL_PATH_KEY))?
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EXIFTOOL.to_string()))
    }

    pub fn set_exiftool_path(&self, program: &str) -> Result<()> {
        self.write(|c| c.set_config(EXIFTOOL_PATH_KEY, program.trim()))
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Most recent batches first.
    pub fn batches(&self, limit: usize) -> Result<Vec<ScanBatch>> {
        self.read(|c| c.list_batches(limit))
    }

    pub fn batch(&self, id: i64) -> Result<Option<ScanBatch>> {
        self.read(|c| c.get_batch(id))
    }

    pub fn log_entries(&self, batch_id: i64) -> Result<Vec<LogEntry>> {
        self.read(|c| c.list_log(batch_id))
    }

    pub fn status(&self) -> Result<CatalogStats> {
        self.read(|c| c.stats())
    }

    /// The asset at `path` under the earliest-registered root that indexes it.
    pub fn asset_by_path(&self, path: &Path) -> Result<Option<AssetRecord>> {
        Ok(self.assets_at_path(path)?.into_iter().next())
    }

    /// Every asset at `path`, one per root when roots are nested.
    pub fn assets_at_path(&self, path: &Path) -> Result<Vec<AssetRecord>> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.read(|c| c.assets_by_path(&path))
    }

    pub fn assets(&self, root_id: i64) -> Result<Vec<AssetRecord>> {
        self.read(|c| c.list_assets(root_id))
    }

    pub fn regions(&self, asset_id: i64) -> Result<Vec<RegionRecord>> {
        self.read(|c| c.list_regions(asset_id))
    }

    pub fn history(&self, asset_id: i64) -> Result<Vec<MetadataSnapshot>> {
        self.read(|c| c.list_history(asset_id))
    }

    pub fn related(&self, kind: Lookup, asset_id: i64) -> Result<Vec<String>> {
        self.read(|c| c.related(kind, asset_id))
    }

    pub fn collections(&self, asset_id: i64) -> Result<Vec<Collection>> {
        self.read(|c| c.list_collections(asset_id))
    }

    pub fn persons(&self, asset_id: i64) -> Result<Vec<Person>> {
        self.read(|c| c.list_persons(asset_id))
    }

    // ── Scan ─────────────────────────────────────────────────────────

    /// Scan every registered root (or only the filtered one), one batch per root.
    /// Calls `progress_cb` with progress updates if provided.
    ///
    /// A root whose batch ends early is recorded in the report and the next root is
    /// scanned; only a missing metadata tool ends the whole run.
    pub fn scan<T: Transport>(
        &self,
        tool: &ExifTool<T>,
        options: &ScanOptions,
        mut progress_cb: Option<&mut dyn FnMut(ScanProgress)>,
    ) -> Result<ScanReport> {
        let filter = options
            .root_filter
            .as_ref()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()));
        let roots: Vec<LibraryRoot> = self
            .roots()?
            .into_iter()
            .filter(|r| filter.as_ref().map_or(true, |f| *f == r.path))
            .collect();
        let ignore = self.ignore_folders()?;

        let mut report = ScanReport::default();
        for root in &roots {
            // Unreachable roots (unmounted volumes) are left untouched.
            if !root.path.is_dir() {
                warn!(root = %root.path.display(), "root is not reachable, skipped");
                continue;
            }
            match self.scan_root(tool, root, &ignore, options, &mut progress_cb) {
                Ok(batch) => report.batches.push(batch),
                Err(e @ Error::ToolNotAvailable { .. }) => return Err(e),
                Err(e) => {
                    warn!(root = %root.path.display(), "scan of root ended early: {e}");
                    scan::emit(
                        &mut progress_cb,
                        ScanProgress::RootFailed {
                            root: root.path.clone(),
                            message: e.to_string(),
                        },
                    );
                    report.failures.push(RootFailure {
                        root: root.path.clone(),
                        error: e,
                    });
                }
            }
        }
        Ok(report)
    }
}
