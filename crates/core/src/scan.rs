//! Per-root scan: walk, classify, extract, cache, persist, reconcile, finalize.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::{self, region, CacheDecision, Decoded};
use crate::catalog::{AssetWrite, Catalog, Lookup};
use crate::detector::{ChangeDetector, Classification};
use crate::domain::*;
use crate::error::{Error, Result};
use crate::exiftool::{ExifTool, Extraction, Transport};
use crate::fields::{self, Resolved};
use crate::hasher;
use crate::reconcile;
use crate::retry::RetryPolicy;
use crate::scanner;
use crate::structured::{self, Structured};
use crate::Library;

/// Runtime options for one scan invocation.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub mode: ScanMode,
    /// Only scan the registered root with this path.
    pub root_filter: Option<PathBuf>,
    pub thumbnails: bool,
    pub regions: bool,
    pub retry: RetryPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            mode: ScanMode::Integrity,
            root_filter: None,
            thumbnails: true,
            regions: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// How one enumerated file was accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Added,
    Updated,
    Skipped,
    Error,
}

/// Progress events emitted while scanning.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    /// A root's listing is complete and processing starts.
    RootStart { root: PathBuf, file_count: usize },
    FileProcessed { path: PathBuf, outcome: FileOutcome },
    /// A catalogued file no longer on disk was dropped.
    Removed { path: PathBuf },
    BatchComplete { batch: ScanBatch },
    /// The root's batch ended early; scanning moves on to the next root.
    RootFailed { root: PathBuf, message: String },
}

/// A root whose batch could not be completed.
#[derive(Debug)]
pub struct RootFailure {
    pub root: PathBuf,
    pub error: Error,
}

/// Outcome of scanning every selected root.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Completed batches, in root order.
    pub batches: Vec<ScanBatch>,
    pub failures: Vec<RootFailure>,
}

pub(crate) type Progress<'a> = Option<&'a mut dyn FnMut(ScanProgress)>;

pub(crate) fn emit(progress: &mut Progress<'_>, event: ScanProgress) {
    if let Some(cb) = progress.as_mut() {
        cb(event);
    }
}

/// Errors that end the batch instead of being charged to one file.
fn is_fatal(err: &Error) -> bool {
    matches!(err, Error::StoreBusy { .. } | Error::ToolNotAvailable { .. })
}

/// `2 hour(s) and 5 minute(s)`, `3 minute(s) and 9 second(s)` or `42 second(s)`.
pub fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours} hour(s) and {minutes} minute(s)")
    } else if minutes > 0 {
        format!("{minutes} minute(s) and {seconds} second(s)")
    } else {
        format!("{seconds} second(s)")
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Work the controller performs on a file once it has been classified.
enum Work {
    Add { sha256: String },
    Update { asset_id: i64, sha256: String },
    Reload { asset_id: i64 },
}

/// Everything computed for a file before the write transaction opens.
struct Prepared {
    file: ScannedFile,
    sha256: String,
    metadata: String,
    structured_raw: Option<String>,
    structured: Option<Structured>,
    resolved: Resolved,
    thumbnail: Option<Vec<u8>>,
    fingerprint: Option<String>,
    regions: Option<region::RegionPlan>,
}

struct RootScan<'a, T: Transport> {
    library: &'a Library,
    tool: &'a ExifTool<T>,
    options: &'a ScanOptions,
    root: &'a LibraryRoot,
    batch_id: i64,
}

impl Library {
    /// Scan one root as a single batch.
    pub(crate) fn scan_root<T: Transport>(
        &self,
        tool: &ExifTool<T>,
        root: &LibraryRoot,
        ignore: &[String],
        options: &ScanOptions,
        progress: &mut Progress<'_>,
    ) -> Result<ScanBatch> {
        let clock = Instant::now();
        let started_at = now();

        let listing = scanner::scan_directory(&root.path, ignore)?;
        let found = listing.found();
        let batch_id = self.write_with(options.retry, |c| {
            c.start_batch(root.id, options.mode, found, started_at)
        })?;
        info!(root = %root.path.display(), batch_id, mode = %options.mode, files = found, "scan started");

        emit(
            progress,
            ScanProgress::RootStart {
                root: root.path.clone(),
                file_count: found,
            },
        );

        let known = self.read(|c| c.known_assets(root.id))?;
        let mut detector = ChangeDetector::new(options.mode, &known);
        let scan = RootScan {
            library: self,
            tool,
            options,
            root,
            batch_id,
        };

        let mut counters = ScanCounters {
            found,
            ..Default::default()
        };

        for failure in &listing.failures {
            scan.log(&failure.path, &failure.message)?;
            counters.errors += 1;
            emit(
                progress,
                ScanProgress::FileProcessed {
                    path: failure.path.clone(),
                    outcome: FileOutcome::Error,
                },
            );
        }

        for file in &listing.files {
            let outcome = match scan.process(&mut detector, file) {
                Ok(outcome) => outcome,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(path = %file.path.display(), "{e}");
                    scan.log(&file.path, &e.to_string())?;
                    FileOutcome::Error
                }
            };
            match outcome {
                FileOutcome::Added => counters.added += 1,
                FileOutcome::Updated => counters.updated += 1,
                FileOutcome::Skipped => counters.skipped += 1,
                FileOutcome::Error => counters.errors += 1,
            }
            emit(
                progress,
                ScanProgress::FileProcessed {
                    path: file.path.clone(),
                    outcome,
                },
            );
        }

        if detector.stopped() {
            debug!(batch_id, "quick scan stopped at first unchanged file");
        }

        // ── Reconcile ────────────────────────────────────────────────
        for removal in detector.removed(&listing.files, &listing.unreadable()) {
            let deleted = self.write_with(options.retry, |c| c.delete_asset(removal.asset_id))?;
            if deleted {
                info!(path = %removal.path.display(), "removed");
                counters.removed += 1;
                emit(progress, ScanProgress::Removed { path: removal.path });
            }
        }
        let sweep = self.write_with(options.retry, |c| c.sweep_orphans())?;
        if sweep.assets + sweep.children > 0 {
            info!(assets = sweep.assets, children = sweep.children, "orphan rows swept");
        }

        // ── Finalize ─────────────────────────────────────────────────
        let elapsed = clock.elapsed().as_secs() as i64;
        let batch = ScanBatch {
            id: batch_id,
            root_id: root.id,
            mode: options.mode,
            started_at,
            ended_at: Some(now()),
            counters,
            elapsed_secs: Some(elapsed),
            summary: Some(format_elapsed(elapsed)),
            warning: !counters.is_consistent(),
        };
        self.write_with(options.retry, |c| c.finalize_batch(&batch))?;

        info!(batch_id, "{counters} Elapsed: {}", format_elapsed(elapsed));
        if batch.warning {
            warn!(
                batch_id,
                "file counts do not reconcile, some files may have been missed"
            );
        }

        emit(progress, ScanProgress::BatchComplete { batch: batch.clone() });
        Ok(batch)
    }
}

impl<T: Transport> RootScan<'_, T> {
    fn log(&self, path: &Path, message: &str) -> Result<()> {
        self.library.write_with(self.options.retry, |c| {
            c.append_log(Some(self.batch_id), path, message, now())
        })
    }

    fn process(&self, detector: &mut ChangeDetector<'_>, file: &ScannedFile) -> Result<FileOutcome> {
        let work = match detector.classify(file)? {
            Classification::Added { sha256 } => Work::Add { sha256 },
            Classification::Modified { asset_id, sha256 } => Work::Update { asset_id, sha256 },
            Classification::Reload { asset_id } => Work::Reload { asset_id },
            Classification::Unchanged { .. } | Classification::Skipped => {
                return Ok(FileOutcome::Skipped)
            }
        };

        match work {
            Work::Add { sha256 } => {
                let prepared = self.prepare(file, sha256, None, true)?;
                self.library.write_with(self.options.retry, |c| {
                    let id = c.insert_asset(&self.asset_write(&prepared))?;
                    sync_relations(c, id, &prepared)
                })?;
                info!(path = %file.path.display(), "added");
                Ok(FileOutcome::Added)
            }
            Work::Update { asset_id, sha256 } => {
                let existing = self.existing(asset_id)?;
                let prepared = self.prepare(file, sha256, Some(&existing), true)?;
                self.update(asset_id, &prepared)?;
                info!(path = %file.path.display(), "updated");
                Ok(FileOutcome::Updated)
            }
            Work::Reload { asset_id } => {
                let existing = self.existing(asset_id)?;
                // Hash and timestamps stay as stored so change detection is unaffected.
                let mut stored = file.clone();
                stored.mtime = existing.mtime;
                stored.size = existing.size;
                let prepared = self.prepare(&stored, existing.sha256.clone(), Some(&existing), false)?;
                self.update(asset_id, &prepared)?;
                debug!(path = %file.path.display(), "reloaded");
                Ok(FileOutcome::Updated)
            }
        }
    }

    fn existing(&self, asset_id: i64) -> Result<AssetRecord> {
        self.library
            .read(|c| c.get_asset(asset_id))?
            .ok_or(Error::Database(rusqlite::Error::QueryReturnedNoRows))
    }

    fn update(&self, asset_id: i64, prepared: &Prepared) -> Result<()> {
        self.library.write_with(self.options.retry, |c| {
            c.snapshot_metadata(asset_id, Some(self.batch_id), now())?;
            c.update_asset(asset_id, &self.asset_write(prepared))?;
            sync_relations(c, asset_id, prepared)
        })
    }

    fn asset_write<'p>(&self, p: &'p Prepared) -> AssetWrite<'p> {
        AssetWrite {
            root_id: self.root.id,
            batch_id: self.batch_id,
            file: &p.file,
            sha256: &p.sha256,
            metadata: &p.metadata,
            structured: p.structured_raw.as_deref(),
            fields: &p.resolved.fields,
            thumbnail: p.thumbnail.as_deref(),
            fingerprint: p.fingerprint.as_deref(),
            now: now(),
        }
    }

    /// Extract, resolve and render everything for one file. Only extraction and read
    /// failures abort; structured and preview failures are logged and degrade.
    fn prepare(
        &self,
        file: &ScannedFile,
        sha256: String,
        existing: Option<&AssetRecord>,
        content_changed: bool,
    ) -> Result<Prepared> {
        let metadata = match self.tool.extract(&file.path)? {
            Extraction::Metadata(metadata) => metadata,
            Extraction::Failed { reason } => {
                return Err(Error::ExtractionFailed {
                    path: file.path.clone(),
                    reason,
                })
            }
        };

        let structured = match metadata.structured.as_deref() {
            Some(raw) => match structured::parse(&file.path, raw) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(path = %file.path.display(), "{e}");
                    self.log(&file.path, &e.to_string())?;
                    None
                }
            },
            None => Some(Structured::default()),
        };

        let needs_render = self.options.regions
            && self.options.thumbnails
            && structured.as_ref().is_some_and(|s| !s.regions.is_empty());
        let bytes = if content_changed || needs_render {
            Some(hasher::read_file(&file.path)?)
        } else {
            None
        };

        let (thumbnail, fingerprint) =
            self.previews(&file.path, bytes.as_deref(), existing, content_changed)?;

        let regions = match (&structured, self.options.regions) {
            (Some(parsed), true) => {
                let stored = match existing {
                    Some(asset) => self.library.read(|c| c.list_regions(asset.id))?,
                    None => Vec::new(),
                };
                let bytes = bytes.as_deref().unwrap_or_default();
                let mut renderer = region::LazyRenderer::new(bytes);
                let plan = region::plan_regions(
                    &parsed.regions,
                    &stored,
                    &mut renderer,
                    self.options.thumbnails,
                );
                for failure in &plan.failures {
                    self.log(&file.path, failure)?;
                }
                Some(plan)
            }
            _ => None,
        };

        Ok(Prepared {
            file: file.clone(),
            sha256,
            metadata: metadata.general_json()?,
            structured_raw: metadata.structured.clone(),
            resolved: fields::resolve(&metadata),
            structured,
            thumbnail,
            fingerprint,
            regions,
        })
    }

    /// Thumbnail and fingerprint to store. Without a content change the stored pair is kept;
    /// changed content with previews disabled clears it.
    fn previews(
        &self,
        path: &Path,
        bytes: Option<&[u8]>,
        existing: Option<&AssetRecord>,
        content_changed: bool,
    ) -> Result<(Option<Vec<u8>>, Option<String>)> {
        let kept = || {
            existing
                .map(|a| (a.thumbnail.clone(), a.fingerprint.clone()))
                .unwrap_or((None, None))
        };
        if !content_changed {
            return Ok(kept());
        }
        let (Some(bytes), true) = (bytes, self.options.thumbnails) else {
            return Ok((None, None));
        };

        let rendered = Decoded::from_bytes(bytes).and_then(|decoded| {
            let fingerprint = decoded.fingerprint()?;
            let stored = kept();
            match cache::decide(stored.1.as_deref(), stored.0.is_some(), &fingerprint) {
                CacheDecision::Reuse => {
                    debug!(path = %path.display(), "pixels unchanged, thumbnail reused");
                    Ok((stored.0, Some(fingerprint)))
                }
                CacheDecision::Regenerate => Ok((Some(decoded.thumbnail()?), Some(fingerprint))),
            }
        });

        match rendered {
            Ok(pair) => Ok(pair),
            Err(e) => {
                warn!(path = %path.display(), "{e}");
                self.log(path, &e.to_string())?;
                Ok((None, None))
            }
        }
    }
}

/// Bring every relation of an asset in line with the freshly extracted payload.
fn sync_relations(c: &Catalog, asset_id: i64, p: &Prepared) -> Result<()> {
    let location_label = p.resolved.fields.location.as_deref();
    let lookups = [
        (Lookup::Tag, &p.resolved.tags),
        (Lookup::Person, &p.resolved.people),
        (Lookup::Location, &p.resolved.location_ids),
    ];
    for (kind, desired) in lookups {
        let existing = c.related(kind, asset_id)?;
        reconcile::apply(
            desired,
            &existing,
            |value| c.unrelate(kind, asset_id, value),
            |value| c.relate(kind, asset_id, value, location_label),
        )?;
    }

    // Malformed structured data leaves the stored collections, persons and regions alone.
    let Some(structured) = &p.structured else {
        return Ok(());
    };

    let collections = c.list_collections(asset_id)?;
    reconcile::apply(
        &structured.collections,
        &collections,
        |col| c.delete_collection(asset_id, col),
        |col| c.insert_collection(asset_id, col),
    )?;

    let persons = c.list_persons(asset_id)?;
    reconcile::apply(
        &structured.persons,
        &persons,
        |person| c.delete_person(asset_id, person),
        |person| c.insert_person(asset_id, person),
    )?;

    if let Some(plan) = &p.regions {
        for id in &plan.remove {
            c.delete_region(*id)?;
        }
        for (spec, blob) in &plan.insert {
            c.insert_region(asset_id, spec, blob.as_deref())?;
        }
    }
    Ok(())
}
