use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::{KnownAsset, ScanMode, ScannedFile};
use crate::error::Result;
use crate::hasher;

/// Outcome of comparing one on-disk file against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not catalogued yet.
    Added { sha256: String },
    /// Catalogued, content or mtime differs.
    Modified { asset_id: i64, sha256: String },
    /// Catalogued and unchanged under the active mode.
    Unchanged { asset_id: i64 },
    /// Not inspected (quick mode past its stop point, or reload of an uncatalogued file).
    Skipped,
    /// Catalogued file queued for metadata re-extraction.
    Reload { asset_id: i64 },
}

/// A catalogued path that no longer appears in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub asset_id: i64,
    pub path: PathBuf,
}

/// Classifies files one at a time against a snapshot of the root's catalog state.
///
/// Files must be fed in listing order (newest first) for quick mode to be correct:
/// the first Unchanged file flips the detector into short-circuit, and every later
/// file is reported Skipped without being read.
pub struct ChangeDetector<'a> {
    mode: ScanMode,
    known: &'a HashMap<PathBuf, KnownAsset>,
    stopped: bool,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(mode: ScanMode, known: &'a HashMap<PathBuf, KnownAsset>) -> Self {
        Self {
            mode,
            known,
            stopped: false,
        }
    }

    /// True once quick mode has hit its first unchanged file.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// Classify a single file. Read failures surface as `FilesystemRead`.
    pub fn classify(&mut self, file: &ScannedFile) -> Result<Classification> {
        if self.stopped {
            return Ok(Classification::Skipped);
        }

        let known = self.known.get(&file.path);

        match (self.mode, known) {
            (ScanMode::Reload, Some(asset)) => Ok(Classification::Reload { asset_id: asset.id }),
            (ScanMode::Reload, None) => Ok(Classification::Skipped),
            (_, None) => Ok(Classification::Added {
                sha256: hasher::hash_file(&file.path)?,
            }),
            (ScanMode::Integrity, Some(asset)) => {
                let sha256 = hasher::hash_file(&file.path)?;
                if sha256 == asset.sha256 {
                    Ok(Classification::Unchanged { asset_id: asset.id })
                } else {
                    Ok(Classification::Modified {
                        asset_id: asset.id,
                        sha256,
                    })
                }
            }
            (ScanMode::Date | ScanMode::Quick, Some(asset)) => {
                if file.mtime == asset.mtime {
                    if self.mode == ScanMode::Quick {
                        self.stopped = true;
                    }
                    Ok(Classification::Unchanged { asset_id: asset.id })
                } else {
                    Ok(Classification::Modified {
                        asset_id: asset.id,
                        sha256: hasher::hash_file(&file.path)?,
                    })
                }
            }
        }
    }

    /// Catalogued paths absent from the full listing. Quick mode's short-circuit does not
    /// shorten `listing`, so removal detection always sees every file.
    ///
    /// Paths at or below an `unreadable` entry are never reported: their absence from the
    /// listing says nothing about the disk.
    pub fn removed(&self, listing: &[ScannedFile], unreadable: &[PathBuf]) -> Vec<Removal> {
        let present: HashSet<&Path> = listing.iter().map(|f| f.path.as_path()).collect();
        let mut removed: Vec<Removal> = self
            .known
            .iter()
            .filter(|(path, _)| !present.contains(path.as_path()))
            .filter(|(path, _)| !unreadable.iter().any(|dir| path.starts_with(dir)))
            .map(|(path, asset)| Removal {
                asset_id: asset.id,
                path: path.clone(),
            })
            .collect();
        removed.sort_by(|a, b| a.path.cmp(&b.path));
        removed
    }
}
