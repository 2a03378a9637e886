use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::ScannedFile;
use crate::error::{Error, Result};

/// File extensions that are indexed.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jxl", "heic"];

/// Normalized format name for an extension, or None if the extension is not indexed.
pub fn format_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpeg"),
        "jxl" => Some("jpeg-xl"),
        "heic" => Some("heic"),
        _ => None,
    }
}

/// Parent directory relative to the root, separators replaced by " - ".
pub fn album_name(root: &Path, path: &Path) -> String {
    let Some(parent) = path.parent() else {
        return String::new();
    };
    match parent.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" - "),
        Err(_) => String::new(),
    }
}

/// Case-insensitive substring match against the deny-list.
pub fn is_ignored(path: &Path, ignore: &[String]) -> bool {
    if ignore.is_empty() {
        return false;
    }
    let haystack = path.to_string_lossy().to_lowercase();
    ignore
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .any(|entry| haystack.contains(&entry.to_lowercase()))
}

/// An entry the walk could not read: an unreadable directory or a file that vanished
/// between listing and stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Result of walking one root.
#[derive(Debug, Default)]
pub struct Listing {
    /// Sorted by mtime descending, ties broken by path, so the newest file comes first.
    pub files: Vec<ScannedFile>,
    pub failures: Vec<WalkFailure>,
}

impl Listing {
    /// Files plus unreadable entries, each of which counts as one found item.
    pub fn found(&self) -> usize {
        self.files.len() + self.failures.len()
    }

    /// Paths whose contents the walk could not vouch for.
    pub fn unreadable(&self) -> Vec<PathBuf> {
        self.failures.iter().map(|f| f.path.clone()).collect()
    }
}

/// Recursively enumerate indexable files under `root`. Unreadable entries are collected
/// in `failures` instead of ending the walk.
pub fn scan_directory(root: &Path, ignore: &[String]) -> Result<Listing> {
    if !root.is_dir() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }

    let mut listing = Listing::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                if is_ignored(&path, ignore) {
                    continue;
                }
                warn!(path = %path.display(), "walk failed: {e}");
                listing.failures.push(WalkFailure {
                    path,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(format) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(format_for_extension)
        else {
            continue;
        };

        if is_ignored(path, ignore) {
            debug!(path = %path.display(), "ignored by deny-list");
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), "stat failed: {e}");
                listing.failures.push(WalkFailure {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        listing.files.push(ScannedFile {
            path: path.to_path_buf(),
            file_name: entry.file_name().to_string_lossy().into_owned(),
            format: format.to_string(),
            album: album_name(root, path),
            size: metadata.len(),
            mtime: metadata.modified().map(unix_seconds).unwrap_or(0),
            created: metadata.created().ok().map(unix_seconds),
        });
    }

    listing
        .files
        .sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.path.cmp(&b.path)));
    Ok(listing)
}

fn unix_seconds(time: SystemTime) -> i64 {
    chrono::DateTime::<chrono::Utc>::from(time).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, UNIX_EPOCH};

    fn touch(path: &Path, mtime: u64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"fake image data").unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime)).unwrap();
    }

    #[test]
    fn test_scan_finds_supported_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("a.jpg"), 100);
        touch(&root.join("b.JPEG"), 100);
        touch(&root.join("c.jxl"), 100);
        touch(&root.join("d.heic"), 100);
        touch(&root.join("e.png"), 100);
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let files = scan_directory(root, &[]).unwrap().files;
        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.JPEG", "c.jxl", "d.heic"]);
        assert_eq!(files[1].format, "jpeg");
        assert_eq!(files[2].format, "jpeg-xl");
        assert_eq!(files[3].format, "heic");
    }

    #[test]
    fn test_every_supported_extension_has_format() {
        for ext in SUPPORTED_EXTENSIONS {
            assert!(format_for_extension(ext).is_some(), "{ext}");
        }
        assert_eq!(format_for_extension("png"), None);
    }

    #[test]
    fn test_scan_orders_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("old.jpg"), 1_000);
        touch(&root.join("new.jpg"), 3_000);
        touch(&root.join("mid.jpg"), 2_000);

        let files = scan_directory(root, &[]).unwrap().files;
        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["new.jpg", "mid.jpg", "old.jpg"]);
        assert_eq!(files[0].mtime, 3_000);
    }

    #[test]
    fn test_scan_respects_ignore_list() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("keep/a.jpg"), 100);
        touch(&root.join("Thumbs Cache/b.jpg"), 100);

        let files = scan_directory(root, &["thumbs cache".to_string()]).unwrap().files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "a.jpg");
    }

    #[test]
    fn test_album_name() {
        let root = Path::new("/photos");
        assert_eq!(album_name(root, Path::new("/photos/a.jpg")), "");
        assert_eq!(album_name(root, Path::new("/photos/2020/a.jpg")), "2020");
        assert_eq!(
            album_name(root, Path::new("/photos/2020/Summer/a.jpg")),
            "2020 - Summer"
        );
    }

    #[test]
    fn test_is_ignored_blank_entries() {
        assert!(!is_ignored(Path::new("/photos/a.jpg"), &["  ".to_string()]));
        assert!(is_ignored(Path::new("/photos/@eaDir/a.jpg"), &["@EADIR".to_string()]));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("top.jpg"), 100);
        touch(&root.join("locked/inner.jpg"), 100);
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let enforced = fs::read_dir(&locked).is_err();

        let listing = scan_directory(root, &[]).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if !enforced {
            // Permission bits are not enforced for this user.
            return;
        }

        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].path, locked);
        assert_eq!(listing.found(), 2);
        assert_eq!(listing.unreadable(), vec![locked]);
    }

    #[test]
    fn test_scan_missing_root() {
        let err = scan_directory(Path::new("/nonexistent/root"), &[]).unwrap_err();
        assert!(matches!(err, Error::RootNotFound(_)));
    }
}
