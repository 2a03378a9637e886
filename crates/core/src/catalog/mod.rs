pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::*;
use crate::error::{Error, Result};

/// SQLite-backed catalog of roots, batches, assets and their dependent rows.
pub struct Catalog {
    conn: Connection,
}

/// Relations that point at a shared lookup row (create-or-reuse by key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Tag,
    Person,
    Location,
}

impl Lookup {
    /// (lookup table, key column, relation table, relation column)
    fn tables(&self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            Lookup::Tag => ("tags", "name", "asset_tags", "tag_id"),
            Lookup::Person => ("people", "name", "asset_people", "person_id"),
            Lookup::Location => ("locations", "identifier", "asset_locations", "location_id"),
        }
    }
}

/// Values written for an asset on insert or update.
pub struct AssetWrite<'a> {
    pub root_id: i64,
    pub batch_id: i64,
    pub file: &'a ScannedFile,
    pub sha256: &'a str,
    pub metadata: &'a str,
    pub structured: Option<&'a str>,
    pub fields: &'a AssetFields,
    pub thumbnail: Option<&'a [u8]>,
    pub fingerprint: Option<&'a str>,
    pub now: i64,
}

/// Row counts removed by an orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanSweep {
    pub assets: usize,
    pub children: usize,
}

const ASSET_COLUMNS: &str = "id, root_id, batch_id, last_batch_id, path, file_name, album, format,
     size, file_created, mtime, sha256, metadata, structured, title, description, rating,
     date_taken, date_taken_tz, device, latitude, longitude, altitude, location, city,
     state_province, country, country_code, creator, copyright, thumbnail, fingerprint,
     record_added, record_modified";

const BATCH_COLUMNS: &str = "id, root_id, mode, started_at, ended_at, files_found, files_added,
     files_updated, files_skipped, files_removed, files_error, elapsed_secs, summary, warning";

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode, creating the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open a short-lived connection to an existing catalog.
    pub fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside an immediate transaction; rolled back on any error.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let outcome = f(self).and_then(|value| {
            self.conn.execute_batch("COMMIT")?;
            Ok(value)
        });
        if outcome.is_err() && !self.conn.is_autocommit() {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
        outcome
    }

    // ── Roots ────────────────────────────────────────────────────────

    pub fn add_root(&self, path: &Path, now: i64) -> Result<LibraryRoot> {
        let canonical = path.canonicalize()?;
        let path_str = canonical.to_string_lossy();

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM library_roots WHERE path = ?1",
                params![path_str.as_ref()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::RootAlreadyExists(canonical));
        }

        self.conn.execute(
            "INSERT INTO library_roots (path, added_at) VALUES (?1, ?2)",
            params![path_str.as_ref(), now],
        )?;
        Ok(LibraryRoot {
            id: self.conn.last_insert_rowid(),
            path: canonical,
            added_at: now,
        })
    }

    pub fn list_roots(&self) -> Result<Vec<LibraryRoot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path, added_at FROM library_roots ORDER BY id")?;
        let roots = stmt
            .query_map([], |row| {
                Ok(LibraryRoot {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    added_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(roots)
    }

    /// Unregister a root. Its assets become orphans for the next sweep.
    pub fn remove_root(&self, path: &Path) -> Result<LibraryRoot> {
        // The directory may already be gone, so fall back to the raw path.
        let lookup_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let path_str = lookup_path.to_string_lossy();

        let root = self
            .conn
            .query_row(
                "SELECT id, path, added_at FROM library_roots WHERE path = ?1",
                params![path_str.as_ref()],
                |row| {
                    Ok(LibraryRoot {
                        id: row.get(0)?,
                        path: PathBuf::from(row.get::<_, String>(1)?),
                        added_at: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(Error::RootNotRegistered(lookup_path.clone()))?;

        self.conn
            .execute("DELETE FROM library_roots WHERE id = ?1", params![root.id])?;
        Ok(root)
    }

    // ── Batches ──────────────────────────────────────────────────────

    pub fn start_batch(&self, root_id: i64, mode: ScanMode, found: usize, started_at: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO scan_batches (root_id, mode, started_at, files_found) VALUES (?1, ?2, ?3, ?4)",
            params![root_id, mode.as_str(), started_at, found as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finalize_batch(&self, batch: &ScanBatch) -> Result<()> {
        let c = &batch.counters;
        self.conn.execute(
            "UPDATE scan_batches SET ended_at=?1, files_found=?2, files_added=?3, files_updated=?4,
             files_skipped=?5, files_removed=?6, files_error=?7, elapsed_secs=?8, summary=?9, warning=?10
             WHERE id=?11",
            params![
                batch.ended_at,
                c.found as i64,
                c.added as i64,
                c.updated as i64,
                c.skipped as i64,
                c.removed as i64,
                c.errors as i64,
                batch.elapsed_secs,
                batch.summary,
                batch.warning,
                batch.id,
            ],
        )?;
        Ok(())
    }

    pub fn get_batch(&self, id: i64) -> Result<Option<ScanBatch>> {
        let batch = self
            .conn
            .query_row(
                &format!("SELECT {BATCH_COLUMNS} FROM scan_batches WHERE id = ?1"),
                params![id],
                row_to_batch,
            )
            .optional()?;
        Ok(batch)
    }

    /// Most recent batches first.
    pub fn list_batches(&self, limit: usize) -> Result<Vec<ScanBatch>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BATCH_COLUMNS} FROM scan_batches ORDER BY id DESC LIMIT ?1"
        ))?;
        let batches = stmt
            .query_map(params![limit as i64], row_to_batch)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    // ── Audit log ────────────────────────────────────────────────────

    pub fn append_log(&self, batch_id: Option<i64>, path: &Path, message: &str, now: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO scan_log (batch_id, path, message, logged_at) VALUES (?1, ?2, ?3, ?4)",
            params![batch_id, path.to_string_lossy().as_ref(), message, now],
        )?;
        Ok(())
    }

    pub fn list_log(&self, batch_id: i64) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, batch_id, path, message, logged_at FROM scan_log WHERE batch_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![batch_id], |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    batch_id: row.get(1)?,
                    path: PathBuf::from(row.get::<_, String>(2)?),
                    message: row.get(3)?,
                    logged_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Assets ───────────────────────────────────────────────────────

    /// Load (path → id, hash, mtime) for every asset of a root in a single query.
    pub fn known_assets(&self, root_id: i64) -> Result<HashMap<PathBuf, KnownAsset>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, id, sha256, mtime FROM assets WHERE root_id = ?1")?;
        let rows = stmt
            .query_map(params![root_id], |row| {
                Ok((
                    PathBuf::from(row.get::<_, String>(0)?),
                    KnownAsset {
                        id: row.get(1)?,
                        sha256: row.get(2)?,
                        mtime: row.get(3)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    }

    pub fn get_asset(&self, id: i64) -> Result<Option<AssetRecord>> {
        let asset = self
            .conn
            .query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"),
                params![id],
                row_to_asset,
            )
            .optional()?;
        Ok(asset)
    }

    /// Assets stored at `path`, at most one per root, oldest root first.
    pub fn assets_by_path(&self, path: &Path) -> Result<Vec<AssetRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE path = ?1 ORDER BY root_id"
        ))?;
        let assets = stmt
            .query_map(params![path.to_string_lossy().as_ref()], row_to_asset)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    pub fn list_assets(&self, root_id: i64) -> Result<Vec<AssetRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE root_id = ?1 ORDER BY path"
        ))?;
        let assets = stmt
            .query_map(params![root_id], row_to_asset)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    pub fn insert_asset(&self, w: &AssetWrite<'_>) -> Result<i64> {
        let path = w.file.path.to_string_lossy().into_owned();
        let mut bindings = asset_bindings(w);
        bindings.push((":batch_id", &w.batch_id));
        bindings.push((":path", &path));
        bindings.push((":record_added", &w.now));

        self.conn.execute(
            "INSERT INTO assets (root_id, batch_id, last_batch_id, path, file_name, album, format, size,
             file_created, mtime, sha256, metadata, structured, title, description, rating, date_taken,
             date_taken_tz, device, latitude, longitude, altitude, location, city, state_province,
             country, country_code, creator, copyright, thumbnail, fingerprint, record_added)
             VALUES (:root_id, :batch_id, :batch_id, :path, :file_name, :album, :format, :size,
             :file_created, :mtime, :sha256, :metadata, :structured, :title, :description, :rating,
             :date_taken, :date_taken_tz, :device, :latitude, :longitude, :altitude, :location, :city,
             :state_province, :country, :country_code, :creator, :copyright, :thumbnail, :fingerprint,
             :record_added)",
            bindings.as_slice(),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite an asset in place. The adding batch and added timestamp are kept.
    pub fn update_asset(&self, id: i64, w: &AssetWrite<'_>) -> Result<()> {
        let mut bindings = asset_bindings(w);
        bindings.push((":last_batch_id", &w.batch_id));
        bindings.push((":record_modified", &w.now));
        bindings.push((":id", &id));

        self.conn.execute(
            "UPDATE assets SET root_id=:root_id, last_batch_id=:last_batch_id, file_name=:file_name,
             album=:album, format=:format, size=:size, file_created=:file_created, mtime=:mtime,
             sha256=:sha256, metadata=:metadata, structured=:structured, title=:title,
             description=:description, rating=:rating, date_taken=:date_taken,
             date_taken_tz=:date_taken_tz, device=:device, latitude=:latitude, longitude=:longitude,
             altitude=:altitude, location=:location, city=:city, state_province=:state_province,
             country=:country, country_code=:country_code, creator=:creator, copyright=:copyright,
             thumbnail=:thumbnail, fingerprint=:fingerprint, record_modified=:record_modified
             WHERE id=:id",
            bindings.as_slice(),
        )?;
        Ok(())
    }

    /// Delete an asset together with every dependent row. Returns false if it did not exist.
    pub fn delete_asset(&self, id: i64) -> Result<bool> {
        for table in schema::ASSET_CHILD_TABLES {
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE asset_id = ?1"),
                params![id],
            )?;
        }
        let removed = self
            .conn
            .execute("DELETE FROM assets WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn count_assets(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Metadata history ─────────────────────────────────────────────

    /// Copy the asset's current payloads into the history table. Returns false if the asset is unknown.
    pub fn snapshot_metadata(&self, asset_id: i64, batch_id: Option<i64>, now: i64) -> Result<bool> {
        let copied = self.conn.execute(
            "INSERT INTO metadata_history (asset_id, batch_id, captured_at, metadata, structured)
             SELECT id, ?2, ?3, metadata, structured FROM assets WHERE id = ?1",
            params![asset_id, batch_id, now],
        )?;
        Ok(copied > 0)
    }

    pub fn list_history(&self, asset_id: i64) -> Result<Vec<MetadataSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, asset_id, batch_id, captured_at, metadata, structured
             FROM metadata_history WHERE asset_id = ?1 ORDER BY id",
        )?;
        let snapshots = stmt
            .query_map(params![asset_id], |row| {
                Ok(MetadataSnapshot {
                    id: row.get(0)?,
                    asset_id: row.get(1)?,
                    batch_id: row.get(2)?,
                    captured_at: row.get(3)?,
                    metadata: row.get(4)?,
                    structured: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    // ── Regions ──────────────────────────────────────────────────────

    pub fn list_regions(&self, asset_id: i64) -> Result<Vec<RegionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, asset_id, name, region_type, unit, area_h, area_w, area_x, area_y, area_d, thumbnail
             FROM regions WHERE asset_id = ?1 ORDER BY id",
        )?;
        let regions = stmt
            .query_map(params![asset_id], |row| {
                Ok(RegionRecord {
                    id: row.get(0)?,
                    asset_id: row.get(1)?,
                    spec: RegionSpec {
                        name: row.get(2)?,
                        region_type: row.get(3)?,
                        area: RegionArea {
                            unit: row.get(4)?,
                            h: row.get(5)?,
                            w: row.get(6)?,
                            x: row.get(7)?,
                            y: row.get(8)?,
                            d: row.get(9)?,
                        },
                    },
                    thumbnail: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(regions)
    }

    pub fn insert_region(&self, asset_id: i64, spec: &RegionSpec, thumbnail: Option<&[u8]>) -> Result<i64> {
        let a = &spec.area;
        self.conn.execute(
            "INSERT INTO regions (asset_id, name, region_type, unit, area_h, area_w, area_x, area_y, area_d, thumbnail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![asset_id, spec.name, spec.region_type, a.unit, a.h, a.w, a.x, a.y, a.d, thumbnail],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn delete_region(&self, region_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM regions WHERE id = ?1", params![region_id])?;
        Ok(())
    }

    // ── Shared lookups (tags, people, locations) ─────────────────────

    /// Keys related to an asset for the given lookup kind.
    pub fn related(&self, kind: Lookup, asset_id: i64) -> Result<Vec<String>> {
        let (table, key, relation, column) = kind.tables();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT l.{key} FROM {relation} r JOIN {table} l ON l.id = r.{column}
             WHERE r.asset_id = ?1 ORDER BY l.{key}"
        ))?;
        let keys = stmt
            .query_map(params![asset_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Create the lookup row if missing, then relate it to the asset.
    /// `label` is only stored for locations, on first creation.
    pub fn relate(&self, kind: Lookup, asset_id: i64, value: &str, label: Option<&str>) -> Result<()> {
        let (table, key, relation, column) = kind.tables();
        let existing: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE {key} = ?1"),
                params![value],
                |row| row.get(0),
            )
            .optional()?;

        let lookup_id = match existing {
            Some(id) => id,
            None => {
                if kind == Lookup::Location {
                    self.conn.execute(
                        "INSERT INTO locations (identifier, name) VALUES (?1, ?2)",
                        params![value, label],
                    )?;
                } else {
                    self.conn.execute(
                        &format!("INSERT INTO {table} ({key}) VALUES (?1)"),
                        params![value],
                    )?;
                }
                self.conn.last_insert_rowid()
            }
        };

        self.conn.execute(
            &format!("INSERT OR IGNORE INTO {relation} (asset_id, {column}) VALUES (?1, ?2)"),
            params![asset_id, lookup_id],
        )?;
        Ok(())
    }

    pub fn unrelate(&self, kind: Lookup, asset_id: i64, value: &str) -> Result<()> {
        let (table, key, relation, column) = kind.tables();
        self.conn.execute(
            &format!(
                "DELETE FROM {relation} WHERE asset_id = ?1
                 AND {column} IN (SELECT id FROM {table} WHERE {key} = ?2)"
            ),
            params![asset_id, value],
        )?;
        Ok(())
    }

    // ── Collections and persons (per-asset rows) ─────────────────────

    pub fn list_collections(&self, asset_id: i64) -> Result<Vec<Collection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, uri FROM collections WHERE asset_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![asset_id], |row| {
                Ok(Collection {
                    name: row.get(0)?,
                    uri: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_collection(&self, asset_id: i64, collection: &Collection) -> Result<()> {
        self.conn.execute(
            "INSERT INTO collections (asset_id, name, uri) VALUES (?1, ?2, ?3)",
            params![asset_id, collection.name, collection.uri],
        )?;
        Ok(())
    }

    pub fn delete_collection(&self, asset_id: i64, collection: &Collection) -> Result<()> {
        self.conn.execute(
            "DELETE FROM collections WHERE asset_id = ?1 AND name = ?2 AND uri = ?3",
            params![asset_id, collection.name, collection.uri],
        )?;
        Ok(())
    }

    pub fn list_persons(&self, asset_id: i64) -> Result<Vec<Person>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, identifier FROM persons WHERE asset_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![asset_id], |row| {
                Ok(Person {
                    name: row.get(0)?,
                    identifier: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_person(&self, asset_id: i64, person: &Person) -> Result<()> {
        self.conn.execute(
            "INSERT INTO persons (asset_id, name, identifier) VALUES (?1, ?2, ?3)",
            params![asset_id, person.name, person.identifier],
        )?;
        Ok(())
    }

    pub fn delete_person(&self, asset_id: i64, person: &Person) -> Result<()> {
        self.conn.execute(
            "DELETE FROM persons WHERE asset_id = ?1 AND name = ?2 AND identifier = ?3",
            params![asset_id, person.name, person.identifier],
        )?;
        Ok(())
    }

    // ── Orphan cleanup ───────────────────────────────────────────────

    /// Set-based cleanup: assets whose root is gone, then child rows whose asset is gone.
    pub fn sweep_orphans(&self) -> Result<OrphanSweep> {
        let assets = self.conn.execute(
            "DELETE FROM assets WHERE NOT EXISTS
             (SELECT 1 FROM library_roots WHERE library_roots.id = assets.root_id)",
            [],
        )?;
        let mut children = 0;
        for table in schema::ASSET_CHILD_TABLES {
            children += self.conn.execute(
                &format!(
                    "DELETE FROM {table} WHERE NOT EXISTS
                     (SELECT 1 FROM assets WHERE assets.id = {table}.asset_id)"
                ),
                [],
            )?;
        }
        Ok(OrphanSweep { assets, children })
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn stats(&self) -> Result<CatalogStats> {
        let stats = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM library_roots),
                (SELECT COUNT(*) FROM assets),
                (SELECT COUNT(*) FROM regions),
                (SELECT COUNT(*) FROM scan_batches)",
            [],
            |row| {
                Ok(CatalogStats {
                    total_roots: row.get::<_, i64>(0)? as usize,
                    total_assets: row.get::<_, i64>(1)? as usize,
                    total_regions: row.get::<_, i64>(2)? as usize,
                    total_batches: row.get::<_, i64>(3)? as usize,
                })
            },
        )?;
        Ok(stats)
    }

    // ── Config ───────────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

/// Named bindings shared by insert and update.
fn asset_bindings<'a>(w: &'a AssetWrite<'a>) -> Vec<(&'static str, &'a dyn ToSql)> {
    let f = w.fields;
    let shared: [(&'static str, &'a dyn ToSql); 28] = [
        (":root_id", &w.root_id),
        (":file_name", &w.file.file_name),
        (":album", &w.file.album),
        (":format", &w.file.format),
        (":size", &w.file.size),
        (":file_created", &w.file.created),
        (":mtime", &w.file.mtime),
        (":sha256", &w.sha256),
        (":metadata", &w.metadata),
        (":structured", &w.structured),
        (":title", &f.title),
        (":description", &f.description),
        (":rating", &f.rating),
        (":date_taken", &f.date_taken),
        (":date_taken_tz", &f.date_taken_tz),
        (":device", &f.device),
        (":latitude", &f.latitude),
        (":longitude", &f.longitude),
        (":altitude", &f.altitude),
        (":location", &f.location),
        (":city", &f.city),
        (":state_province", &f.state_province),
        (":country", &f.country),
        (":country_code", &f.country_code),
        (":creator", &f.creator),
        (":copyright", &f.copyright),
        (":thumbnail", &w.thumbnail),
        (":fingerprint", &w.fingerprint),
    ];
    shared.to_vec()
}

fn row_to_asset(row: &Row<'_>) -> rusqlite::Result<AssetRecord> {
    Ok(AssetRecord {
        id: row.get(0)?,
        root_id: row.get(1)?,
        batch_id: row.get(2)?,
        last_batch_id: row.get(3)?,
        path: PathBuf::from(row.get::<_, String>(4)?),
        file_name: row.get(5)?,
        album: row.get(6)?,
        format: row.get(7)?,
        size: row.get::<_, i64>(8)? as u64,
        file_created: row.get(9)?,
        mtime: row.get(10)?,
        sha256: row.get(11)?,
        metadata: row.get(12)?,
        structured: row.get(13)?,
        fields: AssetFields {
            title: row.get(14)?,
            description: row.get(15)?,
            rating: row.get(16)?,
            date_taken: row.get(17)?,
            date_taken_tz: row.get(18)?,
            device: row.get(19)?,
            latitude: row.get(20)?,
            longitude: row.get(21)?,
            altitude: row.get(22)?,
            location: row.get(23)?,
            city: row.get(24)?,
            state_province: row.get(25)?,
            country: row.get(26)?,
            country_code: row.get(27)?,
            creator: row.get(28)?,
            copyright: row.get(29)?,
        },
        thumbnail: row.get(30)?,
        fingerprint: row.get(31)?,
        record_added: row.get(32)?,
        record_modified: row.get(33)?,
    })
}

fn row_to_batch(row: &Row<'_>) -> rusqlite::Result<ScanBatch> {
    let mode: String = row.get(2)?;
    Ok(ScanBatch {
        id: row.get(0)?,
        root_id: row.get(1)?,
        mode: mode.parse().unwrap_or(ScanMode::Integrity),
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        counters: ScanCounters {
            found: row.get::<_, i64>(5)? as usize,
            added: row.get::<_, i64>(6)? as usize,
            updated: row.get::<_, i64>(7)? as usize,
            skipped: row.get::<_, i64>(8)? as usize,
            removed: row.get::<_, i64>(9)? as usize,
            errors: row.get::<_, i64>(10)? as usize,
        },
        elapsed_secs: row.get(11)?,
        summary: row.get(12)?,
        warning: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_catalog_with_root() -> (Catalog, LibraryRoot, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let root_dir = tmp.path().join("photos");
        std::fs::create_dir_all(&root_dir).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let root = catalog.add_root(&root_dir, 1_700_000_000).unwrap();
        (catalog, root, tmp)
    }

    fn make_file(path: &str) -> ScannedFile {
        ScannedFile {
            path: PathBuf::from(path),
            file_name: Path::new(path).file_name().unwrap().to_string_lossy().into_owned(),
            format: "jpeg".to_string(),
            album: String::new(),
            size: 1024,
            mtime: 1000,
            created: Some(900),
        }
    }

    fn insert(catalog: &Catalog, root_id: i64, path: &str, sha: &str) -> i64 {
        let file = make_file(path);
        let fields = AssetFields {
            title: Some("Title".into()),
            ..Default::default()
        };
        catalog
            .insert_asset(&AssetWrite {
                root_id,
                batch_id: 1,
                file: &file,
                sha256: sha,
                metadata: "{\"a\":\"1\"}",
                structured: None,
                fields: &fields,
                thumbnail: Some(b"thumb"),
                fingerprint: Some("fp"),
                now: 5,
            })
            .unwrap()
    }

    // ── Root tests ───────────────────────────────────────────────

    #[test]
    fn test_catalog_open_and_add_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root_dir = tmp.path().join("photos");
        std::fs::create_dir_all(&root_dir).unwrap();

        let catalog = Catalog::open(&tmp.path().join("test.db")).unwrap();
        let root = catalog.add_root(&root_dir, 1).unwrap();
        assert_eq!(root.path, root_dir.canonicalize().unwrap());
        assert_eq!(catalog.list_roots().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_root_rejected() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let err = catalog.add_root(&root.path, 2).unwrap_err();
        assert!(matches!(err, Error::RootAlreadyExists(_)));
    }

    #[test]
    fn test_remove_root_not_registered() {
        let catalog = Catalog::open_in_memory().unwrap();
        let err = catalog.remove_root(Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, Error::RootNotRegistered(_)));
    }

    #[test]
    fn test_remove_root_leaves_orphans_for_sweep() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        catalog.relate(Lookup::Tag, id, "beach", None).unwrap();

        catalog.remove_root(&root.path).unwrap();
        assert_eq!(catalog.count_assets().unwrap(), 1);

        let sweep = catalog.sweep_orphans().unwrap();
        assert_eq!(sweep.assets, 1);
        assert_eq!(sweep.children, 1);
        assert_eq!(catalog.count_assets().unwrap(), 0);
    }

    // ── Asset tests ──────────────────────────────────────────────

    #[test]
    fn test_insert_and_get_asset() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = insert(&catalog, root.id, "/tmp/test.jpg", "abc123");

        let asset = catalog.get_asset(id).unwrap().unwrap();
        assert_eq!(asset.sha256, "abc123");
        assert_eq!(asset.size, 1024);
        assert_eq!(asset.batch_id, 1);
        assert_eq!(asset.last_batch_id, 1);
        assert_eq!(asset.fields.title.as_deref(), Some("Title"));
        assert_eq!(asset.thumbnail.as_deref(), Some(&b"thumb"[..]));
        assert_eq!(asset.fingerprint.as_deref(), Some("fp"));
        assert_eq!(asset.record_modified, None);

        let by_path = catalog.assets_by_path(Path::new("/tmp/test.jpg")).unwrap();
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].id, id);
    }

    #[test]
    fn test_path_is_unique_within_root() {
        let (catalog, root, tmp) = make_catalog_with_root();
        let nested = tmp.path().join("photos/sub");
        std::fs::create_dir_all(&nested).unwrap();
        let inner = catalog.add_root(&nested, 2).unwrap();
        let outer_id = insert(&catalog, root.id, "/tmp/shared.jpg", "abc");
        let inner_id = insert(&catalog, inner.id, "/tmp/shared.jpg", "abc");
        let ids: Vec<i64> = catalog
            .assets_by_path(Path::new("/tmp/shared.jpg"))
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![outer_id, inner_id]);


        insert(&catalog, root.id, "/tmp/test.jpg", "abc");
        let file = make_file("/tmp/test.jpg");
        let fields = AssetFields::default();
        let err = catalog
            .insert_asset(&AssetWrite {
                root_id: root.id,
                batch_id: 2,
                file: &file,
                sha256: "def",
                metadata: "{}",
                structured: None,
                fields: &fields,
                thumbnail: None,
                fingerprint: None,
                now: 6,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_update_asset_keeps_origin_batch() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = insert(&catalog, root.id, "/tmp/test.jpg", "abc");

        let mut file = make_file("/tmp/test.jpg");
        file.size = 2048;
        let fields = AssetFields {
            city: Some("Paris".into()),
            ..Default::default()
        };
        catalog
            .update_asset(
                id,
                &AssetWrite {
                    root_id: root.id,
                    batch_id: 7,
                    file: &file,
                    sha256: "updated",
                    metadata: "{}",
                    structured: Some("{}"),
                    fields: &fields,
                    thumbnail: None,
                    fingerprint: None,
                    now: 99,
                },
            )
            .unwrap();

        let asset = catalog.get_asset(id).unwrap().unwrap();
        assert_eq!(asset.batch_id, 1);
        assert_eq!(asset.last_batch_id, 7);
        assert_eq!(asset.sha256, "updated");
        assert_eq!(asset.size, 2048);
        assert_eq!(asset.fields.title, None);
        assert_eq!(asset.fields.city.as_deref(), Some("Paris"));
        assert_eq!(asset.record_added, 5);
        assert_eq!(asset.record_modified, Some(99));
    }

    #[test]
    fn test_known_assets() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        insert(&catalog, root.id + 100, "/tmp/other.jpg", "bbb");

        let known = catalog.known_assets(root.id).unwrap();
        assert_eq!(known.len(), 1);
        let entry = &known[Path::new("/tmp/a.jpg")];
        assert_eq!(entry.id, id);
        assert_eq!(entry.sha256, "aaa");
        assert_eq!(entry.mtime, 1000);
    }

    #[test]
    fn test_delete_asset_cascades() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        catalog.relate(Lookup::Tag, id, "beach", None).unwrap();
        catalog.relate(Lookup::Person, id, "Alice", None).unwrap();
        catalog.insert_region(id, &RegionSpec::default(), None).unwrap();
        catalog
            .insert_collection(id, &Collection { name: "Trips".into(), uri: "urn:trips".into() })
            .unwrap();
        catalog.snapshot_metadata(id, None, 1).unwrap();

        assert!(catalog.delete_asset(id).unwrap());
        assert!(catalog.related(Lookup::Tag, id).unwrap().is_empty());
        assert!(catalog.related(Lookup::Person, id).unwrap().is_empty());
        assert!(catalog.list_regions(id).unwrap().is_empty());
        assert!(catalog.list_collections(id).unwrap().is_empty());
        assert!(catalog.list_history(id).unwrap().is_empty());
        assert!(!catalog.delete_asset(id).unwrap());
    }

    #[test]
    fn test_snapshot_copies_prior_payload() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");

        assert!(catalog.snapshot_metadata(id, Some(3), 42).unwrap());
        assert!(!catalog.snapshot_metadata(id + 1, Some(3), 42).unwrap());

        let history = catalog.list_history(id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].metadata.as_deref(), Some("{\"a\":\"1\"}"));
        assert_eq!(history[0].batch_id, Some(3));
        assert_eq!(history[0].captured_at, 42);
    }

    // ── Relation tests ───────────────────────────────────────────

    #[test]
    fn test_relate_reuses_lookup_rows() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let a = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        let b = insert(&catalog, root.id, "/tmp/b.jpg", "bbb");

        catalog.relate(Lookup::Tag, a, "beach", None).unwrap();
        catalog.relate(Lookup::Tag, b, "beach", None).unwrap();
        catalog.relate(Lookup::Tag, a, "beach", None).unwrap();

        let tag_rows: i64 = catalog
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tag_rows, 1);
        assert_eq!(catalog.related(Lookup::Tag, a).unwrap(), vec!["beach"]);

        catalog.unrelate(Lookup::Tag, a, "beach").unwrap();
        assert!(catalog.related(Lookup::Tag, a).unwrap().is_empty());
        assert_eq!(catalog.related(Lookup::Tag, b).unwrap(), vec!["beach"]);
    }

    #[test]
    fn test_location_label_stored_on_create() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let a = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        catalog
            .relate(Lookup::Location, a, "geo:123", Some("Old Town"))
            .unwrap();
        let name: Option<String> = catalog
            .conn
            .query_row("SELECT name FROM locations WHERE identifier = 'geo:123'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name.as_deref(), Some("Old Town"));
    }

    #[test]
    fn test_regions_roundtrip() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let a = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        let spec = RegionSpec {
            name: Some("Alice".into()),
            region_type: Some("Face".into()),
            area: RegionArea {
                unit: Some("normalized".into()),
                h: Some(0.1),
                w: Some(0.2),
                x: Some(0.5),
                y: Some(0.4),
                d: None,
            },
        };
        let id = catalog.insert_region(a, &spec, Some(b"png")).unwrap();
        let regions = catalog.list_regions(a).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, id);
        assert_eq!(regions[0].spec, spec);
        assert_eq!(regions[0].thumbnail.as_deref(), Some(&b"png"[..]));

        catalog.delete_region(id).unwrap();
        assert!(catalog.list_regions(a).unwrap().is_empty());
    }

    // ── Batch and log tests ──────────────────────────────────────

    #[test]
    fn test_batch_lifecycle() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let id = catalog.start_batch(root.id, ScanMode::Quick, 3, 100).unwrap();

        let open = catalog.get_batch(id).unwrap().unwrap();
        assert_eq!(open.counters.found, 3);
        assert_eq!(open.ended_at, None);
        assert_eq!(open.mode, ScanMode::Quick);

        let mut done = open.clone();
        done.ended_at = Some(160);
        done.counters.added = 3;
        done.elapsed_secs = Some(60);
        done.summary = Some("1 minute(s) and 0 second(s)".into());
        catalog.finalize_batch(&done).unwrap();

        assert_eq!(catalog.get_batch(id).unwrap().unwrap(), done);
        assert_eq!(catalog.list_batches(10).unwrap().len(), 1);
    }

    #[test]
    fn test_audit_log_append_only() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let batch = catalog.start_batch(root.id, ScanMode::Integrity, 0, 1).unwrap();
        catalog.append_log(Some(batch), Path::new("/tmp/a.jpg"), "first", 2).unwrap();
        catalog.append_log(Some(batch), Path::new("/tmp/b.jpg"), "second", 3).unwrap();
        catalog.append_log(None, Path::new("/tmp/c.jpg"), "unbatched", 4).unwrap();

        let entries = catalog.list_log(batch).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].path, PathBuf::from("/tmp/b.jpg"));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let result: Result<()> = catalog.in_transaction(|cat| {
            insert(cat, root.id, "/tmp/a.jpg", "aaa");
            Err(Error::CacheGeneration("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(catalog.count_assets().unwrap(), 0);

        catalog
            .in_transaction(|cat| {
                insert(cat, root.id, "/tmp/a.jpg", "aaa");
                Ok(())
            })
            .unwrap();
        assert_eq!(catalog.count_assets().unwrap(), 1);
    }

    #[test]
    fn test_stats() {
        let (catalog, root, _tmp) = make_catalog_with_root();
        let a = insert(&catalog, root.id, "/tmp/a.jpg", "aaa");
        catalog.insert_region(a, &RegionSpec::default(), None).unwrap();
        catalog.start_batch(root.id, ScanMode::Date, 1, 1).unwrap();

        let stats = catalog.stats().unwrap();
        assert_eq!(stats.total_roots, 1);
        assert_eq!(stats.total_assets, 1);
        assert_eq!(stats.total_regions, 1);
        assert_eq!(stats.total_batches, 1);
    }

    // ── Config and schema tests ──────────────────────────────────

    #[test]
    fn test_set_config_overwrite() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.get_config("ignore_folders").unwrap(), None);
        catalog.set_config("ignore_folders", "a").unwrap();
        catalog.set_config("ignore_folders", "b").unwrap();
        assert_eq!(catalog.get_config("ignore_folders").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_schema_version_set_on_fresh_db() {
        let catalog = Catalog::open_in_memory().unwrap();
        let version: i64 = catalog
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_reject_future_schema_version() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("future.db");
        {
            let conn = Connection::open(&db).unwrap();
            conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION + 1).unwrap();
        }
        let err = Catalog::open(&db).err().unwrap();
        assert!(matches!(err, Error::UnsupportedSchemaVersion { .. }));
    }

    #[test]
    fn test_data_survives_reconnect() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("catalog.db");
        let root_dir = tmp.path().join("photos");
        std::fs::create_dir_all(&root_dir).unwrap();
        {
            let catalog = Catalog::open(&db).unwrap();
            catalog.add_root(&root_dir, 1).unwrap();
        }
        let catalog = Catalog::connect(&db).unwrap();
        assert_eq!(catalog.list_roots().unwrap().len(), 1);
    }
}
