use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current on-disk schema version, tracked in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Child tables that hang off `assets.id`; swept when their parent disappears.
pub const ASSET_CHILD_TABLES: &[&str] = &[
    "regions",
    "asset_tags",
    "asset_people",
    "asset_locations",
    "collections",
    "persons",
    "metadata_history",
];

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS library_roots (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            path        TEXT NOT NULL UNIQUE,
            added_at    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scan_batches (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            root_id       INTEGER NOT NULL,
            mode          TEXT NOT NULL,
            started_at    INTEGER NOT NULL,
            ended_at      INTEGER,
            files_found   INTEGER NOT NULL DEFAULT 0,
            files_added   INTEGER NOT NULL DEFAULT 0,
            files_updated INTEGER NOT NULL DEFAULT 0,
            files_skipped INTEGER NOT NULL DEFAULT 0,
            files_removed INTEGER NOT NULL DEFAULT 0,
            files_error   INTEGER NOT NULL DEFAULT 0,
            elapsed_secs  INTEGER,
            summary       TEXT,
            warning       INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS assets (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            root_id         INTEGER NOT NULL,
            batch_id        INTEGER NOT NULL,
            last_batch_id   INTEGER NOT NULL,
            path            TEXT NOT NULL,
            file_name       TEXT NOT NULL,
            album           TEXT NOT NULL,
            format          TEXT NOT NULL,
            size            INTEGER NOT NULL,
            file_created    INTEGER,
            mtime           INTEGER NOT NULL,
            sha256          TEXT NOT NULL,
            metadata        TEXT,
            structured      TEXT,
            title           TEXT,
            description     TEXT,
            rating          TEXT,
            date_taken      TEXT,
            date_taken_tz   TEXT,
            device          TEXT,
            latitude        REAL,
            longitude       REAL,
            altitude        REAL,
            location        TEXT,
            city            TEXT,
            state_province  TEXT,
            country         TEXT,
            country_code    TEXT,
            creator         TEXT,
            copyright       TEXT,
            thumbnail       BLOB,
            fingerprint     TEXT,
            record_added    INTEGER NOT NULL,
            record_modified INTEGER,
            UNIQUE (root_id, path)
        );

        CREATE INDEX IF NOT EXISTS idx_assets_path ON assets(path);
        CREATE INDEX IF NOT EXISTS idx_assets_root_mtime ON assets(root_id, mtime);

        CREATE TABLE IF NOT EXISTS metadata_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id    INTEGER NOT NULL,
            batch_id    INTEGER,
            captured_at INTEGER NOT NULL,
            metadata    TEXT,
            structured  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_history_asset ON metadata_history(asset_id);

        CREATE TABLE IF NOT EXISTS regions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id    INTEGER NOT NULL,
            name        TEXT,
            region_type TEXT,
            unit        TEXT,
            area_h      REAL,
            area_w      REAL,
            area_x      REAL,
            area_y      REAL,
            area_d      REAL,
            thumbnail   BLOB
        );

        CREATE INDEX IF NOT EXISTS idx_regions_asset ON regions(asset_id);

        CREATE TABLE IF NOT EXISTS tags (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name  TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS asset_tags (
            asset_id  INTEGER NOT NULL,
            tag_id    INTEGER NOT NULL,
            PRIMARY KEY (asset_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS people (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name  TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS asset_people (
            asset_id   INTEGER NOT NULL,
            person_id  INTEGER NOT NULL,
            PRIMARY KEY (asset_id, person_id)
        );

        CREATE TABLE IF NOT EXISTS locations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier  TEXT NOT NULL UNIQUE,
            name        TEXT
        );

        CREATE TABLE IF NOT EXISTS asset_locations (
            asset_id     INTEGER NOT NULL,
            location_id  INTEGER NOT NULL,
            PRIMARY KEY (asset_id, location_id)
        );

        CREATE TABLE IF NOT EXISTS collections (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id  INTEGER NOT NULL,
            name      TEXT NOT NULL,
            uri       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_collections_asset ON collections(asset_id);

        CREATE TABLE IF NOT EXISTS persons (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id    INTEGER NOT NULL,
            name        TEXT NOT NULL,
            identifier  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_persons_asset ON persons(asset_id);

        CREATE TABLE IF NOT EXISTS scan_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id   INTEGER,
            path       TEXT NOT NULL,
            message    TEXT NOT NULL,
            logged_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scan_log_batch ON scan_log(batch_id);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Stamp a fresh database with the current version, or reject one written by a newer release.
pub fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchemaVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}
