#![forbid(unsafe_code)]

use rusqlite::Connection;

use crate::error::StoreResult;

/// Bumped on any table change. Stored in `PRAGMA user_version`.
pub(crate) const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS updates (
    id                       TEXT PRIMARY KEY NOT NULL,
    commit_time              INTEGER NOT NULL,
    runtime_version          TEXT NOT NULL,
    metadata                 TEXT NOT NULL,
    manifest_filters         TEXT,
    status                   INTEGER NOT NULL,
    last_accessed            INTEGER NOT NULL,
    successful_launch_count  INTEGER NOT NULL DEFAULT 0,
    failed_launch_count      INTEGER NOT NULL DEFAULT 0,
    launch_asset_id          INTEGER,
    marked_for_deletion      INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS assets (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    key                  TEXT,
    url                  TEXT,
    headers              TEXT NOT NULL DEFAULT '{}',
    type                 TEXT NOT NULL,
    expected_hash        TEXT,
    content_hash         TEXT NOT NULL UNIQUE,
    hash_type            INTEGER NOT NULL,
    relative_path        TEXT NOT NULL,
    download_time        INTEGER NOT NULL,
    marked_for_deletion  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS updates_assets (
    update_id  TEXT NOT NULL REFERENCES updates (id) ON DELETE CASCADE,
    asset_id   INTEGER NOT NULL REFERENCES assets (id),
    PRIMARY KEY (update_id, asset_id)
);

CREATE TABLE IF NOT EXISTS json_data (
    key           TEXT NOT NULL,
    scope_key     TEXT NOT NULL,
    value         TEXT NOT NULL,
    last_updated  INTEGER NOT NULL,
    PRIMARY KEY (key, scope_key)
);

CREATE INDEX IF NOT EXISTS idx_updates_status_commit_time
    ON updates (status, commit_time);
CREATE INDEX IF NOT EXISTS idx_updates_assets_asset_id
    ON updates_assets (asset_id);
"#;

/// Apply pragmas and create tables on a fresh connection.
pub(crate) fn initialize(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(CREATE_TABLES)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
