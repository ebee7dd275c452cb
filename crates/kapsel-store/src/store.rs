#![forbid(unsafe_code)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use kapsel_core::{Asset, HashType, ManifestFilters, Update, UpdateStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    schema,
};

/// `json_data` key under which server-defined manifest filters persist.
const MANIFEST_FILTERS_KEY: &str = "manifestFilters";

/// Durable store for updates and their content-addressed assets.
///
/// One SQLite connection behind an async mutex serializes all access; WAL
/// journal mode keeps that safe if another process opens the same database.
/// Multi-statement operations run inside a transaction that rolls back on
/// drop, so an early error return can never leave partial state behind.
///
/// The store also owns the flat asset directory next to the database; it
/// never writes asset files itself (callers do, atomically) but it is the
/// authority on where a given asset lives via [`UpdateStore::absolute_path_for`].
#[derive(Clone)]
pub struct UpdateStore {
    conn: Arc<Mutex<Connection>>,
    assets_dir: PathBuf,
}

impl UpdateStore {
    /// Open (creating if needed) the database and asset directory under `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let assets_dir = root.join("assets");
        let db_path = root.join("kapsel.db");

        let conn = tokio::task::spawn_blocking({
            let assets_dir = assets_dir.clone();
            move || -> StoreResult<Connection> {
                std::fs::create_dir_all(&assets_dir)?;
                let conn = Connection::open(&db_path)?;
                schema::initialize(&conn)?;
                Ok(conn)
            }
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        debug!(root = %root.display(), "update store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            assets_dir,
        })
    }

    /// Flat directory holding one file per distinct `content_hash`.
    #[must_use]
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Absolute on-disk location of `asset`.
    #[must_use]
    pub fn absolute_path_for(&self, asset: &Asset) -> PathBuf {
        self.assets_dir.join(&asset.relative_path)
    }

    // Updates

    /// Insert a new update row. The id must be fresh; a duplicate is a
    /// programmer error surfaced as [`StoreError::DuplicateId`], not retried.
    pub async fn add_update(&self, update: &Update) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM updates WHERE id = ?1)",
            params![update.id.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::DuplicateId(update.id));
        }

        tx.execute(
            "INSERT INTO updates (id, commit_time, runtime_version, metadata, \
             manifest_filters, status, last_accessed, successful_launch_count, \
             failed_launch_count, marked_for_deletion) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            params![
                update.id.to_string(),
                update.commit_time.timestamp_millis(),
                update.runtime_version,
                serde_json::to_string(&update.metadata)?,
                update
                    .manifest_filters
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                update.status.as_db(),
                update.last_accessed.timestamp_millis(),
                update.successful_launch_count,
                update.failed_launch_count,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Atomic, validated status transition.
    pub async fn update_status(&self, id: Uuid, status: UpdateStatus) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT status FROM updates WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let current = UpdateStatus::from_db(current.ok_or(StoreError::UpdateNotFound(id))?)?;

        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        tx.execute(
            "UPDATE updates SET status = ?1 WHERE id = ?2",
            params![status.as_db(), id.to_string()],
        )?;
        tx.commit()?;
        debug!(update = %id, from = ?current, to = ?status, "status transition");
        Ok(())
    }

    /// All `Ready`, unmarked updates compatible with `filters`, newest first
    /// (`commit_time` descending, id ascending for determinism). An update
    /// whose every launch attempt failed is excluded.
    pub async fn launchable_updates(
        &self,
        filters: Option<&ManifestFilters>,
    ) -> StoreResult<Vec<Update>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM updates \
             WHERE status = ?1 AND marked_for_deletion = 0 \
               AND (successful_launch_count > 0 OR failed_launch_count = 0) \
             ORDER BY commit_time DESC, id ASC",
        )?;
        let updates = stmt
            .query_map(params![UpdateStatus::Ready.as_db()], update_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(updates
            .into_iter()
            .filter(|u| u.matches_filters(filters))
            .collect())
    }

    pub async fn all_updates(&self) -> StoreResult<Vec<Update>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM updates ORDER BY commit_time DESC, id ASC")?;
        let updates = stmt
            .query_map([], update_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(updates)
    }

    pub async fn update_by_id(&self, id: Uuid) -> StoreResult<Option<Update>> {
        let conn = self.conn.lock().await;
        let update = conn
            .query_row(
                "SELECT * FROM updates WHERE id = ?1",
                params![id.to_string()],
                update_from_row,
            )
            .optional()?;
        Ok(update)
    }

    pub async fn mark_update_accessed(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE updates SET last_accessed = ?1 WHERE id = ?2",
            params![at.timestamp_millis(), id.to_string()],
        )?;
        Ok(())
    }

    pub async fn increment_successful_launch_count(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE updates SET successful_launch_count = successful_launch_count + 1 \
             WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    pub async fn increment_failed_launch_count(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE updates SET failed_launch_count = failed_launch_count + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    // Assets

    /// Persist `asset` for `for_update`, deduplicating on `content_hash`.
    ///
    /// If a row with the same content hash already exists, only the join row
    /// is written and the existing row (whose `relative_path` is canonical)
    /// is returned — callers must not have written a second file. Otherwise
    /// the caller has already placed the file at `relative_path` and the new
    /// row plus join row are inserted. Both paths run in one transaction
    /// under the store lock, so two concurrent calls for the same content
    /// cannot both decide to insert.
    pub async fn add_asset(&self, asset: &Asset, for_update: Uuid) -> StoreResult<Asset> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let update_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM updates WHERE id = ?1)",
            params![for_update.to_string()],
            |row| row.get(0),
        )?;
        if !update_exists {
            return Err(StoreError::UpdateNotFound(for_update));
        }

        let existing = tx
            .query_row(
                "SELECT * FROM assets WHERE content_hash = ?1",
                params![asset.content_hash],
                |row| asset_from_row(row, None),
            )
            .optional()?;

        let stored = match existing {
            Some(mut found) => {
                debug!(hash = %asset.content_hash, "asset row reused");
                found.is_launch_asset = asset.is_launch_asset;
                found
            }
            None => {
                tx.execute(
                    "INSERT INTO assets (key, url, headers, type, expected_hash, \
                     content_hash, hash_type, relative_path, download_time, \
                     marked_for_deletion) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                    params![
                        asset.key,
                        asset.url.as_ref().map(Url::as_str),
                        serde_json::to_string(&asset.headers)?,
                        asset.asset_type,
                        asset.expected_hash,
                        asset.content_hash,
                        asset.hash_type.as_db(),
                        asset.relative_path,
                        asset.download_time.timestamp_millis(),
                    ],
                )?;
                let mut inserted = asset.clone();
                inserted.id = Some(tx.last_insert_rowid());
                inserted
            }
        };

        let asset_id = stored.id.expect("stored asset always has a row id");
        tx.execute(
            "INSERT OR IGNORE INTO updates_assets (update_id, asset_id) VALUES (?1, ?2)",
            params![for_update.to_string(), asset_id],
        )?;
        if asset.is_launch_asset {
            tx.execute(
                "UPDATE updates SET launch_asset_id = ?1 WHERE id = ?2",
                params![asset_id, for_update.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(stored)
    }

    /// All assets joined to `update_id`, launch flag resolved against the
    /// update's `launch_asset_id`. Single pass; callers iterate once.
    pub async fn assets_for_update(&self, update_id: Uuid) -> StoreResult<Vec<Asset>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT assets.*, updates.launch_asset_id AS launch_asset_id FROM assets \
             INNER JOIN updates_assets ON updates_assets.asset_id = assets.id \
             INNER JOIN updates ON updates.id = updates_assets.update_id \
             WHERE updates.id = ?1",
        )?;
        let assets = stmt
            .query_map(params![update_id.to_string()], |row| {
                let launch_asset_id: Option<i64> = row.get("launch_asset_id")?;
                asset_from_row(row, launch_asset_id)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    /// Look up an asset row by its content hash (dedup probe for loaders).
    pub async fn asset_with_content_hash(&self, content_hash: &str) -> StoreResult<Option<Asset>> {
        let conn = self.conn.lock().await;
        let asset = conn
            .query_row(
                "SELECT * FROM assets WHERE content_hash = ?1",
                params![content_hash],
                |row| asset_from_row(row, None),
            )
            .optional()?;
        Ok(asset)
    }

    // Two-phase delete

    /// Phase one for updates: flip the listed updates to `Unused` and set the
    /// deletion mark, in one transaction. Physical row deletion is
    /// [`UpdateStore::delete_unused_updates`]; a crash in between leaves rows
    /// the next sweep re-discovers.
    pub async fn mark_updates_for_deletion(&self, ids: &[Uuid]) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE updates SET status = ?1, marked_for_deletion = 1 WHERE id = ?2",
                params![UpdateStatus::Unused.as_db(), id.to_string()],
            )?;
        }
        tx.commit()?;
        debug!(count = ids.len(), "updates marked for deletion");
        Ok(())
    }

    /// Phase one for assets: transactionally mark every asset not referenced
    /// by any unmarked update, and return the marked rows.
    ///
    /// Implemented as mark-all-then-unmark-kept so the reference count is
    /// computed inside the same transaction that records the decision.
    pub async fn mark_assets_for_deletion(&self) -> StoreResult<Vec<Asset>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute("UPDATE assets SET marked_for_deletion = 1", [])?;
        tx.execute(
            "UPDATE assets SET marked_for_deletion = 0 WHERE id IN (\
                 SELECT updates_assets.asset_id FROM updates_assets \
                 INNER JOIN updates ON updates.id = updates_assets.update_id \
                 WHERE updates.marked_for_deletion = 0)",
            [],
        )?;

        let marked = {
            let mut stmt = tx.prepare("SELECT * FROM assets WHERE marked_for_deletion = 1")?;
            let assets = stmt
                .query_map([], |row| asset_from_row(row, None))?
                .collect::<Result<Vec<_>, _>>()?;
            assets
        };

        tx.commit()?;
        debug!(count = marked.len(), "assets marked for deletion");
        Ok(marked)
    }

    /// Assets still carrying the deletion mark — an interrupted earlier sweep
    /// left these behind and the caller should finish unlinking them.
    pub async fn marked_assets(&self) -> StoreResult<Vec<Asset>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM assets WHERE marked_for_deletion = 1")?;
        let assets = stmt
            .query_map([], |row| asset_from_row(row, None))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    /// Phase two for assets: drop the listed rows (and their join rows). Only
    /// rows still marked are deleted.
    pub async fn delete_assets_with_ids(&self, ids: &[i64]) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM updates_assets WHERE asset_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM assets WHERE id = ?1 AND marked_for_deletion = 1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Phase two for updates: drop every marked update row.
    pub async fn delete_unused_updates(&self) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM updates WHERE marked_for_deletion = 1", [])?;
        Ok(())
    }

    // Server-defined manifest filters (json_data side table)

    /// Persist the server-defined manifest filters for `scope_key`.
    pub async fn set_manifest_filters(
        &self,
        scope_key: &str,
        filters: &ManifestFilters,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM json_data WHERE key = ?1 AND scope_key = ?2",
            params![MANIFEST_FILTERS_KEY, scope_key],
        )?;
        tx.execute(
            "INSERT INTO json_data (key, scope_key, value, last_updated) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                MANIFEST_FILTERS_KEY,
                scope_key,
                serde_json::to_string(filters)?,
                Utc::now().timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn manifest_filters(&self, scope_key: &str) -> StoreResult<Option<ManifestFilters>> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM json_data WHERE key = ?1 AND scope_key = ?2",
                params![MANIFEST_FILTERS_KEY, scope_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }
}

// Row mapping

fn bad_column<E>(err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn datetime_from_ms(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| bad_column(std::io::Error::other(format!("timestamp out of range: {ms}"))))
}

fn update_from_row(row: &Row<'_>) -> rusqlite::Result<Update> {
    let id: String = row.get("id")?;
    let metadata: String = row.get("metadata")?;
    let manifest_filters: Option<String> = row.get("manifest_filters")?;

    Ok(Update {
        id: Uuid::parse_str(&id).map_err(bad_column)?,
        commit_time: datetime_from_ms(row.get("commit_time")?)?,
        runtime_version: row.get("runtime_version")?,
        metadata: serde_json::from_str(&metadata).map_err(bad_column)?,
        status: UpdateStatus::from_db(row.get("status")?).map_err(bad_column)?,
        manifest_filters: manifest_filters
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(bad_column)?,
        last_accessed: datetime_from_ms(row.get("last_accessed")?)?,
        successful_launch_count: row.get("successful_launch_count")?,
        failed_launch_count: row.get("failed_launch_count")?,
    })
}

fn asset_from_row(row: &Row<'_>, launch_asset_id: Option<i64>) -> rusqlite::Result<Asset> {
    let id: i64 = row.get("id")?;
    let url: Option<String> = row.get("url")?;
    let headers: String = row.get("headers")?;

    Ok(Asset {
        id: Some(id),
        key: row.get("key")?,
        url: url
            .map(|raw| Url::parse(&raw))
            .transpose()
            .map_err(bad_column)?,
        headers: serde_json::from_str(&headers).map_err(bad_column)?,
        asset_type: row.get("type")?,
        expected_hash: row.get("expected_hash")?,
        content_hash: row.get("content_hash")?,
        hash_type: HashType::from_db(row.get("hash_type")?),
        relative_path: row.get("relative_path")?,
        download_time: datetime_from_ms(row.get("download_time")?)?,
        is_launch_asset: launch_asset_id == Some(id),
    })
}
