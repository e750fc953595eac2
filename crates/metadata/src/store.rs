//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::blocks::BlockStats;
use crate::repos::{BlockRepo, FileRepo, LibraryRepo, SnapshotRepo, VersionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    BlockRepo + FileRepo + LibraryRepo + VersionRepo + SnapshotRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    block_hash TEXT PRIMARY KEY,
    size_bytes INTEGER NOT NULL,
    refcount INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_blocks_refcount ON blocks(refcount);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    block_hashes TEXT NOT NULL,
    library_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);
CREATE INDEX IF NOT EXISTS idx_files_library ON files(library_id);

CREATE TABLE IF NOT EXISTS libraries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    owner TEXT NOT NULL DEFAULT '',
    current_commit TEXT,
    total_size INTEGER NOT NULL DEFAULT 0,
    file_count INTEGER NOT NULL DEFAULT 0,
    version_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS versions (
    commit_hash TEXT PRIMARY KEY,
    library_id INTEGER NOT NULL,
    root_tree_hash TEXT NOT NULL,
    message TEXT NOT NULL,
    author TEXT NOT NULL,
    parents TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_versions_library_created
    ON versions(library_id, created_at DESC);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    parent_id INTEGER,
    root_hash TEXT NOT NULL,
    file_count INTEGER NOT NULL DEFAULT 0,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_files (
    snapshot_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    PRIMARY KEY (snapshot_id, file_id)
);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, running migrations. `query_timeout`
    /// bounds how long a query waits on the database lock.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout: Option<Duration>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(query_timeout.unwrap_or(Duration::from_secs(5)));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under load.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockRepo for SqliteStore {
    async fn upsert_block(&self, block: &BlockRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (block_hash, size_bytes, refcount, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(block_hash) DO UPDATE SET refcount = refcount + excluded.refcount
            "#,
        )
        .bind(&block.block_hash)
        .bind(block.size_bytes)
        .bind(block.refcount)
        .bind(block.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_block(&self, block_hash: &str) -> MetadataResult<Option<BlockRow>> {
        let row = sqlx::query_as::<_, BlockRow>("SELECT * FROM blocks WHERE block_hash = ?")
            .bind(block_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn block_exists(&self, block_hash: &str) -> MetadataResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM blocks WHERE block_hash = ?")
            .bind(block_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn increment_refcount(&self, block_hash: &str) -> MetadataResult<()> {
        sqlx::query("UPDATE blocks SET refcount = refcount + 1 WHERE block_hash = ?")
            .bind(block_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn decrement_refcount(&self, block_hash: &str) -> MetadataResult<()> {
        sqlx::query("UPDATE blocks SET refcount = MAX(0, refcount - 1) WHERE block_hash = ?")
            .bind(block_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_orphan_blocks(&self, limit: u32) -> MetadataResult<Vec<BlockRow>> {
        let rows = sqlx::query_as::<_, BlockRow>(
            "SELECT * FROM blocks WHERE refcount = 0 ORDER BY created_at LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_orphan_block(&self, block_hash: &str) -> MetadataResult<bool> {
        // The refcount re-check and the delete are one statement, so a
        // concurrent increment between candidate listing and deletion
        // keeps the row.
        let result = sqlx::query("DELETE FROM blocks WHERE block_hash = ? AND refcount = 0")
            .bind(block_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn block_stats(&self) -> MetadataResult<BlockStats> {
        let totals: (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), COALESCE(SUM(refcount), 0) FROM blocks",
        )
        .fetch_one(&self.pool)
        .await?;
        let orphans: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blocks WHERE refcount = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(BlockStats {
            count: totals.0 as u64,
            total_size: totals.1 as u64,
            total_refcount: totals.2 as u64,
            orphan_count: orphans.0 as u64,
        })
    }
}

#[async_trait]
impl FileRepo for SqliteStore {
    async fn commit_file(&self, file: &FileRow, blocks: &[BlockRow]) -> MetadataResult<i64> {
        // Refcounts first, file row last: a crash mid-transaction rolls
        // back both, and the visibility order matches the durability order.
        let mut tx = self.pool.begin().await?;

        for block in blocks {
            sqlx::query(
                r#"
                INSERT INTO blocks (block_hash, size_bytes, refcount, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(block_hash) DO UPDATE SET refcount = refcount + excluded.refcount
                "#,
            )
            .bind(&block.block_hash)
            .bind(block.size_bytes)
            .bind(block.refcount)
            .bind(block.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO files (uuid, name, size_bytes, content_hash, block_hashes,
                               library_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(file.uuid)
        .bind(&file.name)
        .bind(file.size_bytes)
        .bind(&file.content_hash)
        .bind(&file.block_hashes)
        .bind(file.library_id)
        .bind(file.created_at)
        .bind(file.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn get_file_by_hash(&self, content_hash: &str) -> MetadataResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT * FROM files WHERE content_hash = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_file_by_uuid(&self, uuid: Uuid) -> MetadataResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_file(&self, file: &FileRow) -> MetadataResult<()> {
        let hashes = file.block_hash_list()?;
        let mut tx = self.pool.begin().await?;

        for hash in &hashes {
            sqlx::query("UPDATE blocks SET refcount = MAX(0, refcount - 1) WHERE block_hash = ?")
                .bind(hash)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(file.id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("file id {}", file.id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_files(&self) -> MetadataResult<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>("SELECT * FROM files ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_files(&self) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl LibraryRepo for SqliteStore {
    async fn create_library(&self, library: &LibraryRow) -> MetadataResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO libraries (uuid, name, description, owner, current_commit,
                                   total_size, file_count, version_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(library.uuid)
        .bind(&library.name)
        .bind(&library.description)
        .bind(&library.owner)
        .bind(&library.current_commit)
        .bind(library.total_size)
        .bind(library.file_count)
        .bind(library.version_count)
        .bind(library.created_at)
        .bind(library.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_library(&self, id: i64) -> MetadataResult<Option<LibraryRow>> {
        let row = sqlx::query_as::<_, LibraryRow>("SELECT * FROM libraries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_library_by_uuid(&self, uuid: Uuid) -> MetadataResult<Option<LibraryRow>> {
        let row = sqlx::query_as::<_, LibraryRow>("SELECT * FROM libraries WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_libraries(&self) -> MetadataResult<Vec<LibraryRow>> {
        let rows = sqlx::query_as::<_, LibraryRow>("SELECT * FROM libraries ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_library_head(
        &self,
        id: i64,
        commit_hash: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE libraries SET current_commit = ?, version_count = version_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(commit_hash)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("library id {id}")));
        }
        Ok(())
    }

    async fn update_library_stats(
        &self,
        id: i64,
        total_size: u64,
        file_count: u64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE libraries SET total_size = ?, file_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(total_size as i64)
        .bind(file_count as i64)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("library id {id}")));
        }
        Ok(())
    }

    async fn delete_library(&self, id: i64) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM libraries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("library id {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionRepo for SqliteStore {
    async fn create_version(&self, version: &VersionRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO versions (commit_hash, library_id, root_tree_hash, message,
                                  author, parents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&version.commit_hash)
        .bind(version.library_id)
        .bind(&version.root_tree_hash)
        .bind(&version.message)
        .bind(&version.author)
        .bind(&version.parents)
        .bind(version.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint") => {
                MetadataError::AlreadyExists(format!("commit {}", version.commit_hash))
            }
            _ => MetadataError::Database(e),
        })?;
        Ok(())
    }

    async fn get_version(&self, commit_hash: &str) -> MetadataResult<Option<VersionRow>> {
        let row = sqlx::query_as::<_, VersionRow>("SELECT * FROM versions WHERE commit_hash = ?")
            .bind(commit_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_versions(&self, library_id: i64) -> MetadataResult<Vec<VersionRow>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions WHERE library_id = ? ORDER BY created_at DESC",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn latest_version(&self, library_id: i64) -> MetadataResult<Option<VersionRow>> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions WHERE library_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl SnapshotRepo for SqliteStore {
    async fn create_snapshot(
        &self,
        snapshot: &SnapshotRow,
        files: &[SnapshotFileRow],
    ) -> MetadataResult<i64> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO snapshots (uuid, name, description, parent_id, root_hash,
                                   file_count, size_bytes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(snapshot.uuid)
        .bind(&snapshot.name)
        .bind(&snapshot.description)
        .bind(snapshot.parent_id)
        .bind(&snapshot.root_hash)
        .bind(snapshot.file_count)
        .bind(snapshot.size_bytes)
        .bind(snapshot.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for file in files {
            sqlx::query(
                r#"
                INSERT INTO snapshot_files (snapshot_id, file_id, file_name, file_hash, status)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(file.file_id)
            .bind(&file.file_name)
            .bind(&file.file_hash)
            .bind(&file.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn get_snapshot(&self, id: i64) -> MetadataResult<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>("SELECT * FROM snapshots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_snapshot_by_uuid(&self, uuid: Uuid) -> MetadataResult<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>("SELECT * FROM snapshots WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_snapshots(&self, limit: u32, offset: u32) -> MetadataResult<Vec<SnapshotRow>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_snapshot_files(&self, snapshot_id: i64) -> MetadataResult<Vec<SnapshotFileRow>> {
        let rows = sqlx::query_as::<_, SnapshotFileRow>(
            "SELECT * FROM snapshot_files WHERE snapshot_id = ? ORDER BY file_name",
        )
        .bind(snapshot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
