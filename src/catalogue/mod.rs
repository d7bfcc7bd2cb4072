//! The Catalogue Store: durable, concurrent-safe persistence of
//! [`Track`], [`AnalysisResult`], and [`ScanSession`] rows.
//!
//! Built around a `db::init_db`-style connection-pool setup, extended
//! with pragma configuration and composite/partial indexes tuned for
//! cache-hit lookups. A single-file SQLite database under WAL journaling
//! backs the whole catalogue; `migrations/` holds the additive schema.

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fingerprint;
use crate::model::{AnalysisResult, DjMeta, ScanMode, ScanSession, SessionStatus, TrackStatus};

mod rows;
pub use rows::{CandidateRow, TrackRow};

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Thin wrapper over [`SqlitePool`] that applies the engine's pragma
/// configuration at open and exposes the Catalogue Store's public
/// operations.
#[derive(Clone)]
pub struct CataloguePool {
    pool: SqlitePool,
}

/// Connection-time tuning. Mirrors [`crate::config::CatalogueConfig`].
#[derive(Debug, Clone)]
pub struct CatalogueOptions {
    pub pool_size: u32,
    pub mmap_mib: u32,
    pub page_cache_pages: u32,
}

impl Default for CatalogueOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            mmap_mib: 256,
            page_cache_pages: 10_000,
        }
    }
}

/// Result of a batched write.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub successful: usize,
    pub failed: Vec<(String, String)>,
}

/// A fully-prepared write for `batch_upsert_analyses`: a path plus the
/// computed fingerprint/stat and the analysis payload to persist.
pub struct PendingUpsert {
    pub path: String,
    pub fingerprint: Vec<u8>,
    pub size: u64,
    pub mtime: f64,
    pub analysis: AnalysisResult,
}

/// Filter set for [`CataloguePool::query_candidates`].
#[derive(Debug, Clone, Default)]
pub struct CandidateFilters {
    pub bpm_tolerance: Option<f64>,
    pub genre: Option<String>,
    pub max_results: usize,
}

impl CataloguePool {
    /// Open (creating if absent) the catalogue at `path`, run pending
    /// migrations, and apply the pragma configuration this engine wants:
    /// WAL journaling, normal durability, a page cache of at least
    /// `page_cache_pages`, a memory-mapped region of at least `mmap_mib`,
    /// and temp artifacts kept in memory.
    pub async fn open(path: &Path, options: &CatalogueOptions) -> Result<Self> {
        let url = format!("sqlite:{}", path.display());

        if !sqlx::Sqlite::database_exists(&url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&url)
                .await
                .map_err(Error::Database)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(options.pool_size)
            .connect(&url)
            .await
            .map_err(Error::Database)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::integrity(format!("migration failed: {e}")))?;

        let pragmas = format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -{cache_kib};
             PRAGMA mmap_size = {mmap_bytes};
             PRAGMA temp_store = MEMORY;",
            cache_kib = options.page_cache_pages * 4,
            mmap_bytes = options.mmap_mib as u64 * 1024 * 1024,
        );
        sqlx::raw_sql(&pragmas)
            .execute(&pool)
            .await
            .map_err(Error::Database)?;

        Ok(Self { pool })
    }

    /// Check whether `path` is cached and fresh. Returns `(false, None)`
    /// without touching the DB when the file no longer exists. Updates
    /// `last_verified` on a cache hit.
    pub async fn is_cached(&self, path: &Path) -> Result<(bool, Option<TrackRow>)> {
        let stat = fingerprint::stat(path).map_err(Error::Io)?;
        let Some(stat) = stat else {
            return Ok((false, None));
        };

        let path_str = path.to_string_lossy().to_string();
        let row = sqlx::query_as::<_, TrackRow>(
            "SELECT path, fingerprint, size, mtime, status, last_verified, has_complete_data
             FROM tracks WHERE path = ?",
        )
        .bind(&path_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok((false, None));
        };

        let hit = row.mtime >= stat.mtime && row.has_complete_data;
        if hit {
            sqlx::query("UPDATE tracks SET last_verified = ? WHERE path = ?")
                .bind(chrono::Utc::now().to_rfc3339())
                .bind(&path_str)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        }
        Ok((hit, Some(row)))
    }

    /// Batched variant of [`Self::is_cached`]: one query over the whole
    /// path set, a local stat loop, and a single batched
    /// `last_verified` update for every hit.
    pub async fn batch_is_cached(&self, paths: &[PathBuf]) -> Result<HashMap<String, bool>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; paths.len()].join(", ");
        let query = format!(
            "SELECT path, mtime, has_complete_data FROM tracks WHERE path IN ({placeholders})"
        );
        let mut q = sqlx::query(&query);
        let path_strs: Vec<String> = paths.iter().map(|p| p.to_string_lossy().to_string()).collect();
        for p in &path_strs {
            q = q.bind(p);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        let mut catalogued: HashMap<String, (f64, bool)> = HashMap::new();
        for row in rows {
            let path: String = row.get("path");
            let mtime: f64 = row.get("mtime");
            let complete: bool = row.get::<i64, _>("has_complete_data") != 0;
            catalogued.insert(path, (mtime, complete));
        }

        let mut result = HashMap::new();
        let mut hits = Vec::new();
        for (path, path_str) in paths.iter().zip(path_strs.iter()) {
            let stat = fingerprint::stat(path).map_err(Error::Io)?;
            let hit = match (stat, catalogued.get(path_str)) {
                (Some(stat), Some((mtime, complete))) => *complete && *mtime >= stat.mtime,
                _ => false,
            };
            if hit {
                hits.push(path_str.clone());
            }
            result.insert(path_str.clone(), hit);
        }

        if !hits.is_empty() {
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            let now = chrono::Utc::now().to_rfc3339();
            for path_str in &hits {
                sqlx::query("UPDATE tracks SET last_verified = ? WHERE path = ?")
                    .bind(&now)
                    .bind(path_str)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
            }
            tx.commit().await.map_err(Error::Database)?;
        }

        Ok(result)
    }

    /// Pure presence check over `tracks`, ignoring mtime and
    /// completeness: a path is a hit iff a row for it exists at all.
    /// Backs incremental scans, which only care about paths the
    /// catalogue has never seen.
    pub async fn batch_is_present(&self, paths: &[PathBuf]) -> Result<HashMap<String, bool>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; paths.len()].join(", ");
        let query = format!("SELECT path FROM tracks WHERE path IN ({placeholders})");
        let mut q = sqlx::query(&query);
        let path_strs: Vec<String> = paths.iter().map(|p| p.to_string_lossy().to_string()).collect();
        for p in &path_strs {
            q = q.bind(p);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        let present: std::collections::HashSet<String> =
            rows.iter().map(|row| row.get::<String, _>("path")).collect();

        Ok(path_strs
            .into_iter()
            .map(|p| {
                let hit = present.contains(&p);
                (p, hit)
            })
            .collect())
    }

    /// Re-stat and re-fingerprint `path`, then write the full row under
    /// `INSERT ... ON CONFLICT DO UPDATE` semantics. Atomic per call.
    pub async fn upsert_analysis(
        &self,
        path: &Path,
        analysis: AnalysisResult,
        session_id: Option<i64>,
    ) -> Result<()> {
        let analysis = analysis.validated()?;
        let stat = fingerprint::stat(path)
            .map_err(Error::Io)?
            .ok_or_else(|| Error::not_found(path.display().to_string()))?;
        let fp = fingerprint::compute(path);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        write_track_and_analysis(
            &mut tx,
            &path.to_string_lossy(),
            &fp,
            stat.size,
            stat.mtime,
            &analysis,
            session_id,
        )
        .await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Batch-write `N`-sized transactions (`batch_size`, default 1000).
    /// On a per-row failure, the current batch is rolled back and the
    /// remaining batches still run (partial-failure semantics).
    pub async fn batch_upsert_analyses(
        &self,
        rows: Vec<PendingUpsert>,
        session_id: Option<i64>,
        batch_size: usize,
    ) -> BatchOutcome {
        let batch_size = batch_size.max(1);
        let mut outcome = BatchOutcome::default();

        for chunk in rows.chunks(batch_size) {
            let chunk_result = self.write_batch(chunk, session_id).await;
            match chunk_result {
                Ok(n) => outcome.successful += n,
                Err(_) => {
                    for pending in chunk {
                        match self
                            .upsert_analysis_raw(
                                &pending.path,
                                &pending.fingerprint,
                                pending.size,
                                pending.mtime,
                                &pending.analysis,
                                session_id,
                            )
                            .await
                        {
                            Ok(()) => outcome.successful += 1,
                            Err(e) => outcome.failed.push((pending.path.clone(), e.to_string())),
                        }
                    }
                }
            }
        }

        outcome
    }

    async fn write_batch(&self, chunk: &[PendingUpsert], session_id: Option<i64>) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for pending in chunk {
            let validated = pending.analysis.clone().validated()?;
            write_track_and_analysis(
                &mut tx,
                &pending.path,
                &pending.fingerprint,
                pending.size,
                pending.mtime,
                &validated,
                session_id,
            )
            .await?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(chunk.len())
    }

    async fn upsert_analysis_raw(
        &self,
        path: &str,
        fp: &[u8],
        size: u64,
        mtime: f64,
        analysis: &AnalysisResult,
        session_id: Option<i64>,
    ) -> Result<()> {
        let validated = analysis.clone().validated()?;
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        write_track_and_analysis(&mut tx, path, fp, size, mtime, &validated, session_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Rows with `status='active' AND has_complete_data AND bpm IS NOT
    /// NULL`, optionally narrowed by BPM tolerance and exact genre,
    /// ordered by `|bpm - seed.bpm|` then `analyzed_at DESC`.
    pub async fn query_candidates(
        &self,
        seed_bpm: f64,
        filters: &CandidateFilters,
    ) -> Result<Vec<CandidateRow>> {
        let mut sql = String::from(
            "SELECT t.path, a.bpm, a.camelot_key, a.energy, a.hamms, a.isrc, a.duration_seconds
             FROM tracks t
             JOIN analysis_results a ON a.path = t.path
             WHERE t.status = 'active' AND t.has_complete_data = 1 AND a.bpm IS NOT NULL",
        );

        if filters.bpm_tolerance.is_some() {
            sql.push_str(" AND a.bpm BETWEEN ? AND ?");
        }
        if filters.genre.is_some() {
            sql.push_str(" AND a.genre = ?");
        }
        sql.push_str(" ORDER BY ABS(a.bpm - ?) ASC, a.analyzed_at DESC");
        if filters.max_results > 0 {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql);
        if let Some(tol) = filters.bpm_tolerance {
            q = q.bind(seed_bpm * (1.0 - tol)).bind(seed_bpm * (1.0 + tol));
        }
        if let Some(ref genre) = filters.genre {
            q = q.bind(genre);
        }
        q = q.bind(seed_bpm);
        if filters.max_results > 0 {
            q = q.bind(filters.max_results as i64);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        Ok(rows.iter().map(rows::candidate_from_row).collect())
    }

    /// Fetch a single track's scoring fields by path, for resolving a
    /// `compat`/`playlist generate` seed argument against the catalogue.
    pub async fn get_candidate(&self, path: &str) -> Result<Option<CandidateRow>> {
        let row = sqlx::query(
            "SELECT t.path, a.bpm, a.camelot_key, a.energy, a.hamms, a.isrc, a.duration_seconds
             FROM tracks t
             JOIN analysis_results a ON a.path = t.path
             WHERE t.path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| rows::candidate_from_row(&r)))
    }

    /// Soft-delete by flipping `status = 'missing'`. Never hard-deletes.
    pub async fn mark_missing(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; paths.len()].join(", ");
        let query = format!(
            "UPDATE tracks SET status = '{}' WHERE path IN ({placeholders})",
            TrackStatus::Missing.as_str()
        );
        let mut q = sqlx::query(&query);
        for p in paths {
            q = q.bind(p);
        }
        q.execute(&self.pool).await.map_err(Error::Database)?;
        Ok(())
    }

    pub async fn start_session(&self, root_path: &str, mode: ScanMode) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO scan_sessions (started_at, root_path, mode, status)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(root_path)
        .bind(mode.as_str())
        .bind(SessionStatus::Running.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Overwrite the live counters of a running session.
    pub async fn update_session(&self, id: i64, counters: SessionCounters) -> Result<()> {
        sqlx::query(
            "UPDATE scan_sessions
             SET discovered = ?, processed = ?, cached = ?, analyzed = ?, skipped = ?, error = ?,
                 peak_memory_mb = ?
             WHERE id = ?",
        )
        .bind(counters.discovered as i64)
        .bind(counters.processed as i64)
        .bind(counters.cached as i64)
        .bind(counters.analyzed as i64)
        .bind(counters.skipped as i64)
        .bind(counters.error as i64)
        .bind(counters.peak_memory_mb as i64)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Close a session exactly once, recording terminal status, final
    /// counters, duration, and (on error) a message.
    pub async fn complete_session(
        &self,
        id: i64,
        counters: SessionCounters,
        status: SessionStatus,
        duration_seconds: f64,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scan_sessions
             SET ended_at = ?, status = ?, discovered = ?, processed = ?, cached = ?,
                 analyzed = ?, skipped = ?, error = ?, peak_memory_mb = ?,
                 duration_seconds = ?, error_message = ?
             WHERE id = ?",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(status.as_str())
        .bind(counters.discovered as i64)
        .bind(counters.processed as i64)
        .bind(counters.cached as i64)
        .bind(counters.analyzed as i64)
        .bind(counters.skipped as i64)
        .bind(counters.error as i64)
        .bind(counters.peak_memory_mb as i64)
        .bind(duration_seconds)
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn get_session(&self, id: i64) -> Result<ScanSession> {
        let row = sqlx::query(
            "SELECT id, started_at, ended_at, root_path, mode, status, discovered, processed,
                    cached, analyzed, skipped, error, peak_memory_mb, duration_seconds,
                    error_message
             FROM scan_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::not_found(format!("scan session {id}")))?;

        Ok(rows::session_from_row(&row)?)
    }

    /// Refresh statistics; vacuum only when the free-page count exceeds a
    /// threshold; reindex.
    pub async fn optimize(&self) -> Result<()> {
        sqlx::raw_sql("PRAGMA optimize;")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        let free: i64 = sqlx::query("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?
            .get(0);
        let total: i64 = sqlx::query("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?
            .get(0);

        const FREE_PAGE_RATIO_THRESHOLD: f64 = 0.1;
        if total > 0 && (free as f64 / total as f64) > FREE_PAGE_RATIO_THRESHOLD {
            sqlx::raw_sql("VACUUM;")
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        }

        sqlx::raw_sql("REINDEX;")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Online copy to `destination`, without holding an exclusive lock
    /// any longer than `VACUUM INTO` itself needs.
    pub async fn backup(&self, destination: &Path) -> Result<()> {
        sqlx::query("VACUUM INTO ?")
            .bind(destination.to_string_lossy().to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Full analysis row for `path`, for merging a sidecar overlay.
    pub async fn get_analysis(&self, path: &str) -> Result<Option<AnalysisResult>> {
        let row = sqlx::query(
            "SELECT bpm, initial_key, camelot_key, energy, hamms, genre, subgenre, era, mood,
                    isrc, duration_seconds, analysis_method, confidence, analyzed_at, scan_session_id
             FROM analysis_results WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| rows::analysis_from_row(&r)).transpose()
    }

    /// Apply a sidecar [`DjMeta`] overlay onto `path`'s existing analysis
    /// (DJMeta fields win per [`DjMeta::merge_into`]). The track must
    /// already be catalogued; importers never create a track on their
    /// own, only enrich one a scan already wrote.
    pub async fn apply_dj_meta(&self, path: &str, overlay: &DjMeta) -> Result<bool> {
        let Some(mut analysis) = self.get_analysis(path).await? else {
            return Ok(false);
        };
        overlay.merge_into(&mut analysis);
        self.upsert_analysis(Path::new(path), analysis, None).await?;
        Ok(true)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Live counters carried by a [`ScanSession`] while it runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounters {
    pub discovered: u64,
    pub processed: u64,
    pub cached: u64,
    pub analyzed: u64,
    pub skipped: u64,
    pub error: u64,
    pub peak_memory_mb: u64,
}

async fn write_track_and_analysis(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    path: &str,
    fingerprint: &[u8],
    size: u64,
    mtime: f64,
    analysis: &AnalysisResult,
    session_id: Option<i64>,
) -> Result<()> {
    let has_complete = analysis.has_complete_data();

    sqlx::query(
        "INSERT INTO tracks (path, fingerprint, size, mtime, status, last_verified, has_complete_data)
         VALUES (?, ?, ?, ?, 'active', ?, ?)
         ON CONFLICT(path) DO UPDATE SET
            fingerprint = excluded.fingerprint,
            size = excluded.size,
            mtime = excluded.mtime,
            status = 'active',
            last_verified = excluded.last_verified,
            has_complete_data = excluded.has_complete_data",
    )
    .bind(path)
    .bind(fingerprint)
    .bind(size as i64)
    .bind(mtime)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(has_complete)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    let hamms_json = analysis.hamms.map(|h| serde_json::to_string(&h).unwrap_or_default());

    sqlx::query(
        "INSERT INTO analysis_results
            (path, bpm, initial_key, camelot_key, energy, hamms, genre, subgenre, era, mood,
             isrc, duration_seconds, analysis_method, confidence, analyzed_at, scan_session_id,
             has_complete_data)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(path) DO UPDATE SET
            bpm = excluded.bpm,
            initial_key = excluded.initial_key,
            camelot_key = excluded.camelot_key,
            energy = excluded.energy,
            hamms = excluded.hamms,
            genre = excluded.genre,
            subgenre = excluded.subgenre,
            era = excluded.era,
            mood = excluded.mood,
            isrc = excluded.isrc,
            duration_seconds = excluded.duration_seconds,
            analysis_method = excluded.analysis_method,
            confidence = excluded.confidence,
            analyzed_at = excluded.analyzed_at,
            scan_session_id = excluded.scan_session_id,
            has_complete_data = excluded.has_complete_data",
    )
    .bind(path)
    .bind(analysis.bpm)
    .bind(&analysis.initial_key)
    .bind(&analysis.camelot_key)
    .bind(analysis.energy)
    .bind(hamms_json)
    .bind(&analysis.genre)
    .bind(&analysis.subgenre)
    .bind(&analysis.era)
    .bind(&analysis.mood)
    .bind(&analysis.isrc)
    .bind(analysis.duration_seconds)
    .bind(&analysis.analysis_method)
    .bind(analysis.confidence)
    .bind(analysis.analyzed_at.to_rfc3339())
    .bind(session_id)
    .bind(has_complete)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            bpm: Some(128.0),
            camelot_key: Some("8A".to_string()),
            energy: Some(0.6),
            analysis_method: "test".to_string(),
            analyzed_at: chrono::Utc::now(),
            ..Default::default()
        }
    }

    async fn open_test_catalogue() -> (CataloguePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalogue.db");
        let pool = CataloguePool::open(&db_path, &CatalogueOptions::default())
            .await
            .unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_is_cached_miss_on_nonexistent_file() {
        let (pool, dir) = open_test_catalogue().await;
        let missing = dir.path().join("nope.mp3");
        let (hit, row) = pool.is_cached(&missing).await.unwrap();
        assert!(!hit);
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_upsert_then_cache_hit() {
        let (pool, dir) = open_test_catalogue().await;
        let track_path = dir.path().join("track.mp3");
        std::fs::write(&track_path, b"audio bytes").unwrap();

        pool.upsert_analysis(&track_path, sample_analysis(), None)
            .await
            .unwrap();

        let (hit, row) = pool.is_cached(&track_path).await.unwrap();
        assert!(hit);
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn test_upsert_incomplete_analysis_is_not_cache_hit() {
        let (pool, dir) = open_test_catalogue().await;
        let track_path = dir.path().join("track.mp3");
        std::fs::write(&track_path, b"audio bytes").unwrap();

        let incomplete = AnalysisResult {
            bpm: Some(120.0),
            analysis_method: "test".to_string(),
            analyzed_at: chrono::Utc::now(),
            ..Default::default()
        };
        pool.upsert_analysis(&track_path, incomplete, None).await.unwrap();

        let (hit, _) = pool.is_cached(&track_path).await.unwrap();
        assert!(!hit);
    }

    #[tokio::test]
    async fn test_query_candidates_orders_by_bpm_distance() {
        let (pool, dir) = open_test_catalogue().await;

        for (name, bpm) in [("a.mp3", 120.0), ("b.mp3", 128.0), ("c.mp3", 135.0)] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"x").unwrap();
            pool.upsert_analysis(
                &path,
                AnalysisResult {
                    bpm: Some(bpm),
                    camelot_key: Some("8A".to_string()),
                    energy: Some(0.5),
                    analysis_method: "test".to_string(),
                    analyzed_at: chrono::Utc::now(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        }

        let rows = pool
            .query_candidates(
                127.0,
                &CandidateFilters {
                    bpm_tolerance: None,
                    genre: None,
                    max_results: 10,
                },
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].path.ends_with("b.mp3"));
    }

    #[tokio::test]
    async fn test_mark_missing_does_not_delete_row() {
        let (pool, dir) = open_test_catalogue().await;
        let track_path = dir.path().join("track.mp3");
        std::fs::write(&track_path, b"x").unwrap();
        pool.upsert_analysis(&track_path, sample_analysis(), None)
            .await
            .unwrap();

        let path_str = track_path.to_string_lossy().to_string();
        pool.mark_missing(&[path_str.clone()]).await.unwrap();

        let row: TrackRow = sqlx::query_as(
            "SELECT path, fingerprint, size, mtime, status, last_verified, has_complete_data
             FROM tracks WHERE path = ?",
        )
        .bind(&path_str)
        .fetch_one(pool.pool())
        .await
        .unwrap();
        assert_eq!(row.status, TrackStatus::Missing.as_str());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (pool, _dir) = open_test_catalogue().await;
        let id = pool.start_session("/music", ScanMode::Smart).await.unwrap();

        pool.update_session(
            id,
            SessionCounters {
                discovered: 10,
                processed: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        pool.complete_session(
            id,
            SessionCounters {
                discovered: 10,
                processed: 10,
                analyzed: 10,
                ..Default::default()
            },
            SessionStatus::Completed,
            1.5,
            None,
        )
        .await
        .unwrap();

        let session = pool.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.processed, 10);
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_batch_upsert_partial_failure_reports_failed_paths() {
        let (pool, dir) = open_test_catalogue().await;
        let good_path = dir.path().join("good.mp3");
        std::fs::write(&good_path, b"x").unwrap();

        let pending = vec![PendingUpsert {
            path: good_path.to_string_lossy().to_string(),
            fingerprint: fingerprint::compute(&good_path),
            size: 1,
            mtime: 0.0,
            analysis: sample_analysis(),
        }];

        let outcome = pool.batch_upsert_analyses(pending, None, 1000).await;
        assert_eq!(outcome.successful, 1);
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn test_backup_creates_destination_file() {
        let (pool, dir) = open_test_catalogue().await;
        let dest = dir.path().join("backup.db");
        pool.backup(&dest).await.unwrap();
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_optimize_does_not_error_on_empty_catalogue() {
        let (pool, _dir) = open_test_catalogue().await;
        pool.optimize().await.unwrap();
    }
}
