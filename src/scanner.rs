//! Scanner Orchestrator: discovery -> cache check -> (extract, persist)
//! with batching, bounded parallelism, cancellation, and progress
//! reporting. Owns the [`ScanSession`] lifecycle.
//!
//! Built around the same `buffer_unordered` pipeline shape as
//! `library::scan_library`, generalized from a fire-and-forget metadata
//! write into a cache-hit contract and batched catalogue writes.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Pid, ProcessExt, System, SystemExt};

use crate::catalogue::{CataloguePool, PendingUpsert, SessionCounters};
use crate::discovery::{discover, validate_root, ExtensionFilter};
use crate::error::{Error, Result};
use crate::extractor::AudioFeatureExtractor;
use crate::fingerprint;
use crate::model::{AnalysisResult, ScanMode, SessionStatus};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub mode: ScanMode,
    pub batch_size: usize,
    pub extensions: ExtensionFilter,
    pub progress_interval: u64,
    /// Soft warning threshold for resident memory.
    pub memory_limit_mb: u64,
    /// Count a per-file extractor failure and continue the scan. When
    /// `false`, the first extractor failure closes the session with a
    /// terminal error status instead.
    pub skip_corrupted: bool,
    /// Re-validate path accessibility (exists, readable) immediately
    /// before extraction.
    pub validate_permissions: bool,
    /// Bounded parallelism for cache-miss extraction.
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            mode: ScanMode::Smart,
            batch_size: 200,
            extensions: ExtensionFilter::default(),
            progress_interval: 50,
            memory_limit_mb: 500,
            skip_corrupted: true,
            validate_permissions: true,
            workers: 10,
        }
    }
}

/// A progress snapshot, monotonic in `processed` within one session.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    pub discovered: u64,
    pub processed: u64,
    pub cached: u64,
    pub analyzed: u64,
    pub skipped: u64,
    pub error: u64,
    pub current_path: Option<String>,
    pub files_per_second: f64,
    pub eta_seconds: Option<f64>,
    pub memory_mb: u64,
    pub cache_hit_rate: f64,
}

/// Capability for progress emission, replacing a framework-specific
/// signal mechanism.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ScanProgress);
}

/// A [`ProgressSink`] backed by a `tokio::sync::mpsc` channel, consumed
/// by the CLI's `scan` subcommand.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<ScanProgress>,
}

impl ChannelSink {
    pub fn new(tx: tokio::sync::mpsc::Sender<ScanProgress>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ScanProgress) {
        if self.tx.try_send(event).is_err() {
            tracing::debug!("progress channel full or closed, dropping snapshot");
        }
    }
}

/// A no-op sink for callers that don't care about progress (tests,
/// one-shot CLI invocations without a TTY).
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ScanProgress) {}
}

/// Cooperative cancellation flag, checked between files during
/// discovery, between items within a batch, and between batches.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final outcome of [`run`].
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub session_id: i64,
    pub status: SessionStatus,
    pub counters: SessionCounters,
}

/// Drive discovery -> cache check -> extract -> persist for one root.
///
/// Mode semantics: `Full` re-analyzes every discovered path;
/// `Incremental` analyzes only paths absent from the catalogue;
/// `Smart` (default) analyzes absent, stale, or incomplete rows.
pub async fn run(
    catalogue: &CataloguePool,
    extractor: &dyn AudioFeatureExtractor,
    config: &ScanConfig,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<ScanOutcome> {
    validate_root(&config.root).map_err(|_| Error::InvalidLibraryPath(config.root.clone()))?;

    let started = Instant::now();
    let session_id = catalogue
        .start_session(&config.root.to_string_lossy(), config.mode)
        .await?;

    let mut counters = SessionCounters::default();
    let root = config.root.clone();
    let extensions = config.extensions.clone();
    let mut sys = System::new();
    let pid = Pid::from(std::process::id() as usize);

    let discovered_paths: Vec<PathBuf> =
        tokio::task::spawn_blocking(move || discover(&root, extensions).collect())
            .await
            .map_err(|e| Error::extractor(format!("discovery task panicked: {e}")))?;

    counters.discovered = discovered_paths.len() as u64;
    sink.emit(progress_of(&counters, &started, None, &mut sys, pid));

    let mut pending_batch: Vec<PendingUpsert> = Vec::with_capacity(config.batch_size);
    let mut processed_since_report = 0u64;
    let mut abort_error: Option<String> = None;

    'outer: for chunk in discovered_paths.chunks(config.batch_size) {
        if cancel.is_cancelled() {
            break;
        }

        let to_process: Vec<PathBuf> = decide_cache_misses(catalogue, config.mode, chunk).await?;
        counters.cached += (chunk.len() - to_process.len()) as u64;

        let validate_permissions = config.validate_permissions;
        let extracted = stream::iter(to_process.into_iter().map(|path| {
            let extractor = extractor;
            async move {
                if validate_permissions
                    && let Err(e) = std::fs::metadata(&path)
                {
                    return (path.clone(), Err(Error::extractor(format!("{}: {e}", path.display()))));
                }
                let result = extractor.extract(&path).await;
                (path, result)
            }
        }))
        .buffer_unordered(config.workers.max(1))
        .collect::<Vec<_>>()
        .await;

        for (path, result) in extracted {
            if cancel.is_cancelled() {
                break 'outer;
            }
            counters.processed += 1;
            processed_since_report += 1;

            match result {
                Ok(features) => {
                    let stat = match fingerprint::stat(&path) {
                        Ok(Some(stat)) => stat,
                        Ok(None) => {
                            counters.skipped += 1;
                            continue;
                        }
                        Err(_) => {
                            counters.error += 1;
                            continue;
                        }
                    };
                    let analysis = AnalysisResult {
                        bpm: features.bpm,
                        initial_key: features.initial_key,
                        camelot_key: features.camelot_key,
                        energy: features.energy,
                        hamms: features.hamms,
                        duration_seconds: features.duration_s,
                        analysis_method: "extractor".to_string(),
                        confidence: features.confidence,
                        analyzed_at: chrono::Utc::now(),
                        scan_session_id: Some(session_id),
                        ..Default::default()
                    };
                    match analysis.validated() {
                        Ok(analysis) => {
                            pending_batch.push(PendingUpsert {
                                path: path.to_string_lossy().to_string(),
                                fingerprint: fingerprint::compute(&path),
                                size: stat.size,
                                mtime: stat.mtime,
                                analysis,
                            });
                            counters.analyzed += 1;
                        }
                        Err(_) => counters.error += 1,
                    }
                }
                Err(e) => {
                    counters.error += 1;
                    if !config.skip_corrupted {
                        abort_error = Some(format!("extractor failed for {}: {e}", path.display()));
                        break 'outer;
                    }
                }
            }

            if pending_batch.len() >= config.batch_size {
                let outcome = catalogue
                    .batch_upsert_analyses(std::mem::take(&mut pending_batch), Some(session_id), config.batch_size)
                    .await;
                counters.error += outcome.failed.len() as u64;
            }

            let current_memory_mb = refresh_memory_mb(&mut sys, pid);
            counters.peak_memory_mb = counters.peak_memory_mb.max(current_memory_mb);
            if current_memory_mb > config.memory_limit_mb {
                tracing::warn!(
                    memory_mb = current_memory_mb,
                    limit_mb = config.memory_limit_mb,
                    "scan resident memory exceeds configured limit"
                );
            }

            if processed_since_report >= config.progress_interval {
                let current_path = Some(path.to_string_lossy().to_string());
                sink.emit(progress_of(&counters, &started, current_path.as_deref(), &mut sys, pid));
                processed_since_report = 0;
            }
        }

        catalogue.update_session(session_id, counters).await?;
    }

    if !pending_batch.is_empty() {
        let outcome = catalogue
            .batch_upsert_analyses(pending_batch, Some(session_id), config.batch_size)
            .await;
        counters.error += outcome.failed.len() as u64;
    }

    let status = if let Some(ref message) = abort_error {
        catalogue
            .complete_session(session_id, counters, SessionStatus::Error, started.elapsed().as_secs_f64(), Some(message.clone()))
            .await?;
        sink.emit(progress_of(&counters, &started, None, &mut sys, pid));
        return Err(Error::extractor(message.clone()));
    } else if cancel.is_cancelled() {
        SessionStatus::Cancelled
    } else {
        SessionStatus::Completed
    };

    catalogue
        .complete_session(session_id, counters, status, started.elapsed().as_secs_f64(), None)
        .await?;
    sink.emit(progress_of(&counters, &started, None, &mut sys, pid));

    Ok(ScanOutcome {
        session_id,
        status,
        counters,
    })
}

fn refresh_memory_mb(sys: &mut System, pid: Pid) -> u64 {
    sys.refresh_process(pid);
    sys.process(pid).map(|p| p.memory() / 1024).unwrap_or(0)
}

/// Apply the cache decision for one batch of discovered paths under the
/// requested mode. `Incremental` is a pure presence check (a path is a
/// hit iff the catalogue has a row for it at all); `Smart` additionally
/// treats a stale `mtime` or incomplete row as a miss.
async fn decide_cache_misses(
    catalogue: &CataloguePool,
    mode: ScanMode,
    paths: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    match mode {
        ScanMode::Full => Ok(paths.to_vec()),
        ScanMode::Incremental => {
            let hits = catalogue.batch_is_present(paths).await?;
            Ok(paths
                .iter()
                .filter(|p| !hits.get(&p.to_string_lossy().to_string()).copied().unwrap_or(false))
                .cloned()
                .collect())
        }
        ScanMode::Smart => {
            let hits = catalogue.batch_is_cached(paths).await?;
            Ok(paths
                .iter()
                .filter(|p| !hits.get(&p.to_string_lossy().to_string()).copied().unwrap_or(false))
                .cloned()
                .collect())
        }
    }
}

fn progress_of(
    counters: &SessionCounters,
    started: &Instant,
    current_path: Option<&str>,
    sys: &mut System,
    pid: Pid,
) -> ScanProgress {
    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    let files_per_second = counters.processed as f64 / elapsed;
    let remaining = counters.discovered.saturating_sub(counters.processed) as f64;
    let eta_seconds = if files_per_second > 0.0 {
        Some(remaining / files_per_second)
    } else {
        None
    };
    let cache_hit_rate = counters.cached as f64 / counters.processed.max(1) as f64;

    ScanProgress {
        discovered: counters.discovered,
        processed: counters.processed,
        cached: counters.cached,
        analyzed: counters.analyzed,
        skipped: counters.skipped,
        error: counters.error,
        current_path: current_path.map(|s| s.to_string()),
        files_per_second,
        eta_seconds,
        memory_mb: refresh_memory_mb(sys, pid),
        cache_hit_rate,
    }
}

/// Orphan sweep: mark every active track whose path is no longer
/// present on disk as missing. Run separately from [`run`] since
/// orphan cleanup is distinct from the scan's discovery loop.
pub async fn sweep_orphans(catalogue: &CataloguePool, candidate_paths: &[String]) -> Result<usize> {
    let mut missing = Vec::new();
    for path in candidate_paths {
        if !Path::new(path).exists() {
            missing.push(path.clone());
        }
    }
    let count = missing.len();
    catalogue.mark_missing(&missing).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::CatalogueOptions;
    use crate::extractor::MockExtractor;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_scan_full_mode_analyzes_every_file() {
        let lib_dir = tempdir().unwrap();
        std::fs::write(lib_dir.path().join("a.mp3"), b"x").unwrap();
        std::fs::write(lib_dir.path().join("b.mp3"), b"y").unwrap();

        let db_dir = tempdir().unwrap();
        let catalogue = CataloguePool::open(&db_dir.path().join("cat.db"), &CatalogueOptions::default())
            .await
            .unwrap();

        let config = ScanConfig {
            root: lib_dir.path().to_path_buf(),
            mode: ScanMode::Full,
            batch_size: 10,
            ..Default::default()
        };

        let outcome = run(
            &catalogue,
            &MockExtractor::new(),
            &config,
            &CancelToken::new(),
            &NullSink,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, SessionStatus::Completed);
        assert_eq!(outcome.counters.discovered, 2);
        assert_eq!(outcome.counters.analyzed, 2);
    }

    #[tokio::test]
    async fn test_scan_smart_mode_skips_cached_files() {
        let lib_dir = tempdir().unwrap();
        std::fs::write(lib_dir.path().join("a.mp3"), b"x").unwrap();

        let db_dir = tempdir().unwrap();
        let catalogue = CataloguePool::open(&db_dir.path().join("cat.db"), &CatalogueOptions::default())
            .await
            .unwrap();

        let config = ScanConfig {
            root: lib_dir.path().to_path_buf(),
            mode: ScanMode::Smart,
            batch_size: 10,
            ..Default::default()
        };

        let first = run(&catalogue, &MockExtractor::new(), &config, &CancelToken::new(), &NullSink)
            .await
            .unwrap();
        assert_eq!(first.counters.analyzed, 1);

        let second = run(&catalogue, &MockExtractor::new(), &config, &CancelToken::new(), &NullSink)
            .await
            .unwrap();
        assert_eq!(second.counters.cached, 1);
        assert_eq!(second.counters.analyzed, 0);
    }

    #[tokio::test]
    async fn test_scan_incremental_mode_ignores_stale_mtime() {
        let lib_dir = tempdir().unwrap();
        let track = lib_dir.path().join("a.mp3");
        std::fs::write(&track, b"x").unwrap();

        let db_dir = tempdir().unwrap();
        let catalogue = CataloguePool::open(&db_dir.path().join("cat.db"), &CatalogueOptions::default())
            .await
            .unwrap();

        let config = ScanConfig {
            root: lib_dir.path().to_path_buf(),
            mode: ScanMode::Incremental,
            batch_size: 10,
            ..Default::default()
        };

        let first = run(&catalogue, &MockExtractor::new(), &config, &CancelToken::new(), &NullSink)
            .await
            .unwrap();
        assert_eq!(first.counters.analyzed, 1);

        // Touch the file so its mtime moves forward; Smart would
        // re-analyze, but Incremental only checks presence.
        std::fs::write(&track, b"xy").unwrap();

        let second = run(&catalogue, &MockExtractor::new(), &config, &CancelToken::new(), &NullSink)
            .await
            .unwrap();
        assert_eq!(second.counters.cached, 1);
        assert_eq!(second.counters.analyzed, 0);
    }

    #[tokio::test]
    async fn test_scan_skip_corrupted_false_aborts_with_terminal_error() {
        let lib_dir = tempdir().unwrap();
        let bad = lib_dir.path().join("bad.mp3");
        std::fs::write(&bad, b"x").unwrap();

        let db_dir = tempdir().unwrap();
        let catalogue = CataloguePool::open(&db_dir.path().join("cat.db"), &CatalogueOptions::default())
            .await
            .unwrap();

        let config = ScanConfig {
            root: lib_dir.path().to_path_buf(),
            mode: ScanMode::Full,
            batch_size: 10,
            skip_corrupted: false,
            ..Default::default()
        };

        let extractor = MockExtractor::new().fail_on(bad.to_string_lossy().to_string());
        let result = run(&catalogue, &extractor, &config, &CancelToken::new(), &NullSink).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scan_rejects_invalid_root() {
        let db_dir = tempdir().unwrap();
        let catalogue = CataloguePool::open(&db_dir.path().join("cat.db"), &CatalogueOptions::default())
            .await
            .unwrap();

        let config = ScanConfig {
            root: PathBuf::from("/does/not/exist"),
            ..Default::default()
        };

        let result = run(&catalogue, &MockExtractor::new(), &config, &CancelToken::new(), &NullSink).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sweep_orphans_marks_missing_without_deleting() {
        let lib_dir = tempdir().unwrap();
        let track = lib_dir.path().join("gone.mp3");
        std::fs::write(&track, b"x").unwrap();

        let db_dir = tempdir().unwrap();
        let catalogue = CataloguePool::open(&db_dir.path().join("cat.db"), &CatalogueOptions::default())
            .await
            .unwrap();

        catalogue
            .upsert_analysis(
                &track,
                AnalysisResult {
                    bpm: Some(120.0),
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

        std::fs::remove_file(&track).unwrap();
        let path_str = track.to_string_lossy().to_string();
        let marked = sweep_orphans(&catalogue, &[path_str]).await.unwrap();
        assert_eq!(marked, 1);
    }
}
