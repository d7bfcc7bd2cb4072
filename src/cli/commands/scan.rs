//! `scan` subcommand: discover and analyze a library root.

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;
use crate::discovery::ExtensionFilter;
use crate::error::Result;
use crate::extractor::MockExtractor;
use crate::model::ScanMode;
use crate::scanner::{self, CancelToken, ChannelSink, ScanConfig};

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Library root to scan.
    pub root: PathBuf,

    /// `full` | `incremental` | `smart`.
    #[arg(long)]
    pub mode: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Bounded parallelism for cache-miss extraction.
    #[arg(long)]
    pub workers: Option<usize>,
}

pub async fn run(args: &ScanArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let catalogue = super::open_catalogue(db, config).await?;

    let mode: ScanMode = args
        .mode
        .as_deref()
        .unwrap_or(&config.scan.mode)
        .parse()?;

    let scan_config = ScanConfig {
        root: args.root.clone(),
        mode,
        batch_size: args.batch_size.unwrap_or(config.scan.batch_size),
        extensions: ExtensionFilter::new(config.scan.supported_extensions.iter()),
        progress_interval: config.scan.progress_interval,
        memory_limit_mb: config.scan.memory_limit_mb,
        skip_corrupted: config.scan.skip_corrupted,
        validate_permissions: config.scan.validate_permissions,
        workers: args.workers.unwrap_or(config.scan.workers),
    };

    let cancel = CancelToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("scan cancellation requested");
            cancel_for_signal.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let sink = ChannelSink::new(tx);
    let progress_task = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            eprintln!(
                "discovered={} processed={} cached={} analyzed={} skipped={} error={} \
                 files_per_second={:.2} eta_seconds={} memory_mb={} cache_hit_rate={:.2} current={}",
                progress.discovered,
                progress.processed,
                progress.cached,
                progress.analyzed,
                progress.skipped,
                progress.error,
                progress.files_per_second,
                progress
                    .eta_seconds
                    .map(|s| format!("{s:.0}"))
                    .unwrap_or_else(|| "-".to_string()),
                progress.memory_mb,
                progress.cache_hit_rate,
                progress.current_path.as_deref().unwrap_or("-")
            );
        }
    });

    // Real audio decoding is external to the core (AudioFeatureExtractor
    // is a capability the caller supplies); no DSP backend ships here,
    // so the CLI wires in a mock extractor until one is plugged in.
    let extractor = MockExtractor::new();
    let outcome = scanner::run(&catalogue, &extractor, &scan_config, &cancel, &sink).await?;
    drop(sink);
    let _ = progress_task.await;

    println!(
        "session {} finished {:?}: discovered={} analyzed={} cached={} skipped={} error={}",
        outcome.session_id,
        outcome.status,
        outcome.counters.discovered,
        outcome.counters.analyzed,
        outcome.counters.cached,
        outcome.counters.skipped,
        outcome.counters.error
    );

    if cancel.is_cancelled() {
        return Err(crate::error::Error::Cancelled);
    }
    Ok(())
}
