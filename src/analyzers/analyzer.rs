use crate::analyzers::aggregate::finalize;
use crate::analyzers::types::DashboardDocument;
use crate::archive::{discover, for_each_batch};
use crate::config::AggregationConfig;
use crate::parser::parse_batch;
use crate::stats::TripStats;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// How many batches of an archive (or a whole run) were folded or skipped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FoldReport {
    pub batches_folded: usize,
    pub batches_skipped: usize,
}

impl FoldReport {
    pub fn merge(&mut self, other: FoldReport) {
        self.batches_folded += other.batches_folded;
        self.batches_skipped += other.batches_skipped;
    }
}

/// Folds every batch of one archive into `stats`.
///
/// Unreadable batches (and unreadable archives) are logged and skipped; they
/// never abort the run.
#[tracing::instrument(skip_all, fields(archive = %path.display()))]
pub fn fold_archive(path: &Path, stats: &mut TripStats) -> FoldReport {
    let mut report = FoldReport::default();

    let result = for_each_batch(path, |source, reader| {
        match reader.and_then(|r| parse_batch(source, r)) {
            Ok(batch) => {
                let schema = batch.schema;
                let rows_read = batch.rows_read;
                let rows_kept = batch.records.len();
                stats.fold(batch);
                report.batches_folded += 1;
                // `stats` is this archive's shard; the run total is logged on merge
                info!(
                    source,
                    ?schema,
                    rows_read,
                    rows_kept,
                    archive_trips = stats.total_trips,
                    "Batch folded"
                );
            }
            Err(e) => {
                report.batches_skipped += 1;
                let reason = format!("{e:#}");
                error!(source, error = %reason, "Skipping unreadable batch");
            }
        }
    });

    if let Err(e) = result {
        report.batches_skipped += 1;
        let reason = format!("{e:#}");
        error!(error = %reason, "Skipping unreadable archive");
    }

    report
}

/// Folds all archives, `jobs` at a time, and merges the per-archive shards
/// in input order.
///
/// Each archive gets its own [`TripStats`] on a blocking worker, so no two
/// workers ever write to the same aggregates. With `jobs == 1` archives are
/// processed strictly one after another.
#[tracing::instrument(skip_all, fields(archives = paths.len(), jobs = jobs))]
pub async fn aggregate_archives(paths: Vec<PathBuf>, jobs: usize) -> Result<(TripStats, FoldReport)> {
    let mut stats = TripStats::default();
    let mut report = FoldReport::default();

    for chunk in paths.chunks(jobs.max(1)) {
        let workers: Vec<_> = chunk
            .iter()
            .cloned()
            .map(|path| {
                let span = tracing::Span::current();
                tokio::task::spawn_blocking(move || {
                    let _entered = span.enter();
                    let mut shard = TripStats::default();
                    let shard_report = fold_archive(&path, &mut shard);
                    (shard, shard_report)
                })
            })
            .collect();

        for (path, worker) in chunk.iter().zip(workers) {
            let (shard, shard_report) = worker.await.context("archive worker panicked")?;
            let archive_trips = shard.total_trips;
            stats.merge(shard);
            report.merge(shard_report);
            info!(
                archive = %path.display(),
                archive_trips,
                running_total = stats.total_trips,
                batches_folded = report.batches_folded,
                "Archive merged"
            );
        }
    }

    Ok((stats, report))
}

/// Runs the whole aggregation over `data_dir` and returns the finalized document.
///
/// # Errors
///
/// Fails when no input file is found or when not a single batch could be read.
#[tracing::instrument(skip_all, fields(data_dir = %data_dir.display(), jobs = jobs))]
pub async fn run(data_dir: &Path, config: &AggregationConfig, jobs: usize) -> Result<DashboardDocument> {
    let paths = discover(data_dir)?;
    if paths.is_empty() {
        bail!("no .zip, .csv or .csv.gz files found in {}", data_dir.display());
    }
    info!(archives = paths.len(), "Discovered input files");

    let (stats, report) = aggregate_archives(paths, jobs).await?;
    if report.batches_folded == 0 {
        bail!(
            "none of the {} batches in {} could be read",
            report.batches_skipped,
            data_dir.display()
        );
    }
    if stats.total_trips == 0 {
        warn!("No valid trips found; the document will be empty");
    }

    info!(
        total_trips = stats.total_trips,
        batches_folded = report.batches_folded,
        batches_skipped = report.batches_skipped,
        rows_read = stats.rows_read,
        rows_dropped = stats.rows_dropped,
        "Aggregation complete"
    );

    Ok(finalize(stats, config))
}
