//! Parallel analysis of independent captures
//!
//! Captures share no mutable state, so each worker runs the whole pipeline on
//! its own job. The registry is borrowed by every worker; results come back
//! in input order.

use crossbeam_channel::{bounded, unbounded};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, info, warn};

use crate::analysis::{Analysis, Analyzer};
use crate::classifier::SignalType;
use crate::error::Result;
use crate::trace::{read_file, Signal};

/// Jobs buffered ahead of the workers
const JOB_QUEUE_DEPTH: usize = 64;

/// Counters for one runner (atomic for access from worker threads)
#[derive(Debug, Default)]
pub struct BatchStats {
    pub analyzed: AtomicU64,
    pub failed: AtomicU64,
    pub identified: AtomicU64,
    pub fixed: AtomicU64,
    pub rolling: AtomicU64,
    pub ambiguous: AtomicU64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, analysis: &Analysis) {
        self.analyzed.fetch_add(1, Ordering::Relaxed);
        if !analysis.matches.is_empty() {
            self.identified.fetch_add(1, Ordering::Relaxed);
        }
        let counter = match analysis.classification.signal_type {
            SignalType::Fixed => &self.fixed,
            SignalType::Rolling => &self.rolling,
            SignalType::Ambiguous => &self.ambiguous,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_analyzed(&self) -> u64 {
        self.analyzed.load(Ordering::Relaxed)
    }

    pub fn get_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn get_identified(&self) -> u64 {
        self.identified.load(Ordering::Relaxed)
    }

    /// (fixed, rolling, ambiguous)
    pub fn get_verdicts(&self) -> (u64, u64, u64) {
        (
            self.fixed.load(Ordering::Relaxed),
            self.rolling.load(Ordering::Relaxed),
            self.ambiguous.load(Ordering::Relaxed),
        )
    }
}

/// Outcome for one input file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Result<Analysis>,
}

pub struct BatchRunner<'r> {
    analyzer: Analyzer<'r>,
    workers: usize,
    stats: BatchStats,
}

impl<'r> BatchRunner<'r> {
    pub fn new(analyzer: Analyzer<'r>, workers: usize) -> Self {
        Self {
            analyzer,
            workers: workers.max(1),
            stats: BatchStats::new(),
        }
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Load and analyze every file. A failing file does not stop the batch.
    pub fn run_files<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> Vec<FileReport> {
        info!(
            "Analyzing {} captures on {} workers",
            paths.len(),
            self.workers.min(paths.len().max(1))
        );

        let reports = self.run_jobs(paths.iter().collect(), |path: &P| {
            let path = path.as_ref();
            let outcome = read_file(path).map(|signal| self.analyzer.run(signal));
            match &outcome {
                Ok(analysis) => {
                    self.stats.record(analysis);
                    debug!("{}: {} bits", path.display(), analysis.decoded.len());
                }
                Err(e) => {
                    self.stats.record_failure();
                    warn!("{}: {}", path.display(), e);
                }
            }
            FileReport {
                path: path.to_path_buf(),
                outcome,
            }
        });

        let (fixed, rolling, ambiguous) = self.stats.get_verdicts();
        info!(
            "Batch complete: {} analyzed, {} failed, {} identified ({} fixed, {} rolling, {} ambiguous)",
            self.stats.get_analyzed(),
            self.stats.get_failed(),
            self.stats.get_identified(),
            fixed,
            rolling,
            ambiguous
        );
        reports
    }

    /// Analyze signals already in memory
    pub fn run_signals(&self, signals: Vec<Signal>) -> Vec<Analysis> {
        self.run_jobs(signals, |signal| {
            let analysis = self.analyzer.run(signal);
            self.stats.record(&analysis);
            analysis
        })
    }

    /// Run `job` over `items` on the worker pool, preserving input order
    fn run_jobs<T, R, F>(&self, items: Vec<T>, job: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }
        let workers = self.workers.min(items.len());
        let (job_tx, job_rx) = bounded::<(usize, T)>(JOB_QUEUE_DEPTH);
        let (result_tx, result_rx) = unbounded::<(usize, R)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let job = &job;
                scope.spawn(move || {
                    for (idx, item) in job_rx.iter() {
                        if result_tx.send((idx, job(item))).is_err() {
                            break;
                        }
                    }
                });
            }
            for entry in items.into_iter().enumerate() {
                if job_tx.send(entry).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });
        drop(result_tx);

        let mut results: Vec<(usize, R)> = result_rx.iter().collect();
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }
}
