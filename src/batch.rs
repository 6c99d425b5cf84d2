//! # Batch Driver
//!
//! Runs a profile over many files with at most `workers` optimizers alive
//! at once. Paths are canonicalized and de-duplicated before scheduling, so
//! the same file is never handed to two concurrent runs.
//!
//! Each file ends in one of three states:
//! - `replaced`: the optimizer's output took the original's place
//! - `failed`: the tool reported a failure, the original is untouched
//! - `error`: a fatal problem (missing tool, cleanup failure, bad path)

use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use crate::json_output::JsonMessage;
use crate::optimizer::{Optimizer, Outcome};
use crate::progress::{OptimizationStats, ProgressManager};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Which optimization a batch applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Jpeg,
    Png,
    Encode { quality: i32 },
    /// Lossless profile chosen from the extension
    Auto,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Jpeg => "jpeg",
            Profile::Png => "png",
            Profile::Encode { .. } => "encode",
            Profile::Auto => "optimize",
        }
    }

    pub async fn apply(self, optimizer: &Optimizer, path: &Path) -> Result<Outcome> {
        match self {
            Profile::Jpeg => optimizer.optimize_jpeg(path).await,
            Profile::Png => optimizer.optimize_png(path).await,
            Profile::Encode { quality } => optimizer.encode_jpeg(path, quality).await,
            Profile::Auto => optimizer.optimize(path).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Replaced,
    Failed,
    Error,
}

/// Result for one file of a batch
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub original_size: u64,
    /// Size after the run; equals `original_size` unless replaced
    pub new_size: u64,
    pub status: FileStatus,
    /// Tool diagnostics or the fatal error, if any
    pub message: Option<String>,
}

impl FileReport {
    fn from_result(path: PathBuf, original_size: u64, new_size: u64, result: Result<Outcome>) -> Self {
        let (status, message) = match result {
            Ok(Outcome::Replaced) => (FileStatus::Replaced, None),
            Ok(Outcome::Failed(failure)) => (FileStatus::Failed, Some(failure.message)),
            Err(e) => (FileStatus::Error, Some(e.to_string())),
        };
        Self {
            path,
            original_size,
            new_size,
            status,
            message,
        }
    }

    fn error(path: PathBuf, message: String) -> Self {
        Self {
            path,
            original_size: 0,
            new_size: 0,
            status: FileStatus::Error,
            message: Some(message),
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.new_size)
    }

    fn status_line(&self) -> String {
        let name = self.path.file_name().unwrap_or_default().to_string_lossy();
        match self.status {
            FileStatus::Replaced => format!("[OK] {}: {:.1}% saved", name, self.reduction_percent()),
            FileStatus::Failed => format!("[FAIL] {}: {}", name, self.message.as_deref().unwrap_or("")),
            FileStatus::Error => format!("[ERROR] {}: {}", name, self.message.as_deref().unwrap_or("")),
        }
    }
}

/// Where per-file results are reported while a batch runs
#[derive(Clone)]
pub enum Reporter {
    Progress(ProgressManager),
    Json,
    Quiet,
}

impl Reporter {
    fn start(&self, profile: &str, total_files: usize) {
        if let Reporter::Json = self {
            JsonMessage::start(profile, total_files).emit();
        }
    }

    fn file_done(&self, report: &FileReport) {
        match self {
            Reporter::Progress(progress) => progress.update(&report.status_line()),
            Reporter::Json => JsonMessage::file_complete(report).emit(),
            Reporter::Quiet => {}
        }
    }

    fn finish(&self, stats: &OptimizationStats, started: Instant) {
        match self {
            Reporter::Progress(progress) => progress.finish(&stats.format_summary()),
            Reporter::Json => JsonMessage::complete(stats, started.elapsed().as_secs_f64()).emit(),
            Reporter::Quiet => {}
        }
    }
}

/// Reports of a finished batch, in input order
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
    pub stats: OptimizationStats,
}

pub struct BatchRunner {
    workers: usize,
    reporter: Reporter,
}

impl BatchRunner {
    pub fn new(workers: usize, reporter: Reporter) -> Self {
        Self {
            workers: workers.max(1),
            reporter,
        }
    }

    /// Apply a named profile to every path
    pub async fn run_profile(&self, optimizer: Arc<Optimizer>, profile: Profile, paths: Vec<PathBuf>) -> BatchSummary {
        self.reporter.start(profile.name(), paths.len());
        self.run(paths, move |path| {
            let optimizer = Arc::clone(&optimizer);
            async move { profile.apply(&optimizer, &path).await }
        })
        .await
    }

    /// Run `job` once per distinct file, bounded by the worker count
    pub async fn run<F, Fut>(&self, paths: Vec<PathBuf>, job: F) -> BatchSummary
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        let started = Instant::now();
        let (unique, mut early) = dedupe(paths).await;
        info!("Processing {} files with {} workers", unique.len(), self.workers);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let job = Arc::new(job);
        let mut tasks = JoinSet::new();

        for (index, path) in unique {
            let semaphore = Arc::clone(&semaphore);
            let job = Arc::clone(&job);
            tasks.spawn(async move {
                let report = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let original_size = FileManager::size_or_zero(&path).await;
                        let result = job(path.clone()).await;
                        let new_size = FileManager::size_or_zero(&path).await;
                        FileReport::from_result(path, original_size, new_size, result)
                    }
                    Err(e) => FileReport::error(path, e.to_string()),
                };
                (index, report)
            });
        }

        let mut done: Vec<(usize, FileReport)> = Vec::new();
        for (_, report) in &early {
            self.reporter.file_done(report);
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    log_report(&report);
                    self.reporter.file_done(&report);
                    done.push((index, report));
                }
                Err(e) => error!("Batch task panicked: {}", e),
            }
        }

        done.append(&mut early);
        done.sort_by_key(|(index, _)| *index);

        let mut stats = OptimizationStats::new();
        for (_, report) in &done {
            match report.status {
                FileStatus::Replaced => stats.add_replaced(report.original_size, report.new_size),
                FileStatus::Failed => stats.add_failed(report.original_size),
                FileStatus::Error => stats.add_error(),
            }
        }
        self.reporter.finish(&stats, started);
        info!("{}", stats.format_summary());

        BatchSummary {
            reports: done.into_iter().map(|(_, report)| report).collect(),
            stats,
        }
    }
}

fn log_report(report: &FileReport) {
    match report.status {
        FileStatus::Replaced => debug!("{}", report.status_line()),
        FileStatus::Failed => warn!("{}", report.status_line()),
        FileStatus::Error => error!("{}", report.status_line()),
    }
}

/// Canonicalize paths and drop repeats. Paths that cannot be resolved come
/// back as ready-made error reports.
async fn dedupe(paths: Vec<PathBuf>) -> (Vec<(usize, PathBuf)>, Vec<(usize, FileReport)>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut rejected = Vec::new();

    for (index, path) in paths.into_iter().enumerate() {
        match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => {
                if seen.insert(canonical.clone()) {
                    unique.push((index, canonical));
                } else {
                    debug!("Skipping duplicate path: {}", path.display());
                }
            }
            Err(e) => {
                let message = OptimizeError::Io(e).to_string();
                rejected.push((index, FileReport::error(path, message)));
            }
        }
    }

    (unique, rejected)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::optimizer::{run_optimizer, CommandTemplate, Mode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn shrink(path: PathBuf) -> Result<Outcome> {
        let command = CommandTemplate::new("sh").args(["-c", "head -c 3 \"$0\" > \"$1\""]).input().output();
        run_optimizer(&path, &command, Mode::InPlace, Duration::from_secs(10)).await
    }

    #[tokio::test]
    async fn test_batch_replaces_and_reports() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.jpg", b"0123456789");
        let b = write(dir.path(), "b.jpg", b"abcdefghij");

        let runner = BatchRunner::new(2, Reporter::Quiet);
        let summary = runner.run(vec![a.clone(), b.clone()], shrink).await;

        assert_eq!(summary.reports.len(), 2);
        assert!(summary.reports.iter().all(|r| r.status == FileStatus::Replaced));
        assert_eq!(summary.reports[0].original_size, 10);
        assert_eq!(summary.reports[0].new_size, 3);
        assert_eq!(summary.stats.total_bytes_saved, 14);
        assert_eq!(std::fs::read(&a).unwrap(), b"012");
        assert_eq!(std::fs::read(&b).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_batch_dedupes_same_file() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.jpg", b"0123456789");
        let alias = dir.path().join(".").join("a.jpg");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let runner = BatchRunner::new(4, Reporter::Quiet);
        let summary = runner
            .run(vec![a.clone(), alias, a], move |path| {
                counter.fetch_add(1, Ordering::SeqCst);
                shrink(path)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.reports.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_respects_worker_limit() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..6).map(|i| write(dir.path(), &format!("{i}.png"), b"data")).collect();

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (running_job, peak_job) = (Arc::clone(&running), Arc::clone(&peak));

        let runner = BatchRunner::new(2, Reporter::Quiet);
        let summary = runner
            .run(paths, move |_path| {
                let running = Arc::clone(&running_job);
                let peak = Arc::clone(&peak_job);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(Outcome::Replaced)
                }
            })
            .await;

        assert_eq!(summary.stats.files_replaced, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_batch_classifies_failures_and_errors() {
        let dir = TempDir::new().unwrap();
        let failing = write(dir.path(), "fail.jpg", b"keep me");
        let missing = dir.path().join("missing.jpg");

        let runner = BatchRunner::new(2, Reporter::Quiet);
        let summary = runner
            .run(vec![failing.clone(), missing], |path| async move {
                let command = CommandTemplate::new("sh").args(["-c", "echo broken >&2; exit 2"]).input().output();
                run_optimizer(&path, &command, Mode::InPlace, Duration::from_secs(10)).await
            })
            .await;

        assert_eq!(summary.reports[0].status, FileStatus::Failed);
        assert_eq!(summary.reports[0].message.as_deref().map(str::trim), Some("broken"));
        assert_eq!(summary.reports[0].new_size, summary.reports[0].original_size);
        assert_eq!(summary.reports[1].status, FileStatus::Error);
        assert_eq!(summary.stats.files_failed, 1);
        assert_eq!(summary.stats.errors, 1);
        assert_eq!(std::fs::read(&failing).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_profile_auto_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "notes.txt", b"text");

        let runner = BatchRunner::new(1, Reporter::Quiet);
        let summary = runner
            .run_profile(Arc::new(Optimizer::default()), Profile::Auto, vec![path])
            .await;
        assert_eq!(summary.reports[0].status, FileStatus::Error);
    }
}
