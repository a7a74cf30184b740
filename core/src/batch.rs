//! Batch coordination and the converter service object.
//!
//! [`Converter`] owns the queue and drives the pipeline over it strictly in
//! order: a file is fully decoded and encoded before the next one starts,
//! and history/stats are only touched between items. `&mut self` on every
//! mutating method keeps queue edits and batches from interleaving.

use std::sync::Arc;

use crate::bundle::{Bundle, ResultBundler};
use crate::config::ConversionConfig;
use crate::encoder::{ImageEncoder, RasterEncoder};
use crate::history::{HistoryRecord, HistoryStore};
use crate::intake::{FileDescriptor, FileQueue, IntakeReport, QueuedFile};
use crate::notify::{Notifier, Severity};
use crate::pipeline::{ConversionPipeline, ConversionResult, Outcome};
use crate::stats::{StatsAggregator, StatsCounters};
use crate::store::KeyValueStore;
use crate::video::{FfmpegDecoder, FrameExtractor, VideoDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
}

/// Progress snapshot emitted after each item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

/// Results of one invocation, in queue order. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct BatchRun {
    pub results: Vec<ConversionResult>,
    pub attempted: usize,
    pub succeeded: usize,
}

impl BatchRun {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    pub fn successes(&self) -> impl Iterator<Item = &ConversionResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn total_output_bytes(&self) -> u64 {
        self.successes().map(|r| r.byte_size).sum()
    }
}

/// Collaborators injected into a [`Converter`].
pub struct ConverterParts {
    pub store: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn Notifier>,
    pub encoder: Arc<dyn RasterEncoder>,
    pub decoder: Arc<dyn VideoDecoder>,
    pub bundler: ResultBundler,
}

impl ConverterParts {
    /// Default image encoder, ffmpeg video decoding, zip bundling.
    pub fn new(store: Arc<dyn KeyValueStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            encoder: Arc::new(ImageEncoder),
            decoder: Arc::new(FfmpegDecoder::default()),
            bundler: ResultBundler::default(),
        }
    }
}

pub struct Converter {
    config: ConversionConfig,
    queue: FileQueue,
    state: BatchState,
    pipeline: ConversionPipeline,
    history: HistoryStore,
    stats: StatsAggregator,
    bundler: ResultBundler,
    notifier: Arc<dyn Notifier>,
}

impl Converter {
    pub fn new(config: ConversionConfig, parts: ConverterParts) -> Self {
        let extractor = FrameExtractor::new(parts.decoder, config.frame_timeout);
        Self {
            pipeline: ConversionPipeline::new(extractor, parts.encoder),
            history: HistoryStore::new(Arc::clone(&parts.store), config.history_limit),
            stats: StatsAggregator::new(parts.store),
            bundler: parts.bundler,
            notifier: parts.notifier,
            queue: FileQueue::new(),
            state: BatchState::Idle,
            config,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConversionConfig {
        &mut self.config
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn queue(&self) -> &[QueuedFile] {
        self.queue.files()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Validate and enqueue. Rejections are reported as one aggregate message.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = FileDescriptor>) -> IntakeReport {
        let report = self.queue.add_files(files);

        if report.accepted > 0 {
            self.notifier
                .notify(Severity::Success, &format!("Added {} file(s)", report.accepted));
        }
        if report.rejected() > 0 {
            let severity = if report.accepted == 0 {
                Severity::Error
            } else {
                Severity::Warning
            };
            self.notifier.notify(
                severity,
                &format!(
                    "Skipped {} file(s): unsupported format or already added",
                    report.rejected()
                ),
            );
        }
        report
    }

    pub fn remove_file(&mut self, index: usize) -> Option<QueuedFile> {
        self.queue.remove(index)
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Convert every queued file to the configured target, in order.
    /// The queue is left intact for re-conversion.
    pub async fn convert_all(&mut self, mut on_progress: impl FnMut(Progress)) -> BatchRun {
        if self.queue.is_empty() {
            self.notifier.notify(Severity::Info, "Nothing to convert");
            return BatchRun::default();
        }

        self.state = BatchState::Running;
        let target = self.config.target;
        let quality = self.config.quality;
        let total = self.queue.len();
        log::info!("Converting {} file(s) to {}", total, target.extension());

        let mut run = BatchRun::default();
        for (i, file) in self.queue.files().iter().enumerate() {
            let result = self.pipeline.convert(file, target, quality).await;
            run.attempted += 1;

            match &result.outcome {
                Outcome::Success => {
                    run.succeeded += 1;
                    let record = HistoryRecord::now(&file.name, target.extension());
                    if let Err(e) = self.history.add(record) {
                        log::warn!("Failed to record history for {}: {}", file.name, e);
                        self.notifier
                            .notify(Severity::Warning, &format!("Could not save history: {}", e));
                    }
                }
                Outcome::Failure(e) => {
                    self.notifier.notify(
                        Severity::Error,
                        &format!("Failed to convert {}: {}", file.name, e),
                    );
                }
            }
            run.results.push(result);

            let completed = i + 1;
            on_progress(Progress {
                completed,
                total,
                percent: completed as f64 / total as f64 * 100.0,
            });
        }

        // Counted by attempts, not successes.
        if let Err(e) = self.stats.increment(run.attempted as u64) {
            log::warn!("Failed to update usage stats: {}", e);
            self.notifier
                .notify(Severity::Warning, &format!("Could not save statistics: {}", e));
        }

        self.state = BatchState::Idle;
        self.notify_summary(&run);
        run
    }

    /// Assemble downloads for a finished batch.
    pub fn bundle(&self, run: &BatchRun) -> Bundle {
        self.bundler.bundle(&run.results, self.notifier.as_ref())
    }

    pub fn clear_history(&self) {
        match self.history.clear() {
            Ok(()) => self.notifier.notify(Severity::Info, "History cleared"),
            Err(e) => self
                .notifier
                .notify(Severity::Error, &format!("Could not clear history: {}", e)),
        }
    }

    pub fn history_records(&self) -> Vec<HistoryRecord> {
        self.history.records().unwrap_or_else(|e| {
            log::warn!("Failed to read history: {}", e);
            Vec::new()
        })
    }

    pub fn stats_counters(&self) -> StatsCounters {
        self.stats.counters().unwrap_or_else(|e| {
            log::warn!("Failed to read stats: {}", e);
            StatsCounters::default()
        })
    }

    fn notify_summary(&self, run: &BatchRun) {
        log::info!(
            "Batch finished: {} of {} converted",
            run.succeeded,
            run.attempted
        );
        let (severity, message) = match run.succeeded {
            0 => (Severity::Error, "Could not convert any files".to_string()),
            n if n == run.attempted => (Severity::Success, format!("Converted {} file(s)", n)),
            n => (
                Severity::Warning,
                format!("Converted {} of {} file(s)", n, run.attempted),
            ),
        };
        self.notifier.notify(severity, &message);
    }
}
