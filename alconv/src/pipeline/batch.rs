//! Sequential batch processing
//!
//! Jobs are taken from an explicit work queue one at a time. The next job is
//! only prepared after the previous job's finalize has completed, so at most
//! one pump is ever alive.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::decoder::DecoderFactory;
use crate::audio::muxer::MuxerFactory;
use crate::config::{BatchSettings, ConvertOptions};
use crate::pipeline::job::{JobReport, TranscodeJob};
use crate::pipeline::pump::PumpConfig;

/// Progress notifications emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// A job was prepared and is about to stream
    JobStarted { index: usize, source: PathBuf },
    /// A job could not be prepared and was dropped
    JobSkipped { index: usize, source: PathBuf, error: String },
    /// A job's container was finalized
    JobCompleted { index: usize, report: JobReport },
    /// All jobs handled, grace interval elapsed
    BatchFinished { completed: usize, failed: usize, cancelled: usize },
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Jobs that streamed and finalized, in processing order
    pub completed: Vec<JobReport>,
    /// Jobs skipped during preparation, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Jobs never started because the batch was cancelled
    pub cancelled: usize,
}

impl BatchSummary {
    /// Completed jobs whose output may be short
    pub fn truncated(&self) -> usize {
        self.completed.iter().filter(|r| r.is_truncated()).count()
    }

    /// Completed jobs whose finalize or encoder failed
    pub fn failed_writes(&self) -> usize {
        self.completed
            .iter()
            .filter(|r| !r.outcome.is_success() || r.write_error.is_some())
            .count()
    }

    /// Whether any job failed anywhere
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || self.failed_writes() > 0
    }
}

/// Runs a list of sources through the pipeline, one at a time
pub struct BatchOrchestrator {
    decoders: Arc<dyn DecoderFactory>,
    muxers: Arc<dyn MuxerFactory>,
    pump_config: PumpConfig,
    grace_interval: Duration,
    events: Option<UnboundedSender<BatchEvent>>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        decoders: Arc<dyn DecoderFactory>,
        muxers: Arc<dyn MuxerFactory>,
        settings: &BatchSettings,
    ) -> Self {
        Self {
            decoders,
            muxers,
            pump_config: PumpConfig {
                buffer_frames: settings.buffer_frames,
                queue_depth: settings.queue_depth,
            },
            grace_interval: settings.grace_interval,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Send progress events to `tx`
    pub fn with_events(mut self, tx: UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Stop taking new jobs once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone just means nobody is listening any more
            let _ = tx.send(event);
        }
    }

    /// Process every source in order, writing outputs into `destination_dir`.
    ///
    /// A job that fails to prepare is logged and skipped; the rest still run.
    pub async fn process(&self, jobs: Vec<PathBuf>, destination_dir: &Path, options: &ConvertOptions) -> BatchSummary {
        let mut queue: VecDeque<(usize, PathBuf)> = jobs.into_iter().enumerate().collect();
        let mut summary = BatchSummary::default();

        info!("Start processing {} file(s)", queue.len());

        while let Some((index, source)) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                info!("Cancelled, {} job(s) not started", queue.len() + 1);
                summary.cancelled = queue.len() + 1;
                break;
            }

            info!("{}", source.display());

            let job = match TranscodeJob::prepare(
                &source,
                destination_dir,
                options,
                self.pump_config,
                self.decoders.as_ref(),
                self.muxers.as_ref(),
            ) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping {}: {}", source.display(), e);
                    self.emit(BatchEvent::JobSkipped {
                        index,
                        source: source.clone(),
                        error: e.to_string(),
                    });
                    summary.failed.push((source, e.to_string()));
                    continue;
                }
            };

            self.emit(BatchEvent::JobStarted {
                index,
                source: source.clone(),
            });

            match job.run().await {
                Ok(report) => {
                    debug!(frames = report.frames, "Finished {}", report.destination.display());
                    self.emit(BatchEvent::JobCompleted {
                        index,
                        report: report.clone(),
                    });
                    summary.completed.push(report);
                }
                Err(e) => {
                    warn!("Job for {} failed: {}", source.display(), e);
                    summary.failed.push((source, e.to_string()));
                }
            }
        }

        info!("Processing done. Cleaning up...");
        if !self.grace_interval.is_zero() {
            tokio::time::sleep(self.grace_interval).await;
        }

        self.emit(BatchEvent::BatchFinished {
            completed: summary.completed.len(),
            failed: summary.failed.len(),
            cancelled: summary.cancelled,
        });

        summary
    }
}
