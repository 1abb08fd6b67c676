//! Conversion pipeline: per-job pump, job preparation, batch orchestration

pub mod batch;
pub mod job;
pub mod pump;
pub mod scheduler;

pub use batch::{BatchEvent, BatchOrchestrator, BatchSummary};
pub use job::{destination_path, JobReport, TranscodeJob, OUTPUT_CONTAINER};
pub use pump::{PumpConfig, PumpPhase, PumpReport, PumpState, TranscodePump};
pub use scheduler::Scheduler;
