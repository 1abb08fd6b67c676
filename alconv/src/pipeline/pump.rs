//! Buffer-by-buffer transfer from a decoder to a muxer for one job
//!
//! The producer side reads into a single reusable [`PcmBuffer`] and hands
//! copies to the consumer over a bounded channel. Waiting for a send permit
//! is the readiness notification: nothing is read until the encoder side has
//! room for another chunk. End of stream and read failures both end the
//! input; the container is then finalized exactly once.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audio::decoder::Decoder;
use crate::audio::muxer::Muxer;
use crate::audio::types::{AudioChunk, PcmBuffer, WriteOutcome};
use crate::config::{DEFAULT_BUFFER_FRAMES, DEFAULT_QUEUE_DEPTH};
use crate::error::{Error, Result};

/// Pump lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpPhase {
    /// Constructed, not started
    Idle,
    /// Streaming buffers to the encoder
    Running,
    /// Input finished, waiting for finalize
    Draining,
    /// Finalize completed (successfully or not)
    Finished,
}

/// Transfer sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Transfer buffer capacity in frames
    pub buffer_frames: usize,
    /// Chunks that may wait for the encoder
    pub queue_depth: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Transfer state owned by a single pump
#[derive(Debug)]
pub struct PumpState {
    buffer: PcmBuffer,
    frame_count: usize,
    finished: bool,
    frames_read: u64,
}

impl PumpState {
    fn new(channels: u16, buffer_frames: usize) -> Self {
        Self {
            buffer: PcmBuffer::new(channels, buffer_frames),
            frame_count: 0,
            finished: false,
            frames_read: 0,
        }
    }

    /// Frames produced by the most recent read
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Whether the encoder input has been marked finished
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Total frames read from the decoder
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity_frames()
    }
}

/// What happened during a pump run
#[derive(Debug, Clone, PartialEq)]
pub struct PumpReport {
    /// Frames accepted by the encoder
    pub frames: u64,
    /// Chunks accepted by the encoder
    pub chunks: u64,
    /// Read failure that ended the stream early
    pub read_error: Option<String>,
    /// Append or startup failure on the encoder side
    pub write_error: Option<String>,
    /// Finalize result
    pub outcome: WriteOutcome,
}

/// Drives one decoder into one muxer
pub struct TranscodePump {
    decoder: Option<Box<dyn Decoder>>,
    muxer: Option<Box<dyn Muxer>>,
    state: PumpState,
    phase: PumpPhase,
    queue_depth: usize,
}

impl TranscodePump {
    pub fn new(decoder: Box<dyn Decoder>, muxer: Box<dyn Muxer>, config: PumpConfig) -> Self {
        let channels = decoder.format().channels;
        Self {
            decoder: Some(decoder),
            muxer: Some(muxer),
            state: PumpState::new(channels, config.buffer_frames.max(1)),
            phase: PumpPhase::Idle,
            queue_depth: config.queue_depth.max(1),
        }
    }

    pub fn phase(&self) -> PumpPhase {
        self.phase
    }

    pub fn state(&self) -> &PumpState {
        &self.state
    }

    /// Stream the whole source and finalize the container.
    ///
    /// Only fails when called more than once; every streaming or finalize
    /// problem is reported through the returned [`PumpReport`].
    pub async fn run(&mut self) -> Result<PumpReport> {
        if self.phase != PumpPhase::Idle {
            return Err(Error::InvalidState(format!(
                "pump already ran (phase {:?})",
                self.phase
            )));
        }
        let (Some(mut decoder), Some(mut muxer)) = (self.decoder.take(), self.muxer.take()) else {
            return Err(Error::InvalidState("pump has no decoder or muxer".to_string()));
        };

        self.phase = PumpPhase::Running;

        let mut report = PumpReport {
            frames: 0,
            chunks: 0,
            read_error: None,
            write_error: None,
            outcome: WriteOutcome::completed(),
        };

        let started = match muxer.start_writing().await {
            Ok(()) => muxer.start_session(Duration::ZERO).await,
            Err(e) => Err(e),
        };

        match started {
            Ok(()) => {
                let (tx, rx) = mpsc::channel::<AudioChunk>(self.queue_depth);
                let producer = produce(&mut *decoder, &mut self.state, tx);
                let consumer = consume(&mut *muxer, rx);
                let (read_error, (frames, chunks, write_error)) = tokio::join!(producer, consumer);

                report.frames = frames;
                report.chunks = chunks;
                report.read_error = read_error;
                report.write_error = write_error;
            }
            Err(e) => {
                warn!("Encoder failed to start: {}", e);
                self.state.finished = true;
                report.write_error = Some(e.to_string());
            }
        }

        muxer.mark_finished();
        self.phase = PumpPhase::Draining;

        report.outcome = muxer.finish_writing().await;
        self.phase = PumpPhase::Finished;

        // Streaming handles are released only once finalize has completed
        drop(decoder);
        drop(muxer);

        if !report.outcome.is_success() {
            warn!(
                "writer status: {:?} / {}",
                report.outcome.status,
                report.outcome.error.as_deref().unwrap_or("<no error>")
            );
        }

        debug!(frames = report.frames, chunks = report.chunks, "Pump finished");
        Ok(report)
    }
}

/// Producer half: one decoder read per readiness notification.
///
/// Returns the read failure that ended the stream, if any.
async fn produce(
    decoder: &mut dyn Decoder,
    state: &mut PumpState,
    tx: mpsc::Sender<AudioChunk>,
) -> Option<String> {
    let read_error = loop {
        // Readiness notification: the encoder side has room for one more chunk
        let permit = match tx.reserve().await {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Encoder input closed, stopping reads");
                break None;
            }
        };

        state.buffer.clear();
        state.frame_count = 0;

        match decoder.read(&mut state.buffer) {
            Ok(0) => break None,
            Ok(frames) => {
                state.frame_count = frames;
                state.frames_read += frames as u64;
                permit.send(state.buffer.to_chunk());
            }
            Err(e) => {
                warn!("Read failed, treating as end of stream: {}", e);
                break Some(e.to_string());
            }
        }
    };

    state.finished = true;
    read_error
}

/// Consumer half: appends chunks in arrival order.
///
/// Returns frames and chunks accepted, plus the append failure that stopped it.
async fn consume(
    muxer: &mut dyn Muxer,
    mut rx: mpsc::Receiver<AudioChunk>,
) -> (u64, u64, Option<String>) {
    let mut frames = 0u64;
    let mut chunks = 0u64;

    while let Some(chunk) = rx.recv().await {
        let chunk_frames = chunk.frames() as u64;
        if let Err(e) = muxer.append(chunk).await {
            warn!("Append failed: {}", e);
            return (frames, chunks, Some(e.to_string()));
        }
        frames += chunk_frames;
        chunks += 1;
    }

    (frames, chunks, None)
}
