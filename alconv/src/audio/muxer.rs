//! Encoder/muxer interface
//!
//! A muxer owns one output container with a single audio input. The call
//! order is fixed: `set_metadata`/`add_input_stream`, `start_writing`,
//! `start_session`, any number of `append`, `mark_finished`, `finish_writing`.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::audio::types::{AudioChunk, ContainerFormat, EncoderOutputSpec, WriteOutcome};
use crate::error::Result;
use crate::metadata::TagEntry;

#[async_trait]
pub trait Muxer: Send {
    /// Tags written into the container on finalize
    fn set_metadata(&mut self, tags: Vec<TagEntry>);

    /// Configure the audio input; rejected settings fail with `EncoderConfig`
    fn add_input_stream(&mut self, spec: &EncoderOutputSpec) -> Result<()>;

    /// Prepare the destination for writing
    async fn start_writing(&mut self) -> Result<()>;

    /// Begin the media session at `base_time`
    async fn start_session(&mut self, base_time: Duration) -> Result<()>;

    /// Append PCM frames in presentation order.
    ///
    /// Completes once the input has accepted the chunk, so awaiting it is the
    /// encoder side of backpressure.
    async fn append(&mut self, chunk: AudioChunk) -> Result<()>;

    /// No more input will follow
    fn mark_finished(&mut self);

    /// Close out the container; never fails, the outcome carries the status
    async fn finish_writing(&mut self) -> WriteOutcome;
}

/// Creates muxers for destination paths
pub trait MuxerFactory: Send + Sync {
    fn create(&self, destination: &Path, container: ContainerFormat) -> Result<Box<dyn Muxer>>;
}
