//! Scripted decoder and muxer doubles
//!
//! Every mock writes into a shared [`Recorder`] so tests can check ordering
//! across jobs (open, append, finalize, close) as well as the exact samples
//! the encoder side received.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use alconv::audio::types::{
    AudioChunk, CodecId, ContainerFormat, EncoderOutputSpec, PcmBuffer, RawTags, StreamFormat,
    WriteOutcome,
};
use alconv::audio::{Decoder, DecoderFactory, Muxer, MuxerFactory};
use alconv::metadata::TagEntry;
use alconv::{Error, Result};

/// Something observable that happened to a mock
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DecoderOpened(PathBuf),
    DecoderClosed(PathBuf),
    MuxerCreated(PathBuf),
    SessionStarted(PathBuf),
    Appended { destination: PathBuf, frames: usize },
    InputFinished(PathBuf),
    Finalized(PathBuf),
}

/// Shared log of events and received samples
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    samples: Mutex<HashMap<PathBuf, Vec<i32>>>,
    specs: Mutex<HashMap<PathBuf, EncoderOutputSpec>>,
    tags: Mutex<HashMap<PathBuf, Vec<TagEntry>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Position of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events.lock().unwrap().iter().position(pred)
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// All samples appended for `destination`, in arrival order
    pub fn samples(&self, destination: &Path) -> Vec<i32> {
        self.samples
            .lock()
            .unwrap()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    pub fn spec(&self, destination: &Path) -> Option<EncoderOutputSpec> {
        self.specs.lock().unwrap().get(destination).cloned()
    }

    pub fn tags(&self, destination: &Path) -> Vec<TagEntry> {
        self.tags
            .lock()
            .unwrap()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }
}

/// Scripted source content and failures
#[derive(Debug, Clone)]
pub struct MockSource {
    pub format: StreamFormat,
    pub reported_bit_depth: u32,
    pub frames: u64,
    pub tags: RawTags,
    pub artwork: Option<Vec<u8>>,
    /// Frames delivered per read at most
    pub max_read_frames: usize,
    pub fail_open: bool,
    pub fail_bit_depth: bool,
    /// Fail every read once this many frames have been delivered
    pub read_fail_after: Option<u64>,
}

impl MockSource {
    /// 16-bit stereo FLAC-like source with sequential sample values
    pub fn flac(frames: u64) -> Self {
        Self {
            format: StreamFormat {
                sample_rate: 44100,
                channels: 2,
                codec: CodecId::Flac,
                bits_per_channel: 0,
                format_flags: 1,
            },
            reported_bit_depth: 16,
            frames,
            tags: RawTags::new(),
            artwork: None,
            max_read_frames: usize::MAX,
            fail_open: false,
            fail_bit_depth: false,
            read_fail_after: None,
        }
    }

    pub fn with_format_flags(mut self, flags: u32, reported_bit_depth: u32) -> Self {
        self.format.format_flags = flags;
        self.reported_bit_depth = reported_bit_depth;
        self
    }

    pub fn with_max_read(mut self, frames: usize) -> Self {
        self.max_read_frames = frames;
        self
    }

    pub fn with_tags(mut self, tags: RawTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_artwork(mut self, data: Vec<u8>) -> Self {
        self.artwork = Some(data);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_bit_depth(mut self) -> Self {
        self.fail_bit_depth = true;
        self
    }

    pub fn failing_read_after(mut self, frames: u64) -> Self {
        self.read_fail_after = Some(frames);
        self
    }
}

/// Decoder factory serving scripted sources by path
pub struct MockDecoderFactory {
    sources: HashMap<PathBuf, MockSource>,
    recorder: Arc<Recorder>,
}

impl MockDecoderFactory {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            sources: HashMap::new(),
            recorder,
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>, source: MockSource) -> Self {
        self.sources.insert(path.into(), source);
        self
    }
}

impl DecoderFactory for MockDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>> {
        let source = match self.sources.get(path) {
            Some(source) if !source.fail_open => source.clone(),
            Some(_) => return Err(Error::source_open(path, "corrupt file")),
            None => return Err(Error::source_open(path, "no such file")),
        };

        self.recorder.push(Event::DecoderOpened(path.to_path_buf()));
        Ok(Box::new(MockDecoder {
            path: path.to_path_buf(),
            source,
            delivered: 0,
            recorder: self.recorder.clone(),
        }))
    }
}

/// Decoder producing sample `n` = `n` for the `n`th interleaved sample
pub struct MockDecoder {
    path: PathBuf,
    source: MockSource,
    delivered: u64,
    recorder: Arc<Recorder>,
}

impl Decoder for MockDecoder {
    fn format(&self) -> &StreamFormat {
        &self.source.format
    }

    fn bit_depth(&self) -> Result<u32> {
        if self.source.fail_bit_depth {
            return Err(Error::PropertyRead {
                property: "bit depth".to_string(),
                reason: "property unavailable".to_string(),
            });
        }
        Ok(self.source.reported_bit_depth)
    }

    fn info_dictionary(&self) -> RawTags {
        self.source.tags.clone()
    }

    fn artwork(&self) -> Option<Vec<u8>> {
        self.source.artwork.clone()
    }

    fn read(&mut self, buffer: &mut PcmBuffer) -> Result<usize> {
        if let Some(limit) = self.source.read_fail_after {
            if self.delivered >= limit {
                return Err(Error::Read("device went away".to_string()));
            }
        }

        let channels = self.source.format.channels as u64;
        let remaining = self.source.frames - self.delivered;
        let frames = (buffer.remaining_frames() as u64)
            .min(self.source.max_read_frames as u64)
            .min(remaining);
        if frames == 0 {
            return Ok(0);
        }

        let first = self.delivered * channels;
        let samples: Vec<i32> = (first..first + frames * channels).map(|n| n as i32).collect();
        let pushed = buffer.push_interleaved(&samples);
        self.delivered += pushed as u64;
        Ok(pushed)
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.recorder.push(Event::DecoderClosed(self.path.clone()));
    }
}

/// Muxer failure injection
#[derive(Debug, Clone, Default)]
pub struct MuxerBehaviour {
    /// `start_session` fails
    pub fail_start: bool,
    /// `append` fails once this many chunks were accepted
    pub fail_append_after: Option<usize>,
    /// `finish_writing` reports a failure
    pub fail_finalize: bool,
    /// Suspend on every append to exercise backpressure
    pub slow_append: bool,
}

/// Muxer factory whose muxers record into a shared [`Recorder`]
pub struct MockMuxerFactory {
    recorder: Arc<Recorder>,
    behaviour: MuxerBehaviour,
    /// Destinations whose input configuration is rejected
    rejected: HashSet<PathBuf>,
}

impl MockMuxerFactory {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            recorder,
            behaviour: MuxerBehaviour::default(),
            rejected: HashSet::new(),
        }
    }

    pub fn with_behaviour(mut self, behaviour: MuxerBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn rejecting(mut self, destination: impl Into<PathBuf>) -> Self {
        self.rejected.insert(destination.into());
        self
    }
}

impl MuxerFactory for MockMuxerFactory {
    fn create(&self, destination: &Path, _container: ContainerFormat) -> Result<Box<dyn Muxer>> {
        self.recorder.push(Event::MuxerCreated(destination.to_path_buf()));
        Ok(Box::new(MockMuxer {
            destination: destination.to_path_buf(),
            recorder: self.recorder.clone(),
            behaviour: self.behaviour.clone(),
            reject_spec: self.rejected.contains(destination),
            accepted_chunks: 0,
            started: false,
        }))
    }
}

pub struct MockMuxer {
    destination: PathBuf,
    recorder: Arc<Recorder>,
    behaviour: MuxerBehaviour,
    reject_spec: bool,
    accepted_chunks: usize,
    started: bool,
}

#[async_trait]
impl Muxer for MockMuxer {
    fn set_metadata(&mut self, tags: Vec<TagEntry>) {
        self.recorder
            .tags
            .lock()
            .unwrap()
            .insert(self.destination.clone(), tags);
    }

    fn add_input_stream(&mut self, spec: &EncoderOutputSpec) -> Result<()> {
        if self.reject_spec {
            return Err(Error::EncoderConfig(format!("{} rejected", spec)));
        }
        self.recorder
            .specs
            .lock()
            .unwrap()
            .insert(self.destination.clone(), spec.clone());
        Ok(())
    }

    async fn start_writing(&mut self) -> Result<()> {
        Ok(())
    }

    async fn start_session(&mut self, _base_time: Duration) -> Result<()> {
        if self.behaviour.fail_start {
            return Err(Error::EncoderConfig("encoder refused to start".to_string()));
        }
        self.started = true;
        self.recorder.push(Event::SessionStarted(self.destination.clone()));
        Ok(())
    }

    async fn append(&mut self, chunk: AudioChunk) -> Result<()> {
        if let Some(limit) = self.behaviour.fail_append_after {
            if self.accepted_chunks >= limit {
                return Err(Error::Write("encoder input closed".to_string()));
            }
        }
        if self.behaviour.slow_append {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        self.recorder.push(Event::Appended {
            destination: self.destination.clone(),
            frames: chunk.frames(),
        });
        self.recorder
            .samples
            .lock()
            .unwrap()
            .entry(self.destination.clone())
            .or_default()
            .extend_from_slice(&chunk.samples);
        self.accepted_chunks += 1;
        Ok(())
    }

    fn mark_finished(&mut self) {
        self.recorder.push(Event::InputFinished(self.destination.clone()));
    }

    async fn finish_writing(&mut self) -> WriteOutcome {
        self.recorder.push(Event::Finalized(self.destination.clone()));

        if !self.started {
            return WriteOutcome::failed("writer was never started");
        }
        if self.behaviour.fail_finalize {
            return WriteOutcome::failed("disk full");
        }
        match std::fs::write(&self.destination, b"m4a") {
            Ok(()) => WriteOutcome::completed(),
            Err(e) => WriteOutcome::failed(e.to_string()),
        }
    }
}
