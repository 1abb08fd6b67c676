//! ffmpeg-based muxer implementation.
//!
//! Raw interleaved s32le PCM is piped to an ffmpeg child over stdin, which
//! encodes ALAC or AAC into an MPEG-4 container. Tags are written with lofty
//! once ffmpeg has exited successfully.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::audio::mp4_tags;
use crate::audio::muxer::{Muxer, MuxerFactory};
use crate::audio::types::{
    AudioChunk, BitrateStrategy, ContainerFormat, EncoderOutputSpec, OutputCodec, OutputEncoding,
    WriteOutcome,
};
use crate::config::MuxerSettings;
use crate::error::{Error, Result};
use crate::metadata::TagEntry;

/// Highest channel count accepted by either encoder
const MAX_CHANNELS: u16 = 8;

/// Deepest sample size Apple Lossless can store
const MAX_ALAC_BIT_DEPTH: u32 = 32;

/// Highest sample rate accepted by the AAC encoder
const MAX_AAC_SAMPLE_RATE: u32 = 96_000;

/// Creates [`FfmpegMuxer`]s
#[derive(Debug, Clone)]
pub struct FfmpegMuxerFactory {
    settings: MuxerSettings,
}

impl FfmpegMuxerFactory {
    pub fn new(settings: MuxerSettings) -> Self {
        Self { settings }
    }
}

impl MuxerFactory for FfmpegMuxerFactory {
    fn create(&self, destination: &Path, container: ContainerFormat) -> Result<Box<dyn Muxer>> {
        if destination.exists() && !self.settings.overwrite {
            return Err(Error::EncoderConfig(format!(
                "destination already exists: {}",
                destination.display()
            )));
        }
        Ok(Box::new(FfmpegMuxer::new(
            destination.to_path_buf(),
            container,
            self.settings.clone(),
        )))
    }
}

/// Writer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Configuring,
    Writing,
    Streaming,
    Finished,
}

/// One ffmpeg process writing one container
pub struct FfmpegMuxer {
    destination: PathBuf,
    container: ContainerFormat,
    settings: MuxerSettings,
    tags: Vec<TagEntry>,
    spec: Option<EncoderOutputSpec>,
    state: WriterState,
    child: Option<Child>,
    /// Collects ffmpeg diagnostics while streaming so the pipe never fills
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    stdin: Option<ChildStdin>,
    /// First failure seen while streaming
    failure: Option<String>,
    scratch: Vec<u8>,
}

impl FfmpegMuxer {
    pub fn new(destination: PathBuf, container: ContainerFormat, settings: MuxerSettings) -> Self {
        Self {
            destination,
            container,
            settings,
            tags: Vec::new(),
            spec: None,
            state: WriterState::Configuring,
            child: None,
            stderr_task: None,
            stdin: None,
            failure: None,
            scratch: Vec::new(),
        }
    }

    /// Builds ffmpeg arguments for the configured input
    fn build_args(&self, spec: &EncoderOutputSpec, base_time: Duration) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            if self.settings.overwrite { "-y" } else { "-n" }.to_string(),
            // Raw PCM input on stdin
            "-f".to_string(),
            "s32le".to_string(),
            "-ar".to_string(),
            spec.sample_rate.to_string(),
            "-ac".to_string(),
            spec.channels.to_string(),
        ];

        if !base_time.is_zero() {
            args.extend(["-itsoffset".to_string(), format!("{:.6}", base_time.as_secs_f64())]);
        }

        args.extend(["-i".to_string(), "pipe:0".to_string(), "-vn".to_string()]);

        match (spec.codec, spec.encoding) {
            (OutputCodec::AppleLossless, OutputEncoding::BitDepthHint(bits)) => {
                args.extend(["-c:a".to_string(), "alac".to_string()]);
                match alac_depth(bits) {
                    0 => {}
                    16 => args.extend(["-sample_fmt".to_string(), "s16p".to_string()]),
                    depth => args.extend([
                        "-sample_fmt".to_string(),
                        "s32p".to_string(),
                        "-bits_per_raw_sample".to_string(),
                        depth.to_string(),
                    ]),
                }
            }
            (_, OutputEncoding::Bitrate { bits_per_second, strategy }) => {
                args.extend([
                    "-c:a".to_string(),
                    self.settings.aac_encoder.clone(),
                    "-b:a".to_string(),
                    bits_per_second.to_string(),
                ]);
                // Constrained VBR is only exposed by the AudioToolbox encoder
                if strategy == BitrateStrategy::VariableConstrained && self.settings.aac_encoder == "aac_at" {
                    args.extend(["-aac_at_mode".to_string(), "cvbr".to_string()]);
                }
            }
            (OutputCodec::Aac, OutputEncoding::BitDepthHint(_)) => {
                args.extend(["-c:a".to_string(), self.settings.aac_encoder.clone()]);
            }
        }

        // Network-optimized layout: moov atom ahead of the media data
        args.extend([
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            muxer_name(self.container).to_string(),
            self.destination.to_string_lossy().to_string(),
        ]);

        args
    }

    fn record_failure(&mut self, message: String) {
        warn!("{}", message);
        if self.failure.is_none() {
            self.failure = Some(message);
        }
    }
}

/// Smallest Apple Lossless depth that holds a `bits` hint (0 = encoder default)
fn alac_depth(bits: u32) -> u32 {
    match bits {
        0 => 0,
        1..=16 => 16,
        17..=20 => 20,
        21..=24 => 24,
        _ => 32,
    }
}

fn muxer_name(container: ContainerFormat) -> &'static str {
    match container {
        ContainerFormat::M4a => "mp4",
    }
}

/// Reject settings the encoders cannot honor
fn validate_spec(spec: &EncoderOutputSpec) -> Result<()> {
    if spec.sample_rate == 0 {
        return Err(Error::EncoderConfig("sample rate must be greater than 0".to_string()));
    }
    if spec.channels == 0 || spec.channels > MAX_CHANNELS {
        return Err(Error::EncoderConfig(format!(
            "channel layout with {} channels is not valid",
            spec.channels
        )));
    }
    match (spec.codec, spec.encoding) {
        (OutputCodec::AppleLossless, OutputEncoding::BitDepthHint(bits)) => {
            if bits > MAX_ALAC_BIT_DEPTH {
                return Err(Error::EncoderConfig(format!(
                    "{} bit is above the Apple Lossless limit",
                    bits
                )));
            }
        }
        (OutputCodec::Aac, OutputEncoding::Bitrate { .. }) => {
            if spec.sample_rate > MAX_AAC_SAMPLE_RATE {
                return Err(Error::EncoderConfig(format!(
                    "{} Hz is above the AAC limit",
                    spec.sample_rate
                )));
            }
        }
        (codec, encoding) => {
            return Err(Error::EncoderConfig(format!(
                "{:?} does not accept {:?}",
                codec, encoding
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    fn set_metadata(&mut self, tags: Vec<TagEntry>) {
        self.tags = tags;
    }

    fn add_input_stream(&mut self, spec: &EncoderOutputSpec) -> Result<()> {
        if self.state != WriterState::Configuring {
            return Err(Error::InvalidState("input added after writing started".to_string()));
        }
        if self.spec.is_some() {
            return Err(Error::EncoderConfig("only one input stream is supported".to_string()));
        }
        validate_spec(spec)?;
        self.spec = Some(spec.clone());
        Ok(())
    }

    async fn start_writing(&mut self) -> Result<()> {
        if self.state != WriterState::Configuring {
            return Err(Error::InvalidState("writing already started".to_string()));
        }
        if self.spec.is_none() {
            return Err(Error::EncoderConfig("no input stream configured".to_string()));
        }
        if let Some(parent) = self.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.state = WriterState::Writing;
        Ok(())
    }

    async fn start_session(&mut self, base_time: Duration) -> Result<()> {
        if self.state != WriterState::Writing {
            return Err(Error::InvalidState("session started before writing".to_string()));
        }
        let spec = self
            .spec
            .clone()
            .ok_or_else(|| Error::EncoderConfig("no input stream configured".to_string()))?;

        let args = self.build_args(&spec, base_time);
        debug!(ffmpeg = %self.settings.ffmpeg_path.display(), ?args, "Spawning encoder");

        let mut child = Command::new(&self.settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::EncoderConfig(format!(
                        "ffmpeg not found at {}",
                        self.settings.ffmpeg_path.display()
                    ))
                } else {
                    Error::Io(e)
                }
            })?;

        self.stdin = child.stdin.take();
        if let Some(mut stderr) = child.stderr.take() {
            self.stderr_task = Some(tokio::spawn(async move {
                let mut collected = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut collected).await {
                    debug!("Reading ffmpeg stderr failed: {}", e);
                }
                collected
            }));
        }
        self.child = Some(child);
        self.state = WriterState::Streaming;
        Ok(())
    }

    async fn append(&mut self, chunk: AudioChunk) -> Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Error::Write("input is not accepting data".to_string()));
        };

        self.scratch.clear();
        self.scratch.reserve(chunk.samples.len() * 4);
        for sample in &chunk.samples {
            self.scratch.extend_from_slice(&sample.to_le_bytes());
        }

        if let Err(e) = stdin.write_all(&self.scratch).await {
            let message = format!("encoder input closed: {}", e);
            self.stdin = None;
            self.record_failure(message.clone());
            return Err(Error::Write(message));
        }
        Ok(())
    }

    fn mark_finished(&mut self) {
        // Dropping stdin delivers EOF to ffmpeg
        self.stdin = None;
    }

    async fn finish_writing(&mut self) -> WriteOutcome {
        self.stdin = None;
        self.state = WriterState::Finished;

        let Some(child) = self.child.take() else {
            return WriteOutcome::failed(
                self.failure
                    .take()
                    .unwrap_or_else(|| "writer was never started".to_string()),
            );
        };

        let mut child = child;
        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => return WriteOutcome::failed(format!("waiting for ffmpeg: {}", e)),
        };
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return WriteOutcome::failed(format!("ffmpeg exited with {}: {}", status, stderr.trim()));
        }

        if let Some(failure) = self.failure.take() {
            return WriteOutcome::failed(failure);
        }

        let path = self.destination.clone();
        let tags = std::mem::take(&mut self.tags);
        match tokio::task::spawn_blocking(move || mp4_tags::write_tags(&path, &tags)).await {
            Ok(Ok(())) => WriteOutcome::completed(),
            Ok(Err(e)) => WriteOutcome::failed(e.to_string()),
            Err(e) => WriteOutcome::failed(format!("tag writer panicked: {}", e)),
        }
    }
}
