//! Core audio data types
//!
//! Describes what a decoder reports about a source, the PCM buffers moved by
//! the pump, and the settings handed to the encoder.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::ConvertOptions;

/// Bitrate used for every compressed output
pub const COMPRESSED_BITRATE: u32 = 256_000;

/// Source codec family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecId {
    Flac,
    AppleLossless,
    Pcm,
    Aac,
    Mp3,
    Vorbis,
    Opus,
    Other(String),
}

impl CodecId {
    /// Map a decoder short name (`flac`, `alac`, `pcm_s16le`, ...) to a codec
    pub fn from_short_name(name: &str) -> Self {
        match name {
            "flac" => CodecId::Flac,
            "alac" => CodecId::AppleLossless,
            "aac" => CodecId::Aac,
            "mp3" => CodecId::Mp3,
            "vorbis" => CodecId::Vorbis,
            "opus" => CodecId::Opus,
            n if n.starts_with("pcm_") => CodecId::Pcm,
            other => CodecId::Other(other.to_string()),
        }
    }

    /// Codecs whose source depth is carried in the lossless format flags
    pub fn is_lossless_flagged(&self) -> bool {
        matches!(self, CodecId::Flac | CodecId::AppleLossless)
    }
}

/// Stream format fields as reported by a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: CodecId,

    /// Explicit bits per channel (0 for packetized or compressed codecs)
    pub bits_per_channel: u32,

    /// Codec specific flag bits
    pub format_flags: u32,
}

/// Opaque value from a decoder's info dictionary
#[derive(Debug, Clone, PartialEq)]
pub enum RawTagValue {
    Text(String),
    Binary(Vec<u8>),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

/// Raw key/value tag dictionary
pub type RawTags = BTreeMap<String, RawTagValue>;

/// Everything known about a source once it has been opened
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub path: PathBuf,
    pub format: StreamFormat,

    /// Decoder reported source bit depth (0 = unknown)
    pub reported_bit_depth: u32,

    pub tags: RawTags,
}

/// Interleaved signed 32-bit PCM buffer with a fixed frame capacity
///
/// Samples are left-justified: a 16-bit source occupies the upper 16 bits.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Vec<i32>,
    channels: u16,
    capacity_frames: usize,
    frame_len: usize,
}

impl PcmBuffer {
    /// Allocate a buffer holding `capacity_frames` frames of `channels` samples
    pub fn new(channels: u16, capacity_frames: usize) -> Self {
        Self {
            samples: vec![0; capacity_frames * channels as usize],
            channels,
            capacity_frames,
            frame_len: 0,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Number of valid frames
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Frames that can still be written
    pub fn remaining_frames(&self) -> usize {
        self.capacity_frames - self.frame_len
    }

    pub fn is_full(&self) -> bool {
        self.frame_len == self.capacity_frames
    }

    /// Reset the frame count without touching the allocation
    pub fn clear(&mut self) {
        self.frame_len = 0;
    }

    /// Valid interleaved samples
    pub fn samples(&self) -> &[i32] {
        &self.samples[..self.frame_len * self.channels as usize]
    }

    /// Append whole frames from interleaved samples.
    ///
    /// Returns the number of frames copied, bounded by the remaining capacity.
    pub fn push_interleaved(&mut self, interleaved: &[i32]) -> usize {
        let channels = self.channels as usize;
        if channels == 0 {
            return 0;
        }
        let frames = (interleaved.len() / channels).min(self.remaining_frames());
        let start = self.frame_len * channels;
        let count = frames * channels;
        self.samples[start..start + count].copy_from_slice(&interleaved[..count]);
        self.frame_len += frames;
        frames
    }

    /// Copy the valid frames into a chunk that can be handed to the encoder
    pub fn to_chunk(&self) -> AudioChunk {
        AudioChunk {
            samples: self.samples().to_vec(),
            channels: self.channels,
        }
    }
}

/// PCM frames handed from the pump to the encoder
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<i32>,
    pub channels: u16,
}

impl AudioChunk {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MPEG-4 audio (`.m4a`)
    M4a,
}

impl ContainerFormat {
    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::M4a => "m4a",
        }
    }
}

/// Encoder codec choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCodec {
    AppleLossless,
    Aac,
}

/// Bitrate allocation strategy for compressed output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateStrategy {
    Constant,
    VariableConstrained,
}

/// Codec specific part of the output settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    /// Compressed path
    Bitrate {
        bits_per_second: u32,
        strategy: BitrateStrategy,
    },
    /// Lossless path (0 = let the encoder decide)
    BitDepthHint(u32),
}

/// Settings for the encoder input, fixed for the lifetime of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOutputSpec {
    pub codec: OutputCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: OutputEncoding,
}

impl EncoderOutputSpec {
    /// Build the output settings for a source.
    ///
    /// `effective_bit_depth` only matters for the lossless path.
    pub fn for_source(format: &StreamFormat, effective_bit_depth: u32, options: &ConvertOptions) -> Self {
        if options.compress {
            Self {
                codec: OutputCodec::Aac,
                sample_rate: format.sample_rate,
                channels: format.channels,
                encoding: OutputEncoding::Bitrate {
                    bits_per_second: COMPRESSED_BITRATE,
                    strategy: BitrateStrategy::VariableConstrained,
                },
            }
        } else {
            Self {
                codec: OutputCodec::AppleLossless,
                sample_rate: format.sample_rate,
                channels: format.channels,
                encoding: OutputEncoding::BitDepthHint(effective_bit_depth),
            }
        }
    }
}

impl fmt::Display for EncoderOutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encoding {
            OutputEncoding::Bitrate { bits_per_second, .. } => write!(
                f,
                "AAC {}Hz {} bit/s - {} channels",
                self.sample_rate, bits_per_second, self.channels
            ),
            OutputEncoding::BitDepthHint(bits) => write!(
                f,
                "lossless {}Hz {} bit - {} channels",
                self.sample_rate, bits, self.channels
            ),
        }
    }
}

/// Final state of the encoder after finalize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    Completed,
    Failed,
}

/// Result reported by the encoder's finalize operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub status: WriterStatus,
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn completed() -> Self {
        Self {
            status: WriterStatus::Completed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: WriterStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WriterStatus::Completed
    }
}
