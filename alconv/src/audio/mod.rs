//! Audio collaborators: decoder and muxer seams plus their concrete backends

pub mod decoder;
pub mod ffmpeg;
pub mod mp4_tags;
pub mod muxer;
pub mod types;

pub use decoder::{Decoder, DecoderFactory, SymphoniaDecoder, SymphoniaDecoderFactory};
pub use ffmpeg::{FfmpegMuxer, FfmpegMuxerFactory};
pub use muxer::{Muxer, MuxerFactory};
pub use types::{
    AudioChunk, CodecId, ContainerFormat, EncoderOutputSpec, PcmBuffer, RawTagValue, RawTags,
    SourceDescriptor, StreamFormat, WriteOutcome, WriterStatus,
};
