//! # alconv
//!
//! Batch converter from any decodable audio file to an MPEG-4 audio container
//! (Apple Lossless or AAC), carrying tags and cover art across.
//!
//! **Architecture:** symphonia decoder → bounded transfer pump → ffmpeg muxer,
//! tags written with lofty once the container is finalized. Jobs run strictly
//! one at a time on a single-threaded tokio runtime.

pub mod audio;
pub mod bit_depth;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;

pub use error::{Error, Result};
