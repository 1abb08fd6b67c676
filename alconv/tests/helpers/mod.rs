//! Shared test infrastructure for alconv integration tests
//!
//! - Scripted decoder/muxer factories that record a shared timeline
//! - WAV fixture generation with hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_pipeline;

pub use audio_generator::{generate_ramp_wav, generate_silent_wav};
pub use mock_pipeline::{
    Event, MockDecoderFactory, MockMuxerFactory, MockSource, MuxerBehaviour, Recorder,
};
