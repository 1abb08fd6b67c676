//! One source-to-destination conversion
//!
//! Preparing a job reads the source properties through a short-lived decoder
//! handle, derives tags and output settings, then opens a second handle for
//! streaming together with the muxer.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::audio::decoder::DecoderFactory;
use crate::audio::muxer::MuxerFactory;
use crate::audio::types::{ContainerFormat, EncoderOutputSpec, SourceDescriptor, WriteOutcome};
use crate::bit_depth::{resolve_effective_bit_depth, resolve_source_bit_depth};
use crate::config::ConvertOptions;
use crate::error::{Error, Result};
use crate::metadata::{MetadataMapper, TagEntry};
use crate::pipeline::pump::{PumpConfig, PumpPhase, TranscodePump};

/// Output container used for every job
pub const OUTPUT_CONTAINER: ContainerFormat = ContainerFormat::M4a;

/// Result of a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Frames accepted by the encoder
    pub frames: u64,
    /// Read failure that truncated the output
    pub read_error: Option<String>,
    /// Encoder side failure while streaming
    pub write_error: Option<String>,
    /// Finalize result
    pub outcome: WriteOutcome,
}

impl JobReport {
    /// Whether the output may be shorter than the source
    pub fn is_truncated(&self) -> bool {
        self.read_error.is_some()
    }
}

/// Destination for `source`: its file name inside `destination_dir`, with the
/// container's extension
pub fn destination_path(source: &Path, destination_dir: &Path, container: ContainerFormat) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::source_open(source, "path has no file name"))?;
    Ok(destination_dir
        .join(file_name)
        .with_extension(container.extension()))
}

/// Read the descriptor and artwork with a scoped decoder handle.
///
/// The handle is dropped before returning, on success and on failure.
pub fn read_source(source: &Path, decoders: &dyn DecoderFactory) -> Result<(SourceDescriptor, Option<Vec<u8>>)> {
    let probe = decoders.open(source)?;

    let reported_bit_depth = probe.bit_depth().map_err(|e| match e {
        Error::PropertyRead { .. } => e,
        other => Error::PropertyRead {
            property: "bit depth".to_string(),
            reason: other.to_string(),
        },
    })?;

    let descriptor = SourceDescriptor {
        path: source.to_path_buf(),
        format: probe.format().clone(),
        reported_bit_depth,
        tags: probe.info_dictionary(),
    };
    let artwork = probe.artwork();

    Ok((descriptor, artwork))
}

/// A prepared conversion, ready to stream
pub struct TranscodeJob {
    source: PathBuf,
    destination: PathBuf,
    output_spec: EncoderOutputSpec,
    tags: Vec<TagEntry>,
    pump: TranscodePump,
}

impl TranscodeJob {
    /// Open `source` and configure the muxer for it.
    ///
    /// Fails with `SourceOpen`, `PropertyRead` or `EncoderConfig`; none of
    /// these leave a pump behind.
    pub fn prepare(
        source: &Path,
        destination_dir: &Path,
        options: &ConvertOptions,
        pump_config: PumpConfig,
        decoders: &dyn DecoderFactory,
        muxers: &dyn MuxerFactory,
    ) -> Result<Self> {
        let destination = destination_path(source, destination_dir, OUTPUT_CONTAINER)?;

        let (descriptor, artwork) = read_source(source, decoders)?;
        let tags = MetadataMapper::new().map(&descriptor.tags, artwork.as_deref());

        let source_bit_depth = resolve_source_bit_depth(&descriptor);
        let effective_bit_depth = resolve_effective_bit_depth(source_bit_depth, options.bits_per_sample);
        debug!(
            reported = descriptor.reported_bit_depth,
            source = source_bit_depth,
            effective = effective_bit_depth,
            "Resolved bit depth"
        );

        let output_spec = EncoderOutputSpec::for_source(&descriptor.format, effective_bit_depth, options);
        info!("\t{}", output_spec);

        let stream = decoders.open(source)?;
        let mut muxer = muxers.create(&destination, OUTPUT_CONTAINER)?;
        muxer.set_metadata(tags.clone());
        muxer.add_input_stream(&output_spec)?;

        let pump = TranscodePump::new(stream, muxer, pump_config);

        Ok(Self {
            source: source.to_path_buf(),
            destination,
            output_spec,
            tags,
            pump,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn output_spec(&self) -> &EncoderOutputSpec {
        &self.output_spec
    }

    pub fn tags(&self) -> &[TagEntry] {
        &self.tags
    }

    /// Stream and finalize; consumes the job
    pub async fn run(mut self) -> Result<JobReport> {
        let report = self.pump.run().await?;
        debug_assert_eq!(self.pump.phase(), PumpPhase::Finished);

        Ok(JobReport {
            source: self.source,
            destination: self.destination,
            frames: report.frames,
            read_error: report.read_error,
            write_error: report.write_error,
            outcome: report.outcome,
        })
    }
}
