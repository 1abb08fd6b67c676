//! Converter configuration
//!
//! Combines command-line values, environment variables and `config.toml`
//! into the settings used by the batch.

use std::path::PathBuf;
use std::time::Duration;

use alconv_common::config::resolve_setting;
use alconv_common::TomlConfig;

use crate::error::{Error, Result};

/// Default transfer buffer capacity in frames
pub const DEFAULT_BUFFER_FRAMES: usize = 16 * 1024;

/// Default number of chunks queued ahead of the encoder
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Default delay before exiting after the last job
pub const DEFAULT_GRACE_MS: u64 = 1000;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "alconv=info";

/// Per-job encoding options chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertOptions {
    /// Encode to AAC instead of Apple Lossless
    pub compress: bool,

    /// Lossless bit depth cap (0 or below = source depth)
    pub bits_per_sample: i32,
}

/// Batch scheduling settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub output_dir: PathBuf,
    pub buffer_frames: usize,
    pub queue_depth: usize,
    pub grace_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            grace_interval: Duration::from_millis(DEFAULT_GRACE_MS),
        }
    }
}

/// Settings for the ffmpeg muxer backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxerSettings {
    pub ffmpeg_path: PathBuf,
    pub aac_encoder: String,
    pub overwrite: bool,
}

impl Default for MuxerSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            aac_encoder: "aac".to_string(),
            overwrite: false,
        }
    }
}

/// Values given on the command line (`None` = not given)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_dir: Option<PathBuf>,
    pub compress: bool,
    pub bits_per_sample: Option<i32>,
    pub overwrite: bool,
    pub ffmpeg_path: Option<PathBuf>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub options: ConvertOptions,
    pub batch: BatchSettings,
    pub muxer: MuxerSettings,
    pub log_filter: String,
}

impl Settings {
    /// Resolve every setting: CLI, then `ALCONV_*` environment, then TOML, then default
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let batch_defaults = BatchSettings::default();
        let muxer_defaults = MuxerSettings::default();

        // Boolean flags only ever turn a setting on from the command line
        let compress = resolve_setting(cli.compress.then_some(true), "ALCONV_COMPRESS", toml.compress, false)?;
        let overwrite = resolve_setting(cli.overwrite.then_some(true), "ALCONV_OVERWRITE", toml.overwrite, false)?;

        let bits_per_sample = resolve_setting(
            cli.bits_per_sample,
            "ALCONV_BITS_PER_SAMPLE",
            toml.bits_per_sample,
            0,
        )?;

        let output_dir = resolve_setting(
            cli.output_dir.clone(),
            "ALCONV_OUTPUT_DIR",
            toml.output_dir.clone(),
            batch_defaults.output_dir,
        )?;

        let buffer_frames = resolve_setting(
            None,
            "ALCONV_BUFFER_FRAMES",
            toml.buffer_frames,
            batch_defaults.buffer_frames,
        )?;
        if buffer_frames == 0 {
            return Err(Error::Config("buffer_frames must be greater than 0".to_string()));
        }

        let queue_depth = resolve_setting(
            None,
            "ALCONV_QUEUE_DEPTH",
            toml.queue_depth,
            batch_defaults.queue_depth,
        )?;
        if queue_depth == 0 {
            return Err(Error::Config("queue_depth must be greater than 0".to_string()));
        }

        let grace_ms = resolve_setting(None, "ALCONV_GRACE_MS", toml.grace_ms, DEFAULT_GRACE_MS)?;

        let ffmpeg_path = resolve_setting(
            cli.ffmpeg_path.clone(),
            "ALCONV_FFMPEG",
            toml.ffmpeg_path.clone(),
            muxer_defaults.ffmpeg_path,
        )?;

        let aac_encoder = resolve_setting(
            None,
            "ALCONV_AAC_ENCODER",
            toml.aac_encoder.clone(),
            muxer_defaults.aac_encoder,
        )?;

        let log_filter = toml
            .logging
            .level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            options: ConvertOptions {
                compress,
                bits_per_sample,
            },
            batch: BatchSettings {
                output_dir,
                buffer_frames,
                queue_depth,
                grace_interval: Duration::from_millis(grace_ms),
            },
            muxer: MuxerSettings {
                ffmpeg_path,
                aac_encoder,
                overwrite,
            },
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        let settings = Settings::resolve(&CliOverrides::default(), &TomlConfig::default()).unwrap();
        assert_eq!(settings.options, ConvertOptions::default());
        assert_eq!(settings.batch, BatchSettings::default());
        assert_eq!(settings.muxer, MuxerSettings::default());
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    #[serial]
    fn test_cli_overrides_toml() {
        let toml = TomlConfig {
            output_dir: Some(PathBuf::from("/toml/out")),
            bits_per_sample: Some(24),
            grace_ms: Some(0),
            ..Default::default()
        };
        let cli = CliOverrides {
            output_dir: Some(PathBuf::from("/cli/out")),
            compress: true,
            bits_per_sample: Some(16),
            ..Default::default()
        };

        let settings = Settings::resolve(&cli, &toml).unwrap();
        assert_eq!(settings.batch.output_dir, PathBuf::from("/cli/out"));
        assert_eq!(settings.options.bits_per_sample, 16);
        assert!(settings.options.compress);
        assert_eq!(settings.batch.grace_interval, Duration::ZERO);
    }

    #[test]
    #[serial]
    fn test_toml_enables_compress_without_flag() {
        let toml = TomlConfig {
            compress: Some(true),
            ..Default::default()
        };
        let settings = Settings::resolve(&CliOverrides::default(), &toml).unwrap();
        assert!(settings.options.compress);
    }

    #[test]
    #[serial]
    fn test_env_beats_toml() {
        std::env::set_var("ALCONV_QUEUE_DEPTH", "9");
        std::env::set_var("ALCONV_AAC_ENCODER", "aac_at");
        let toml = TomlConfig {
            queue_depth: Some(2),
            aac_encoder: Some("libfdk_aac".to_string()),
            ..Default::default()
        };
        let result = Settings::resolve(&CliOverrides::default(), &toml);
        std::env::remove_var("ALCONV_QUEUE_DEPTH");
        std::env::remove_var("ALCONV_AAC_ENCODER");

        let settings = result.unwrap();
        assert_eq!(settings.batch.queue_depth, 9);
        assert_eq!(settings.muxer.aac_encoder, "aac_at");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_error() {
        std::env::set_var("ALCONV_BITS_PER_SAMPLE", "lots");
        let result = Settings::resolve(&CliOverrides::default(), &TomlConfig::default());
        std::env::remove_var("ALCONV_BITS_PER_SAMPLE");

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_rejects_zero_buffer() {
        let toml = TomlConfig {
            buffer_frames: Some(0),
            ..Default::default()
        };
        let result = Settings::resolve(&CliOverrides::default(), &toml);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
