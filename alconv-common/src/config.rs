//! Configuration file loading and setting resolution
//!
//! Settings follow a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Name of the per-user configuration directory
const APP_DIR: &str = "alconv";

/// Name of the configuration file inside the configuration directory
const CONFIG_FILE: &str = "config.toml";

/// Contents of `config.toml`
///
/// Every field is optional so that a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory receiving converted files
    pub output_dir: Option<PathBuf>,

    /// Encode to AAC instead of Apple Lossless
    pub compress: Option<bool>,

    /// Upper bound on the lossless bit depth (0 = keep source depth)
    pub bits_per_sample: Option<i32>,

    /// Replace destination files that already exist
    pub overwrite: Option<bool>,

    /// Path of the ffmpeg executable
    pub ffmpeg_path: Option<PathBuf>,

    /// ffmpeg AAC encoder name (`aac`, `aac_at`, `libfdk_aac`)
    pub aac_encoder: Option<String>,

    /// Transfer buffer capacity in frames
    pub buffer_frames: Option<usize>,

    /// Number of chunks that may wait for the encoder
    pub queue_depth: Option<usize>,

    /// Delay before exiting once the last job has finalized
    pub grace_ms: Option<u64>,

    /// Logging section
    pub logging: LoggingConfig,
}

/// `[logging]` section of `config.toml`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive used when `RUST_LOG` is unset
    pub level: Option<String>,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Load the configuration file.
///
/// An explicit path must exist. Without one, the platform locations are
/// searched and a missing file yields the empty configuration.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!("Loading config file {}", path.display());
        return TomlConfig::from_file(path);
    }

    match default_config_path() {
        Some(path) => {
            debug!("Loading config file {}", path.display());
            TomlConfig::from_file(&path)
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Locate the first existing configuration file for the platform
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        // System-wide fallback
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve a single setting by priority: CLI, environment, TOML, default.
///
/// Environment values that fail to parse are reported as configuration errors
/// instead of being silently skipped.
pub fn resolve_setting<T>(
    cli_value: Option<T>,
    env_var_name: &str,
    toml_value: Option<T>,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    // Priority 1: Command-line argument
    if let Some(value) = cli_value {
        return Ok(value);
    }

    // Priority 2: Environment variable
    if let Ok(raw) = std::env::var(env_var_name) {
        return raw.parse::<T>().map_err(|e| {
            Error::Config(format!("Invalid value {:?} for {}: {}", raw, env_var_name, e))
        });
    }

    // Priority 3: TOML config file
    if let Some(value) = toml_value {
        return Ok(value);
    }

    // Priority 4: Compiled default
    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_parse_partial_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            compress = true
            buffer_frames = 4096

            [logging]
            level = "alconv=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.compress, Some(true));
        assert_eq!(config.buffer_frames, Some(4096));
        assert_eq!(config.output_dir, None);
        assert_eq!(config.logging.level.as_deref(), Some("alconv=debug"));
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let result = TomlConfig::from_toml_str("grace_ms = \"soon\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_explicit_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir = \"/music/out\"").unwrap();
        writeln!(file, "bits_per_sample = 16").unwrap();

        let config = load_toml_config(Some(file.path())).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("/music/out")));
        assert_eq!(config.bits_per_sample, Some(16));
    }

    #[test]
    fn test_explicit_config_file_missing() {
        let result = load_toml_config(Some(Path::new("/nonexistent/alconv.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_cli_overrides_env_and_toml() {
        std::env::set_var("ALCONV_TEST_DEPTH", "20");
        let value = resolve_setting(Some(16), "ALCONV_TEST_DEPTH", Some(24), 0).unwrap();
        assert_eq!(value, 16);
        std::env::remove_var("ALCONV_TEST_DEPTH");
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        std::env::set_var("ALCONV_TEST_DEPTH", "20");
        let value = resolve_setting(None, "ALCONV_TEST_DEPTH", Some(24), 0).unwrap();
        assert_eq!(value, 20);
        std::env::remove_var("ALCONV_TEST_DEPTH");
    }

    #[test]
    #[serial]
    fn test_toml_then_default() {
        std::env::remove_var("ALCONV_TEST_DEPTH");
        assert_eq!(
            resolve_setting(None, "ALCONV_TEST_DEPTH", Some(24), 0).unwrap(),
            24
        );
        assert_eq!(resolve_setting::<i32>(None, "ALCONV_TEST_DEPTH", None, 0).unwrap(), 0);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        std::env::set_var("ALCONV_TEST_DEPTH", "deep");
        let result = resolve_setting::<i32>(None, "ALCONV_TEST_DEPTH", None, 0);
        assert!(matches!(result, Err(Error::Config(_))));
        std::env::remove_var("ALCONV_TEST_DEPTH");
    }
}
