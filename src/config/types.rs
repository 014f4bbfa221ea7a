use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::AppDirError;
use crate::audio::ByteOrder;

const DEFAULT_OUTPUT_DEVICE: &str = "default";
const DEFAULT_DISC_LENGTH_MINUTES: u32 = 80;

/// User preferences persisted as `config.toml`.
///
/// Config keys (TOML): `output_dir`, `output_device`, `raw_byte_order`, `[naming]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where written segments go; `None` writes next to the source file.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Playback device identifier handed to the output sink untouched.
    #[serde(default = "default_output_device")]
    pub output_device: String,
    #[serde(default)]
    pub naming: NamingSettings,
    /// Last byte order chosen for headerless files.
    #[serde(default)]
    pub raw_byte_order: Option<ByteOrder>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            output_device: default_output_device(),
            naming: NamingSettings::default(),
            raw_byte_order: None,
        }
    }
}

/// How segment filename stems are generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingSettings {
    /// Put the track number before the base name instead of after it.
    pub prepend_number: bool,
    /// Text placed between the base name and the track number.
    pub filename_suffix: String,
    /// Name segments `d<disc>t<track>`, starting a new disc every `disc_length_minutes`.
    pub disc_numbering: bool,
    pub disc_length_minutes: u32,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            prepend_number: false,
            filename_suffix: String::new(),
            disc_numbering: false,
            disc_length_minutes: DEFAULT_DISC_LENGTH_MINUTES,
        }
    }
}

fn default_output_device() -> String {
    DEFAULT_OUTPUT_DEVICE.to_string()
}

/// Errors raised while loading or saving the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config directory unavailable: {0}")]
    Directory(#[from] AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config for {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: toml::ser::Error,
    },
}
