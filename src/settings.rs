//! User settings persisted as TOML.
//!
//! The default location is `<config dir>/download-manager/settings.toml`.
//! A missing file yields [`Settings::default`]; a present file is parsed with
//! unknown keys ignored and missing keys defaulted, then validated.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::transfer::{CONNECT_TIMEOUT_SECS, DEFAULT_FORMAT, TRANSFER_TIMEOUT_SECS, discover_extractor};

/// Directory name under the platform config/data directories.
pub const APP_DIR_NAME: &str = "download-manager";

/// Settings file name.
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Default cap on concurrent transfers.
pub const DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS: usize = 3;

const MAX_SIMULTANEOUS_RANGE: std::ops::RangeInclusive<usize> = 1..=16;
const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=86_400;

/// Errors from reading, writing or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File could not be read or written.
    #[error("settings file {path}: {source}")]
    Io {
        /// Settings file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// File is not valid TOML for [`Settings`].
    #[error("invalid settings file {path}: {source}")]
    Parse {
        /// Settings file path.
        path: PathBuf,
        /// The TOML decoding error.
        #[source]
        source: toml::de::Error,
    },

    /// Settings could not be serialized.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is outside its allowed range.
    #[error("invalid settings value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Name of the offending key.
        field: &'static str,
        /// The rejected value as written.
        value: String,
        /// Human-readable allowed range.
        expected: &'static str,
    },
}

/// Engine and shell preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory new downloads are saved to.
    pub default_save_path: PathBuf,
    /// Cap on concurrent transfers (1..=16).
    pub max_simultaneous_downloads: usize,
    /// Extractor executable; discovered next to the binary when unset.
    pub extractor_executable_path: Option<PathBuf>,
    /// Format hint for external jobs added without one.
    pub extractor_default_format: String,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP whole-transfer timeout in seconds.
    pub transfer_timeout_secs: u64,
    /// Speed cap applied at startup, in KB/s.
    pub speed_limit_kbps: Option<u64>,
    /// Desktop shell only: announce finished downloads. The engine and CLI
    /// keep the value but never act on it.
    pub show_notifications: bool,
    /// Desktop shell only: hide to the tray instead of quitting.
    pub minimize_to_tray: bool,
    /// Desktop shell only: launch at login.
    pub start_with_system: bool,
    /// Extra request headers keyed by domain.
    pub headers: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_save_path: default_save_path(),
            max_simultaneous_downloads: DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS,
            extractor_executable_path: None,
            extractor_default_format: DEFAULT_FORMAT.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            transfer_timeout_secs: TRANSFER_TIMEOUT_SECS,
            speed_limit_kbps: None,
            show_notifications: true,
            minimize_to_tray: false,
            start_with_system: false,
            headers: BTreeMap::new(),
        }
    }
}

fn default_save_path() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `<config dir>/download-manager/settings.toml`, if the platform has one.
#[must_use]
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// `<data dir>/download-manager/downloads.db`, if the platform has one.
#[must_use]
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join("downloads.db"))
}

impl Settings {
    /// Loads settings from `path`, or defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let settings: Self = toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Writes settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] on invalid values or I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        let text = toml::to_string_pretty(self)?;
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, text).map_err(io_error)
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::OutOfRange`] for the first bad value.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !MAX_SIMULTANEOUS_RANGE.contains(&self.max_simultaneous_downloads) {
            return Err(SettingsError::OutOfRange {
                field: "max_simultaneous_downloads",
                value: self.max_simultaneous_downloads.to_string(),
                expected: "1..=16",
            });
        }
        validate_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout("transfer_timeout_secs", self.transfer_timeout_secs)?;
        Ok(())
    }

    /// Configured extractor, else one discovered next to the running binary.
    #[must_use]
    pub fn extractor_path(&self) -> Option<PathBuf> {
        self.extractor_executable_path
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(discover_extractor)
    }
}

fn validate_timeout(field: &'static str, value: u64) -> Result<(), SettingsError> {
    if TIMEOUT_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value: value.to_string(),
            expected: "1..=86400",
        })
    }
}
