//! Settings of the download panel, persisted as a small JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token in `external_arguments` that is replaced by the download URL.
pub const URL_PLACEHOLDER: &str = "%d";

const APP_DIR: &str = "download-panel";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerSettings {
    /// When set, downloads are saved here without asking.
    pub default_download_path: Option<PathBuf>,
    /// Directory the save dialog starts in.
    pub last_download_path: PathBuf,
    pub close_on_finish: bool,
    pub use_native_dialog: bool,
    pub use_external_manager: bool,
    pub external_executable: String,
    pub external_arguments: String,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            default_download_path: None,
            last_download_path: dirs::home_dir().unwrap_or_default(),
            close_on_finish: false,
            use_native_dialog: true,
            use_external_manager: false,
            external_executable: String::new(),
            external_arguments: String::new(),
        }
    }
}

impl ManagerSettings {
    /// Makes sure the external manager receives the URL. Applying it twice is a no-op.
    pub fn normalized(mut self) -> Self {
        if !self.external_arguments.contains(URL_PLACEHOLDER) {
            self.external_arguments.push(' ');
            self.external_arguments.push_str(URL_PLACEHOLDER);
        }
        if self
            .default_download_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.default_download_path = None;
        }
        self
    }
}

/// Where the manager reads its settings from and writes the last save directory to.
pub trait SettingsStore {
    fn load(&self) -> Result<ManagerSettings, ConfigError>;

    fn store_last_download_path(&self, path: &Path) -> Result<(), ConfigError>;
}

pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/download-panel/settings.json`, falling back to the working directory.
    pub fn default_location() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR).join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<ManagerSettings, ConfigError> {
        if !self.path.exists() {
            tracing::debug!("No settings file at {}, using defaults", self.path.display());
            return Ok(ManagerSettings::default());
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, settings: &ManagerSettings) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, raw).map_err(io_err)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<ManagerSettings, ConfigError> {
        self.read().map(ManagerSettings::normalized)
    }

    fn store_last_download_path(&self, path: &Path) -> Result<(), ConfigError> {
        // Only this key is written back; everything else stays as the user wrote it.
        let mut settings = self.read()?;
        settings.last_download_path = path.to_path_buf();
        self.write(&settings)
    }
}
