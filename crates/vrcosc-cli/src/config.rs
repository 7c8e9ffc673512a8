//! Configuration file support for vrcosc
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/vrcosc/config.toml`
//! - macOS: `~/Library/Application Support/vrcosc/config.toml`
//! - Windows: `%APPDATA%\vrcosc\config.toml`

use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "vrcosc";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OSC connection to VRChat
    pub osc: OscSettings,
    /// Where module settings are kept
    pub storage: StorageSettings,
}

impl Config {
    /// Load configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path`, or the default config file when `None`.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        if path.exists() {
            Self::load_from(&path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory holding the per-module settings files.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage.directory {
            Some(dir) => Ok(dir.clone()),
            None => project_dirs().map(|dirs| dirs.data_dir().join("modules")),
        }
    }

    /// Write a commented default config file to `path`.
    pub fn create_default_config_file(path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(Error::ConfigExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = r#"# vrcosc configuration file

[osc]
# Host VRChat runs on
address = "127.0.0.1"

# Port VRChat listens on
send_port = 9000

# Port VRChat sends avatar parameters to
receive_port = 9001

[storage]
# Directory for module settings files
# directory = "/path/to/modules"
"#;

        fs::write(path, content)?;
        Ok(())
    }
}

/// OSC connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscSettings {
    /// Host VRChat runs on
    pub address: String,
    /// Port VRChat receives on
    pub send_port: u16,
    /// Port VRChat sends to
    pub receive_port: u16,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            send_port: 9000,
            receive_port: 9001,
        }
    }
}

impl OscSettings {
    pub fn send_addr(&self) -> String {
        format!("{}:{}", self.address, self.send_port)
    }

    pub fn receive_addr(&self) -> String {
        format!("{}:{}", self.address, self.receive_port)
    }
}

/// Module settings storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Override for the settings directory
    pub directory: Option<PathBuf>,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME).ok_or(Error::NoProjectDirs)
}
