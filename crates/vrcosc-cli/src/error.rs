//! Errors raised while locating, reading or writing the host configuration.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The platform reported no home directory to derive paths from.
    #[error("Could not determine the vrcosc config directory")]
    NoProjectDirs,

    /// `init-config` found a file and was not asked to overwrite it.
    #[error("{} already exists, pass --force to overwrite", .0.display())]
    ConfigExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML or has mistyped keys.
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}
