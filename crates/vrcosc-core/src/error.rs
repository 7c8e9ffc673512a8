//! Error types for vrcosc-core.

use thiserror::Error;

/// Result type alias for vrcosc-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the OSC layer, the attribute model and the module runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed OSC wire data (truncated, bad padding, unsupported type tag).
    #[error("OSC format error: {0}")]
    Format(String),

    /// An OSC message failed construction-time validation.
    #[error("Invalid OSC message: {0}")]
    InvalidMessage(String),

    /// Socket or file IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A module tried to send a parameter it never declared.
    #[error("Parameter '{0}' has not been defined")]
    UndeclaredParameter(String),

    /// A module tried to send a value to a parameter without write mode.
    #[error("Cannot send a value to read-only parameter '{0}'")]
    ReadOnlyParameter(String),

    /// A setting lookup that the module never declared.
    #[error("Setting '{0}' has not been defined")]
    UnknownSetting(String),

    /// A setting was read or written with the wrong value type.
    #[error("Setting '{lookup}' is not of type '{expected}'")]
    SettingType {
        lookup: String,
        expected: String,
    },

    /// Module schema or runtime configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rosc::OscError> for Error {
    fn from(err: rosc::OscError) -> Self {
        Error::Format(err.to_string())
    }
}
