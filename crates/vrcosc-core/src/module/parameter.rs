//! Declared avatar parameters.

use crate::osc::ValueType;

/// Prefix VRChat uses for avatar parameter addresses.
pub const AVATAR_PARAMETER_PREFIX: &str = "/avatar/parameters/";

/// Address VRChat sends when the local avatar changes.
pub const AVATAR_CHANGE_ADDRESS: &str = "/avatar/change";

/// Direction of a parameter, seen from the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterMode {
    Read,
    Write,
    ReadWrite,
}

impl ParameterMode {
    pub fn can_read(self) -> bool {
        matches!(self, ParameterMode::Read | ParameterMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, ParameterMode::Write | ParameterMode::ReadWrite)
    }
}

/// Immutable description of one declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMetadata {
    mode: ParameterMode,
    address: String,
    description: String,
    expected: ValueType,
}

impl ParameterMetadata {
    /// `address` may be a full OSC address or a bare parameter name, which is
    /// placed under `/avatar/parameters/`.
    pub fn new<A: Into<String>, D: Into<String>>(
        mode: ParameterMode,
        address: A,
        description: D,
        expected: ValueType,
    ) -> Self {
        let address = address.into();
        let address = if address.starts_with('/') {
            address
        } else {
            format!("{}{}", AVATAR_PARAMETER_PREFIX, address)
        };
        Self {
            mode,
            address,
            description: description.into(),
            expected,
        }
    }

    pub fn mode(&self) -> ParameterMode {
        self.mode
    }

    /// Fully formatted OSC address used for sending.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expected(&self) -> ValueType {
        self.expected
    }

    /// The bare parameter name matched against inbound `/avatar/parameters/*`.
    pub fn name(&self) -> &str {
        self.address
            .strip_prefix(AVATAR_PARAMETER_PREFIX)
            .unwrap_or(&self.address)
    }
}
