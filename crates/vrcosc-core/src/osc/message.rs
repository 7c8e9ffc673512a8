//! OSC message value types.

use crate::error::{Error, Result};
use std::fmt;

/// A single OSC argument.
///
/// Only the argument kinds VRChat uses are representable. Booleans are carried
/// purely in the type tag (`T`/`F`) on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    Int(i32),
    Float(f32),
    String(String),
    Bool(bool),
}

/// Tag-only twin of [`OscValue`], used to declare expected parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Float,
    String,
    Bool,
}

impl OscValue {
    /// The runtime type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            OscValue::Int(_) => ValueType::Int,
            OscValue::Float(_) => ValueType::Float,
            OscValue::String(_) => ValueType::String,
            OscValue::Bool(_) => ValueType::Bool,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            OscValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OscValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Bool => "bool",
        };
        f.write_str(name)
    }
}

impl From<i32> for OscValue {
    fn from(v: i32) -> Self {
        OscValue::Int(v)
    }
}

impl From<f32> for OscValue {
    fn from(v: f32) -> Self {
        OscValue::Float(v)
    }
}

impl From<bool> for OscValue {
    fn from(v: bool) -> Self {
        OscValue::Bool(v)
    }
}

impl From<&str> for OscValue {
    fn from(v: &str) -> Self {
        OscValue::String(v.to_string())
    }
}

impl From<String> for OscValue {
    fn from(v: String) -> Self {
        OscValue::String(v)
    }
}

/// An OSC message: a non-empty address and a non-empty argument list.
///
/// Both invariants are checked at construction and the message cannot be
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    address: String,
    values: Vec<OscValue>,
}

impl OscMessage {
    /// Create a message, validating address and values.
    ///
    /// # Arguments
    /// * `address` - OSC address pattern, starting with `/`
    /// * `values` - at least one argument
    ///
    /// # Returns
    /// `Error::InvalidMessage` when the address is empty, lacks the leading
    /// `/`, or when the address or a string argument contains a NUL byte.
    pub fn new<A: Into<String>>(address: A, values: Vec<OscValue>) -> Result<Self> {
        let address = address.into();
        if address.is_empty() {
            return Err(Error::InvalidMessage(
                "address must have a non-zero length".to_string(),
            ));
        }
        if !address.starts_with('/') {
            return Err(Error::InvalidMessage(format!(
                "address {:?} must start with '/'",
                address
            )));
        }
        // NUL terminates OSC strings on the wire
        if address.contains('\0') {
            return Err(Error::InvalidMessage(format!(
                "address {:?} contains a NUL byte",
                address
            )));
        }
        if values.is_empty() {
            return Err(Error::InvalidMessage(format!(
                "message to {} must carry at least one value",
                address
            )));
        }
        if values
            .iter()
            .any(|v| v.as_str().is_some_and(|s| s.contains('\0')))
        {
            return Err(Error::InvalidMessage(format!(
                "string argument to {} contains a NUL byte",
                address
            )));
        }
        Ok(Self { address, values })
    }

    /// Convenience constructor for the common single-value case.
    pub fn single<A: Into<String>, V: Into<OscValue>>(address: A, value: V) -> Result<Self> {
        Self::new(address, vec![value.into()])
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn values(&self) -> &[OscValue] {
        &self.values
    }

    /// The first argument. Always present by construction.
    pub fn first_value(&self) -> &OscValue {
        &self.values[0]
    }
}
