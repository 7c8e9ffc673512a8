//! Typed module attributes.
//!
//! A [`ModuleAttribute`] is one user-editable setting: a single value, a
//! bounded numeric value, a text value paired with a button, or a homogeneous
//! list. Every attribute remembers its default so it can be reset and so
//! persistence can skip unchanged values.

use super::settings::Settings;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Persisted type tag of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Bool,
    Int,
    Float,
    String,
    Enum,
}

impl AttributeType {
    /// The lowercase tag written to settings files.
    pub fn tag(self) -> &'static str {
        match self {
            AttributeType::Bool => "bool",
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::String => "string",
            AttributeType::Enum => "enum",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bool" => Some(AttributeType::Bool),
            "int" => Some(AttributeType::Int),
            "float" => Some(AttributeType::Float),
            "string" => Some(AttributeType::String),
            "enum" => Some(AttributeType::Enum),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A value of some registered setting enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Stable, fully qualified name of the enum type.
    pub type_name: &'static str,
    /// Integer discriminant.
    pub value: i32,
}

/// Enums usable as setting values.
///
/// `TYPE_NAME` is persisted, so it must stay stable across releases.
pub trait SettingEnum: Copy + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
    const VARIANTS: &'static [Self];

    fn to_i32(self) -> i32;

    fn name(self) -> &'static str;

    fn from_i32(value: i32) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.to_i32() == value)
    }
}

type EnumValidator = fn(i32) -> bool;

fn is_variant<E: SettingEnum>(value: i32) -> bool {
    E::from_i32(value).is_some()
}

/// Maps persisted enum type names to their decoders.
///
/// Populated by the module schema whenever an enum setting is declared.
#[derive(Debug, Clone, Default)]
pub struct EnumRegistry {
    decoders: HashMap<&'static str, EnumValidator>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: SettingEnum>(&mut self) {
        self.decoders.insert(E::TYPE_NAME, is_variant::<E>);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Resolve a persisted `type_name#value` pair.
    ///
    /// Returns `None` for unknown types and out-of-range discriminants.
    pub fn decode(&self, type_name: &str, value: i32) -> Option<EnumValue> {
        let (name, valid) = self.decoders.get_key_value(type_name)?;
        valid(value).then_some(EnumValue {
            type_name: *name,
            value,
        })
    }
}

/// The value held by an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    Enum(EnumValue),
}

impl AttributeValue {
    pub fn enumeration<E: SettingEnum>(value: E) -> Self {
        AttributeValue::Enum(EnumValue {
            type_name: E::TYPE_NAME,
            value: value.to_i32(),
        })
    }

    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::Bool(_) => AttributeType::Bool,
            AttributeValue::Int(_) => AttributeType::Int,
            AttributeValue::Float(_) => AttributeType::Float,
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Enum(_) => AttributeType::Enum,
        }
    }

    /// Whether `other` may replace this value. Enums must share a type.
    pub fn same_type(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Enum(a), AttributeValue::Enum(b)) => a.type_name == b.type_name,
            _ => self.attribute_type() == other.attribute_type(),
        }
    }

    /// Human readable type name, used in error messages.
    pub fn type_description(&self) -> String {
        match self {
            AttributeValue::Enum(e) => e.type_name.to_string(),
            other => other.attribute_type().to_string(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum<E: SettingEnum>(&self) -> Option<E> {
        match self {
            AttributeValue::Enum(v) if v.type_name == E::TYPE_NAME => E::from_i32(v.value),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => f.write_str(v),
            AttributeValue::Enum(v) => write!(f, "{}#{}", v.type_name, v.value),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

/// Display name and description shown next to an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMetadata {
    pub display_name: String,
    pub description: String,
}

impl AttributeMetadata {
    pub fn new<N: Into<String>, D: Into<String>>(display_name: N, description: D) -> Self {
        Self {
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

/// Predicate deciding whether an attribute is currently editable.
pub type DependsOn = Arc<dyn Fn(&Settings) -> bool + Send + Sync>;

/// Callback run when the button of a [`AttributeKind::SingleWithButton`] is pressed.
pub type ButtonAction = Arc<dyn Fn() + Send + Sync>;

/// Shape-specific state of an attribute.
#[derive(Clone)]
pub enum AttributeKind {
    Single {
        value: AttributeValue,
        default: AttributeValue,
    },
    SingleWithBounds {
        value: AttributeValue,
        default: AttributeValue,
        min: AttributeValue,
        max: AttributeValue,
    },
    SingleWithButton {
        value: AttributeValue,
        default: AttributeValue,
        button_text: String,
        action: ButtonAction,
    },
    List {
        values: Vec<AttributeValue>,
        defaults: Vec<AttributeValue>,
        element_type: AttributeType,
        can_be_empty: bool,
    },
}

/// One declared module setting.
#[derive(Clone)]
pub struct ModuleAttribute {
    metadata: AttributeMetadata,
    kind: AttributeKind,
    depends_on: Option<DependsOn>,
}

impl ModuleAttribute {
    pub fn single(metadata: AttributeMetadata, default: AttributeValue) -> Self {
        Self {
            metadata,
            kind: AttributeKind::Single {
                value: default.clone(),
                default,
            },
            depends_on: None,
        }
    }

    /// A numeric attribute clamped to `[min, max]`.
    pub fn bounded(
        metadata: AttributeMetadata,
        default: AttributeValue,
        min: AttributeValue,
        max: AttributeValue,
    ) -> Result<Self> {
        let numeric = matches!(
            default.attribute_type(),
            AttributeType::Int | AttributeType::Float
        );
        if !numeric || !default.same_type(&min) || !default.same_type(&max) {
            return Err(Error::Config(format!(
                "bounded setting '{}' needs numeric default, min and max of one type",
                metadata.display_name
            )));
        }
        let value = clamp(&default, &min, &max);
        Ok(Self {
            metadata,
            kind: AttributeKind::SingleWithBounds {
                value: value.clone(),
                default: value,
                min,
                max,
            },
            depends_on: None,
        })
    }

    pub fn with_button<T: Into<String>>(
        metadata: AttributeMetadata,
        default: String,
        button_text: T,
        action: ButtonAction,
    ) -> Self {
        let default = AttributeValue::String(default);
        Self {
            metadata,
            kind: AttributeKind::SingleWithButton {
                value: default.clone(),
                default,
                button_text: button_text.into(),
                action,
            },
            depends_on: None,
        }
    }

    /// A list attribute. Only `int` and `string` elements are supported and
    /// every default must match `element_type`.
    pub fn list(
        metadata: AttributeMetadata,
        defaults: Vec<AttributeValue>,
        element_type: AttributeType,
        can_be_empty: bool,
    ) -> Result<Self> {
        if !matches!(element_type, AttributeType::Int | AttributeType::String) {
            return Err(Error::Config(format!(
                "list setting '{}' cannot hold {} values",
                metadata.display_name, element_type
            )));
        }
        if let Some(bad) = defaults.iter().find(|v| v.attribute_type() != element_type) {
            return Err(Error::Config(format!(
                "list setting '{}' holds {} but got a {} default",
                metadata.display_name,
                element_type,
                bad.attribute_type()
            )));
        }
        if defaults.is_empty() && !can_be_empty {
            return Err(Error::Config(format!(
                "list setting '{}' cannot be empty but has no defaults",
                metadata.display_name
            )));
        }
        Ok(Self {
            metadata,
            kind: AttributeKind::List {
                values: defaults.clone(),
                defaults,
                element_type,
                can_be_empty,
            },
            depends_on: None,
        })
    }

    pub fn with_depends_on(mut self, depends_on: Option<DependsOn>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn metadata(&self) -> &AttributeMetadata {
        &self.metadata
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, AttributeKind::List { .. })
    }

    /// The scalar value, or `None` for lists.
    pub fn value(&self) -> Option<&AttributeValue> {
        match &self.kind {
            AttributeKind::Single { value, .. }
            | AttributeKind::SingleWithBounds { value, .. }
            | AttributeKind::SingleWithButton { value, .. } => Some(value),
            AttributeKind::List { .. } => None,
        }
    }

    /// The list values, or `None` for scalars.
    pub fn values(&self) -> Option<&[AttributeValue]> {
        match &self.kind {
            AttributeKind::List { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Scalar type, or the element type for lists.
    pub fn attribute_type(&self) -> AttributeType {
        match &self.kind {
            AttributeKind::List { element_type, .. } => *element_type,
            AttributeKind::Single { default, .. }
            | AttributeKind::SingleWithBounds { default, .. }
            | AttributeKind::SingleWithButton { default, .. } => default.attribute_type(),
        }
    }

    pub fn can_be_empty(&self) -> bool {
        matches!(self.kind, AttributeKind::List { can_be_empty: true, .. })
    }

    pub fn is_default(&self) -> bool {
        match &self.kind {
            AttributeKind::Single { value, default }
            | AttributeKind::SingleWithBounds { value, default, .. }
            | AttributeKind::SingleWithButton { value, default, .. } => value == default,
            AttributeKind::List {
                values, defaults, ..
            } => values == defaults,
        }
    }

    /// Evaluate the dependency gate against the rest of the settings.
    pub fn is_enabled(&self, settings: &Settings) -> bool {
        self.depends_on.as_ref().map_or(true, |f| f(settings))
    }

    /// Replace a scalar value. Bounded values are clamped.
    pub fn set_value(&mut self, new_value: AttributeValue) -> Result<()> {
        let name = self.metadata.display_name.clone();
        check_single_line(&name, &new_value)?;
        match &mut self.kind {
            AttributeKind::Single { value, .. } | AttributeKind::SingleWithButton { value, .. } => {
                check_type(&name, value, &new_value)?;
                *value = new_value;
            }
            AttributeKind::SingleWithBounds {
                value, min, max, ..
            } => {
                check_type(&name, value, &new_value)?;
                *value = clamp(&new_value, min, max);
            }
            AttributeKind::List { .. } => {
                return Err(Error::SettingType {
                    lookup: name,
                    expected: "list".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Replace every element of a list.
    pub fn set_values(&mut self, new_values: Vec<AttributeValue>) -> Result<()> {
        let name = self.metadata.display_name.clone();
        let AttributeKind::List {
            values,
            element_type,
            can_be_empty,
            ..
        } = &mut self.kind
        else {
            return Err(Error::SettingType {
                lookup: name,
                expected: "list".to_string(),
            });
        };
        if let Some(bad) = new_values.iter().find(|v| v.attribute_type() != *element_type) {
            return Err(Error::SettingType {
                lookup: format!("{} ({})", name, bad.attribute_type()),
                expected: element_type.to_string(),
            });
        }
        for value in &new_values {
            check_single_line(&name, value)?;
        }
        if new_values.is_empty() && !*can_be_empty {
            return Err(Error::Config(format!("list setting '{}' cannot be empty", name)));
        }
        *values = new_values;
        Ok(())
    }

    /// Place `new_value` at `index`, growing the list with copies of it when
    /// `index` is past the end.
    pub fn set_value_at(&mut self, index: usize, new_value: AttributeValue) -> Result<()> {
        let mut values = self.list_values_for_edit()?;
        if index < values.len() {
            values[index] = new_value;
        } else {
            values.resize(index + 1, new_value);
        }
        self.set_values(values)
    }

    pub fn push_value(&mut self, new_value: AttributeValue) -> Result<()> {
        let mut values = self.list_values_for_edit()?;
        values.push(new_value);
        self.set_values(values)
    }

    pub fn remove_value(&mut self, index: usize) -> Result<AttributeValue> {
        let mut values = self.list_values_for_edit()?;
        if index >= values.len() {
            return Err(Error::Config(format!(
                "index {} out of range for list setting '{}'",
                index, self.metadata.display_name
            )));
        }
        let removed = values.remove(index);
        self.set_values(values)?;
        Ok(removed)
    }

    /// Restore the default value(s).
    pub fn reset(&mut self) {
        match &mut self.kind {
            AttributeKind::Single { value, default }
            | AttributeKind::SingleWithBounds { value, default, .. }
            | AttributeKind::SingleWithButton { value, default, .. } => *value = default.clone(),
            AttributeKind::List {
                values, defaults, ..
            } => *values = defaults.clone(),
        }
    }

    /// Run the button action, if this attribute has one.
    pub fn press_button(&self) -> bool {
        match &self.kind {
            AttributeKind::SingleWithButton { action, .. } => {
                action();
                true
            }
            _ => false,
        }
    }

    fn list_values_for_edit(&self) -> Result<Vec<AttributeValue>> {
        self.values()
            .map(|v| v.to_vec())
            .ok_or_else(|| Error::SettingType {
                lookup: self.metadata.display_name.clone(),
                expected: "list".to_string(),
            })
    }
}

impl fmt::Debug for ModuleAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ModuleAttribute");
        s.field("name", &self.metadata.display_name);
        match &self.kind {
            AttributeKind::List { values, .. } => s.field("values", values),
            _ => s.field("value", &self.value()),
        };
        s.field("default", &self.is_default()).finish_non_exhaustive()
    }
}

fn check_type(name: &str, current: &AttributeValue, new_value: &AttributeValue) -> Result<()> {
    if current.same_type(new_value) {
        Ok(())
    } else {
        Err(Error::SettingType {
            lookup: name.to_string(),
            expected: current.type_description(),
        })
    }
}

/// Settings files are line oriented, so string values cannot span lines.
fn check_single_line(name: &str, value: &AttributeValue) -> Result<()> {
    match value.as_str() {
        Some(text) if text.contains(['\n', '\r']) => Err(Error::Config(format!(
            "setting '{}' cannot hold a line break",
            name
        ))),
        _ => Ok(()),
    }
}

fn clamp(value: &AttributeValue, min: &AttributeValue, max: &AttributeValue) -> AttributeValue {
    match (value, min, max) {
        (AttributeValue::Int(v), AttributeValue::Int(lo), AttributeValue::Int(hi)) => {
            AttributeValue::Int((*v).clamp(*lo, (*hi).max(*lo)))
        }
        (AttributeValue::Float(v), AttributeValue::Float(lo), AttributeValue::Float(hi)) => {
            AttributeValue::Float(v.clamp(*lo, hi.max(*lo)))
        }
        _ => value.clone(),
    }
}
