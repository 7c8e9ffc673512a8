//! Ordered collection of a module's settings.

use super::attribute::{AttributeValue, ModuleAttribute, SettingEnum};
use crate::error::{Error, Result};

/// Types that can be read out of a setting with [`Settings::get`].
pub trait FromSetting: Sized {
    /// Name used in type errors.
    const EXPECTED: &'static str;

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self>;
}

impl FromSetting for bool {
    const EXPECTED: &'static str = "bool";

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self> {
        attribute.value()?.as_bool()
    }
}

impl FromSetting for i32 {
    const EXPECTED: &'static str = "int";

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self> {
        attribute.value()?.as_int()
    }
}

impl FromSetting for f32 {
    const EXPECTED: &'static str = "float";

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self> {
        attribute.value()?.as_float()
    }
}

impl FromSetting for String {
    const EXPECTED: &'static str = "string";

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self> {
        attribute.value()?.as_str().map(str::to_string)
    }
}

impl FromSetting for Vec<i32> {
    const EXPECTED: &'static str = "list of int";

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self> {
        attribute.values()?.iter().map(AttributeValue::as_int).collect()
    }
}

impl FromSetting for Vec<String> {
    const EXPECTED: &'static str = "list of string";

    fn from_setting(attribute: &ModuleAttribute) -> Option<Self> {
        attribute
            .values()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

/// Settings keyed by lookup, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    entries: Vec<(String, ModuleAttribute)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting. Lookups must be unique.
    pub fn insert<L: Into<String>>(&mut self, lookup: L, attribute: ModuleAttribute) -> Result<()> {
        let lookup = lookup.into();
        if lookup.is_empty() || lookup.contains(['#', ':', '=']) {
            return Err(Error::Config(format!(
                "setting lookup '{}' must be non-empty and free of '#', ':' and '='",
                lookup
            )));
        }
        if self.contains(&lookup) {
            return Err(Error::Config(format!("setting '{}' declared twice", lookup)));
        }
        self.entries.push((lookup, attribute));
        Ok(())
    }

    pub fn contains(&self, lookup: &str) -> bool {
        self.attribute(lookup).is_some()
    }

    pub fn attribute(&self, lookup: &str) -> Option<&ModuleAttribute> {
        self.entries
            .iter()
            .find(|(key, _)| key == lookup)
            .map(|(_, attr)| attr)
    }

    pub fn attribute_mut(&mut self, lookup: &str) -> Option<&mut ModuleAttribute> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == lookup)
            .map(|(_, attr)| attr)
    }

    /// Read a setting as `T`.
    pub fn get<T: FromSetting>(&self, lookup: &str) -> Result<T> {
        let attribute = self
            .attribute(lookup)
            .ok_or_else(|| Error::UnknownSetting(lookup.to_string()))?;
        T::from_setting(attribute).ok_or_else(|| Error::SettingType {
            lookup: lookup.to_string(),
            expected: T::EXPECTED.to_string(),
        })
    }

    /// Read an enum setting.
    pub fn get_enum<E: SettingEnum>(&self, lookup: &str) -> Result<E> {
        let attribute = self
            .attribute(lookup)
            .ok_or_else(|| Error::UnknownSetting(lookup.to_string()))?;
        attribute
            .value()
            .and_then(AttributeValue::as_enum::<E>)
            .ok_or_else(|| Error::SettingType {
                lookup: lookup.to_string(),
                expected: E::TYPE_NAME.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModuleAttribute)> {
        self.entries.iter().map(|(key, attr)| (key.as_str(), attr))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_default(&self) -> bool {
        self.entries.iter().all(|(_, attr)| attr.is_default())
    }

    /// Whether the setting's dependency gate currently allows editing.
    pub fn is_enabled(&self, lookup: &str) -> bool {
        self.attribute(lookup).is_some_and(|attr| attr.is_enabled(self))
    }

    pub fn reset_all(&mut self) {
        for (_, attr) in &mut self.entries {
            attr.reset();
        }
    }
}
