//! Declaration of a module's settings and parameters.

use super::attribute::{
    AttributeMetadata, AttributeType, AttributeValue, ButtonAction, DependsOn, EnumRegistry,
    ModuleAttribute, SettingEnum,
};
use super::parameter::{ParameterMetadata, ParameterMode};
use super::settings::Settings;
use crate::error::{Error, Result};
use crate::osc::ValueType;

/// Collects everything a module declares in
/// [`Module::create_attributes`](super::Module::create_attributes).
#[derive(Debug, Default)]
pub struct ModuleSchema {
    settings: Settings,
    parameters: Vec<(String, ParameterMetadata)>,
    enums: EnumRegistry,
}

impl ModuleSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a plain bool, int, float or string setting.
    pub fn create_setting<V: Into<AttributeValue>>(
        &mut self,
        lookup: &str,
        display_name: &str,
        description: &str,
        default: V,
    ) -> Result<()> {
        let default = default.into();
        if default.attribute_type() == AttributeType::Enum {
            return Err(Error::Config(format!(
                "enum setting '{}' must be declared with create_enum_setting",
                lookup
            )));
        }
        self.add_setting(
            lookup,
            ModuleAttribute::single(AttributeMetadata::new(display_name, description), default),
        )
    }

    /// Declare an enum setting and register the enum for loading.
    pub fn create_enum_setting<E: SettingEnum>(
        &mut self,
        lookup: &str,
        display_name: &str,
        description: &str,
        default: E,
    ) -> Result<()> {
        self.enums.register::<E>();
        self.add_setting(
            lookup,
            ModuleAttribute::single(
                AttributeMetadata::new(display_name, description),
                AttributeValue::enumeration(default),
            ),
        )
    }

    /// Declare an int or float setting clamped to `[min, max]`.
    pub fn create_bounded_setting<V: Into<AttributeValue>>(
        &mut self,
        lookup: &str,
        display_name: &str,
        description: &str,
        default: V,
        min: V,
        max: V,
    ) -> Result<()> {
        let attribute = ModuleAttribute::bounded(
            AttributeMetadata::new(display_name, description),
            default.into(),
            min.into(),
            max.into(),
        )?;
        self.add_setting(lookup, attribute)
    }

    /// Declare a list of ints or strings.
    pub fn create_list_setting<V: Into<AttributeValue>>(
        &mut self,
        lookup: &str,
        display_name: &str,
        description: &str,
        element_type: AttributeType,
        defaults: Vec<V>,
        can_be_empty: bool,
    ) -> Result<()> {
        let attribute = ModuleAttribute::list(
            AttributeMetadata::new(display_name, description),
            defaults.into_iter().map(Into::into).collect(),
            element_type,
            can_be_empty,
        )?;
        self.add_setting(lookup, attribute)
    }

    /// Declare a text setting with a button next to it.
    pub fn create_button_setting(
        &mut self,
        lookup: &str,
        display_name: &str,
        description: &str,
        default: &str,
        button_text: &str,
        action: ButtonAction,
    ) -> Result<()> {
        self.add_setting(
            lookup,
            ModuleAttribute::with_button(
                AttributeMetadata::new(display_name, description),
                default.to_string(),
                button_text,
                action,
            ),
        )
    }

    /// Gate an already declared setting on the rest of the settings.
    pub fn set_depends_on(&mut self, lookup: &str, depends_on: DependsOn) -> Result<()> {
        let attribute = self
            .settings
            .attribute_mut(lookup)
            .ok_or_else(|| Error::UnknownSetting(lookup.to_string()))?;
        *attribute = attribute.clone().with_depends_on(Some(depends_on));
        Ok(())
    }

    /// Declare a prebuilt attribute.
    pub fn add_setting(&mut self, lookup: &str, attribute: ModuleAttribute) -> Result<()> {
        if let Some(AttributeValue::Enum(e)) = attribute.value() {
            if !self.enums.contains(e.type_name) {
                return Err(Error::Config(format!(
                    "enum type '{}' of setting '{}' is not registered",
                    e.type_name, lookup
                )));
            }
        }
        self.settings.insert(lookup, attribute)
    }

    /// Declare an avatar parameter. `address` may be a bare parameter name.
    pub fn create_parameter(
        &mut self,
        lookup: &str,
        mode: ParameterMode,
        address: &str,
        description: &str,
        expected: ValueType,
    ) -> Result<()> {
        if self.parameters.iter().any(|(key, _)| key == lookup) {
            return Err(Error::Config(format!("parameter '{}' declared twice", lookup)));
        }
        self.parameters.push((
            lookup.to_string(),
            ParameterMetadata::new(mode, address, description, expected),
        ));
        Ok(())
    }

    /// Register an enum without declaring a setting for it.
    pub fn register_enum<E: SettingEnum>(&mut self) {
        self.enums.register::<E>();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn parameters(&self) -> &[(String, ParameterMetadata)] {
        &self.parameters
    }

    pub(crate) fn into_parts(self) -> (Settings, Vec<(String, ParameterMetadata)>, EnumRegistry) {
        (self.settings, self.parameters, self.enums)
    }
}
