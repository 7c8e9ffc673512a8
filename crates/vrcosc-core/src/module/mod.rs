//! Module runtime.
//!
//! A module is a piece of behaviour ([`Module`]) plus the state the runtime
//! keeps for it ([`ModuleInstance`]): declared settings and parameters, the
//! lifecycle state, the player snapshot and the host services.
//!
//! Lifecycle:
//!
//! ```text
//! Stopped -> Starting -> Started -> Stopping -> Stopped
//! ```

pub mod attribute;
pub mod context;
pub mod instance;
pub mod parameter;
pub mod persistence;
pub mod player;
pub mod schema;
pub mod services;
pub mod settings;

pub use attribute::{
    AttributeKind, AttributeMetadata, AttributeType, AttributeValue, ButtonAction, DependsOn,
    EnumRegistry, EnumValue, ModuleAttribute, SettingEnum,
};
pub use context::ModuleContext;
pub use instance::ModuleInstance;
pub use parameter::{ParameterMetadata, ParameterMode, AVATAR_CHANGE_ADDRESS, AVATAR_PARAMETER_PREFIX};
pub use persistence::{FileStorage, LoadReport, MemoryStorage, SettingsStorage};
pub use player::{Gesture, Player, TrackingType, VRChatInputParameter, Viseme};
pub use schema::ModuleSchema;
pub use services::{
    ChatBox, ModuleServices, NoopChatBox, NoopUrlOpener, NoopVrInterface, OscChatBox,
    SystemUrlOpener, UrlOpener, VrDevice, VrInterface,
};
pub use settings::{FromSetting, Settings};

use crate::timer::CancellationToken;
use std::fmt;
use std::time::Duration;

/// How often VRChat refreshes avatar parameters.
pub const VRC_OSC_UPDATE_RATE: f32 = 20.0;

/// Update interval matching [`VRC_OSC_UPDATE_RATE`].
pub const VRC_OSC_DELTA_UPDATE: Duration = Duration::from_millis(50);

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Stopped => "stopped",
            ModuleState::Starting => "starting",
            ModuleState::Started => "started",
            ModuleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Behaviour of a module.
///
/// Every hook runs with the module's behaviour lock held, so hooks of one
/// module never overlap. Hooks that fail are logged by the runtime.
pub trait Module: Send + 'static {
    fn title(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn author(&self) -> &str {
        ""
    }

    /// Stable identifier, also used for the settings file name.
    fn type_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Priority used when this module writes to the chat box.
    fn chatbox_priority(&self) -> i32 {
        0
    }

    /// Declare settings and parameters. Called once, before loading.
    fn create_attributes(&self, _schema: &mut ModuleSchema) -> crate::Result<()> {
        Ok(())
    }

    /// Interval for [`Module::on_update`], or `None` to never update.
    /// Read once per start, after [`Module::on_start`].
    fn update_interval(&self, _ctx: &ModuleContext<'_>) -> Option<Duration> {
        None
    }

    fn on_start(&mut self, _ctx: &ModuleContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_update(&mut self, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_avatar_change(&mut self, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// A VRChat input parameter changed; read it from [`ModuleContext::player`].
    fn on_player_state_update(
        &mut self,
        _ctx: &ModuleContext<'_>,
        _parameter: VRChatInputParameter,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_bool_parameter_received(
        &mut self,
        _ctx: &ModuleContext<'_>,
        _lookup: &str,
        _value: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_int_parameter_received(
        &mut self,
        _ctx: &ModuleContext<'_>,
        _lookup: &str,
        _value: i32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_float_parameter_received(
        &mut self,
        _ctx: &ModuleContext<'_>,
        _lookup: &str,
        _value: f32,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Linearly map `source` from `[s_min, s_max]` onto `[d_min, d_max]`.
pub fn map(source: f32, s_min: f32, s_max: f32, d_min: f32, d_max: f32) -> f32 {
    d_min + (d_max - d_min) * ((source - s_min) / (s_max - s_min))
}
