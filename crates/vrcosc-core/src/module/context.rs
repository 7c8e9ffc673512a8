//! What a module can reach from inside its hooks.

use super::attribute::SettingEnum;
use super::instance::Shared;
use super::player::Player;
use super::services::VrInterface;
use super::settings::{FromSetting, Settings};
use super::ModuleState;
use crate::error::Result;
use crate::osc::OscValue;
use std::time::{Duration, Instant};

/// Borrowed view of a running module, passed to every [`Module`](super::Module) hook.
pub struct ModuleContext<'a> {
    shared: &'a Shared,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self { shared }
    }

    pub fn title(&self) -> &str {
        &self.shared.title
    }

    pub fn state(&self) -> ModuleState {
        self.shared.state()
    }

    /// Read a setting as `T`.
    pub fn setting<T: FromSetting>(&self, lookup: &str) -> Result<T> {
        self.shared.with_settings(|s| s.get::<T>(lookup))
    }

    pub fn setting_enum<E: SettingEnum>(&self, lookup: &str) -> Result<E> {
        self.shared.with_settings(|s| s.get_enum::<E>(lookup))
    }

    pub fn with_settings<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        self.shared.with_settings(f)
    }

    /// Send a value to a declared writable parameter.
    pub fn send_parameter<V: Into<OscValue>>(&self, lookup: &str, value: V) -> Result<()> {
        self.shared.send_parameter(lookup, value.into())
    }

    /// Snapshot of the local player.
    pub fn player(&self) -> Player {
        self.shared.player()
    }

    pub fn log(&self, message: &str) {
        log::info!("[MODULE:{}] {}", self.shared.title, message);
    }

    /// Show text in the chat box at this module's priority.
    pub fn set_chatbox_text(&self, text: Option<&str>, duration: Duration) -> Instant {
        self.shared
            .services
            .chatbox
            .set_text(text, self.shared.chatbox_priority, duration)
    }

    pub fn set_chatbox_typing(&self, typing: bool) {
        self.shared.services.chatbox.set_typing(typing);
    }

    pub fn open_url(&self, url: &str) {
        if let Err(e) = self.shared.services.url_opener.open_url(url) {
            log::warn!("[MODULE:{}] Failed to open {}: {:#}", self.shared.title, url, e);
        }
    }

    pub fn vr(&self) -> &dyn VrInterface {
        self.shared.services.vr.as_ref()
    }
}
