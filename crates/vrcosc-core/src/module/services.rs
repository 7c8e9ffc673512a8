//! Host services handed to every module.

use super::persistence::{MemoryStorage, SettingsStorage};
use crate::osc::{OscClient, OscMessage, OscValue};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// VRChat's chat box input address.
pub const CHATBOX_INPUT_ADDRESS: &str = "/chatbox/input";
/// VRChat's typing indicator address.
pub const CHATBOX_TYPING_ADDRESS: &str = "/chatbox/typing";
/// Longest text VRChat shows in the chat box.
pub const CHATBOX_MAX_LENGTH: usize = 144;

/// Priority-arbitrated chat box shared by all modules.
pub trait ChatBox: Send + Sync {
    /// Request that `text` is shown for `duration`. `None` clears the box.
    ///
    /// Returns the instant the accepted text expires, or when the text
    /// currently holding the box expires if the request was rejected.
    fn set_text(&self, text: Option<&str>, priority: i32, duration: Duration) -> Instant;

    fn set_typing(&self, typing: bool);
}

/// Opens URLs in the user's browser.
pub trait UrlOpener: Send + Sync {
    fn open_url(&self, url: &str) -> anyhow::Result<()>;
}

/// Tracked VR devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VrDevice {
    Headset,
    LeftController,
    RightController,
}

/// Read-only view of the VR runtime.
pub trait VrInterface: Send + Sync {
    /// Whether a VR runtime is connected.
    fn is_running(&self) -> bool;

    /// Battery charge of `device` in `[0, 1]`, if known.
    fn battery_level(&self, device: VrDevice) -> Option<f32>;
}

#[derive(Debug, Clone, Copy)]
struct ShownText {
    priority: i32,
    expires: Instant,
}

/// [`ChatBox`] that talks to VRChat over OSC.
#[derive(Debug)]
pub struct OscChatBox {
    client: OscClient,
    current: Mutex<Option<ShownText>>,
}

impl OscChatBox {
    pub fn new(client: OscClient) -> Self {
        Self {
            client,
            current: Mutex::new(None),
        }
    }

    fn send(&self, message: anyhow::Result<OscMessage>) {
        let result = message.and_then(|m| self.client.send_message(&m).map_err(Into::into));
        if let Err(e) = result {
            log::warn!("[CHATBOX] Failed to send: {:#}", e);
        }
    }
}

impl ChatBox for OscChatBox {
    fn set_text(&self, text: Option<&str>, priority: i32, duration: Duration) -> Instant {
        let now = Instant::now();
        let mut current = self.current.lock().expect("ChatBox lock poisoned");

        if let Some(shown) = *current {
            if now < shown.expires && priority < shown.priority {
                log::debug!(
                    "[CHATBOX] Rejected priority {} text, priority {} showing",
                    priority,
                    shown.priority
                );
                return shown.expires;
            }
        }

        let (text, expires) = match text {
            Some(text) => {
                let expires = now + duration;
                *current = Some(ShownText { priority, expires });
                (truncate(text), expires)
            }
            None => {
                *current = None;
                (String::new(), now)
            }
        };

        self.send(
            OscMessage::new(
                CHATBOX_INPUT_ADDRESS,
                vec![OscValue::String(text), OscValue::Bool(true)],
            )
            .map_err(Into::into),
        );
        expires
    }

    fn set_typing(&self, typing: bool) {
        self.send(OscMessage::single(CHATBOX_TYPING_ADDRESS, typing).map_err(Into::into));
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(CHATBOX_MAX_LENGTH).collect()
}

/// Opens URLs with the platform's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = std::process::Command::new("cmd");
            c.args(["/C", "start", "", url]);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = std::process::Command::new("open");
            c.arg(url);
            c
        } else {
            let mut c = std::process::Command::new("xdg-open");
            c.arg(url);
            c
        };
        command.spawn()?;
        Ok(())
    }
}

/// Discards chat box requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChatBox;

impl ChatBox for NoopChatBox {
    fn set_text(&self, _text: Option<&str>, _priority: i32, _duration: Duration) -> Instant {
        Instant::now()
    }

    fn set_typing(&self, _typing: bool) {}
}

/// Logs URLs instead of opening them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUrlOpener;

impl UrlOpener for NoopUrlOpener {
    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        log::info!("Not opening {}", url);
        Ok(())
    }
}

/// No VR runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVrInterface;

impl VrInterface for NoopVrInterface {
    fn is_running(&self) -> bool {
        false
    }

    fn battery_level(&self, _device: VrDevice) -> Option<f32> {
        None
    }
}

/// Collaborators a module needs from its host.
#[derive(Clone)]
pub struct ModuleServices {
    pub storage: Arc<dyn SettingsStorage>,
    pub osc: OscClient,
    pub chatbox: Arc<dyn ChatBox>,
    pub url_opener: Arc<dyn UrlOpener>,
    pub vr: Arc<dyn VrInterface>,
}

impl ModuleServices {
    /// Services that keep everything in memory and send nothing.
    pub fn noop() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            osc: OscClient::noop(),
            chatbox: Arc::new(NoopChatBox),
            url_opener: Arc::new(NoopUrlOpener),
            vr: Arc::new(NoopVrInterface),
        }
    }

    /// Services for a live VRChat session: storage, OSC and an OSC chat box.
    pub fn new(storage: Arc<dyn SettingsStorage>, osc: OscClient) -> Self {
        Self {
            storage,
            chatbox: Arc::new(OscChatBox::new(osc.clone())),
            osc,
            url_opener: Arc::new(SystemUrlOpener),
            vr: Arc::new(NoopVrInterface),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn SettingsStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_osc(mut self, osc: OscClient) -> Self {
        self.osc = osc;
        self
    }

    pub fn with_chatbox(mut self, chatbox: Arc<dyn ChatBox>) -> Self {
        self.chatbox = chatbox;
        self
    }

    pub fn with_url_opener(mut self, url_opener: Arc<dyn UrlOpener>) -> Self {
        self.url_opener = url_opener;
        self
    }

    pub fn with_vr(mut self, vr: Arc<dyn VrInterface>) -> Self {
        self.vr = vr;
        self
    }
}

impl Default for ModuleServices {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for ModuleServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleServices")
            .field("osc", &self.osc)
            .finish_non_exhaustive()
    }
}
