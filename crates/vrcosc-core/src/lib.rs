//! VRCOSC Core - module runtime for VRChat's OSC avatar parameters.
//!
//! This crate provides:
//!
//! - **OSC** - message values, OSC 1.0 wire codec, UDP client with a
//!   listener registry
//! - **Modules** - typed settings, declared parameters, lifecycle and
//!   dispatch of inbound avatar parameters
//! - **Persistence** - per-module settings files
//! - **Services** - chat box, URL opener and VR state for modules
//! - **Built-in modules** - the clock
//!
//! # Architecture
//!
//! The [`OscClient`] receives datagrams on its own thread and fans every
//! decoded [`OscMessage`] out to registered listeners. A started
//! [`ModuleInstance`] is one such listener: it updates its [`Player`]
//! snapshot and calls the [`Module`] hooks. Modules answer through
//! [`ModuleContext::send_parameter`], and modules with an update interval
//! also run on a [`TimedTask`].

pub mod error;
pub mod module;
pub mod modules;
pub mod osc;
pub mod timer;

pub use error::{Error, Result};
pub use module::{
    AttributeType, AttributeValue, ChatBox, FileStorage, MemoryStorage, Module, ModuleContext,
    ModuleInstance, ModuleSchema, ModuleServices, ModuleState, ParameterMetadata, ParameterMode,
    Player, SettingEnum, Settings, SettingsStorage, VRChatInputParameter,
};
pub use osc::{OscClient, OscListener, OscMessage, OscValue, ValueType};
pub use timer::{CancellationToken, TimedTask};
