//! OSC (Open Sound Control) layer: message values, wire codec and the UDP
//! client that talks to VRChat.

pub mod client;
pub mod codec;
pub mod message;

pub use client::{OscClient, OscListener, DEFAULT_RECEIVE_ADDR, DEFAULT_SEND_ADDR};
pub use codec::{decode, decode_packet, encode};
pub use message::{OscMessage, OscValue, ValueType};
