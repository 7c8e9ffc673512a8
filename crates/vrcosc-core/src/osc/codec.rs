//! OSC 1.0 wire codec.
//!
//! Byte-level work is done by `rosc`; this module narrows its packet model to
//! [`OscMessage`] and rejects argument kinds VRChat never produces.

use super::message::{OscMessage, OscValue};
use crate::error::{Error, Result};
use rosc::{decoder, encoder, OscPacket, OscType};

/// Encode a message to its OSC wire representation.
pub fn encode(message: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(rosc::OscMessage {
        addr: message.address().to_string(),
        args: message.values().iter().map(to_osc_type).collect(),
    });
    Ok(encoder::encode(&packet)?)
}

/// Decode a single message.
///
/// Bundles are rejected here; use [`decode_packet`] on datagrams that may
/// carry them.
pub fn decode(bytes: &[u8]) -> Result<OscMessage> {
    match decode_raw(bytes)? {
        OscPacket::Message(msg) => from_rosc(msg),
        OscPacket::Bundle(_) => Err(Error::Format(
            "expected a message but found a bundle".to_string(),
        )),
    }
}

/// Decode a datagram into the messages it carries, flattening bundles in order.
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<OscMessage>> {
    let mut out = Vec::new();
    flatten(decode_raw(bytes)?, &mut out)?;
    Ok(out)
}

fn decode_raw(bytes: &[u8]) -> Result<OscPacket> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Format(format!(
            "packet length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let (rest, packet) = decoder::decode_udp(bytes)?;
    if !rest.is_empty() {
        return Err(Error::Format(format!(
            "{} trailing bytes after packet",
            rest.len()
        )));
    }
    // rosc skips padding without reading it, so non-zero padding only shows
    // up as a difference from the canonical encoding
    if encoder::encode(&packet)? != bytes {
        return Err(Error::Format(
            "inconsistent padding in OSC packet".to_string(),
        ));
    }
    Ok(packet)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) -> Result<()> {
    match packet {
        OscPacket::Message(msg) => out.push(from_rosc(msg)?),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out)?;
            }
        }
    }
    Ok(())
}

fn from_rosc(msg: rosc::OscMessage) -> Result<OscMessage> {
    let values = msg
        .args
        .into_iter()
        .map(from_osc_type)
        .collect::<Result<Vec<_>>>()?;
    OscMessage::new(msg.addr, values).map_err(|e| Error::Format(e.to_string()))
}

fn to_osc_type(value: &OscValue) -> OscType {
    match value {
        OscValue::Int(v) => OscType::Int(*v),
        OscValue::Float(v) => OscType::Float(*v),
        OscValue::String(v) => OscType::String(v.clone()),
        OscValue::Bool(v) => OscType::Bool(*v),
    }
}

fn from_osc_type(arg: OscType) -> Result<OscValue> {
    match arg {
        OscType::Int(v) => Ok(OscValue::Int(v)),
        OscType::Float(v) => Ok(OscValue::Float(v)),
        OscType::String(v) => Ok(OscValue::String(v)),
        OscType::Bool(v) => Ok(OscValue::Bool(v)),
        other => Err(Error::Format(format!("unsupported argument type {:?}", other))),
    }
}
