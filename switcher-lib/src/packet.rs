//! Inbound frame parsing.
//!
//! Three frame shapes arrive from a device: the 165-byte UDP status
//! broadcast, the variable-length TCP status reply, and the TCP login
//! reply carrying the session token. Each gets a thin wrapper over
//! [`Bytes`] whose `TryFrom` validates length and magic up front, so the
//! fixed-offset reads below can never go out of bounds.

use crate::constants::*;
use crate::error::SwitcherError;
use crate::status::{DeviceId, DeviceState, DeviceStatus, SessionToken};
use bytes::Bytes;
use std::net::Ipv4Addr;

/// True iff `buf` looks like a status broadcast: exactly 165 bytes
/// opening with the frame magic. Anything else is ignored by listeners,
/// not treated as an error.
pub fn is_broadcast(buf: &[u8]) -> bool {
    buf.len() == BROADCAST_LEN && buf.starts_with(&FRAME_MAGIC)
}

fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Device names are a NUL-padded 32-byte ASCII field.
fn read_name(buf: &[u8], offset: usize) -> String {
    let raw = &buf[offset..offset + DEVICE_NAME_LEN];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// A validated 165-byte status broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastFrame {
    bytes: Bytes,
}

impl TryFrom<Bytes> for BroadcastFrame {
    type Error = SwitcherError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        if !is_broadcast(&bytes) {
            return Err(SwitcherError::InvalidPacket(format!(
                "not a status broadcast ({} bytes)",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }
}

impl BroadcastFrame {
    /// Decodes every documented field. Infallible once the frame
    /// validated: the length check covers all offsets.
    pub fn decode(&self) -> DeviceStatus {
        let b = self.bytes.as_ref();
        let id = DeviceId([
            b[BCAST_ID_OFFSET],
            b[BCAST_ID_OFFSET + 1],
            b[BCAST_ID_OFFSET + 2],
        ]);
        let ip = Ipv4Addr::from(u32::from_be_bytes([
            b[BCAST_IP_OFFSET],
            b[BCAST_IP_OFFSET + 1],
            b[BCAST_IP_OFFSET + 2],
            b[BCAST_IP_OFFSET + 3],
        ]));
        DeviceStatus {
            name: read_name(b, BCAST_NAME_OFFSET),
            id,
            ip,
            state: DeviceState::from_wire(read_u16_le(b, BCAST_STATE_OFFSET)),
            remaining_seconds: read_u32_le(b, BCAST_REMAINING_OFFSET),
            default_shutdown_seconds: read_u32_le(b, BCAST_DEFAULT_SHUTDOWN_OFFSET),
            power_watts: read_u16_le(b, BCAST_POWER_OFFSET),
        }
    }
}

/// A validated TCP status reply (answer to a status query).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    bytes: Bytes,
}

impl TryFrom<Bytes> for StatusReply {
    type Error = SwitcherError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        if bytes.len() < STATUS_REPLY_MIN_LEN {
            return Err(SwitcherError::InvalidPacket(format!(
                "status reply too short: {} bytes, need {}",
                bytes.len(),
                STATUS_REPLY_MIN_LEN
            )));
        }
        if !bytes.starts_with(&FRAME_MAGIC) {
            return Err(SwitcherError::InvalidPacket(
                "status reply missing frame magic".to_string(),
            ));
        }
        Ok(Self { bytes })
    }
}

impl StatusReply {
    /// Decodes the reply. The reply does not repeat the device id or
    /// address, so the session supplies them.
    pub fn decode(&self, id: DeviceId, ip: Ipv4Addr) -> DeviceStatus {
        let b = self.bytes.as_ref();
        DeviceStatus {
            name: read_name(b, REPLY_NAME_OFFSET),
            id,
            ip,
            state: DeviceState::from_wire(read_u16_le(b, REPLY_STATE_OFFSET)),
            remaining_seconds: read_u32_le(b, REPLY_REMAINING_OFFSET),
            default_shutdown_seconds: read_u32_le(b, REPLY_DEFAULT_SHUTDOWN_OFFSET),
            power_watts: read_u16_le(b, REPLY_POWER_OFFSET),
        }
    }
}

/// A validated login reply.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginReply {
    bytes: Bytes,
}

impl TryFrom<Bytes> for LoginReply {
    type Error = SwitcherError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        if bytes.len() < LOGIN_REPLY_MIN_LEN {
            return Err(SwitcherError::InvalidPacket(format!(
                "login reply too short: {} bytes",
                bytes.len()
            )));
        }
        if !bytes.starts_with(&FRAME_MAGIC) {
            return Err(SwitcherError::InvalidPacket(
                "login reply missing frame magic".to_string(),
            ));
        }
        Ok(Self { bytes })
    }
}

impl LoginReply {
    pub fn token(&self) -> SessionToken {
        let b = self.bytes.as_ref();
        SessionToken::from_bytes([
            b[TOKEN_OFFSET],
            b[TOKEN_OFFSET + 1],
            b[TOKEN_OFFSET + 2],
            b[TOKEN_OFFSET + 3],
        ])
    }
}
