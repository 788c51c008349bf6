//! Decoded device data: identifiers, switch state and live status.

use crate::constants::DEVICE_ID_LEN;
use crate::error::SwitcherError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use strum_macros::Display;

/// 3-byte device identifier, broadcast by the device and used to address
/// TCP commands to it. Displayed as 6 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DeviceId(pub [u8; DEVICE_ID_LEN]);

impl DeviceId {
    pub fn as_bytes(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for DeviceId {
    type Err = SwitcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s)
            .map_err(|e| SwitcherError::Protocol(format!("invalid device id {s:?}: {e}")))?;
        let bytes: [u8; DEVICE_ID_LEN] = raw.as_slice().try_into().map_err(|_| {
            SwitcherError::Protocol(format!(
                "device id must be {DEVICE_ID_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for DeviceId {
    type Error = SwitcherError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Opaque 4-byte value returned by a successful login exchange and
/// carried in every subsequent command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionToken([u8; 4]);

impl SessionToken {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Switch state. The wire encodes it as a 2-byte field where 0x0000 is off
/// and anything else is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum DeviceState {
    #[strum(to_string = "on")]
    On,
    #[strum(to_string = "off")]
    Off,
}

impl DeviceState {
    pub fn from_wire(raw: u16) -> Self {
        if raw == 0 { DeviceState::Off } else { DeviceState::On }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, DeviceState::On)
    }
}

/// Live status of a device, decoded from a UDP broadcast or a TCP
/// status reply. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub name: String,
    pub id: DeviceId,
    pub ip: Ipv4Addr,
    pub state: DeviceState,
    pub remaining_seconds: u32,
    pub default_shutdown_seconds: u32,
    pub power_watts: u16,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] at {}: {}, {} W, {}s remaining, default shutdown {}s",
            self.name,
            self.id,
            self.ip,
            self.state,
            self.power_watts,
            self.remaining_seconds,
            self.default_shutdown_seconds
        )
    }
}
