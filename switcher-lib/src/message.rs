//! Outbound command frames.
//!
//! Every command is a fixed template of constant bytes interleaved with the
//! send-time unix timestamp, the session token, the device id and the phone
//! credentials, then signed with the two-stage CRC trailer. Templates were
//! recovered from traffic captures; the declared length field counts the
//! trailer.

use crate::constants::*;
use crate::crc;
use crate::error::SwitcherError;
use crate::status::{DeviceId, SessionToken};
use num_enum::{FromPrimitive, IntoPrimitive};

/// Constant block between the session token and the timestamp.
const SESSION_BLOCK: [u8; 12] = [
    0x34, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Login body tag following the inner magic.
const LOGIN_TAG: [u8; 2] = [0x1C, 0x00];

/// Power on/off payload tag.
const CONTROL_TAG: [u8; 3] = [0x01, 0x06, 0x00];

/// Set-default-shutdown payload tag.
const SHUTDOWN_TAG: [u8; 3] = [0x04, 0x04, 0x00];

/// Opcode field at bytes 6..8, written little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Opcode {
    Login = 0x00A1,
    Control = 0x0201,
    Query = 0x0301,

    #[num_enum(catch_all)]
    Unknown(u16),
}

/// High-level command, one variant per opcode/payload rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Login,
    QueryStatus,
    /// Turn on, auto-off after `seconds` (0 means stay on indefinitely).
    PowerOn { seconds: u32 },
    PowerOff,
    /// Configure the default shutdown timer. Clamped on encode.
    SetDefaultShutdown { seconds: u32 },
}

/// Session material a frame embeds besides the command itself.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub device_id: DeviceId,
    pub phone_id: [u8; 2],
    pub password: [u8; 4],
    /// `None` is only valid for [`Command::Login`], which sends a zero
    /// placeholder instead.
    pub token: Option<SessionToken>,
    /// Unix seconds, generated at send time.
    pub timestamp: u32,
}

/// Devices reject shutdown timers outside [1 hour, 23h59m].
pub fn clamp_shutdown(seconds: u32) -> u32 {
    seconds.clamp(MIN_SHUTDOWN_SECONDS, MAX_SHUTDOWN_SECONDS)
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Login => Opcode::Login,
            Command::QueryStatus => Opcode::Query,
            Command::PowerOn { .. } | Command::PowerOff | Command::SetDefaultShutdown { .. } => {
                Opcode::Control
            }
        }
    }

    /// Total signed frame length, trailer included.
    fn frame_len(&self) -> usize {
        match self {
            Command::Login => LOGIN_FRAME_LEN,
            Command::QueryStatus => QUERY_FRAME_LEN,
            Command::PowerOn { .. } | Command::PowerOff => CONTROL_FRAME_LEN,
            Command::SetDefaultShutdown { .. } => SET_SHUTDOWN_FRAME_LEN,
        }
    }

    /// Builds and signs the wire frame for this command.
    ///
    /// Fails with [`SwitcherError::NotLoggedIn`] if a non-login command is
    /// encoded without a session token.
    pub fn to_frame(&self, ctx: &FrameContext) -> Result<Vec<u8>, SwitcherError> {
        let token = match (self, ctx.token) {
            (Command::Login, _) => SessionToken::default(),
            (_, Some(token)) => token,
            (_, None) => return Err(SwitcherError::NotLoggedIn),
        };

        let len = self.frame_len();
        let mut frame = Vec::with_capacity(len);
        frame.extend_from_slice(&FRAME_MAGIC);
        frame.extend_from_slice(&(len as u16).to_le_bytes());
        frame.extend_from_slice(&VERSION_BLOCK);
        frame.extend_from_slice(&u16::from(self.opcode()).to_le_bytes());
        frame.extend_from_slice(token.as_bytes());
        frame.extend_from_slice(&SESSION_BLOCK);
        frame.extend_from_slice(&ctx.timestamp.to_le_bytes());
        frame.extend_from_slice(&[0u8; 10]);
        frame.extend_from_slice(&INNER_MAGIC);

        match *self {
            Command::Login => {
                frame.extend_from_slice(&LOGIN_TAG);
                push_credentials(&mut frame, ctx);
            }
            Command::QueryStatus => {
                push_target(&mut frame, ctx);
            }
            Command::PowerOn { seconds } => {
                push_target(&mut frame, ctx);
                push_credentials(&mut frame, ctx);
                frame.extend_from_slice(&CONTROL_TAG);
                frame.push(0x01);
                frame.push(0x00);
                frame.extend_from_slice(&seconds.to_le_bytes());
            }
            Command::PowerOff => {
                push_target(&mut frame, ctx);
                push_credentials(&mut frame, ctx);
                frame.extend_from_slice(&CONTROL_TAG);
                frame.push(0x00);
                frame.push(0x00);
                frame.extend_from_slice(&0u32.to_le_bytes());
            }
            Command::SetDefaultShutdown { seconds } => {
                push_target(&mut frame, ctx);
                push_credentials(&mut frame, ctx);
                frame.extend_from_slice(&SHUTDOWN_TAG);
                frame.extend_from_slice(&clamp_shutdown(seconds).to_le_bytes());
            }
        }

        debug_assert_eq!(frame.len(), len - SIGNATURE_LEN);
        crc::sign(&mut frame);
        Ok(frame)
    }
}

/// Device id block: 3 id bytes plus a zero separator.
fn push_target(frame: &mut Vec<u8>, ctx: &FrameContext) {
    frame.extend_from_slice(ctx.device_id.as_bytes());
    frame.push(0x00);
}

/// Credential block: phone id, separator, device password, padding.
fn push_credentials(frame: &mut Vec<u8>, ctx: &FrameContext) {
    frame.extend_from_slice(&ctx.phone_id);
    frame.extend_from_slice(&[0u8; 2]);
    frame.extend_from_slice(&ctx.password);
    frame.extend_from_slice(&[0u8; 28]);
}
