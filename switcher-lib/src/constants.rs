// Protocol constants for Switcher smart switches

/// UDP port devices send unsolicited status broadcasts on
pub const DISCOVERY_PORT: u16 = 20002;

/// TCP port devices accept signed command frames on
pub const COMMAND_PORT: u16 = 9957;

/// First two bytes of every frame
pub const FRAME_MAGIC: [u8; 2] = [0xFE, 0xF0];

/// Inner magic separating the header block from the command body
pub const INNER_MAGIC: [u8; 2] = [0xF0, 0xFE];

/// Protocol version block following the declared length
pub const VERSION_BLOCK: [u8; 2] = [0x02, 0x32];

/// Wire length of a status broadcast datagram
pub const BROADCAST_LEN: usize = 165;

/// Length of the NUL-padded device name field
pub const DEVICE_NAME_LEN: usize = 32;

/// Length of the device identifier
pub const DEVICE_ID_LEN: usize = 3;

/// Total length of a signed login frame
pub const LOGIN_FRAME_LEN: usize = 82;

/// Total length of a signed status query frame
pub const QUERY_FRAME_LEN: usize = 48;

/// Total length of a signed power on/off frame
pub const CONTROL_FRAME_LEN: usize = 93;

/// Total length of a signed set-default-shutdown frame
pub const SET_SHUTDOWN_FRAME_LEN: usize = 91;

/// Length of the two-stage CRC trailer appended to every outbound frame
pub const SIGNATURE_LEN: usize = 4;

/// Shared signing key: 32 ASCII '0' bytes, identical on all known devices
pub const REMOTE_KEY: &[u8; 32] = b"00000000000000000000000000000000";

/// Lower bound for the default shutdown timer (1 hour)
pub const MIN_SHUTDOWN_SECONDS: u32 = 3_600;

/// Upper bound for the default shutdown timer (23h59m)
pub const MAX_SHUTDOWN_SECONDS: u32 = 86_340;

// Field offsets into a 165-byte status broadcast.
// The device id overlaps the first name byte on the wire; both tables
// were recovered from traffic captures, not documentation.

/// Device id, 3 raw bytes
pub const BCAST_ID_OFFSET: usize = 18;

/// Device name, 32 bytes ASCII, NUL-trimmed
pub const BCAST_NAME_OFFSET: usize = 20;

/// Device IPv4 address, big-endian dotted quad
pub const BCAST_IP_OFFSET: usize = 76;

/// Switch state, 2 bytes, 0x0000 means off
pub const BCAST_STATE_OFFSET: usize = 133;

/// Momentary power draw, little-endian u16 watts
pub const BCAST_POWER_OFFSET: usize = 135;

/// Seconds until the running shutdown timer fires, little-endian u32
pub const BCAST_REMAINING_OFFSET: usize = 147;

/// Configured default shutdown timer, little-endian u32 seconds
pub const BCAST_DEFAULT_SHUTDOWN_OFFSET: usize = 155;

// Field offsets into a TCP status reply (variable length, different
// layout from the broadcast).

/// Device name, 32 bytes ASCII, NUL-trimmed
pub const REPLY_NAME_OFFSET: usize = 20;

/// Switch state, 2 bytes, 0x0000 means off
pub const REPLY_STATE_OFFSET: usize = 75;

/// Momentary power draw, little-endian u16 watts
pub const REPLY_POWER_OFFSET: usize = 77;

/// Seconds until the running shutdown timer fires, little-endian u32
pub const REPLY_REMAINING_OFFSET: usize = 89;

/// Configured default shutdown timer, little-endian u32 seconds
pub const REPLY_DEFAULT_SHUTDOWN_OFFSET: usize = 97;

/// Minimum status reply length covering every decoded field
pub const STATUS_REPLY_MIN_LEN: usize = REPLY_DEFAULT_SHUTDOWN_OFFSET + 4;

/// Session token position in both outbound frames and the login reply
pub const TOKEN_OFFSET: usize = 8;

/// Minimum login reply length covering the session token
pub const LOGIN_REPLY_MIN_LEN: usize = TOKEN_OFFSET + 4;
