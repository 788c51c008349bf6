//! CRC16-CCITT and the two-stage frame signature.
//!
//! The device drops any frame whose 4-byte trailer does not verify; there is
//! no NACK, so getting this bit-exact is the difference between a working
//! client and silence.

use crate::constants::REMOTE_KEY;

const POLYNOMIAL: u16 = 0x1021;

/// CRC16-CCITT: polynomial 0x1021, initial value 0, MSB-first,
/// no input or output reflection.
pub fn crc16(data: &[u8]) -> u16 {
    let mut acc: u16 = 0;
    for &byte in data {
        acc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if acc & 0x8000 != 0 {
                acc = (acc << 1) ^ POLYNOMIAL;
            } else {
                acc <<= 1;
            }
        }
    }
    acc
}

/// Appends the signature trailer to an outbound frame:
/// the CRC of the frame so far (byte-swapped), then the CRC of those two
/// bytes followed by the shared remote key (byte-swapped again).
pub fn sign(frame: &mut Vec<u8>) {
    let first = crc16(frame).to_le_bytes();
    frame.extend_from_slice(&first);

    let mut keyed = Vec::with_capacity(first.len() + REMOTE_KEY.len());
    keyed.extend_from_slice(&first);
    keyed.extend_from_slice(REMOTE_KEY);
    frame.extend_from_slice(&crc16(&keyed).to_le_bytes());
}
