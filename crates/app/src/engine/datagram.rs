//! Ball firmware datagram encoding.
//!
//! Every packet starts with an 8-byte header: tag `66`, a big-endian u32 and
//! u8 and u16 that the firmware expects to be zero. The opcode and its
//! arguments follow.

use crate::engine::protocol::Rgb;

pub(crate) const HEADER_TAG: u8 = 66;
pub(crate) const OPCODE_COLOR: u8 = 0x0A;
pub(crate) const OPCODE_BRIGHTNESS: u8 = 0x10;
const HEADER_LEN: usize = 8;

fn header() -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0] = HEADER_TAG;
    out[1..5].copy_from_slice(&0u32.to_be_bytes());
    out[5] = 0;
    out[6..8].copy_from_slice(&0u16.to_be_bytes());
    out
}

pub(crate) fn encode_color(color: Rgb) -> [u8; HEADER_LEN + 4] {
    let mut out = [0u8; HEADER_LEN + 4];
    out[..HEADER_LEN].copy_from_slice(&header());
    out[HEADER_LEN..].copy_from_slice(&[OPCODE_COLOR, color.r, color.g, color.b]);
    out
}

pub(crate) fn encode_brightness(level: u8) -> [u8; HEADER_LEN + 2] {
    let mut out = [0u8; HEADER_LEN + 2];
    out[..HEADER_LEN].copy_from_slice(&header());
    out[HEADER_LEN..].copy_from_slice(&[OPCODE_BRIGHTNESS, level]);
    out
}
