//! Additive checksums used by firmware container headers.

use fwupd_errors::{FwupdError, Result};

use crate::mem::Endian;

/// Sum of all bytes, wrapping at 8 bits.
pub fn sum8(buf: &[u8]) -> u8 {
    buf.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Sum of all bytes, wrapping at 16 bits.
pub fn sum16(buf: &[u8]) -> u16 {
    buf.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// Sum of all bytes, wrapping at 32 bits.
pub fn sum32(buf: &[u8]) -> u32 {
    buf.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

/// Sum of 16-bit words, wrapping at 16 bits.
///
/// # Errors
///
/// Returns an invalid-data error if the buffer length is not a multiple of 2.
pub fn sum16w(buf: &[u8], endian: Endian) -> Result<u16> {
    if buf.len() % 2 != 0 {
        return Err(FwupdError::invalid_data(format!(
            "buffer size 0x{:x} is not a multiple of 2",
            buf.len()
        )));
    }
    Ok(buf.chunks_exact(2).fold(0u16, |acc, w| {
        let word = match endian {
            Endian::Little => u16::from_le_bytes([w[0], w[1]]),
            Endian::Big => u16::from_be_bytes([w[0], w[1]]),
        };
        acc.wrapping_add(word)
    }))
}

/// Sum of 32-bit words, wrapping at 32 bits.
///
/// # Errors
///
/// Returns an invalid-data error if the buffer length is not a multiple of 4.
pub fn sum32w(buf: &[u8], endian: Endian) -> Result<u32> {
    if buf.len() % 4 != 0 {
        return Err(FwupdError::invalid_data(format!(
            "buffer size 0x{:x} is not a multiple of 4",
            buf.len()
        )));
    }
    Ok(buf.chunks_exact(4).fold(0u32, |acc, w| {
        let word = match endian {
            Endian::Little => u32::from_le_bytes([w[0], w[1], w[2], w[3]]),
            Endian::Big => u32::from_be_bytes([w[0], w[1], w[2], w[3]]),
        };
        acc.wrapping_add(word)
    }))
}

/// Two's complement of an 8-bit sum, so that `sum + finish8(sum) == 0`.
pub fn finish8(csum: u8) -> u8 {
    (!csum).wrapping_add(1)
}

/// Two's complement of a 16-bit sum.
pub fn finish16(csum: u16) -> u16 {
    (!csum).wrapping_add(1)
}

/// Two's complement of a 32-bit sum.
pub fn finish32(csum: u32) -> u32 {
    (!csum).wrapping_add(1)
}
