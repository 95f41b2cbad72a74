//! Bounds-checked memory helpers.
//!
//! Every helper validates offsets and lengths before touching a buffer, so a
//! failed call never partially writes its destination.

use fwupd_errors::{FwupdError, Result};

/// Largest single allocation the helpers will attempt.
pub const MAX_ALLOC: usize = 0x4000_0000;

/// Byte order of a multi-byte integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

fn check_range(what: &str, offset: usize, n: usize, len: usize) -> Result<()> {
    match offset.checked_add(n) {
        Some(end) if end <= len => Ok(()),
        _ => Err(FwupdError::out_of_range(format!(
            "attempted to access 0x{n:x} bytes at offset 0x{offset:x} of {what} of size 0x{len:x}"
        ))),
    }
}

/// Copy `n` bytes from `src[src_offset..]` to `dst[dst_offset..]`.
///
/// # Errors
///
/// Returns an out-of-range error if either region does not fit.
pub fn memcpy_safe(
    dst: &mut [u8],
    dst_offset: usize,
    src: &[u8],
    src_offset: usize,
    n: usize,
) -> Result<()> {
    if n == 0 {
        return Ok(());
    }
    check_range("source buffer", src_offset, n, src.len())?;
    check_range("destination buffer", dst_offset, n, dst.len())?;
    dst[dst_offset..dst_offset + n].copy_from_slice(&src[src_offset..src_offset + n]);
    Ok(())
}

/// Compare `n` bytes of two buffers at the given offsets.
///
/// # Errors
///
/// Returns an out-of-range error if either region does not fit, or an
/// invalid-data error naming the first differing offset.
pub fn memcmp_safe(
    buf1: &[u8],
    buf1_offset: usize,
    buf2: &[u8],
    buf2_offset: usize,
    n: usize,
) -> Result<()> {
    check_range("first buffer", buf1_offset, n, buf1.len())?;
    check_range("second buffer", buf2_offset, n, buf2.len())?;
    bytes_compare(
        &buf1[buf1_offset..buf1_offset + n],
        &buf2[buf2_offset..buf2_offset + n],
    )
}

/// Find the first occurrence of `needle` in `haystack`.
///
/// # Errors
///
/// Returns a not-found error if the needle does not occur, including when
/// the needle is longer than the haystack.
pub fn memmem_safe(haystack: &[u8], needle: &[u8]) -> Result<usize> {
    if needle.is_empty() {
        return Ok(0);
    }
    if needle.len() > haystack.len() {
        return Err(FwupdError::not_found(format!(
            "needle of size 0x{:x} is larger than haystack of size 0x{:x}",
            needle.len(),
            haystack.len()
        )));
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .ok_or_else(|| FwupdError::not_found("needle not found in haystack"))
}

/// Duplicate the first `n` bytes of `src`.
///
/// The size limit is checked before anything is allocated.
///
/// # Errors
///
/// Returns a resource-limit error if `n` exceeds [`MAX_ALLOC`], or an
/// out-of-range error if `src` is shorter than `n`.
pub fn memdup_safe(src: &[u8], n: usize) -> Result<Vec<u8>> {
    if n > MAX_ALLOC {
        return Err(FwupdError::resource_limit(format!(
            "cannot allocate 0x{n:x} bytes, limit is 0x{MAX_ALLOC:x}"
        )));
    }
    check_range("source buffer", 0, n, src.len())?;
    Ok(src[..n].to_vec())
}

/// Read one byte at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if `offset` is past the end of `buf`.
pub fn read_u8_safe(buf: &[u8], offset: usize) -> Result<u8> {
    check_range("buffer", offset, 1, buf.len())?;
    Ok(buf[offset])
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    check_range("buffer", offset, N, buf.len())?;
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    Ok(out)
}

/// Read a 16-bit integer at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn read_u16_safe(buf: &[u8], offset: usize, endian: Endian) -> Result<u16> {
    let b = read_array::<2>(buf, offset)?;
    Ok(match endian {
        Endian::Little => u16::from_le_bytes(b),
        Endian::Big => u16::from_be_bytes(b),
    })
}

/// Read a 24-bit integer at `offset` into the low bits of a `u32`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn read_u24_safe(buf: &[u8], offset: usize, endian: Endian) -> Result<u32> {
    let b = read_array::<3>(buf, offset)?;
    Ok(match endian {
        Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], 0]),
        Endian::Big => u32::from_be_bytes([0, b[0], b[1], b[2]]),
    })
}

/// Read a 32-bit integer at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn read_u32_safe(buf: &[u8], offset: usize, endian: Endian) -> Result<u32> {
    let b = read_array::<4>(buf, offset)?;
    Ok(match endian {
        Endian::Little => u32::from_le_bytes(b),
        Endian::Big => u32::from_be_bytes(b),
    })
}

/// Read a 64-bit integer at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn read_u64_safe(buf: &[u8], offset: usize, endian: Endian) -> Result<u64> {
    let b = read_array::<8>(buf, offset)?;
    Ok(match endian {
        Endian::Little => u64::from_le_bytes(b),
        Endian::Big => u64::from_be_bytes(b),
    })
}

/// Write one byte at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if `offset` is past the end of `buf`.
pub fn write_u8_safe(buf: &mut [u8], offset: usize, value: u8) -> Result<()> {
    memcpy_safe(buf, offset, &[value], 0, 1)
}

/// Write a 16-bit integer at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn write_u16_safe(buf: &mut [u8], offset: usize, value: u16, endian: Endian) -> Result<()> {
    let b = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    memcpy_safe(buf, offset, &b, 0, b.len())
}

/// Write the low 24 bits of `value` at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn write_u24_safe(buf: &mut [u8], offset: usize, value: u32, endian: Endian) -> Result<()> {
    let b = match endian {
        Endian::Little => {
            let le = value.to_le_bytes();
            [le[0], le[1], le[2]]
        }
        Endian::Big => {
            let be = value.to_be_bytes();
            [be[1], be[2], be[3]]
        }
    };
    memcpy_safe(buf, offset, &b, 0, b.len())
}

/// Write a 32-bit integer at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn write_u32_safe(buf: &mut [u8], offset: usize, value: u32, endian: Endian) -> Result<()> {
    let b = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    memcpy_safe(buf, offset, &b, 0, b.len())
}

/// Write a 64-bit integer at `offset`.
///
/// # Errors
///
/// Returns an out-of-range error if the value does not fit in `buf`.
pub fn write_u64_safe(buf: &mut [u8], offset: usize, value: u64, endian: Endian) -> Result<()> {
    let b = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    memcpy_safe(buf, offset, &b, 0, b.len())
}

/// Round `value` up to a multiple of `1 << alignment`.
///
/// # Errors
///
/// Returns an out-of-range error if the alignment is 64 or more bits, or if
/// the result does not fit in `usize`.
pub fn align_up(value: usize, alignment: u8) -> Result<usize> {
    if u32::from(alignment) >= usize::BITS {
        return Err(FwupdError::out_of_range(format!(
            "alignment 2^{alignment} is too large"
        )));
    }
    let mask = (1usize << alignment) - 1;
    value
        .checked_add(mask)
        .map(|v| v & !mask)
        .ok_or_else(|| FwupdError::out_of_range(format!("0x{value:x} cannot be aligned to 2^{alignment}")))
}

/// Convert raw bytes to a printable string.
///
/// Stops at the first NUL; non-printable bytes become `.`.
pub fn strsafe(buf: &[u8]) -> String {
    buf.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '.'
            }
        })
        .collect()
}

/// Compare two byte slices.
///
/// # Errors
///
/// Returns an invalid-data error describing the length mismatch or the first
/// differing byte.
pub fn bytes_compare(buf1: &[u8], buf2: &[u8]) -> Result<()> {
    if buf1.len() != buf2.len() {
        return Err(FwupdError::invalid_data(format!(
            "got 0x{:x} bytes, expected 0x{:x}",
            buf1.len(),
            buf2.len()
        )));
    }
    match buf1.iter().zip(buf2).position(|(a, b)| a != b) {
        None => Ok(()),
        Some(i) => Err(FwupdError::invalid_data(format!(
            "got 0x{:02x}, expected 0x{:02x} @0x{i:04x}",
            buf1[i], buf2[i]
        ))),
    }
}

/// Append helpers for building wire images.
pub trait ByteVecExt {
    /// Append one byte.
    fn append_u8(&mut self, value: u8);
    /// Append a 16-bit integer.
    fn append_u16(&mut self, value: u16, endian: Endian);
    /// Append the low 24 bits of `value`.
    fn append_u24(&mut self, value: u32, endian: Endian);
    /// Append a 32-bit integer.
    fn append_u32(&mut self, value: u32, endian: Endian);
    /// Append a 64-bit integer.
    fn append_u64(&mut self, value: u64, endian: Endian);
    /// Pad with `fill` until the length is a multiple of `1 << alignment`.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error for an impossible alignment.
    fn align_with(&mut self, alignment: u8, fill: u8) -> Result<()>;
    /// Pad with `fill` until the length is at least `size`.
    fn pad_to(&mut self, size: usize, fill: u8);
}

impl ByteVecExt for Vec<u8> {
    fn append_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn append_u16(&mut self, value: u16, endian: Endian) {
        match endian {
            Endian::Little => self.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn append_u24(&mut self, value: u32, endian: Endian) {
        match endian {
            Endian::Little => self.extend_from_slice(&value.to_le_bytes()[..3]),
            Endian::Big => self.extend_from_slice(&value.to_be_bytes()[1..]),
        }
    }

    fn append_u32(&mut self, value: u32, endian: Endian) {
        match endian {
            Endian::Little => self.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn append_u64(&mut self, value: u64, endian: Endian) {
        match endian {
            Endian::Little => self.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn align_with(&mut self, alignment: u8, fill: u8) -> Result<()> {
        let size = align_up(self.len(), alignment)?;
        self.resize(size, fill);
        Ok(())
    }

    fn pad_to(&mut self, size: usize, fill: u8) {
        if self.len() < size {
            self.resize(size, fill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_errors::ErrorKind;

    #[test]
    fn test_memcpy_safe_bounds() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let src = *b"abcdef";
        let mut dst = [0u8; 4];
        memcpy_safe(&mut dst, 1, &src, 2, 3)?;
        assert_eq!(&dst, b"\0cde");

        // nothing written on failure
        let mut dst = [0xAAu8; 4];
        assert!(memcpy_safe(&mut dst, 2, &src, 0, 3).is_err());
        assert!(memcpy_safe(&mut dst, 0, &src, 4, 3).is_err());
        assert!(memcpy_safe(&mut dst, usize::MAX, &src, 0, 1).is_err());
        assert_eq!(dst, [0xAA; 4]);
        Ok(())
    }

    #[test]
    fn test_memmem_narrowed_haystack() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let buf = b"abcdef";
        assert_eq!(memmem_safe(buf, b"cd")?, 2);
        let err = memmem_safe(&buf[..3], b"cd").err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(memmem_safe(&buf[1..], b"ef")?, 3);
        Ok(())
    }

    #[test]
    fn test_memcmp_safe_reports_offset() -> std::result::Result<(), Box<dyn std::error::Error>> {
        memcmp_safe(b"xxabc", 2, b"abc", 0, 3)?;
        let err = memcmp_safe(b"abd", 0, b"abc", 0, 3).err().ok_or("expected error")?;
        assert_eq!(err.to_string(), "got 0x64, expected 0x63 @0x0002");
        Ok(())
    }

    #[test]
    fn test_memdup_limit_checked_first() {
        let err = memdup_safe(b"abc", MAX_ALLOC + 1).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::ResourceLimit));
        let err = memdup_safe(b"abc", 4).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::OutOfRange));
    }

    #[test]
    fn test_endian_read_write() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut buf = [0u8; 8];
        write_u24_safe(&mut buf, 1, 0x123456, Endian::Little)?;
        assert_eq!(&buf[..4], &[0x00, 0x56, 0x34, 0x12]);
        assert_eq!(read_u24_safe(&buf, 1, Endian::Little)?, 0x123456);
        write_u24_safe(&mut buf, 0, 0x123456, Endian::Big)?;
        assert_eq!(&buf[..3], &[0x12, 0x34, 0x56]);
        write_u32_safe(&mut buf, 4, 0xDEADBEEF, Endian::Big)?;
        assert_eq!(read_u32_safe(&buf, 4, Endian::Little)?, 0xEFBEADDE);
        assert!(read_u64_safe(&buf, 1, Endian::Little).is_err());
        assert!(write_u16_safe(&mut buf, 7, 0, Endian::Little).is_err());
        Ok(())
    }

    #[test]
    fn test_align_up() -> std::result::Result<(), Box<dyn std::error::Error>> {
        assert_eq!(align_up(0, 3)?, 0);
        assert_eq!(align_up(1, 3)?, 8);
        assert_eq!(align_up(8, 3)?, 8);
        assert_eq!(align_up(9, 2)?, 12);
        assert!(align_up(usize::MAX, 4).is_err());
        assert!(align_up(1, 64).is_err());
        Ok(())
    }

    #[test]
    fn test_strsafe() {
        assert_eq!(strsafe(b"DSDT"), "DSDT");
        assert_eq!(strsafe(b"AB\x01C\0junk"), "AB.C");
        assert_eq!(strsafe(b"\0"), "");
    }

    #[test]
    fn test_byte_vec_ext() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut buf = Vec::new();
        buf.append_u8(0x01);
        buf.append_u24(0x0A0B0C, Endian::Little);
        buf.append_u16(0x1234, Endian::Big);
        buf.align_with(3, 0xFF)?;
        assert_eq!(buf, [0x01, 0x0C, 0x0B, 0x0A, 0x12, 0x34, 0xFF, 0xFF]);
        buf.pad_to(10, 0x00);
        assert_eq!(buf.len(), 10);
        buf.pad_to(4, 0x00);
        assert_eq!(buf.len(), 10);
        Ok(())
    }
}
