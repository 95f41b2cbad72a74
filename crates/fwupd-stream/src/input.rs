//! Helpers available on every seekable input stream.

use std::io::{ErrorKind as IoErrorKind, Read, Seek, SeekFrom};

use fwupd_common::mem::MAX_ALLOC;
use fwupd_errors::{FwupdError, Result};

/// Extension methods for `Read + Seek` streams.
///
/// All offsets are absolute. Methods that move the cursor leave it after the
/// bytes they read; [`InputStream::stream_size`] restores it. The trait is
/// object safe, so parsers can recurse through `&mut dyn InputStream` views.
pub trait InputStream: Read + Seek {
    /// Total size of the stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the stream cannot seek.
    fn stream_size(&mut self) -> Result<u64> {
        let pos = self.stream_position()?;
        let size = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(size)
    }

    /// Fill `buf` from `offset`.
    ///
    /// # Errors
    ///
    /// Returns a read error naming the offset if the stream ends early.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf).map_err(|e| {
            if e.kind() == IoErrorKind::UnexpectedEof {
                FwupdError::read(format!(
                    "failed to read 0x{:x} bytes at 0x{offset:x}: stream too short",
                    buf.len()
                ))
            } else {
                FwupdError::from(e)
            }
        })
    }

    /// Read exactly `count` bytes from `offset` into a new buffer.
    ///
    /// The request is checked against the stream size and [`MAX_ALLOC`]
    /// before anything is allocated.
    ///
    /// # Errors
    ///
    /// Returns a resource-limit error for oversized requests and an
    /// out-of-range error if the region extends past the end of the stream.
    fn read_bytes_at(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        if count > MAX_ALLOC {
            return Err(FwupdError::resource_limit(format!(
                "cannot allocate 0x{count:x} bytes, limit is 0x{MAX_ALLOC:x}"
            )));
        }
        let size = self.stream_size()?;
        let end = offset.checked_add(count as u64);
        if end.is_none_or(|end| end > size) {
            return Err(FwupdError::out_of_range(format!(
                "requested 0x{count:x} bytes at 0x{offset:x} from stream of size 0x{size:x}"
            )));
        }
        let mut buf = vec![0u8; count];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Read from `offset` to the end of the stream.
    ///
    /// # Errors
    ///
    /// See [`InputStream::read_bytes_at`].
    fn read_to_end_at(&mut self, offset: u64) -> Result<Vec<u8>> {
        let size = self.stream_size()?;
        let count = size.checked_sub(offset).ok_or_else(|| {
            FwupdError::out_of_range(format!("offset 0x{offset:x} beyond stream of size 0x{size:x}"))
        })?;
        let count = usize::try_from(count)
            .map_err(|e| FwupdError::resource_limit(format!("stream too large: {e}")))?;
        self.read_bytes_at(offset, count)
    }

    /// Feed the stream from `offset` to the end through `func` in blocks.
    ///
    /// # Errors
    ///
    /// Returns any error from reading or from `func`.
    fn for_each_block(
        &mut self,
        offset: u64,
        block_size: usize,
        func: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        if block_size == 0 {
            return Err(FwupdError::invalid_data("block size must be non-zero"));
        }
        self.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; block_size];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            func(&buf[..n])?;
        }
    }
}

impl<T: Read + Seek> InputStream for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_errors::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn test_size_restores_position() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut s = Cursor::new(vec![0u8; 10]);
        s.seek(SeekFrom::Start(3))?;
        assert_eq!(s.stream_size()?, 10);
        assert_eq!(s.stream_position()?, 3);
        Ok(())
    }

    #[test]
    fn test_read_bytes_at_bounds() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut s = Cursor::new(b"abcdef".to_vec());
        assert_eq!(s.read_bytes_at(2, 3)?, b"cde");
        let err = s.read_bytes_at(4, 3).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        let err = s.read_bytes_at(0, MAX_ALLOC + 1).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::ResourceLimit);
        assert_eq!(s.read_to_end_at(4)?, b"ef");
        Ok(())
    }

    #[test]
    fn test_read_exact_at_short() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut s = Cursor::new(b"abc".to_vec());
        let mut buf = [0u8; 4];
        let err = s.read_exact_at(0, &mut buf).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::Read);
        Ok(())
    }

    #[test]
    fn test_for_each_block() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut s = Cursor::new((0u8..10).collect::<Vec<_>>());
        let mut sizes = Vec::new();
        s.for_each_block(1, 4, &mut |b| {
            sizes.push(b.len());
            Ok(())
        })?;
        assert_eq!(sizes, [4, 4, 1]);
        Ok(())
    }
}
