//! Bounded views over a larger seekable stream.

use std::io::{self, Read, Seek, SeekFrom};

use fwupd_errors::{FwupdError, Result};

use crate::input::InputStream;

/// Size value requesting a view that runs to the end of the base.
pub const UNTIL_END: u64 = u64::MAX;

/// A window `[start, start + size)` of a base stream.
///
/// The view keeps its own cursor and re-seeks the base before every read, so
/// several views may alias the same base as long as they are used one at a
/// time. Views stack: the base may itself be a `PartialStream`.
#[derive(Debug)]
pub struct PartialStream<S> {
    base: S,
    start: u64,
    size: u64,
    pos: u64,
}

impl<S: Read + Seek> PartialStream<S> {
    /// Create a view of `size` bytes starting at `start` of `base`.
    ///
    /// Pass [`UNTIL_END`] as `size` to cover everything from
    /// `start` to the end of the base.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `start + size` overflows or exceeds
    /// the size of the base stream.
    pub fn new(mut base: S, start: u64, size: u64) -> Result<Self> {
        let base_size = base.stream_size()?;
        let size = if size == UNTIL_END {
            base_size.checked_sub(start).ok_or_else(|| {
                FwupdError::out_of_range(format!(
                    "offset 0x{start:x} beyond base stream of size 0x{base_size:x}"
                ))
            })?
        } else {
            let end = start.checked_add(size).ok_or_else(|| {
                FwupdError::out_of_range(format!("offset 0x{start:x} + size 0x{size:x} overflows"))
            })?;
            if end > base_size {
                return Err(FwupdError::out_of_range(format!(
                    "offset 0x{start:x} + size 0x{size:x} exceeds base stream of size 0x{base_size:x}"
                )));
            }
            size
        };
        Ok(Self {
            base,
            start,
            size,
            pos: 0,
        })
    }

    /// Offset of the view inside its base.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Size of the view.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Borrow the base stream.
    pub fn base(&self) -> &S {
        &self.base
    }

    /// Give the base stream back.
    pub fn into_inner(self) -> S {
        self.base
    }
}

impl<S: Read + Seek> Read for PartialStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        self.base.seek(SeekFrom::Start(self.start + self.pos))?;
        let n = self.base.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: Read + Seek> Seek for PartialStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => self.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(target) if target <= self.size => {
                self.pos = target;
                Ok(target)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek {pos:?} outside partial stream of size 0x{:x}", self.size),
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
