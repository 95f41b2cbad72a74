//! Several blobs read as one seekable stream.

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};

/// A concatenation of byte blobs with one address space.
///
/// Blobs are borrowed where possible, so building a composite does not
/// copy the parts into one combined buffer.
#[derive(Debug, Clone, Default)]
pub struct CompositeStream<'a> {
    parts: Vec<Cow<'a, [u8]>>,
    // start offset of each part
    starts: Vec<u64>,
    size: u64,
    pos: u64,
}

impl<'a> CompositeStream<'a> {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a blob at the current end.
    pub fn add_bytes(&mut self, part: impl Into<Cow<'a, [u8]>>) {
        let part = part.into();
        if part.is_empty() {
            return;
        }
        self.starts.push(self.size);
        self.size += part.len() as u64;
        self.parts.push(part);
    }

    /// Number of non-empty parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Total size of all parts.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn part_at(&self, pos: u64) -> Option<(usize, usize)> {
        let idx = self.starts.partition_point(|&start| start <= pos).checked_sub(1)?;
        let offset = usize::try_from(pos - self.starts[idx]).ok()?;
        (offset < self.parts[idx].len()).then_some((idx, offset))
    }
}

impl<'a, T: Into<Cow<'a, [u8]>>> FromIterator<T> for CompositeStream<'a> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut stream = Self::new();
        for part in iter {
            stream.add_bytes(part);
        }
        stream
    }
}

impl Read for CompositeStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let Some((idx, offset)) = self.part_at(self.pos) else {
                break;
            };
            let src = &self.parts[idx][offset..];
            let n = src.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&src[..n]);
            written += n;
            self.pos += n as u64;
        }
        Ok(written)
    }
}

impl Seek for CompositeStream<'_> {
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
                format!("seek {pos:?} outside composite stream of size 0x{:x}", self.size),
            )),
        }
    }
}
