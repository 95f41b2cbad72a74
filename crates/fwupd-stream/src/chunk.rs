//! Splitting images into addressed, optionally paged transfer units.

use std::borrow::Cow;
use std::io::{Read, Seek};

use fwupd_common::XmlBuilder;
use fwupd_errors::{FwupdError, Result};
use tracing::debug;

use crate::input::InputStream;

/// Geometry shared by every chunk of an array.
///
/// Chunk `i` covers data offset `i * packet_size`. Its linear address is
/// `base_address + offset`; with a non-zero page size that address is split
/// into a page number and an address inside the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    base_address: u64,
    page_size: u64,
    packet_size: usize,
    total_size: usize,
}

impl ChunkLayout {
    /// Describe `total_size` bytes split into `packet_size` pieces.
    ///
    /// A `page_size` of zero leaves addresses unpaged.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `packet_size` is zero.
    pub fn new(base_address: u64, page_size: u64, packet_size: usize, total_size: usize) -> Result<Self> {
        if packet_size == 0 {
            return Err(FwupdError::invalid_data("packet size must be non-zero"));
        }
        Ok(Self {
            base_address,
            page_size,
            packet_size,
            total_size,
        })
    }

    /// Number of chunks, zero for empty input.
    pub fn len(&self) -> usize {
        self.total_size.div_ceil(self.packet_size)
    }

    /// Check if there are no chunks.
    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// Total number of bytes covered.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Maximum size of one chunk.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn chunk_at<'a>(&self, idx: usize, data: Option<Cow<'a, [u8]>>) -> Chunk<'a> {
        let data_offset = idx * self.packet_size;
        let data_size = self.packet_size.min(self.total_size - data_offset);
        let linear = self.base_address.wrapping_add(data_offset as u64);
        let (page, address) = match self.page_size {
            0 => (0, linear),
            page_size => (linear / page_size, linear % page_size),
        };
        Chunk {
            idx,
            page,
            address,
            linear_address: linear,
            data_offset,
            data_size,
            data,
        }
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx >= self.len() {
            return Err(FwupdError::out_of_range(format!(
                "chunk index 0x{idx:x} invalid, only 0x{:x} chunks",
                self.len()
            )));
        }
        Ok(())
    }

    fn range(&self, idx: usize) -> (usize, usize) {
        let offset = idx * self.packet_size;
        (offset, offset + self.packet_size.min(self.total_size - offset))
    }
}

/// One addressed slice of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    idx: usize,
    page: u64,
    address: u64,
    linear_address: u64,
    data_offset: usize,
    data_size: usize,
    data: Option<Cow<'a, [u8]>>,
}

impl<'a> Chunk<'a> {
    /// Position in the array.
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Page number, zero when unpaged.
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Address inside the page, or the linear address when unpaged.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Base address plus data offset, ignoring paging.
    pub fn linear_address(&self) -> u64 {
        self.linear_address
    }

    /// Offset of the data in the source image.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Number of data bytes.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Data bytes, `None` for address-only chunks.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Take the data bytes.
    pub fn into_data(self) -> Option<Cow<'a, [u8]>> {
        self.data
    }

    /// Append a `<chunk>` node, omitting zero fields.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the XML writer fails.
    pub fn export(&self, bld: &mut XmlBuilder) -> Result<()> {
        bld.open("chunk")?;
        bld.insert_kx("idx", self.idx as u64)?;
        bld.insert_kx("page", self.page)?;
        bld.insert_kx("addr", self.address)?;
        match self.data() {
            Some(data) => {
                let size = format!("0x{:x}", data.len());
                let text = if data.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                    String::from_utf8_lossy(data).into_owned()
                } else {
                    data.iter().map(|b| format!("{b:02x}")).collect()
                };
                bld.text_with_attrs("data", &text, &[("size", &size)])?;
            }
            None => bld.insert_kx("size", self.data_size as u64)?,
        }
        bld.close("chunk")
    }
}

/// Chunks over an in-memory image, or addresses only.
#[derive(Debug, Clone)]
pub struct ChunkArray<'a> {
    data: Option<&'a [u8]>,
    layout: ChunkLayout,
}

impl<'a> ChunkArray<'a> {
    /// Split `data` into chunks of at most `packet_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `packet_size` is zero.
    pub fn from_bytes(data: &'a [u8], base_address: u64, page_size: u64, packet_size: usize) -> Result<Self> {
        Ok(Self {
            data: Some(data),
            layout: ChunkLayout::new(base_address, page_size, packet_size, data.len())?,
        })
    }

    /// Compute addresses for `total_size` bytes without any data.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `packet_size` is zero.
    pub fn new_virtual(total_size: usize, base_address: u64, page_size: u64, packet_size: usize) -> Result<Self> {
        Ok(Self {
            data: None,
            layout: ChunkLayout::new(base_address, page_size, packet_size, total_size)?,
        })
    }

    /// Geometry of the array.
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Check if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    fn build(&self, idx: usize) -> Chunk<'a> {
        let data = self.data.map(|d| {
            let (start, end) = self.layout.range(idx);
            Cow::Borrowed(&d[start..end])
        });
        self.layout.chunk_at(idx, data)
    }

    /// Chunk `idx`, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error reporting the chunk count.
    pub fn index(&self, idx: usize) -> Result<Chunk<'a>> {
        self.layout.check_index(idx)?;
        Ok(self.build(idx))
    }

    /// Chunk `idx`, or `None` when it does not exist.
    pub fn get(&self, idx: usize) -> Option<Chunk<'a>> {
        (idx < self.len()).then(|| self.build(idx))
    }

    /// All chunks in order.
    pub fn iter(&self) -> impl Iterator<Item = Chunk<'a>> + '_ {
        (0..self.len()).map(|idx| self.build(idx))
    }

    /// Render the array as a `<chunks>` XML tree.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the XML writer fails.
    pub fn to_xml(&self) -> Result<String> {
        let mut bld = XmlBuilder::new();
        bld.open("chunks")?;
        for chk in self.iter() {
            chk.export(&mut bld)?;
        }
        bld.close("chunks")?;
        bld.finish()
    }
}

/// Chunks read on demand from a seekable stream.
#[derive(Debug)]
pub struct StreamChunkArray<S> {
    stream: S,
    layout: ChunkLayout,
}

impl<S: Read + Seek> StreamChunkArray<S> {
    /// Split the whole of `stream` into chunks.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `packet_size` is zero, or a resource
    /// error if the stream is larger than the address space.
    pub fn from_stream(mut stream: S, base_address: u64, page_size: u64, packet_size: usize) -> Result<Self> {
        let size = stream.stream_size()?;
        let total_size = usize::try_from(size)
            .map_err(|e| FwupdError::resource_limit(format!("stream of 0x{size:x} bytes too large: {e}")))?;
        let layout = ChunkLayout::new(base_address, page_size, packet_size, total_size)?;
        debug!(total_size, packet_size, chunks = layout.len(), "chunking stream");
        Ok(Self { stream, layout })
    }

    /// Geometry of the array.
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Check if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Read chunk `idx` from the stream.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error for a missing chunk, or a read error if
    /// the stream is shorter than when the array was created.
    pub fn index(&mut self, idx: usize) -> Result<Chunk<'static>> {
        self.layout.check_index(idx)?;
        let (start, end) = self.layout.range(idx);
        let data = self.stream.read_bytes_at(start as u64, end - start)?;
        Ok(self.layout.chunk_at(idx, Some(Cow::Owned(data))))
    }

    /// Give the stream back.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_errors::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn test_hello_world() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let chunks = ChunkArray::from_bytes(b"hello world", 100, 0, 5)?;
        assert_eq!(chunks.len(), 3);
        let expected: [(&[u8], u64); 3] = [(b"hello", 100), (b" worl", 105), (b"d", 110)];
        for (chk, (data, addr)) in chunks.iter().zip(expected) {
            assert_eq!(chk.data(), Some(data));
            assert_eq!(chk.address(), addr);
            assert_eq!(chk.page(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_index_vs_get() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let chunks = ChunkArray::from_bytes(b"hello world", 100, 0, 5)?;
        assert!(chunks.get(3).is_none());
        let err = chunks.index(3).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(err.to_string(), "chunk index 0x3 invalid, only 0x3 chunks");
        Ok(())
    }

    #[test]
    fn test_paged_addresses() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let chunks = ChunkArray::new_virtual(0x30, 0x8, 0x10, 0x8)?;
        let got: Vec<(u64, u64, u64)> = chunks
            .iter()
            .map(|c| (c.page(), c.address(), c.linear_address()))
            .collect();
        assert_eq!(
            got,
            vec![
                (0, 0x8, 0x08),
                (1, 0x0, 0x10),
                (1, 0x8, 0x18),
                (2, 0x0, 0x20),
                (2, 0x8, 0x28),
                (3, 0x0, 0x30),
            ]
        );
        assert!(chunks.iter().all(|c| c.data().is_none()));
        Ok(())
    }

    #[test]
    fn test_empty_input() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let chunks = ChunkArray::from_bytes(&[], 0, 0, 64)?;
        assert!(chunks.is_empty());
        assert_eq!(chunks.iter().count(), 0);
        assert!(ChunkArray::from_bytes(b"x", 0, 0, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_stream_chunks_match_bytes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let data: Vec<u8> = (0u8..=200).collect();
        let bytes = ChunkArray::from_bytes(&data, 0x1000, 0x40, 0x18)?;
        let mut stream = StreamChunkArray::from_stream(Cursor::new(data.clone()), 0x1000, 0x40, 0x18)?;
        assert_eq!(stream.len(), bytes.len());
        for idx in 0..bytes.len() {
            assert_eq!(stream.index(idx)?, bytes.index(idx)?);
        }
        assert!(stream.index(bytes.len()).is_err());
        Ok(())
    }

    #[test]
    fn test_to_xml() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let chunks = ChunkArray::from_bytes(b"hello world", 100, 0, 5)?;
        insta::assert_snapshot!(chunks.to_xml()?, @r#"
        <chunks>
          <chunk>
            <addr>0x64</addr>
            <data size="0x5">hello</data>
          </chunk>
          <chunk>
            <idx>0x1</idx>
            <addr>0x69</addr>
            <data size="0x5"> worl</data>
          </chunk>
          <chunk>
            <idx>0x2</idx>
            <addr>0x6e</addr>
            <data size="0x1">d</data>
          </chunk>
        </chunks>
        "#);
        Ok(())
    }
}
