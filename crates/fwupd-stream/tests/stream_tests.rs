//! Streams and chunk arrays used together through the public API.

use std::io::{Cursor, Read, Seek, SeekFrom};

use fwupd_stream::{
    ChunkArray, CompositeStream, InputStream, PartialStream, SharedStream, StreamChunkArray,
    UNTIL_END,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn test_partial_stream_reads_inside_window() -> TestResult {
    let mut base = Cursor::new(b"12345678".to_vec());
    let mut view = PartialStream::new(&mut base, 2, 4)?;
    view.seek(SeekFrom::Start(2))?;
    let mut buf = [0u8; 2];
    assert_eq!(view.read(&mut buf)?, 2);
    assert_eq!(&buf, b"56");
    assert_eq!(view.read(&mut buf)?, 0);
    Ok(())
}

#[test]
fn test_chunk_shared_composite_image() -> TestResult {
    let composite: CompositeStream<'_> = [b"HEADER".to_vec(), b"payload-bytes".to_vec()]
        .into_iter()
        .collect();
    let shared = SharedStream::new(composite);
    let payload = PartialStream::new(shared.clone(), 6, UNTIL_END)?;
    let mut chunks = StreamChunkArray::from_stream(payload, 0x2000, 0, 4)?;
    assert_eq!(chunks.len(), 4);

    let mut joined = Vec::new();
    for idx in 0..chunks.len() {
        let chk = chunks.index(idx)?;
        assert_eq!(chk.address(), 0x2000 + 4 * idx as u64);
        joined.extend_from_slice(chk.data().unwrap_or_default());
    }
    assert_eq!(joined, b"payload-bytes");

    let mut header = PartialStream::new(shared, 0, 6)?;
    assert_eq!(header.read_bytes_at(0, 6)?, b"HEADER");
    Ok(())
}

#[test]
fn test_virtual_chunks_xml() -> TestResult {
    let chunks = ChunkArray::new_virtual(0x20, 0x100, 0x100, 0x10)?;
    insta::assert_snapshot!(chunks.to_xml()?, @r"
    <chunks>
      <chunk>
        <page>0x1</page>
        <size>0x10</size>
      </chunk>
      <chunk>
        <idx>0x1</idx>
        <page>0x1</page>
        <addr>0x10</addr>
        <size>0x10</size>
      </chunk>
    </chunks>
    ");
    Ok(())
}
