//! Minimal protobuf wire codec.
//!
//! Only the VARINT, INT64, LEN and INT32 wire types are supported, and the
//! tag is a single byte `(field_number << 3) | wire_type`, which limits field
//! numbers to 0..=31.

use core::fmt;

use fwupd_errors::{FwupdError, Result};

/// Highest field number that fits in the single tag byte.
pub const FIELD_NUMBER_MAX: u8 = 31;

const VARINT_MAX_GROUPS: usize = 10;

/// Wire type of a protobuf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtobufWireType {
    /// Variable-length integer
    Varint = 0,
    /// Fixed 64-bit little-endian integer
    Int64 = 1,
    /// Length-delimited bytes
    Len = 2,
    /// Deprecated group start, never accepted
    StartGroup = 3,
    /// Deprecated group end, never accepted
    EndGroup = 4,
    /// Fixed 32-bit little-endian integer
    Int32 = 5,
}

impl ProtobufWireType {
    /// Convert from the low three bits of a tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Varint),
            1 => Some(Self::Int64),
            2 => Some(Self::Len),
            3 => Some(Self::StartGroup),
            4 => Some(Self::EndGroup),
            5 => Some(Self::Int32),
            _ => None,
        }
    }
}

impl fmt::Display for ProtobufWireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Varint => "varint",
            Self::Int64 => "int64",
            Self::Len => "len",
            Self::StartGroup => "start-group",
            Self::EndGroup => "end-group",
            Self::Int32 => "int32",
        };
        f.write_str(s)
    }
}

/// Append `value` as a varint: 7-bit groups, least significant first.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let group = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(group);
            return;
        }
        buf.push(group | 0x80);
    }
}

/// Decode a varint at `*offset`, advancing the offset past it.
///
/// # Errors
///
/// Returns an invalid-data error if the varint is truncated or longer than
/// ten groups.
pub fn read_varint(buf: &[u8], offset: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..VARINT_MAX_GROUPS {
        let byte = *buf.get(*offset).ok_or_else(|| {
            FwupdError::invalid_data(format!("truncated varint at offset 0x{:x}", *offset))
        })?;
        *offset += 1;
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(FwupdError::invalid_data(format!(
        "varint longer than {VARINT_MAX_GROUPS} groups"
    )))
}

fn tag(field_number: u8, wire_type: ProtobufWireType) -> Result<u8> {
    if field_number > FIELD_NUMBER_MAX {
        return Err(FwupdError::out_of_range(format!(
            "field number {field_number} exceeds {FIELD_NUMBER_MAX}"
        )));
    }
    Ok((field_number << 3) | wire_type as u8)
}

/// Builder for a protobuf message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtobufWriter {
    buf: Vec<u8>,
}

impl ProtobufWriter {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a VARINT field.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `field_number` exceeds 31.
    pub fn add_varint(&mut self, field_number: u8, value: u64) -> Result<&mut Self> {
        self.buf.push(tag(field_number, ProtobufWireType::Varint)?);
        write_varint(&mut self.buf, value);
        Ok(self)
    }

    /// Append a fixed 32-bit field.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `field_number` exceeds 31.
    pub fn add_int32(&mut self, field_number: u8, value: u32) -> Result<&mut Self> {
        self.buf.push(tag(field_number, ProtobufWireType::Int32)?);
        self.buf.extend_from_slice(&value.to_le_bytes());
        Ok(self)
    }

    /// Append a fixed 64-bit field.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `field_number` exceeds 31.
    pub fn add_int64(&mut self, field_number: u8, value: u64) -> Result<&mut Self> {
        self.buf.push(tag(field_number, ProtobufWireType::Int64)?);
        self.buf.extend_from_slice(&value.to_le_bytes());
        Ok(self)
    }

    /// Append a LEN field holding raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `field_number` exceeds 31.
    pub fn add_bytes(&mut self, field_number: u8, value: &[u8]) -> Result<&mut Self> {
        self.buf.push(tag(field_number, ProtobufWireType::Len)?);
        write_varint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
        Ok(self)
    }

    /// Append a LEN field holding a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `field_number` exceeds 31.
    pub fn add_string(&mut self, field_number: u8, value: &str) -> Result<&mut Self> {
        self.add_bytes(field_number, value.as_bytes())
    }

    /// Append a LEN field holding an embedded message.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if `field_number` exceeds 31.
    pub fn add_embedded(&mut self, field_number: u8, msg: &ProtobufWriter) -> Result<&mut Self> {
        self.add_bytes(field_number, &msg.buf)
    }

    /// Encoded bytes so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the builder, returning the encoded message.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// A decoded field value, borrowing LEN payloads from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtobufValue<'a> {
    /// VARINT payload
    Varint(u64),
    /// INT64 payload
    Int64(u64),
    /// LEN payload
    Len(&'a [u8]),
    /// INT32 payload
    Int32(u32),
}

impl<'a> ProtobufValue<'a> {
    /// Integer value of a VARINT, INT64 or INT32 field.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Varint(v) | Self::Int64(v) => Some(v),
            Self::Int32(v) => Some(u64::from(v)),
            Self::Len(_) => None,
        }
    }

    /// Payload of a LEN field.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Self::Len(b) => Some(b),
            _ => None,
        }
    }
}

/// Iterator over the fields of an encoded message.
///
/// Yields `(field_number, value)`; the first error ends iteration.
#[derive(Debug, Clone)]
pub struct ProtobufReader<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> ProtobufReader<'a> {
    /// Start reading `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Return the first field with `field_number`.
    ///
    /// # Errors
    ///
    /// Returns the first decode error, or not-found if no such field exists.
    pub fn find(buf: &'a [u8], field_number: u8) -> Result<ProtobufValue<'a>> {
        for item in ProtobufReader::new(buf) {
            let (number, value) = item?;
            if number == field_number {
                return Ok(value);
            }
        }
        Err(FwupdError::not_found(format!("no field {field_number}")))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                FwupdError::out_of_range(format!(
                    "0x{n:x} bytes at offset 0x{:x} exceeds message size 0x{:x}",
                    self.offset,
                    self.buf.len()
                ))
            })?;
        let bytes = &self.buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn next_field(&mut self) -> Result<(u8, ProtobufValue<'a>)> {
        let tag = self.buf[self.offset];
        self.offset += 1;
        let field_number = tag >> 3;
        let value = match ProtobufWireType::from_u8(tag & 0x07) {
            Some(ProtobufWireType::Varint) => {
                ProtobufValue::Varint(read_varint(self.buf, &mut self.offset)?)
            }
            Some(ProtobufWireType::Int64) => {
                let b = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                ProtobufValue::Int64(u64::from_le_bytes(arr))
            }
            Some(ProtobufWireType::Len) => {
                let len = read_varint(self.buf, &mut self.offset)?;
                let len = usize::try_from(len).map_err(|e| {
                    FwupdError::out_of_range(format!("LEN value 0x{len:x} too large: {e}"))
                })?;
                ProtobufValue::Len(self.take(len)?)
            }
            Some(ProtobufWireType::Int32) => {
                let b = self.take(4)?;
                ProtobufValue::Int32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            Some(other) => {
                return Err(FwupdError::not_supported(format!(
                    "wire type {other} not supported"
                )));
            }
            None => {
                return Err(FwupdError::invalid_data(format!(
                    "invalid wire type {}",
                    tag & 0x07
                )));
            }
        };
        Ok((field_number, value))
    }
}

impl<'a> Iterator for ProtobufReader<'a> {
    type Item = Result<(u8, ProtobufValue<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let item = self.next_field();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_encoding() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, [0xAC, 0x02]);
        let mut offset = 0;
        assert_eq!(read_varint(&buf, &mut offset)?, 300);
        assert_eq!(offset, 2);

        buf.clear();
        write_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 10);
        let mut offset = 0;
        assert_eq!(read_varint(&buf, &mut offset)?, u64::MAX);
        Ok(())
    }

    #[test]
    fn test_varint_truncated_and_overlong() {
        let mut offset = 0;
        assert!(read_varint(&[0x80, 0x80], &mut offset).is_err());
        let mut offset = 0;
        assert!(read_varint(&[0xFF; 11], &mut offset).is_err());
    }

    #[test]
    fn test_writer_tags() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut inner = ProtobufWriter::new();
        inner.add_varint(1, 150)?;
        let mut msg = ProtobufWriter::new();
        msg.add_embedded(3, &inner)?.add_int32(5, 0x0403_0201)?.add_string(2, "hi")?;
        assert_eq!(
            msg.as_bytes(),
            [
                0x1A, 0x03, 0x08, 0x96, 0x01, // field 3 LEN { field 1 varint 150 }
                0x2D, 0x01, 0x02, 0x03, 0x04, // field 5 INT32
                0x12, 0x02, b'h', b'i', // field 2 LEN
            ]
        );
        assert!(ProtobufWriter::new().add_varint(32, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_reader_fields() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut msg = ProtobufWriter::new();
        msg.add_varint(1, 7)?
            .add_int64(31, 0x1122_3344_5566_7788)?
            .add_bytes(4, b"\x01\x02")?;
        let bytes = msg.into_bytes();
        let fields: Vec<_> = ProtobufReader::new(&bytes).collect::<Result<_>>()?;
        assert_eq!(
            fields,
            vec![
                (1, ProtobufValue::Varint(7)),
                (31, ProtobufValue::Int64(0x1122_3344_5566_7788)),
                (4, ProtobufValue::Len(&[0x01, 0x02][..])),
            ]
        );
        assert_eq!(ProtobufReader::find(&bytes, 4)?.as_bytes(), Some(&[1u8, 2][..]));
        assert!(ProtobufReader::find(&bytes, 9).is_err());
        Ok(())
    }

    #[test]
    fn test_reader_rejects_bad_input() {
        // group wire type
        assert!(ProtobufReader::new(&[0x0B]).any(|r| r.is_err()));
        // wire type 6
        assert!(ProtobufReader::new(&[0x0E]).any(|r| r.is_err()));
        // LEN overruns the message
        assert!(ProtobufReader::new(&[0x12, 0x05, 0x00]).any(|r| r.is_err()));
        // truncated INT32
        assert!(ProtobufReader::new(&[0x0D, 0x00]).any(|r| r.is_err()));
    }
}
