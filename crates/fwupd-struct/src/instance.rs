//! Struct instances: a schema plus the current value of every field.

use core::fmt;
use std::sync::Arc;

use fwupd_common::guid::{Guid, guid_to_string};
use fwupd_common::mem::{Endian, strsafe};
use fwupd_errors::{FwupdError, Result};

use crate::schema::{FieldKind, FieldSpec, StructSchema};

/// Flags controlling [`StructInstance::unpack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UnpackFlags(u8);

impl UnpackFlags {
    /// Verify constants and copy every other field.
    pub const NONE: Self = Self(0);
    /// Verify constants without changing the instance.
    pub const ONLY_CONSTANTS: Self = Self(1 << 0);

    /// Check if all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for UnpackFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One record laid out by a [`StructSchema`].
///
/// Field values live in a single buffer of the schema's size; every field
/// starts out holding its compiled default, or zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInstance {
    schema: Arc<StructSchema>,
    buf: Vec<u8>,
}

fn format_value(field: &FieldSpec, bytes: &[u8]) -> String {
    match field.kind() {
        kind if kind.is_integer() && field.multiplier() == 1 => {
            format!("0x{:x}", decode_integer(field.endian(), bytes))
        }
        FieldKind::String => format!("'{}'", strsafe(bytes)),
        FieldKind::Guid if field.multiplier() == 1 => {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(bytes);
            guid_to_string(&guid)
        }
        _ => bytes.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

fn decode_integer(endian: Endian, bytes: &[u8]) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match endian {
        Endian::Little => bytes.iter().rev().fold(0, fold),
        Endian::Big => bytes.iter().fold(0, fold),
    }
}

impl StructInstance {
    /// Create an instance holding the schema's defaults.
    pub fn new(schema: Arc<StructSchema>) -> Self {
        let mut buf = vec![0u8; schema.size()];
        for field in schema.fields() {
            if let Some(default) = field.default_bytes() {
                buf[field.offset()..field.offset() + field.width()].copy_from_slice(default);
            }
        }
        Self { schema, buf }
    }

    /// Create an instance by unpacking `buf` at `offset`.
    ///
    /// # Errors
    ///
    /// See [`StructInstance::unpack`].
    pub fn parse(schema: Arc<StructSchema>, buf: &[u8], offset: usize) -> Result<Self> {
        let mut st = Self::new(schema);
        st.unpack(buf, offset, UnpackFlags::NONE)?;
        Ok(st)
    }

    /// The schema this instance follows.
    pub fn schema(&self) -> &StructSchema {
        &self.schema
    }

    /// Size of the packed record.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Serialize every field at its offset.
    pub fn pack(&self) -> Vec<u8> {
        self.buf.clone()
    }

    /// Borrow the packed record.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Read the record at `offset` of `buf`.
    ///
    /// Constant fields are compared byte for byte with their default. All
    /// checks happen before the instance is modified, so a failed unpack
    /// leaves it unchanged.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if the record does not fit in `buf`, or
    /// an invalid-data error describing the first constant mismatch.
    pub fn unpack(&mut self, buf: &[u8], offset: usize, flags: UnpackFlags) -> Result<()> {
        for field in self.schema.fields() {
            let start = offset.checked_add(field.offset());
            let end = start.and_then(|s| s.checked_add(field.width()));
            let (Some(start), Some(end)) = (start, end) else {
                return Err(FwupdError::out_of_range(format!(
                    "offset 0x{offset:x} overflows for {}",
                    self.schema.name()
                )));
            };
            if end > buf.len() {
                return Err(FwupdError::out_of_range(format!(
                    "buffer of size 0x{:x} too small for {}.{}: need 0x{end:x} bytes",
                    buf.len(),
                    self.schema.name(),
                    field.id()
                )));
            }
            if field.is_constant()
                && let Some(expected) = field.default_bytes()
            {
                let actual = &buf[start..end];
                if actual != expected {
                    return Err(FwupdError::invalid_data(format!(
                        "constant value invalid for {}.{}, expected {} and got {}",
                        self.schema.name(),
                        field.id(),
                        format_value(field, expected),
                        format_value(field, actual)
                    )));
                }
            }
        }
        if !flags.contains(UnpackFlags::ONLY_CONSTANTS) {
            let size = self.buf.len();
            self.buf.copy_from_slice(&buf[offset..offset + size]);
        }
        Ok(())
    }

    fn field_checked(&self, id: &str, kind: FieldKind) -> &FieldSpec {
        let Some(field) = self.schema.field(id) else {
            panic!("{} has no field {id}", self.schema.name());
        };
        assert!(
            field.is_scalar(kind),
            "{}.{id} is {:?}x{}, not {kind:?}",
            self.schema.name(),
            field.kind(),
            field.multiplier()
        );
        assert!(
            !field.is_constant(),
            "{}.{id} is constant and cannot be accessed",
            self.schema.name()
        );
        field
    }

    fn field_any(&self, id: &str, kind: FieldKind) -> &FieldSpec {
        let Some(field) = self.schema.field(id) else {
            panic!("{} has no field {id}", self.schema.name());
        };
        assert!(
            field.kind() == kind,
            "{}.{id} is {:?}, not {kind:?}",
            self.schema.name(),
            field.kind()
        );
        assert!(
            !field.is_constant(),
            "{}.{id} is constant and cannot be accessed",
            self.schema.name()
        );
        field
    }

    fn get_integer(&self, id: &str, kind: FieldKind) -> u64 {
        let field = self.field_checked(id, kind);
        let bytes = &self.buf[field.offset()..field.offset() + field.width()];
        decode_integer(field.endian(), bytes)
    }

    fn set_integer(&mut self, id: &str, kind: FieldKind, value: u64) {
        let field = self.field_checked(id, kind);
        let (offset, width, endian) = (field.offset(), field.width(), field.endian());
        let dst = &mut self.buf[offset..offset + width];
        match endian {
            Endian::Little => dst.copy_from_slice(&value.to_le_bytes()[..width]),
            Endian::Big => dst.copy_from_slice(&value.to_be_bytes()[8 - width..]),
        }
    }

    /// Read a `u8` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u8`.
    pub fn get_u8(&self, id: &str) -> u8 {
        self.get_integer(id, FieldKind::U8) as u8
    }

    /// Read a `u16` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u16`.
    pub fn get_u16(&self, id: &str) -> u16 {
        self.get_integer(id, FieldKind::U16) as u16
    }

    /// Read a `u24` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u24`.
    pub fn get_u24(&self, id: &str) -> u32 {
        self.get_integer(id, FieldKind::U24) as u32
    }

    /// Read a `u32` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u32`.
    pub fn get_u32(&self, id: &str) -> u32 {
        self.get_integer(id, FieldKind::U32) as u32
    }

    /// Read a `u64` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u64`.
    pub fn get_u64(&self, id: &str) -> u64 {
        self.get_integer(id, FieldKind::U64)
    }

    /// Write a `u8` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u8`.
    pub fn set_u8(&mut self, id: &str, value: u8) {
        self.set_integer(id, FieldKind::U8, u64::from(value));
    }

    /// Write a `u16` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u16`.
    pub fn set_u16(&mut self, id: &str, value: u16) {
        self.set_integer(id, FieldKind::U16, u64::from(value));
    }

    /// Write a `u24` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u24`, or if
    /// `value` does not fit in 24 bits.
    pub fn set_u24(&mut self, id: &str, value: u32) {
        assert!(value <= 0x00FF_FFFF, "0x{value:x} does not fit in {id}");
        self.set_integer(id, FieldKind::U24, u64::from(value));
    }

    /// Write a `u32` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u32`.
    pub fn set_u32(&mut self, id: &str, value: u32) {
        self.set_integer(id, FieldKind::U32, u64::from(value));
    }

    /// Write a `u64` field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single `u64`.
    pub fn set_u64(&mut self, id: &str, value: u64) {
        self.set_integer(id, FieldKind::U64, value);
    }

    /// Read a string field as printable text, stopping at the first NUL.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a string.
    pub fn get_string(&self, id: &str) -> String {
        let field = self.field_any(id, FieldKind::String);
        strsafe(&self.buf[field.offset()..field.offset() + field.width()])
    }

    /// Write a string field, zero padding to its width.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `value` is longer than the field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a string.
    pub fn set_string(&mut self, id: &str, value: &str) -> Result<()> {
        let field = self.field_any(id, FieldKind::String);
        let (offset, width) = (field.offset(), field.width());
        if value.len() > width {
            return Err(FwupdError::invalid_data(format!(
                "string '{value}' is longer than {}.{id} of size 0x{width:x}",
                self.schema.name()
            )));
        }
        let dst = &mut self.buf[offset..offset + width];
        dst.fill(0);
        dst[..value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }

    /// Read a GUID field in its on-disk byte order.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single GUID.
    pub fn get_guid(&self, id: &str) -> Guid {
        let field = self.field_checked(id, FieldKind::Guid);
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&self.buf[field.offset()..field.offset() + 16]);
        guid
    }

    /// Write a GUID field in its on-disk byte order.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing, constant, or not a single GUID.
    pub fn set_guid(&mut self, id: &str, guid: &Guid) {
        let offset = self.field_checked(id, FieldKind::Guid).offset();
        self.buf[offset..offset + 16].copy_from_slice(guid);
    }

    /// Borrow the raw bytes of a `u8` array or string field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing or constant.
    pub fn get_bytes(&self, id: &str) -> &[u8] {
        let Some(field) = self.schema.field(id) else {
            panic!("{} has no field {id}", self.schema.name());
        };
        assert!(
            !field.is_constant(),
            "{}.{id} is constant and cannot be accessed",
            self.schema.name()
        );
        &self.buf[field.offset()..field.offset() + field.width()]
    }

    /// Write the raw bytes of a field, zero padding to its width.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `value` is longer than the field.
    ///
    /// # Panics
    ///
    /// Panics if `id` is missing or constant.
    pub fn set_bytes(&mut self, id: &str, value: &[u8]) -> Result<()> {
        let Some(field) = self.schema.field(id) else {
            panic!("{} has no field {id}", self.schema.name());
        };
        assert!(
            !field.is_constant(),
            "{}.{id} is constant and cannot be accessed",
            self.schema.name()
        );
        let (offset, width) = (field.offset(), field.width());
        if value.len() > width {
            return Err(FwupdError::invalid_data(format!(
                "0x{:x} bytes do not fit {}.{id} of size 0x{width:x}",
                value.len(),
                self.schema.name()
            )));
        }
        let dst = &mut self.buf[offset..offset + width];
        dst.fill(0);
        dst[..value.len()].copy_from_slice(value);
        Ok(())
    }
}

impl fmt::Display for StructInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.schema.name())?;
        for field in self.schema.fields() {
            let bytes = &self.buf[field.offset()..field.offset() + field.width()];
            writeln!(f, "  {}: {}", field.id(), format_value(field, bytes))?;
        }
        Ok(())
    }
}
