//! Schemas declared once as `static` items and compiled on first use.

use std::sync::{Arc, OnceLock};

use fwupd_errors::Result;

use crate::error::SchemaError;
use crate::instance::{StructInstance, UnpackFlags};
use crate::schema::StructSchema;

/// A schema compiled lazily from text known at build time.
///
/// ```
/// use fwupd_struct::StaticSchema;
///
/// static HDR: StaticSchema = StaticSchema::new("Hdr{ magic:u16be:0xAA55:const, len:u8 }");
///
/// let st = HDR.parse(&[0xAA, 0x55, 0x07], 0)?;
/// assert_eq!(st.get_u8("len"), 7);
/// # Ok::<(), fwupd_errors::FwupdError>(())
/// ```
#[derive(Debug)]
pub struct StaticSchema {
    text: &'static str,
    cell: OnceLock<std::result::Result<Arc<StructSchema>, SchemaError>>,
}

impl StaticSchema {
    /// Declare a schema without compiling it.
    pub const fn new(text: &'static str) -> Self {
        Self {
            text,
            cell: OnceLock::new(),
        }
    }

    /// The schema source text.
    pub fn text(&self) -> &'static str {
        self.text
    }

    /// The compiled schema, compiling it on the first call.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if the text does not compile. The
    /// failure is cached, so every call reports it.
    pub fn schema(&self) -> Result<Arc<StructSchema>> {
        self.cell
            .get_or_init(|| StructSchema::compile(self.text).map(Arc::new))
            .clone()
            .map_err(Into::into)
    }

    /// Size of the compiled record.
    ///
    /// # Errors
    ///
    /// See [`StaticSchema::schema`].
    pub fn size(&self) -> Result<usize> {
        Ok(self.schema()?.size())
    }

    /// A new instance holding the schema defaults.
    ///
    /// # Errors
    ///
    /// See [`StaticSchema::schema`].
    pub fn new_instance(&self) -> Result<StructInstance> {
        Ok(StructInstance::new(self.schema()?))
    }

    /// Unpack a record at `offset` of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a compile error, an out-of-range error or a constant mismatch.
    pub fn parse(&self, buf: &[u8], offset: usize) -> Result<StructInstance> {
        StructInstance::parse(self.schema()?, buf, offset)
    }

    /// Check only the constant fields of a record at `offset` of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a compile error, an out-of-range error or a constant mismatch.
    pub fn validate(&self, buf: &[u8], offset: usize) -> Result<()> {
        self.new_instance()?
            .unpack(buf, offset, UnpackFlags::ONLY_CONSTANTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupd_errors::ErrorKind;

    static GOOD: StaticSchema = StaticSchema::new("Good{ magic:2s:\"MZ\":const, size:u32le }");
    static BAD: StaticSchema = StaticSchema::new("Bad{ a:u17 }");

    #[test]
    fn test_compiles_once() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let a = GOOD.schema()?;
        let b = GOOD.schema()?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(GOOD.size()?, 6);
        Ok(())
    }

    #[test]
    fn test_validate() -> std::result::Result<(), Box<dyn std::error::Error>> {
        GOOD.validate(b"MZ\x01\x00\x00\x00", 0)?;
        let err = GOOD.validate(b"PE\x01\x00\x00\x00", 0).err().ok_or("expected error")?;
        assert_eq!(
            err.to_string(),
            "constant value invalid for Good.magic, expected 'MZ' and got 'PE'"
        );
        Ok(())
    }

    #[test]
    fn test_compile_error_is_cached() {
        for _ in 0..2 {
            let err = BAD.schema().err();
            assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::InvalidData));
        }
    }
}
