//! Concrete container formats.

mod acpi;
mod efi_file;
mod efi_filesystem;
mod efi_section;
mod efi_volume;
mod ifwi_fpt;
mod vss2;
mod vss_auth;

pub use acpi::AcpiTable;
pub use efi_file::{ATTRIB_CHECKSUM, ATTRIB_LARGE_FILE, EfiFile, efi_file_type_to_string};
pub use efi_filesystem::EfiFilesystem;
pub use efi_section::{EfiSection, GuidDefined, efi_section_type_to_string};
pub use efi_volume::{EfiVolume, GUID_FFS2, GUID_FFS3, GUID_NVRAM};
pub use ifwi_fpt::{HEADER_VERSION_MIN, IfwiFpt, IfwiFptPartition, MAX_ENTRIES};
pub use vss2::{EfiVss2VariableStore, GUID_AUTHENTICATED_VARIABLE};
pub use vss_auth::{EfiVssAuthVariable, STATE_VAR_ADDED};

use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;
use fwupd_struct::{StaticSchema, StructInstance};

use crate::firmware::{ContainerFormat, FirmwareBase, ParseContext};
use crate::xml::XmlNode;

/// Opaque payload without any header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawImage;

impl ContainerFormat for RawImage {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        _ctx: &ParseContext,
    ) -> Result<()> {
        let bytes = stream.read_to_end_at(0)?;
        base.size = bytes.len() as u64;
        base.bytes = Some(bytes);
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        Ok(base.bytes_or_empty().to_vec())
    }
}

/// Read and unpack one header at `offset`.
pub(crate) fn read_struct(
    stream: &mut dyn InputStream,
    schema: &StaticSchema,
    offset: u64,
) -> Result<StructInstance> {
    let buf = stream.read_bytes_at(offset, schema.size()?)?;
    schema.parse(&buf, 0)
}

/// Convert a payload length read from a header into `usize`.
pub(crate) fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|e| FwupdError::out_of_range(format!("{what} 0x{value:x} too large: {e}")))
}

/// Check a declared length against the header size and the stream.
pub(crate) fn check_length(declared: u64, header: u64, available: u64, what: &str) -> Result<()> {
    if declared < header {
        return Err(FwupdError::invalid_file(format!(
            "{what} 0x{declared:x} smaller than header of 0x{header:x}"
        )));
    }
    if declared > available {
        return Err(FwupdError::invalid_file(format!(
            "{what} 0x{declared:x} larger than available 0x{available:x}"
        )));
    }
    Ok(())
}

/// Numeric builder key narrowed to the width of its header field.
pub(crate) fn query_narrow<T: TryFrom<u64>>(node: &XmlNode, key: &str) -> Result<Option<T>> {
    node.query_uint(key)?
        .map(|value| {
            T::try_from(value)
                .map_err(|_e| FwupdError::invalid_data(format!("<{key}> 0x{value:x} out of range")))
        })
        .transpose()
}

/// Decode a UTF-16LE string, stopping at the first NUL.
pub(crate) fn utf16le_decode(buf: &[u8]) -> Result<String> {
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16(&units).map_err(|e| FwupdError::invalid_data(format!("invalid UTF-16 string: {e}")))
}

/// Encode a string as UTF-16LE with a NUL terminator.
pub(crate) fn utf16le_encode(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}
