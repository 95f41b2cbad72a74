//! EFI firmware files inside an FFS file system.

use fwupd_common::XmlBuilder;
use fwupd_common::guid::{guid_from_string, guid_to_string};
use fwupd_common::mem::{ByteVecExt, align_up};
use fwupd_common::sum::{finish8, sum8};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::{InputStream, PartialStream};

use super::{EfiSection, check_length, query_narrow, read_struct, to_usize};
use crate::firmware::{ContainerFormat, Firmware, FirmwareBase, FirmwareFormat, ParseContext};
use crate::structs::{EFI_FILE, EFI_FILE2};
use crate::xml::XmlNode;

pub(crate) const TYPE_RAW: u8 = 0x01;
pub(crate) const TYPE_FFS_PAD: u8 = 0xF0;

/// The size is stored in the extended 64-bit field.
pub const ATTRIB_LARGE_FILE: u8 = 0x01;
/// The data checksum covers the payload.
pub const ATTRIB_CHECKSUM: u8 = 0x40;

const DATA_CHECKSUM_UNUSED: u8 = 0xAA;
const SIZE_MAX_SHORT: usize = 0xFF_FFFF;

// Header bytes left out of the header checksum.
const OFFSET_HDR_CHECKSUM: usize = 0x10;
const OFFSET_DATA_CHECKSUM: usize = 0x11;
const OFFSET_STATE: usize = 0x17;

/// Human readable name of a file type.
pub fn efi_file_type_to_string(file_type: u8) -> Option<&'static str> {
    Some(match file_type {
        TYPE_RAW => "raw",
        0x02 => "freeform",
        0x03 => "security-core",
        0x04 => "pei-core",
        0x05 => "dxe-core",
        0x06 => "peim",
        0x07 => "driver",
        0x08 => "combined-peim-driver",
        0x09 => "application",
        0x0A => "mm",
        0x0B => "firmware-volume-image",
        0x0C => "combined-mm-dxe",
        0x0D => "mm-core",
        0x0E => "mm-standalone",
        0x0F => "mm-core-standalone",
        TYPE_FFS_PAD => "ffs-pad",
        _ => return None,
    })
}

fn hdr_checksum8(header: &[u8]) -> u8 {
    let csum = header
        .iter()
        .enumerate()
        .filter(|(i, _)| ![OFFSET_HDR_CHECKSUM, OFFSET_DATA_CHECKSUM, OFFSET_STATE].contains(i))
        .fold(0u8, |acc, (_, &b)| acc.wrapping_add(b));
    finish8(csum)
}

/// Header fields of an EFI file; the file name GUID is the image id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfiFile {
    /// File type.
    pub file_type: u8,
    /// File attributes.
    pub attrib: u8,
}

impl Default for EfiFile {
    fn default() -> Self {
        Self {
            file_type: TYPE_RAW,
            attrib: 0,
        }
    }
}

impl EfiFile {
    fn has_sections(&self) -> bool {
        self.file_type != TYPE_RAW && self.file_type != TYPE_FFS_PAD
    }
}

impl ContainerFormat for EfiFile {
    fn name(&self) -> &'static str {
        "efi-file"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &EFI_FILE, 0)?;
        ctx.dump(&st);
        self.file_type = st.get_u8("type");
        self.attrib = st.get_u8("attrs");
        let mut header_size = st.size() as u64;
        let mut size = u64::from(st.get_u24("size"));
        if self.attrib & ATTRIB_LARGE_FILE != 0 {
            if size != 0 {
                return Err(FwupdError::invalid_file(format!(
                    "large file has short size 0x{size:x}, expected 0x0"
                )));
            }
            let st2 = read_struct(stream, &EFI_FILE2, header_size)?;
            ctx.dump(&st2);
            size = st2.get_u64("extended_size");
            header_size += st2.size() as u64;
        }
        check_length(size, header_size, stream.stream_size()?, "file size")?;

        let header = stream.read_bytes_at(0, to_usize(header_size, "header size")?)?;
        let hdr_checksum = hdr_checksum8(&header);
        if hdr_checksum != st.get_u8("hdr_checksum") && ctx.check_checksums() {
            return Err(FwupdError::invalid_file(format!(
                "header checksum invalid, got 0x{:02x}, expected 0x{hdr_checksum:02x}",
                st.get_u8("hdr_checksum")
            )));
        }

        let payload_size = size - header_size;
        if self.attrib & ATTRIB_CHECKSUM != 0 && ctx.check_checksums() {
            let payload = stream.read_bytes_at(header_size, to_usize(payload_size, "file size")?)?;
            let data_checksum = finish8(sum8(&payload));
            if data_checksum != st.get_u8("data_checksum") {
                return Err(FwupdError::invalid_file(format!(
                    "data checksum invalid, got 0x{:02x}, expected 0x{data_checksum:02x}",
                    st.get_u8("data_checksum")
                )));
            }
        }

        base.id = Some(guid_to_string(&st.get_guid("name")));
        base.size = size;
        if !self.has_sections() {
            base.bytes = Some(stream.read_bytes_at(header_size, to_usize(payload_size, "file size")?)?);
            return Ok(());
        }

        let mut payload = PartialStream::new(&mut *stream, header_size, payload_size)?;
        let mut offset = 0u64;
        while offset < payload_size {
            let child = Firmware::new(FirmwareFormat::EfiSection(EfiSection::default()));
            let section_size =
                Firmware::parse_child(base, child, &mut payload, offset, payload_size - offset, ctx)?;
            offset += align_up(to_usize(section_size, "section size")?, 2)? as u64;
        }
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        if base.images().is_empty() {
            payload.extend_from_slice(base.bytes_or_empty());
        }
        for (i, image) in base.images().iter().enumerate() {
            if i > 0 {
                payload.align_with(2, 0x00)?;
            }
            payload.extend(image.write()?);
        }

        let guid = base
            .id
            .as_deref()
            .ok_or_else(|| FwupdError::not_found("no GUID set for EFI file"))?;
        let mut st = EFI_FILE.new_instance()?;
        let mut attrib = self.attrib & !ATTRIB_LARGE_FILE;
        let short_size = st.size() + payload.len();
        let large = short_size > SIZE_MAX_SHORT;
        if large {
            attrib |= ATTRIB_LARGE_FILE;
        }
        st.set_guid("name", &guid_from_string(guid)?);
        st.set_u8("type", self.file_type);
        st.set_u8("attrs", attrib);
        st.set_u8(
            "data_checksum",
            if attrib & ATTRIB_CHECKSUM != 0 {
                finish8(sum8(&payload))
            } else {
                DATA_CHECKSUM_UNUSED
            },
        );
        let mut header = if large {
            let mut st2 = EFI_FILE2.new_instance()?;
            st2.set_u64("extended_size", (short_size + st2.size()) as u64);
            let mut header = st.pack();
            header.extend_from_slice(st2.as_bytes());
            header
        } else {
            st.set_u24("size", short_size as u32);
            st.pack()
        };
        header[OFFSET_HDR_CHECKSUM] = hdr_checksum8(&header);
        header.extend(payload);
        Ok(header)
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(file_type) = query_narrow(node, "type")? {
            self.file_type = file_type;
        }
        if let Some(attrib) = query_narrow(node, "attrib")? {
            self.attrib = attrib;
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("type", u64::from(self.file_type))?;
        xb.insert_kv("type_name", efi_file_type_to_string(self.file_type))?;
        xb.insert_kx("attrib", u64::from(self.attrib))
    }
}
