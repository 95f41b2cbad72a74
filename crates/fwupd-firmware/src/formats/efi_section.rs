//! EFI file sections.

use fwupd_common::XmlBuilder;
use fwupd_common::guid::{guid_from_string, guid_to_string};
use fwupd_common::mem::{ByteVecExt, Endian};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{check_length, query_narrow, read_struct, to_usize, utf16le_decode, utf16le_encode};
use super::EfiVolume;
use crate::firmware::{ContainerFormat, Firmware, FirmwareBase, FirmwareFormat, ParseContext};
use crate::structs::{EFI_SECTION, EFI_SECTION_GUID_DEFINED, EFI_SECTION2};
use crate::xml::XmlNode;

pub(crate) const TYPE_GUID_DEFINED: u8 = 0x02;
pub(crate) const TYPE_VERSION: u8 = 0x14;
pub(crate) const TYPE_USER_INTERFACE: u8 = 0x15;
pub(crate) const TYPE_VOLUME_IMAGE: u8 = 0x17;
pub(crate) const TYPE_RAW: u8 = 0x19;

const SIZE_EXTENDED: u32 = 0xFF_FFFF;

/// Human readable name of a section type.
pub fn efi_section_type_to_string(section_type: u8) -> Option<&'static str> {
    Some(match section_type {
        0x01 => "compression",
        TYPE_GUID_DEFINED => "guid-defined",
        0x03 => "disposable",
        0x10 => "pe32",
        0x11 => "pic",
        0x12 => "te",
        0x13 => "dxe-depex",
        TYPE_VERSION => "version",
        TYPE_USER_INTERFACE => "user-interface",
        0x16 => "compatibility16",
        TYPE_VOLUME_IMAGE => "volume-image",
        0x18 => "freeform-subtype-guid",
        TYPE_RAW => "raw",
        0x1B => "pei-depex",
        0x1C => "mm-depex",
        _ => return None,
    })
}

/// Extra header of a GUID-defined section; the GUID is the image id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuidDefined {
    /// Processing attributes.
    pub attr: u16,
    /// Bytes between the header and the data offset.
    pub gap: Vec<u8>,
}

/// Header fields of an EFI section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfiSection {
    /// Section type.
    pub section_type: u8,
    /// Name carried by a user-interface section.
    pub user_interface: Option<String>,
    /// Extra header of a GUID-defined section.
    pub guid_defined: Option<GuidDefined>,
}

impl Default for EfiSection {
    fn default() -> Self {
        Self {
            section_type: TYPE_RAW,
            user_interface: None,
            guid_defined: None,
        }
    }
}

impl EfiSection {
    /// Offset of the data from the start of the section, for GUID-defined
    /// sections with a header of `header_size` bytes.
    pub fn data_offset(&self, header_size: usize) -> Option<usize> {
        self.guid_defined
            .as_ref()
            .map(|gd| header_size + EFI_SECTION_GUID_DEFINED_SIZE + gd.gap.len())
    }

    fn payload(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        if let Some(image) = base.images().first() {
            return image.write();
        }
        if let Some(bytes) = base.bytes.as_deref() {
            return Ok(bytes.to_vec());
        }
        match self.section_type {
            TYPE_USER_INTERFACE => Ok(utf16le_encode(self.user_interface.as_deref().unwrap_or_default())),
            TYPE_VERSION => {
                let mut buf = Vec::new();
                buf.append_u16(0, Endian::Little);
                buf.extend(utf16le_encode(base.version.as_deref().unwrap_or_default()));
                Ok(buf)
            }
            _ => Ok(Vec::new()),
        }
    }
}

const EFI_SECTION_GUID_DEFINED_SIZE: usize = 20;

impl ContainerFormat for EfiSection {
    fn name(&self) -> &'static str {
        "efi-section"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &EFI_SECTION, 0)?;
        ctx.dump(&st);
        let mut header_size = st.size() as u64;
        let mut size = u64::from(st.get_u24("size"));
        if size == u64::from(SIZE_EXTENDED) {
            let st2 = read_struct(stream, &EFI_SECTION2, header_size)?;
            ctx.dump(&st2);
            size = u64::from(st2.get_u32("extended_size"));
            header_size += st2.size() as u64;
        }
        check_length(size, header_size, stream.stream_size()?, "section size")?;
        self.section_type = st.get_u8("type");
        base.size = size;

        let mut data_offset = header_size;
        if self.section_type == TYPE_GUID_DEFINED {
            let gd = read_struct(stream, &EFI_SECTION_GUID_DEFINED, header_size)?;
            ctx.dump(&gd);
            let min_offset = header_size + gd.size() as u64;
            data_offset = u64::from(gd.get_u16("offset"));
            if data_offset < min_offset || data_offset > size {
                return Err(FwupdError::invalid_file(format!(
                    "GUID-defined data offset 0x{data_offset:x} outside 0x{min_offset:x}..0x{size:x}"
                )));
            }
            let gap_size = to_usize(data_offset - min_offset, "data offset")?;
            base.id = Some(guid_to_string(&gd.get_guid("name")));
            self.guid_defined = Some(GuidDefined {
                attr: gd.get_u16("attr"),
                gap: stream.read_bytes_at(min_offset, gap_size)?,
            });
        }

        let payload_size = size - data_offset;
        if self.section_type == TYPE_VOLUME_IMAGE {
            let child = Firmware::new(FirmwareFormat::EfiVolume(EfiVolume::default()));
            Firmware::parse_child(base, child, stream, data_offset, payload_size, ctx)?;
            return Ok(());
        }

        let payload = stream.read_bytes_at(data_offset, to_usize(payload_size, "section size")?)?;
        match self.section_type {
            TYPE_USER_INTERFACE => {
                let name = utf16le_decode(&payload)?;
                if base.id.is_none() {
                    base.id = Some(name.clone());
                }
                self.user_interface = Some(name);
            }
            TYPE_VERSION => {
                let text = payload.get(2..).unwrap_or_default();
                base.version = Some(utf16le_decode(text)?);
            }
            _ => {}
        }
        base.bytes = Some(payload);
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let payload = self.payload(base)?;
        let mut extra = Vec::new();
        if self.section_type == TYPE_GUID_DEFINED {
            let gd = self.guid_defined.clone().unwrap_or_default();
            let guid = base
                .id
                .as_deref()
                .ok_or_else(|| FwupdError::not_found("no GUID set for GUID-defined section"))?;
            let mut st = EFI_SECTION_GUID_DEFINED.new_instance()?;
            st.set_guid("name", &guid_from_string(guid)?);
            st.set_u16("attr", gd.attr);
            extra = st.pack();
            extra.extend_from_slice(&gd.gap);
        }

        let mut header_size = EFI_SECTION.size()?;
        let mut total = header_size + extra.len() + payload.len();
        let extended = total >= SIZE_EXTENDED as usize;
        if extended {
            header_size += EFI_SECTION2.size()?;
            total += EFI_SECTION2.size()?;
        }
        let total_u32 = u32::try_from(total)
            .map_err(|e| FwupdError::out_of_range(format!("section too large: {e}")))?;

        let mut st = EFI_SECTION.new_instance()?;
        st.set_u24("size", if extended { SIZE_EXTENDED } else { total_u32 });
        st.set_u8("type", self.section_type);
        let mut buf = st.pack();
        if extended {
            let mut st2 = EFI_SECTION2.new_instance()?;
            st2.set_u32("extended_size", total_u32);
            buf.extend_from_slice(st2.as_bytes());
        }
        if self.section_type == TYPE_GUID_DEFINED {
            let data_offset = u16::try_from(header_size + extra.len())
                .map_err(|e| FwupdError::out_of_range(format!("data offset too large: {e}")))?;
            let offset_at = EFI_SECTION_GUID_DEFINED
                .schema()?
                .offset_of("offset")
                .ok_or_else(|| FwupdError::internal("GUID-defined header has no offset"))?;
            extra[offset_at..offset_at + 2].copy_from_slice(&data_offset.to_le_bytes());
        }
        buf.extend_from_slice(&extra);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(section_type) = query_narrow(node, "type")? {
            self.section_type = section_type;
        }
        if let Some(name) = node.query_text("user_interface") {
            self.user_interface = Some(name.to_owned());
        }
        if self.section_type == TYPE_GUID_DEFINED {
            let mut gd = GuidDefined::default();
            if let Some(attr) = query_narrow(node, "attr")? {
                gd.attr = attr;
            }
            if let Some(data_offset) = node.query_uint("data_offset")? {
                let min_offset = (EFI_SECTION.size()? + EFI_SECTION_GUID_DEFINED_SIZE) as u64;
                let gap = data_offset.checked_sub(min_offset).ok_or_else(|| {
                    FwupdError::invalid_data(format!("data offset 0x{data_offset:x} too small"))
                })?;
                gd.gap = vec![0; to_usize(gap, "data offset")?];
            }
            self.guid_defined = Some(gd);
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("type", u64::from(self.section_type))?;
        xb.insert_kv("type_name", efi_section_type_to_string(self.section_type))?;
        xb.insert_kv("user_interface", self.user_interface.as_deref())?;
        if let Some(gd) = &self.guid_defined {
            xb.insert_kx("attr", u64::from(gd.attr))?;
            let data_offset = self.data_offset(EFI_SECTION.size()?).unwrap_or_default();
            xb.insert_kx("data_offset", data_offset as u64)?;
        }
        Ok(())
    }
}
