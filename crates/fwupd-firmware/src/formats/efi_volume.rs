//! EFI firmware volumes.

use fwupd_common::XmlBuilder;
use fwupd_common::guid::{guid_from_string, guid_to_string};
use fwupd_common::mem::{ByteVecExt, Endian, align_up};
use fwupd_common::sum::{finish16, sum16w};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{EfiFilesystem, EfiVss2VariableStore, check_length, query_narrow, read_struct, to_usize};
use crate::firmware::{ContainerFormat, Firmware, FirmwareBase, FirmwareFormat, ParseContext};
use crate::structs::{EFI_VOLUME, EFI_VOLUME_BLOCK_MAP, EFI_VOLUME_EXT_ENTRY, EFI_VOLUME_EXT_HEADER};
use crate::xml::XmlNode;

/// File system GUID of FFS version 2.
pub const GUID_FFS2: &str = "8c8ce578-8a3d-4f1c-9935-896185c32dd3";
/// File system GUID of FFS version 3.
pub const GUID_FFS3: &str = "5473c07a-3dcb-4dca-bd6f-1e9689e7349a";
/// Volume GUID of a non-volatile variable store.
pub const GUID_NVRAM: &str = "fff12b8d-7696-4c8b-a985-2747075b4f50";

const ERASED: u8 = 0xFF;
const SIGNATURE_OFFSET: u64 = 0x28;

/// Header fields of an EFI volume; the file system GUID is the image id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EfiVolume {
    /// Attributes without the alignment bits.
    pub attrs: u32,
}

fn alignment_from_attrs(attrs: u32) -> u8 {
    ((attrs >> 16) & 0x1F) as u8
}

impl EfiVolume {
    fn validate_ext_header(
        stream: &mut dyn InputStream,
        ext_hdr: u64,
        length: u64,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &EFI_VOLUME_EXT_HEADER, ext_hdr)?;
        ctx.dump(&st);
        let size = u64::from(st.get_u32("size"));
        let header_size = st.size() as u64;
        let end = ext_hdr + size;
        if size < header_size || end > length {
            return Err(FwupdError::invalid_file(format!(
                "extension header size 0x{size:x} at 0x{ext_hdr:x} invalid"
            )));
        }
        let entry_size = EFI_VOLUME_EXT_ENTRY.size()? as u64;
        let mut offset = ext_hdr + header_size;
        while offset < end {
            let entry = read_struct(stream, &EFI_VOLUME_EXT_ENTRY, offset)?;
            ctx.dump(&entry);
            let size = u64::from(entry.get_u16("size"));
            if size < entry_size || offset + size > end {
                return Err(FwupdError::invalid_file(format!(
                    "extension entry size 0x{size:x} at 0x{offset:x} invalid"
                )));
            }
            offset += size;
        }
        Ok(())
    }

    fn validate_block_map(stream: &mut dyn InputStream, hdr_len: u64, length: u64) -> Result<()> {
        let entry_size = EFI_VOLUME_BLOCK_MAP.size()? as u64;
        let mut offset = EFI_VOLUME.size()? as u64;
        let mut total = 0u64;
        loop {
            if offset + entry_size > hdr_len {
                return Err(FwupdError::invalid_file("block map has no terminator"));
            }
            let entry = read_struct(stream, &EFI_VOLUME_BLOCK_MAP, offset)?;
            let num_blocks = u64::from(entry.get_u32("num_blocks"));
            let block_length = u64::from(entry.get_u32("length"));
            if num_blocks == 0 && block_length == 0 {
                break;
            }
            total = num_blocks
                .checked_mul(block_length)
                .and_then(|size| total.checked_add(size))
                .ok_or_else(|| FwupdError::invalid_file("block map size overflows"))?;
            offset += entry_size;
        }
        if total < length {
            return Err(FwupdError::invalid_file(format!(
                "blocks allocate 0x{total:x} bytes, less than volume length 0x{length:x}"
            )));
        }
        Ok(())
    }
}

impl ContainerFormat for EfiVolume {
    fn name(&self) -> &'static str {
        "efi-volume"
    }

    fn magic(&self) -> Option<(u64, &'static [u8])> {
        Some((SIGNATURE_OFFSET, b"_FVH"))
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &EFI_VOLUME, 0)?;
        ctx.dump(&st);
        let length = st.get_u64("length");
        let hdr_len = u64::from(st.get_u16("hdr_len"));
        check_length(length, st.size() as u64, stream.stream_size()?, "volume length")?;
        check_length(hdr_len, st.size() as u64, length, "header length")?;

        let header = stream.read_bytes_at(0, to_usize(hdr_len, "header length")?)?;
        let csum = sum16w(&header, Endian::Little)?;
        if csum != 0 && ctx.check_checksums() {
            return Err(FwupdError::invalid_file(format!(
                "checksum invalid, got 0x{:04x}, expected 0x{:04x}",
                st.get_u16("checksum"),
                st.get_u16("checksum").wrapping_sub(csum)
            )));
        }

        let ext_hdr = u64::from(st.get_u16("ext_hdr"));
        if ext_hdr != 0 {
            Self::validate_ext_header(stream, ext_hdr, length, ctx)?;
        }
        Self::validate_block_map(stream, hdr_len, length)?;

        let attrs = st.get_u32("attrs");
        let guid = guid_to_string(&st.get_guid("guid"));
        self.attrs = attrs & !(0x1F << 16);
        base.alignment = alignment_from_attrs(attrs);
        base.size = length;

        let payload_size = length - hdr_len;
        let child = match guid.as_str() {
            GUID_FFS2 | GUID_FFS3 => Some(FirmwareFormat::EfiFilesystem(EfiFilesystem)),
            GUID_NVRAM => Some(FirmwareFormat::EfiVss2VariableStore(EfiVss2VariableStore)),
            _ => None,
        };
        base.id = Some(guid);
        match child {
            Some(format) => {
                Firmware::parse_child(base, Firmware::new(format), stream, hdr_len, payload_size, ctx)?;
            }
            None => {
                base.bytes = Some(stream.read_bytes_at(hdr_len, to_usize(payload_size, "volume length")?)?);
            }
        }
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let payload = match base.images().first() {
            Some(image) => image.write()?,
            None => base.bytes_or_empty().to_vec(),
        };
        let guid = base
            .id
            .as_deref()
            .ok_or_else(|| FwupdError::not_found("no GUID set for EFI volume"))?;

        let block_map_size = EFI_VOLUME_BLOCK_MAP.size()?;
        let hdr_len = EFI_VOLUME.size()? + 2 * block_map_size;
        let fv_length = align_up(hdr_len + payload.len(), base.alignment)?;
        let num_blocks = u32::try_from(fv_length)
            .map_err(|e| FwupdError::out_of_range(format!("volume too large: {e}")))?;

        let mut st = EFI_VOLUME.new_instance()?;
        st.set_guid("guid", &guid_from_string(guid)?);
        st.set_u64("length", fv_length as u64);
        st.set_u32("attrs", self.attrs | (u32::from(base.alignment) << 16));
        st.set_u16("hdr_len", hdr_len as u16);
        let mut header = st.pack();
        let mut block = EFI_VOLUME_BLOCK_MAP.new_instance()?;
        block.set_u32("num_blocks", num_blocks);
        block.set_u32("length", 1);
        header.extend_from_slice(block.as_bytes());
        header.extend(EFI_VOLUME_BLOCK_MAP.new_instance()?.pack());

        st.set_u16("checksum", finish16(sum16w(&header, Endian::Little)?));
        header[..st.size()].copy_from_slice(st.as_bytes());
        header.extend(payload);
        header.pad_to(fv_length, ERASED);
        Ok(header)
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(attrs) = query_narrow::<u32>(node, "attrs")? {
            self.attrs = attrs & !(0x1F << 16);
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("attrs", u64::from(self.attrs))
    }
}
