//! Authenticated variable stores found in NVRAM volumes.

use fwupd_common::guid::{guid_from_string, guid_to_string};
use fwupd_common::mem::{ByteVecExt, Endian, align_up, read_u16_safe};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{EfiVssAuthVariable, check_length, read_struct, to_usize};
use crate::firmware::{ContainerFormat, Firmware, FirmwareBase, FirmwareFormat, ParseContext};
use crate::structs::{EFI_VSS_AUTH_VARIABLE, EFI_VSS2_VARIABLE_STORE};

/// Signature of a store holding authenticated variables.
pub const GUID_AUTHENTICATED_VARIABLE: &str = "aaf32c78-947b-439a-a180-2e144ec37792";

const VARIABLE_ALIGNMENT: u8 = 2;
const START_ID_ERASED: u16 = 0xFFFF;
const ERASED: u8 = 0xFF;

/// Variable store header; the variables are child images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EfiVss2VariableStore;

impl ContainerFormat for EfiVss2VariableStore {
    fn name(&self) -> &'static str {
        "efi-vss2-variable-store"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &EFI_VSS2_VARIABLE_STORE, 0)?;
        ctx.dump(&st);
        let signature = guid_to_string(&st.get_guid("signature"));
        if signature != GUID_AUTHENTICATED_VARIABLE {
            return Err(FwupdError::invalid_file(format!(
                "signature invalid, got {signature}, expected {GUID_AUTHENTICATED_VARIABLE}"
            )));
        }
        let size = u64::from(st.get_u32("size"));
        check_length(size, st.size() as u64, stream.stream_size()?, "store size")?;
        base.size = size;

        let header_size = EFI_VSS_AUTH_VARIABLE.size()? as u64;
        let mut offset = st.size() as u64;
        while offset + header_size <= size {
            let start_id = stream.read_bytes_at(offset, 2)?;
            if read_u16_safe(&start_id, 0, Endian::Little)? == START_ID_ERASED {
                break;
            }
            let child = Firmware::new(FirmwareFormat::EfiVssAuthVariable(EfiVssAuthVariable::default()));
            let var_size = Firmware::parse_child(base, child, stream, offset, size - offset, ctx)?;
            offset += align_up(to_usize(var_size, "variable size")?, VARIABLE_ALIGNMENT)? as u64;
        }
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let mut st = EFI_VSS2_VARIABLE_STORE.new_instance()?;
        let mut body = Vec::new();
        for image in base.images() {
            body.extend(image.write()?);
            body.align_with(VARIABLE_ALIGNMENT, ERASED)?;
        }
        let used = st.size() + body.len();
        let size = match to_usize(base.size, "store size")? {
            0 => used,
            size if size < used => {
                return Err(FwupdError::out_of_range(format!(
                    "variables of 0x{used:x} bytes do not fit store of 0x{size:x}"
                )));
            }
            size => size,
        };
        st.set_guid("signature", &guid_from_string(GUID_AUTHENTICATED_VARIABLE)?);
        st.set_u32(
            "size",
            u32::try_from(size).map_err(|e| FwupdError::out_of_range(format!("store too large: {e}")))?,
        );
        let mut buf = st.pack();
        buf.extend(body);
        buf.pad_to(size, ERASED);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseFlags;
    use fwupd_errors::ErrorKind;

    const STORE: &str = r#"<firmware format="efi-vss2-variable-store">
  <size>0x100</size>
  <firmware format="efi-vss-auth-variable">
    <id>Boot0000</id>
    <vendor_guid>8be4df61-93ca-11d2-aa0d-00e098032b8c</vendor_guid>
    <attributes>0x7</attributes>
    <data>abc</data>
  </firmware>
  <firmware format="efi-vss-auth-variable">
    <id>Timeout</id>
    <vendor_guid>8be4df61-93ca-11d2-aa0d-00e098032b8c</vendor_guid>
    <data encoding="hex">0500</data>
  </firmware>
</firmware>"#;

    #[test]
    fn test_store_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let blob = Firmware::build_from_xml(STORE)?.write()?;
        assert_eq!(blob.len(), 0x100);
        assert_eq!(blob[20..22], [0x5A, 0xFE]);
        assert_eq!(blob[0xFF], ERASED);

        let mut fw = Firmware::from_name("efi-vss2-variable-store")?;
        fw.parse_bytes(&blob, 0, ParseFlags::NONE)?;
        assert_eq!(fw.images().len(), 2);
        let boot = fw.get_image_by_id("Boot0000")?;
        assert_eq!(boot.base().offset, 28);
        assert_eq!(boot.base().bytes.as_deref(), Some(&b"abc"[..]));
        // 60 + 18 + 3 = 81, aligned to 84
        assert_eq!(fw.get_image_by_id("Timeout")?.base().offset, 28 + 84);
        assert_eq!(fw.write()?, blob);
        Ok(())
    }

    #[test]
    fn test_bad_signature() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut blob = Firmware::build_from_xml(STORE)?.write()?;
        blob[0] ^= 0xFF;
        let mut fw = Firmware::from_name("efi-vss2-variable-store")?;
        let err = fw.parse_bytes(&blob, 0, ParseFlags::NONE).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::InvalidFile);
        assert!(err.to_string().contains("signature invalid"), "{err}");
        Ok(())
    }

    #[test]
    fn test_store_too_small() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fw = Firmware::build_from_xml(&STORE.replace("0x100", "0x40"))?;
        let err = fw.write().err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        Ok(())
    }
}
