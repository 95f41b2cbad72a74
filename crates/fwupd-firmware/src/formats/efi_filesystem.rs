//! FFS file systems: a run of 8-byte aligned EFI files.

use fwupd_common::mem::{ByteVecExt, align_up};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{EfiFile, to_usize};
use crate::firmware::{ContainerFormat, Firmware, FirmwareBase, FirmwareFormat, ParseContext};
use crate::structs::EFI_FILE;

const FILE_ALIGNMENT: u8 = 3;
const ERASED: u8 = 0xFF;

/// File system of EFI files; holds no header of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EfiFilesystem;

impl ContainerFormat for EfiFilesystem {
    fn name(&self) -> &'static str {
        "efi-filesystem"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let size = stream.stream_size()?;
        let header_size = EFI_FILE.size()? as u64;
        base.size = size;
        let mut offset = 0u64;
        while offset + header_size <= size {
            let header = stream.read_bytes_at(offset, to_usize(header_size, "header size")?)?;
            if header.iter().all(|&b| b == ERASED) {
                break;
            }
            let child = Firmware::new(FirmwareFormat::EfiFile(EfiFile::default()));
            let file_size = Firmware::parse_child(base, child, stream, offset, size - offset, ctx)?;
            offset += align_up(to_usize(file_size, "file size")?, FILE_ALIGNMENT)? as u64;
        }
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for image in base.images() {
            buf.extend(image.write()?);
            buf.align_with(FILE_ALIGNMENT, ERASED)?;
        }
        let size = to_usize(base.size, "file system size")?;
        if size != 0 && buf.len() > size {
            return Err(FwupdError::out_of_range(format!(
                "files of 0x{:x} bytes do not fit file system of 0x{size:x}",
                buf.len()
            )));
        }
        buf.pad_to(size, ERASED);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseFlags;

    #[test]
    fn test_files_until_erased() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fs = Firmware::build_from_xml(
            r#"<firmware format="efi-filesystem">
  <size>0x60</size>
  <firmware format="efi-file"><id>8c8ce578-8a3d-4f1c-9935-896185c32dd3</id><data>a</data></firmware>
  <firmware format="efi-file"><id>5473c07a-3dcb-4dca-bd6f-1e9689e7349a</id><data>bcdefghij</data></firmware>
</firmware>"#,
        )?;
        let blob = fs.write()?;
        assert_eq!(blob.len(), 0x60);
        assert_eq!(blob[25..32], [ERASED; 7]);
        let mut fw = Firmware::from_name("efi-filesystem")?;
        fw.parse_bytes(&blob, 0, ParseFlags::NONE)?;
        assert_eq!(fw.images().len(), 2);
        assert_eq!(fw.images()[1].base().offset, 32);
        assert_eq!(fw.images()[1].base().bytes.as_deref(), Some(&b"bcdefghij"[..]));
        assert_eq!(fw.write()?, blob);
        Ok(())
    }

    #[test]
    fn test_overflowing_size() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fs = Firmware::build_from_xml(
            r#"<firmware format="efi-filesystem">
  <size>0x10</size>
  <firmware format="efi-file"><id>8c8ce578-8a3d-4f1c-9935-896185c32dd3</id><data>a</data></firmware>
</firmware>"#,
        )?;
        assert!(fs.write().is_err());
        Ok(())
    }
}
