//! ACPI tables with the generic 36-byte header.

use fwupd_common::XmlBuilder;
use fwupd_common::sum::{finish8, sum8};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{check_length, query_narrow, read_struct, to_usize};
use crate::firmware::{ContainerFormat, FirmwareBase, ParseContext};
use crate::structs::ACPI_TABLE;
use crate::xml::XmlNode;

/// Header fields of an ACPI table; the signature is the image id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcpiTable {
    /// Table revision.
    pub revision: u8,
    /// OEM identifier.
    pub oem_id: String,
    /// OEM table identifier.
    pub oem_table_id: String,
    /// OEM revision.
    pub oem_revision: u32,
    /// Vendor of the compiler that built the table.
    pub asl_compiler_id: String,
    /// Revision of that compiler.
    pub asl_compiler_revision: u32,
}

impl ContainerFormat for AcpiTable {
    fn name(&self) -> &'static str {
        "acpi-table"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &ACPI_TABLE, 0)?;
        ctx.dump(&st);
        let header_size = st.size() as u64;
        let length = u64::from(st.get_u32("length"));
        check_length(length, header_size, stream.stream_size()?, "table length")?;

        let table = stream.read_bytes_at(0, to_usize(length, "table length")?)?;
        let csum = sum8(&table);
        if csum != 0 && ctx.check_checksums() {
            return Err(FwupdError::invalid_file(format!(
                "CRC failed, expected 0x{:02x}, got 0x{:02x}",
                st.get_u8("checksum").wrapping_sub(csum),
                st.get_u8("checksum")
            )));
        }

        base.id = Some(st.get_string("signature"));
        base.size = length;
        base.bytes = Some(table[st.size()..].to_vec());
        self.revision = st.get_u8("revision");
        self.oem_id = st.get_string("oem_id");
        self.oem_table_id = st.get_string("oem_table_id");
        self.oem_revision = st.get_u32("oem_revision");
        self.asl_compiler_id = st.get_string("asl_compiler_id");
        self.asl_compiler_revision = st.get_u32("asl_compiler_revision");
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let payload = base.bytes_or_empty();
        let mut st = ACPI_TABLE.new_instance()?;
        let length = u32::try_from(st.size() + payload.len())
            .map_err(|e| FwupdError::out_of_range(format!("table too large: {e}")))?;
        st.set_string("signature", base.id.as_deref().unwrap_or_default())?;
        st.set_u32("length", length);
        st.set_u8("revision", self.revision);
        st.set_string("oem_id", &self.oem_id)?;
        st.set_string("oem_table_id", &self.oem_table_id)?;
        st.set_u32("oem_revision", self.oem_revision);
        st.set_string("asl_compiler_id", &self.asl_compiler_id)?;
        st.set_u32("asl_compiler_revision", self.asl_compiler_revision);

        let mut buf = st.pack();
        buf.extend_from_slice(payload);
        let csum = finish8(sum8(&buf));
        st.set_u8("checksum", csum);
        buf[..st.size()].copy_from_slice(st.as_bytes());
        Ok(buf)
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(revision) = query_narrow(node, "revision")? {
            self.revision = revision;
        }
        if let Some(oem_id) = node.query_text("oem_id") {
            self.oem_id = oem_id.to_owned();
        }
        if let Some(oem_table_id) = node.query_text("oem_table_id") {
            self.oem_table_id = oem_table_id.to_owned();
        }
        if let Some(oem_revision) = query_narrow(node, "oem_revision")? {
            self.oem_revision = oem_revision;
        }
        if let Some(asl_compiler_id) = node.query_text("asl_compiler_id") {
            self.asl_compiler_id = asl_compiler_id.to_owned();
        }
        if let Some(revision) = query_narrow(node, "asl_compiler_revision")? {
            self.asl_compiler_revision = revision;
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("revision", u64::from(self.revision))?;
        xb.insert_kv("oem_id", Some(self.oem_id.as_str()))?;
        xb.insert_kv("oem_table_id", Some(self.oem_table_id.as_str()))?;
        xb.insert_kx("oem_revision", u64::from(self.oem_revision))?;
        xb.insert_kv("asl_compiler_id", Some(self.asl_compiler_id.as_str()))?;
        xb.insert_kx("asl_compiler_revision", u64::from(self.asl_compiler_revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Firmware, ParseFlags};
    use fwupd_errors::ErrorKind;

    fn facp() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"FACP");
        buf.extend_from_slice(&40u32.to_le_bytes());
        buf.push(6);
        buf.push(0);
        buf.extend_from_slice(b"ALASKA");
        buf.extend_from_slice(b"A M I   ");
        buf.extend_from_slice(&0x0107_2009u32.to_le_bytes());
        buf.extend_from_slice(b"AMI ");
        buf.extend_from_slice(&0x0001_0013u32.to_le_bytes());
        buf.extend_from_slice(&[1, 2, 3, 4]);
        buf[9] = finish8(sum8(&buf));
        buf
    }

    #[test]
    fn test_parse_header() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let blob = facp();
        let mut fw = Firmware::from_name("acpi-table")?;
        fw.parse_bytes(&blob, 0, ParseFlags::NONE)?;
        assert_eq!(fw.id(), Some("FACP"));
        assert_eq!(fw.base().size, 40);
        assert_eq!(fw.base().bytes.as_deref(), Some(&[1u8, 2, 3, 4][..]));
        let crate::FirmwareFormat::AcpiTable(table) = fw.format() else {
            return Err("wrong format".into());
        };
        assert_eq!(table.oem_id, "ALASKA");
        assert_eq!(table.oem_table_id, "A M I   ");
        assert_eq!(table.oem_revision, 0x0107_2009);
        assert_eq!(fw.write()?, blob);
        Ok(())
    }

    #[test]
    fn test_checksum_mismatch() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut blob = facp();
        blob[36] ^= 0x01;
        let mut fw = Firmware::from_name("acpi-table")?;
        let err = fw
            .parse_bytes(&blob, 0, ParseFlags::NONE)
            .err()
            .ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::InvalidFile);
        assert!(err.to_string().contains("CRC failed"), "{err}");
        fw.parse_bytes(&blob, 0, ParseFlags::IGNORE_CHECKSUM)?;
        Ok(())
    }

    #[test]
    fn test_length_bounds() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut blob = facp();
        blob[4..8].copy_from_slice(&0x100u32.to_le_bytes());
        let mut fw = Firmware::from_name("acpi-table")?;
        assert!(fw.parse_bytes(&blob, 0, ParseFlags::IGNORE_CHECKSUM).is_err());
        blob[4..8].copy_from_slice(&0x10u32.to_le_bytes());
        assert!(fw.parse_bytes(&blob, 0, ParseFlags::IGNORE_CHECKSUM).is_err());
        assert!(fw.parse_bytes(&blob[..20], 0, ParseFlags::NONE).is_err());
        Ok(())
    }
}
