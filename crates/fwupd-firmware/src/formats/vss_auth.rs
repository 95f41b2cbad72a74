//! Authenticated variables inside a VSS2 store.

use fwupd_common::XmlBuilder;
use fwupd_common::guid::{Guid, guid_from_string, guid_is_zero, guid_to_string};
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{check_length, query_narrow, read_struct, to_usize, utf16le_decode, utf16le_encode};
use crate::firmware::{ContainerFormat, FirmwareBase, ParseContext, decode_hex, encode_hex};
use crate::structs::EFI_VSS_AUTH_VARIABLE;
use crate::xml::XmlNode;

/// State of a variable that was written and not deleted.
pub const STATE_VAR_ADDED: u8 = 0x3F;

/// Header fields of an authenticated variable; the name is the image id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfiVssAuthVariable {
    /// Variable state bits.
    pub state: u8,
    /// Variable attributes.
    pub attributes: u32,
    /// Monotonic counter of the last authenticated write.
    pub monotonic_counter: u64,
    /// `EFI_TIME` of the last authenticated write.
    pub timestamp: [u8; 16],
    /// Index of the public key in the key database.
    pub pubkey_index: u32,
    /// Vendor GUID.
    pub vendor_guid: Guid,
}

impl Default for EfiVssAuthVariable {
    fn default() -> Self {
        Self {
            state: STATE_VAR_ADDED,
            attributes: 0,
            monotonic_counter: 0,
            timestamp: [0; 16],
            pubkey_index: 0,
            vendor_guid: [0; 16],
        }
    }
}

impl ContainerFormat for EfiVssAuthVariable {
    fn name(&self) -> &'static str {
        "efi-vss-auth-variable"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &EFI_VSS_AUTH_VARIABLE, 0)?;
        ctx.dump(&st);
        let header_size = st.size() as u64;
        let name_size = u64::from(st.get_u32("name_size"));
        let data_size = u64::from(st.get_u32("data_size"));
        let total = header_size + name_size + data_size;
        check_length(total, header_size, stream.stream_size()?, "variable size")?;

        let name = stream.read_bytes_at(header_size, to_usize(name_size, "name size")?)?;
        base.id = Some(utf16le_decode(&name)?);
        base.bytes = Some(stream.read_bytes_at(header_size + name_size, to_usize(data_size, "data size")?)?);
        base.size = total;

        self.state = st.get_u8("state");
        self.attributes = st.get_u32("attributes");
        self.monotonic_counter = st.get_u64("monotonic_counter");
        self.timestamp.copy_from_slice(st.get_bytes("timestamp"));
        self.pubkey_index = st.get_u32("pubkey_index");
        self.vendor_guid = st.get_guid("vendor_guid");
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let name = base
            .id
            .as_deref()
            .ok_or_else(|| FwupdError::not_found("no name set for variable"))?;
        let name = utf16le_encode(name);
        let data = base.bytes_or_empty();
        let mut st = EFI_VSS_AUTH_VARIABLE.new_instance()?;
        st.set_u8("state", self.state);
        st.set_u32("attributes", self.attributes);
        st.set_u64("monotonic_counter", self.monotonic_counter);
        st.set_bytes("timestamp", &self.timestamp)?;
        st.set_u32("pubkey_index", self.pubkey_index);
        st.set_u32(
            "name_size",
            u32::try_from(name.len()).map_err(|e| FwupdError::out_of_range(format!("name too long: {e}")))?,
        );
        st.set_u32(
            "data_size",
            u32::try_from(data.len()).map_err(|e| FwupdError::out_of_range(format!("data too large: {e}")))?,
        );
        st.set_guid("vendor_guid", &self.vendor_guid);
        let mut buf = st.pack();
        buf.extend(name);
        buf.extend_from_slice(data);
        Ok(buf)
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(state) = query_narrow(node, "state")? {
            self.state = state;
        }
        if let Some(attributes) = query_narrow(node, "attributes")? {
            self.attributes = attributes;
        }
        if let Some(counter) = node.query_uint("monotonic_counter")? {
            self.monotonic_counter = counter;
        }
        if let Some(timestamp) = node.query_text("timestamp") {
            let bytes = decode_hex(timestamp)?;
            if bytes.len() != self.timestamp.len() {
                return Err(FwupdError::invalid_data(format!(
                    "timestamp must be 16 bytes, got 0x{:x}",
                    bytes.len()
                )));
            }
            self.timestamp.copy_from_slice(&bytes);
        }
        if let Some(index) = query_narrow(node, "pubkey_index")? {
            self.pubkey_index = index;
        }
        if let Some(guid) = node.query_text("vendor_guid") {
            self.vendor_guid = guid_from_string(guid)?;
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("state", u64::from(self.state))?;
        xb.insert_kx("attributes", u64::from(self.attributes))?;
        xb.insert_kx("monotonic_counter", self.monotonic_counter)?;
        if self.timestamp.iter().any(|&b| b != 0) {
            xb.insert_kv("timestamp", Some(encode_hex(&self.timestamp).as_str()))?;
        }
        xb.insert_kx("pubkey_index", u64::from(self.pubkey_index))?;
        if !guid_is_zero(&self.vendor_guid) {
            xb.insert_kv("vendor_guid", Some(guid_to_string(&self.vendor_guid).as_str()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Firmware, FirmwareFormat, ParseFlags};

    #[test]
    fn test_variable_fields() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fw = Firmware::build_from_xml(
            r#"<firmware format="efi-vss-auth-variable">
  <id>db</id>
  <state>0x3f</state>
  <attributes>0x27</attributes>
  <monotonic_counter>0x2</monotonic_counter>
  <timestamp>e5070c0f0a1e0000000000000000ffff</timestamp>
  <pubkey_index>0x1</pubkey_index>
  <vendor_guid>d719b2cb-3d3a-4596-a3bc-dad00e67656f</vendor_guid>
  <data encoding="hex">a1a2</data>
</firmware>"#,
        )?;
        let blob = fw.write()?;
        assert_eq!(blob.len(), 60 + 6 + 2);
        assert_eq!(blob[..4], [0xAA, 0x55, 0x3F, 0x00]);
        assert_eq!(&blob[60..66], &[b'd', 0, b'b', 0, 0, 0]);

        let mut parsed = Firmware::from_name("efi-vss-auth-variable")?;
        parsed.parse_bytes(&blob, 0, ParseFlags::NONE)?;
        assert_eq!(parsed.id(), Some("db"));
        let FirmwareFormat::EfiVssAuthVariable(var) = parsed.format() else {
            return Err("wrong format".into());
        };
        assert_eq!(var.attributes, 0x27);
        assert_eq!(var.monotonic_counter, 2);
        assert_eq!(var.timestamp[15], 0xFF);
        assert_eq!(guid_to_string(&var.vendor_guid), "d719b2cb-3d3a-4596-a3bc-dad00e67656f");
        assert_eq!(parsed.write()?, blob);
        Ok(())
    }

    #[test]
    fn test_truncated_data() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let fw = Firmware::build_from_xml(
            r#"<firmware format="efi-vss-auth-variable"><id>x</id><data>abcdef</data></firmware>"#,
        )?;
        let blob = fw.write()?;
        let mut parsed = Firmware::from_name("efi-vss-auth-variable")?;
        assert!(parsed.parse_bytes(&blob[..blob.len() - 1], 0, ParseFlags::NONE).is_err());
        let mut bad = blob.clone();
        bad[0] = 0x00;
        assert!(parsed.parse_bytes(&bad, 0, ParseFlags::NONE).is_err());
        Ok(())
    }

    #[test]
    fn test_bad_timestamp() {
        let result = Firmware::build_from_xml(
            r#"<firmware format="efi-vss-auth-variable"><timestamp>0011</timestamp></firmware>"#,
        );
        assert!(result.is_err());
    }
}
