//! Intel flash partition tables.

use fwupd_common::XmlBuilder;
use fwupd_common::mem::strsafe;
use fwupd_errors::{FwupdError, Result};
use fwupd_stream::InputStream;

use super::{query_narrow, read_struct, to_usize};
use crate::firmware::{ContainerFormat, Firmware, FirmwareBase, FirmwareFormat, ParseContext};
use crate::structs::{IFWI_FPT, IFWI_FPT_ENTRY};
use crate::xml::XmlNode;

/// Largest number of partitions a table may declare.
pub const MAX_ENTRIES: u32 = 56;
/// Oldest header version understood.
pub const HEADER_VERSION_MIN: u8 = 0x20;

/// Header fields of a flash partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfwiFpt {
    /// Header version, at least 0x20.
    pub header_version: u8,
    /// Table flags.
    pub flags: u8,
    /// Boot delay ticks.
    pub ticks_to_add: u16,
    /// Boot delay tokens.
    pub tokens_to_add: u16,
    /// UMA size requested by the ME.
    pub uma_size: u32,
    /// Stored table CRC, kept as found.
    pub crc32: u32,
    /// Flash image tool version: major, minor, hotfix, build.
    pub fitc: [u16; 4],
}

impl Default for IfwiFpt {
    fn default() -> Self {
        Self {
            header_version: HEADER_VERSION_MIN,
            flags: 0,
            ticks_to_add: 0,
            tokens_to_add: 0,
            uma_size: 0,
            crc32: 0,
            fitc: [0; 4],
        }
    }
}

const FITC_KEYS: [&str; 4] = ["fitc_major", "fitc_minor", "fitc_hotfix", "fitc_build"];

fn partition_name(name: u32) -> String {
    strsafe(&name.to_le_bytes())
}

fn partition_name_value(image: &Firmware) -> Result<u32> {
    let Some(id) = image.id() else {
        return u32::try_from(image.idx())
            .map_err(|e| FwupdError::out_of_range(format!("partition idx too large: {e}")));
    };
    if id.len() > 4 || !id.is_ascii() {
        return Err(FwupdError::invalid_data(format!(
            "partition name {id} must be at most 4 ASCII characters"
        )));
    }
    let mut name = [0u8; 4];
    name[..id.len()].copy_from_slice(id.as_bytes());
    Ok(u32::from_le_bytes(name))
}

impl ContainerFormat for IfwiFpt {
    fn name(&self) -> &'static str {
        "ifwi-fpt"
    }

    fn magic(&self) -> Option<(u64, &'static [u8])> {
        Some((0, b"$FPT"))
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()> {
        let st = read_struct(stream, &IFWI_FPT, 0)?;
        ctx.dump(&st);
        let num_of_entries = st.get_u32("num_of_entries");
        if num_of_entries > MAX_ENTRIES {
            return Err(FwupdError::invalid_file(format!(
                "invalid FPT number of entries {num_of_entries}, limit is {MAX_ENTRIES}"
            )));
        }
        self.header_version = st.get_u8("header_version");
        if self.header_version < HEADER_VERSION_MIN {
            return Err(FwupdError::invalid_file(format!(
                "invalid FPT header version 0x{:x}, expected at least 0x{HEADER_VERSION_MIN:x}",
                self.header_version
            )));
        }
        let header_length = u64::from(st.get_u8("header_length"));
        if header_length < st.size() as u64 {
            return Err(FwupdError::invalid_file(format!(
                "invalid FPT header length 0x{header_length:x}"
            )));
        }
        self.flags = st.get_u8("flags");
        self.ticks_to_add = st.get_u16("ticks_to_add");
        self.tokens_to_add = st.get_u16("tokens_to_add");
        self.uma_size = st.get_u32("uma_size");
        self.crc32 = st.get_u32("crc32");
        for (value, key) in self.fitc.iter_mut().zip(FITC_KEYS) {
            *value = st.get_u16(key);
        }

        let stream_size = stream.stream_size()?;
        let entry_size = IFWI_FPT_ENTRY.size()? as u64;
        let mut end = header_length + u64::from(num_of_entries) * entry_size;
        for i in 0..u64::from(num_of_entries) {
            let entry = read_struct(stream, &IFWI_FPT_ENTRY, header_length + i * entry_size)?;
            ctx.dump(&entry);
            let name = entry.get_u32("partition_name");
            let offset = u64::from(entry.get_u32("offset"));
            let length = u64::from(entry.get_u32("length"));
            let mut child = Firmware::new(FirmwareFormat::IfwiFptPartition(IfwiFptPartition {
                partition_type: entry.get_u32("partition_type"),
            }));
            child.set_id(partition_name(name));
            child.base_mut().idx = u64::from(name);
            if length == 0 {
                child.base_mut().offset = offset;
                child.base_mut().bytes = Some(Vec::new());
                base.add_image(child)?;
                continue;
            }
            if offset + length > stream_size {
                return Err(FwupdError::invalid_file(format!(
                    "partition {} at 0x{offset:x} of size 0x{length:x} exceeds image of 0x{stream_size:x}",
                    partition_name(name)
                )));
            }
            Firmware::parse_child(base, child, stream, offset, length, ctx)?;
            end = end.max(offset + length);
        }
        base.size = end;
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        let num_of_entries = u32::try_from(base.images().len())
            .ok()
            .filter(|&n| n <= MAX_ENTRIES)
            .ok_or_else(|| FwupdError::out_of_range(format!("too many partitions, limit is {MAX_ENTRIES}")))?;
        let mut st = IFWI_FPT.new_instance()?;
        let header_length = st.size();
        st.set_u32("num_of_entries", num_of_entries);
        st.set_u8("header_version", self.header_version);
        st.set_u8("header_length", header_length as u8);
        st.set_u8("flags", self.flags);
        st.set_u16("ticks_to_add", self.ticks_to_add);
        st.set_u16("tokens_to_add", self.tokens_to_add);
        st.set_u32("uma_size", self.uma_size);
        st.set_u32("crc32", self.crc32);
        for (value, key) in self.fitc.iter().zip(FITC_KEYS) {
            st.set_u16(key, *value);
        }

        let mut buf = st.pack();
        let mut data = Vec::new();
        let data_start = header_length + base.images().len() * IFWI_FPT_ENTRY.size()?;
        for image in base.images() {
            let blob = image.write()?;
            let partition_type = match image.format() {
                FirmwareFormat::IfwiFptPartition(partition) => partition.partition_type,
                _ => 0,
            };
            let offset = if blob.is_empty() { 0 } else { data_start + data.len() };
            let mut entry = IFWI_FPT_ENTRY.new_instance()?;
            entry.set_u32("partition_name", partition_name_value(image)?);
            entry.set_u32(
                "offset",
                u32::try_from(offset).map_err(|e| FwupdError::out_of_range(format!("partition offset: {e}")))?,
            );
            entry.set_u32(
                "length",
                u32::try_from(blob.len()).map_err(|e| FwupdError::out_of_range(format!("partition size: {e}")))?,
            );
            entry.set_u32("partition_type", partition_type);
            buf.extend_from_slice(entry.as_bytes());
            data.extend(blob);
        }
        buf.extend(data);
        Ok(buf)
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(header_version) = query_narrow(node, "header_version")? {
            self.header_version = header_version;
        }
        if let Some(flags) = query_narrow(node, "flags")? {
            self.flags = flags;
        }
        if let Some(ticks) = query_narrow(node, "ticks_to_add")? {
            self.ticks_to_add = ticks;
        }
        if let Some(tokens) = query_narrow(node, "tokens_to_add")? {
            self.tokens_to_add = tokens;
        }
        if let Some(uma_size) = query_narrow(node, "uma_size")? {
            self.uma_size = uma_size;
        }
        if let Some(crc32) = query_narrow(node, "crc32")? {
            self.crc32 = crc32;
        }
        for (value, key) in self.fitc.iter_mut().zip(FITC_KEYS) {
            if let Some(v) = query_narrow(node, key)? {
                *value = v;
            }
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("header_version", u64::from(self.header_version))?;
        xb.insert_kx("flags", u64::from(self.flags))?;
        xb.insert_kx("ticks_to_add", u64::from(self.ticks_to_add))?;
        xb.insert_kx("tokens_to_add", u64::from(self.tokens_to_add))?;
        xb.insert_kx("uma_size", u64::from(self.uma_size))?;
        xb.insert_kx("crc32", u64::from(self.crc32))?;
        for (value, key) in self.fitc.iter().zip(FITC_KEYS) {
            xb.insert_kx(key, u64::from(*value))?;
        }
        Ok(())
    }
}

/// One partition of a flash partition table; the tag is the image id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfwiFptPartition {
    /// Partition type from the table entry.
    pub partition_type: u32,
}

impl ContainerFormat for IfwiFptPartition {
    fn name(&self) -> &'static str {
        "ifwi-fpt-partition"
    }

    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        _ctx: &ParseContext,
    ) -> Result<()> {
        let size = stream.stream_size()?;
        base.bytes = Some(stream.read_bytes_at(0, to_usize(size, "partition size")?)?);
        base.size = size;
        Ok(())
    }

    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>> {
        Ok(base.bytes_or_empty().to_vec())
    }

    fn build(&mut self, _base: &mut FirmwareBase, node: &XmlNode) -> Result<()> {
        if let Some(partition_type) = query_narrow(node, "partition_type")? {
            self.partition_type = partition_type;
        }
        Ok(())
    }

    fn export(&self, _base: &FirmwareBase, xb: &mut XmlBuilder) -> Result<()> {
        xb.insert_kx("partition_type", u64::from(self.partition_type))
    }
}
