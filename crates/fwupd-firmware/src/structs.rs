//! On-disk layouts of every container header.

use fwupd_struct::StaticSchema;

pub(crate) static ACPI_TABLE: StaticSchema = StaticSchema::new(
    "AcpiTable{
	signature:4s,
	length:u32le,
	revision:u8,
	checksum:u8,
	oem_id:6s,
	oem_table_id:8s,
	oem_revision:u32le,
	asl_compiler_id:4s,
	asl_compiler_revision:u32le
}",
);

pub(crate) static EFI_FILE: StaticSchema = StaticSchema::new(
    "EfiFile{
	name:guid,
	hdr_checksum:u8,
	data_checksum:u8,
	type:u8,
	attrs:u8,
	size:u24le,
	state:u8:0xF8:const
}",
);

pub(crate) static EFI_FILE2: StaticSchema = StaticSchema::new("EfiFile2{ extended_size:u64le }");

pub(crate) static EFI_SECTION: StaticSchema = StaticSchema::new("EfiSection{ size:u24le, type:u8 }");

pub(crate) static EFI_SECTION2: StaticSchema = StaticSchema::new("EfiSection2{ extended_size:u32le }");

pub(crate) static EFI_SECTION_GUID_DEFINED: StaticSchema =
    StaticSchema::new("EfiSectionGuidDefined{ name:guid, offset:u16le, attr:u16le }");

pub(crate) static EFI_VOLUME: StaticSchema = StaticSchema::new(
    "EfiVolume{
	zero_vector:guid,
	guid:guid,
	length:u64le,
	signature:u32le:0x4856465F:const,
	attrs:u32le,
	hdr_len:u16le,
	checksum:u16le,
	ext_hdr:u16le,
	reserved:u8,
	revision:u8:0x02:const
}",
);

pub(crate) static EFI_VOLUME_BLOCK_MAP: StaticSchema =
    StaticSchema::new("EfiVolumeBlockMap{ num_blocks:u32le, length:u32le }");

pub(crate) static EFI_VOLUME_EXT_HEADER: StaticSchema =
    StaticSchema::new("EfiVolumeExtHeader{ fv_name:guid, size:u32le }");

pub(crate) static EFI_VOLUME_EXT_ENTRY: StaticSchema =
    StaticSchema::new("EfiVolumeExtEntry{ size:u16le, type:u16le }");

pub(crate) static IFWI_FPT: StaticSchema = StaticSchema::new(
    "IfwiFpt{
	signature:u32le:0x54504624:const,
	num_of_entries:u32le,
	header_version:u8,
	entry_version:u8:0x10:const,
	header_length:u8,
	flags:u8,
	ticks_to_add:u16le,
	tokens_to_add:u16le,
	uma_size:u32le,
	crc32:u32le,
	fitc_major:u16le,
	fitc_minor:u16le,
	fitc_hotfix:u16le,
	fitc_build:u16le
}",
);

pub(crate) static IFWI_FPT_ENTRY: StaticSchema = StaticSchema::new(
    "IfwiFptEntry{
	partition_name:u32le,
	reserved1:4u8,
	offset:u32le,
	length:u32le,
	reserved2:12u8,
	partition_type:u32le
}",
);

pub(crate) static EFI_VSS2_VARIABLE_STORE: StaticSchema = StaticSchema::new(
    "EfiVss2VariableStoreHeader{
	signature:guid,
	size:u32le,
	format:u8:0x5A:const,
	state:u8:0xFE:const,
	reserved:u16le,
	reserved1:u32le
}",
);

pub(crate) static EFI_VSS_AUTH_VARIABLE: StaticSchema = StaticSchema::new(
    "EfiVssAuthVariableHeader{
	start_id:u16le:0x55AA:const,
	state:u8,
	reserved:u8,
	attributes:u32le,
	monotonic_counter:u64le,
	timestamp:16u8,
	pubkey_index:u32le,
	name_size:u32le,
	data_size:u32le,
	vendor_guid:guid
}",
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_compile() -> Result<(), Box<dyn std::error::Error>> {
        let sizes = [
            (&ACPI_TABLE, 36),
            (&EFI_FILE, 24),
            (&EFI_FILE2, 8),
            (&EFI_SECTION, 4),
            (&EFI_SECTION2, 4),
            (&EFI_SECTION_GUID_DEFINED, 20),
            (&EFI_VOLUME, 56),
            (&EFI_VOLUME_BLOCK_MAP, 8),
            (&EFI_VOLUME_EXT_HEADER, 20),
            (&EFI_VOLUME_EXT_ENTRY, 4),
            (&IFWI_FPT, 32),
            (&IFWI_FPT_ENTRY, 32),
            (&EFI_VSS2_VARIABLE_STORE, 28),
            (&EFI_VSS_AUTH_VARIABLE, 60),
        ];
        for (schema, size) in sizes {
            assert_eq!(schema.size()?, size, "{}", schema.text());
        }
        Ok(())
    }
}
