//! End-to-end tests for nested firmware trees: build, write, parse, export.

use fwupd_errors::ErrorKind;
use fwupd_firmware::formats::{GUID_FFS2, GUID_NVRAM};
use fwupd_firmware::{Firmware, FirmwareFormat, ParseConfig, ParseFlags};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const DRIVER_GUID: &str = "1ba0062e-c779-4582-8566-336ae8f78f09";

fn nested_volume_xml() -> String {
    format!(
        r#"<firmware format="efi-volume">
  <id>{GUID_FFS2}</id>
  <firmware format="efi-filesystem">
    <firmware format="efi-file">
      <id>{DRIVER_GUID}</id>
      <type>0x7</type>
      <attrib>0x40</attrib>
      <firmware format="efi-section">
        <type>0x15</type>
        <user_interface>Driver</user_interface>
      </firmware>
      <firmware format="efi-section">
        <data>abc</data>
      </firmware>
    </firmware>
  </firmware>
</firmware>"#
    )
}

fn nested_volume() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    Ok(Firmware::build_from_xml(&nested_volume_xml())?.write()?)
}

fn parse(name: &str, blob: &[u8], flags: ParseFlags) -> Result<Firmware, Box<dyn std::error::Error>> {
    let mut fw = Firmware::from_name(name)?;
    fw.parse_bytes(blob, 0, flags)?;
    Ok(fw)
}

#[test]
fn test_nested_volume_tree() -> TestResult {
    let blob = nested_volume()?;
    assert_eq!(blob.len(), 0x80);
    let fw = parse("efi-volume", &blob, ParseFlags::NONE)?;
    insta::assert_snapshot!(fw.to_string(), @r"
    efi-volume id=8c8ce578-8a3d-4f1c-9935-896185c32dd3 offset=0x0 size=0x80
      efi-filesystem offset=0x48 size=0x38
        efi-file id=1ba0062e-c779-4582-8566-336ae8f78f09 offset=0x0 size=0x33
          efi-section id=Driver offset=0x0 size=0x12
          efi-section offset=0x14 size=0x7
    ");
    Ok(())
}

#[test]
fn test_nested_volume_write_is_idempotent() -> TestResult {
    let blob = nested_volume()?;
    let first = parse("efi-volume", &blob, ParseFlags::NONE)?.write()?;
    assert_eq!(first, blob);
    let second = parse("efi-volume", &first, ParseFlags::NONE)?.write()?;
    assert_eq!(second, first);
    Ok(())
}

#[test]
fn test_nested_section_payloads() -> TestResult {
    let fw = parse("efi-volume", &nested_volume()?, ParseFlags::NONE)?;
    let fs = fw.images().first().ok_or("no file system")?;
    let file = fs.get_image_by_id(DRIVER_GUID)?;
    let FirmwareFormat::EfiFile(header) = file.format() else {
        return Err("expected an EFI file".into());
    };
    assert_eq!(header.file_type, 0x07);
    let ui = file.get_image_by_id("Driver")?;
    let FirmwareFormat::EfiSection(section) = ui.format() else {
        return Err("expected an EFI section".into());
    };
    assert_eq!(section.user_interface.as_deref(), Some("Driver"));
    let raw = file.images().get(1).ok_or("no raw section")?;
    assert_eq!(raw.base().bytes.as_deref(), Some(&b"abc"[..]));
    Ok(())
}

#[test]
fn test_export_then_build_roundtrip() -> TestResult {
    let blob = nested_volume()?;
    let fw = parse("efi-volume", &blob, ParseFlags::NONE)?;
    let xml = fw.export_xml()?;
    let rebuilt = Firmware::build_from_xml(&xml)?;
    assert_eq!(rebuilt.write()?, blob);
    assert_eq!(rebuilt.export_xml()?, xml);
    Ok(())
}

#[test]
fn test_export_acpi_table() -> TestResult {
    let blob = Firmware::build_from_xml(
        r#"<firmware format="acpi-table">
  <id>SSDT</id>
  <revision>0x2</revision>
  <oem_id>FWUPD</oem_id>
  <data>payload</data>
</firmware>"#,
    )?
    .write()?;
    let fw = parse("acpi-table", &blob, ParseFlags::NONE)?;
    insta::assert_snapshot!(fw.export_xml()?, @r#"
    <firmware format="acpi-table">
      <id>SSDT</id>
      <size>0x2b</size>
      <revision>0x2</revision>
      <oem_id>FWUPD</oem_id>
      <data encoding="base64" size="0x7">cGF5bG9hZA==</data>
    </firmware>
    "#);
    Ok(())
}

#[test]
fn test_nvram_volume_holds_variable_store() -> TestResult {
    let blob = Firmware::build_from_xml(&format!(
        r#"<firmware format="efi-volume">
  <id>{GUID_NVRAM}</id>
  <firmware format="efi-vss2-variable-store">
    <size>0x80</size>
    <firmware format="efi-vss-auth-variable">
      <id>SecureBoot</id>
      <vendor_guid>8be4df61-93ca-11d2-aa0d-00e098032b8c</vendor_guid>
      <attributes>0x6</attributes>
      <data encoding="hex">01</data>
    </firmware>
  </firmware>
</firmware>"#
    ))?
    .write()?;
    let fw = parse("efi-volume", &blob, ParseFlags::NONE)?;
    let store = fw.images().first().ok_or("no variable store")?;
    assert_eq!(store.format_name(), "efi-vss2-variable-store");
    let var = store.get_image_by_id("SecureBoot")?;
    assert_eq!(var.base().bytes.as_deref(), Some(&[0x01][..]));
    assert_eq!(fw.write()?, blob);
    Ok(())
}

#[test]
fn test_ifwi_partitions_by_name() -> TestResult {
    let blob = Firmware::build_from_xml(
        r#"<firmware format="ifwi-fpt">
  <firmware format="ifwi-fpt-partition"><id>FTPR</id><data>code</data></firmware>
  <firmware format="ifwi-fpt-partition"><id>NVRM</id></firmware>
  <firmware format="ifwi-fpt-partition"><id>INFO</id><data>xy</data></firmware>
</firmware>"#,
    )?
    .write()?;
    let fw = parse("ifwi-fpt", &blob, ParseFlags::NONE)?;
    assert_eq!(fw.images().len(), 3);
    assert_eq!(fw.get_image_by_id("FTPR")?.base().bytes.as_deref(), Some(&b"code"[..]));
    assert_eq!(fw.get_image_by_id("INFO")?.base().bytes.as_deref(), Some(&b"xy"[..]));
    let idx = u64::from(u32::from_le_bytes(*b"NVRM"));
    assert_eq!(fw.get_image_by_idx(idx)?.id(), Some("NVRM"));
    assert_eq!(fw.write()?, blob);
    Ok(())
}

#[test]
fn test_depth_limit() -> TestResult {
    let blob = nested_volume()?;
    let config = ParseConfig {
        max_depth: 2,
        ..ParseConfig::default()
    };
    let mut fw = Firmware::from_name("efi-volume")?;
    let mut cursor = std::io::Cursor::new(&blob);
    let err = fw
        .parse_with_config(&mut cursor, 0, ParseFlags::NONE, &config)
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.kind(), ErrorKind::ResourceLimit);
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let config = ParseConfig {
        max_depth: 3,
        ..ParseConfig::default()
    };
    fw.parse_with_config(&mut cursor, 0, ParseFlags::NONE, &config)?;
    Ok(())
}

#[test]
fn test_image_limit_when_fuzzing() -> TestResult {
    let blob = Firmware::build_from_xml(
        r#"<firmware format="efi-filesystem">
  <firmware format="efi-file"><id>8c8ce578-8a3d-4f1c-9935-896185c32dd3</id><data>a</data></firmware>
  <firmware format="efi-file"><id>5473c07a-3dcb-4dca-bd6f-1e9689e7349a</id><data>b</data></firmware>
</firmware>"#,
    )?
    .write()?;
    let config = ParseConfig {
        max_images_fuzzing: 1,
        ..ParseConfig::default()
    };
    let mut fw = Firmware::from_name("efi-filesystem")?;
    let mut cursor = std::io::Cursor::new(&blob);
    fw.parse_with_config(&mut cursor, 0, ParseFlags::NONE, &config)?;
    assert_eq!(fw.images().len(), 2);

    let err = fw
        .parse_with_config(&mut cursor, 0, ParseFlags::FUZZING, &config)
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.kind(), ErrorKind::ResourceLimit);
    assert!(err.to_string().contains("too many images, limit is 1"), "{err}");
    Ok(())
}

#[test]
fn test_size_limit() -> TestResult {
    let blob = nested_volume()?;
    let config = ParseConfig {
        max_size: 0x40,
        ..ParseConfig::default()
    };
    let mut fw = Firmware::from_name("efi-volume")?;
    let mut cursor = std::io::Cursor::new(&blob);
    let err = fw
        .parse_with_config(&mut cursor, 0, ParseFlags::NONE, &config)
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.kind(), ErrorKind::ResourceLimit);
    Ok(())
}

#[test]
fn test_error_names_failing_image() -> TestResult {
    let mut blob = nested_volume()?;
    // first payload byte of the raw section inside the checksummed file
    let offset = 72 + 24 + 20 + 4;
    blob[offset] ^= 0xFF;
    let err = parse("efi-volume", &blob, ParseFlags::NONE)
        .err()
        .ok_or("expected error")?;
    let msg = err.to_string();
    assert!(msg.contains("failed to parse efi-volume at 0x0"), "{msg}");
    assert!(msg.contains("failed to parse efi-file at 0x0"), "{msg}");
    assert!(msg.contains("data checksum invalid"), "{msg}");

    let fw = parse("efi-volume", &blob, ParseFlags::IGNORE_CHECKSUM)?;
    assert_eq!(fw.images().len(), 1);
    Ok(())
}
