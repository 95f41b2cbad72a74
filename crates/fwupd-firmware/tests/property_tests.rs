//! Property-based tests for checksum verification and hostile input.

use fwupd_firmware::{FORMAT_NAMES, Firmware, ParseFlags};
use proptest::prelude::*;

const FILE_GUID: &str = "1ba0062e-c779-4582-8566-336ae8f78f09";

// State byte of an EFI file header, outside the header checksum.
const FILE_STATE_OFFSET: usize = 0x17;

// A shorter ACPI length may select a prefix that happens to sum to zero.
const ACPI_LENGTH: std::ops::Range<usize> = 4..8;

fn acpi_table(payload: &[u8]) -> Result<Vec<u8>, TestCaseError> {
    let mut fw = Firmware::from_name("acpi-table").map_err(|e| TestCaseError::fail(e.to_string()))?;
    fw.set_id("SSDT");
    fw.base_mut().bytes = Some(payload.to_vec());
    fw.write().map_err(|e| TestCaseError::fail(e.to_string()))
}

fn efi_file(payload: &[u8]) -> Result<Vec<u8>, TestCaseError> {
    let xml = format!(
        r#"<firmware format="efi-file"><id>{FILE_GUID}</id><attrib>0x40</attrib></firmware>"#
    );
    let mut fw = Firmware::build_from_xml(&xml).map_err(|e| TestCaseError::fail(e.to_string()))?;
    fw.base_mut().bytes = Some(payload.to_vec());
    fw.write().map_err(|e| TestCaseError::fail(e.to_string()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_acpi_single_byte_corruption_detected(
        payload in proptest::collection::vec(any::<u8>(), 0..64),
        idx in any::<proptest::sample::Index>(),
        delta in 1u8..=255,
    ) {
        let mut blob = acpi_table(&payload)?;
        let mut fw = Firmware::from_name("acpi-table").map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(fw.parse_bytes(&blob, 0, ParseFlags::NONE).is_ok());

        let i = idx.index(blob.len());
        prop_assume!(!ACPI_LENGTH.contains(&i));
        blob[i] = blob[i].wrapping_add(delta);
        prop_assert!(fw.parse_bytes(&blob, 0, ParseFlags::NONE).is_err());
    }

    #[test]
    fn test_efi_file_single_byte_corruption_detected(
        payload in proptest::collection::vec(any::<u8>(), 1..64),
        idx in any::<proptest::sample::Index>(),
        delta in 1u8..=255,
    ) {
        let mut blob = efi_file(&payload)?;
        let mut fw = Firmware::from_name("efi-file").map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(fw.parse_bytes(&blob, 0, ParseFlags::NONE).is_ok());

        let i = idx.index(blob.len());
        prop_assume!(i != FILE_STATE_OFFSET);
        blob[i] = blob[i].wrapping_add(delta);
        prop_assert!(fw.parse_bytes(&blob, 0, ParseFlags::NONE).is_err());
    }

    #[test]
    fn test_arbitrary_bytes_do_not_panic(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        offset in 0u64..16,
    ) {
        for name in FORMAT_NAMES {
            let mut fw = Firmware::from_name(name).map_err(|e| TestCaseError::fail(e.to_string()))?;
            if let Err(e) = fw.parse_bytes(&data, offset, ParseFlags::FUZZING) {
                prop_assert!(!e.to_string().is_empty());
            }
        }
    }
}
