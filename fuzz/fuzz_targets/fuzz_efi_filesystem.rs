//! Fuzzes the EFI firmware file system parser.
//!
//! Parses arbitrary bytes as `efi-filesystem` with the fuzzing limits, then writes
//! and exports whatever parsed. None of these operations must panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_efi_filesystem

#![no_main]

use fwupd_firmware::{Firmware, ParseFlags};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut fw) = Firmware::from_name("efi-filesystem") else {
        return;
    };
    if fw.parse_bytes(data, 0, ParseFlags::FUZZING).is_err() {
        return;
    }
    let _ = fw.write();
    let _ = fw.export_xml();
});
