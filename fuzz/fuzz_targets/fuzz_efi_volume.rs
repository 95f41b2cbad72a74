//! Fuzzes the EFI firmware volume parser and its nested children.
//!
//! Parses arbitrary bytes as `efi-volume` with the fuzzing limits, then writes
//! and exports whatever parsed. None of these operations must panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_efi_volume

#![no_main]

use fwupd_firmware::{Firmware, ParseFlags};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut fw) = Firmware::from_name("efi-volume") else {
        return;
    };
    if fw.parse_bytes(data, 0, ParseFlags::FUZZING).is_err() {
        return;
    }
    let _ = fw.write();
    let _ = fw.export_xml();
});
