//! Firmware container tree with parsers for common firmware image formats.
//!
//! A parsed image is a [`Firmware`] tree. Each node carries the shared
//! [`FirmwareBase`] state and one [`FirmwareFormat`] variant; containers hold
//! their children as images. Every format can be parsed from a stream,
//! written back to bytes, built from a `<firmware>` XML description and
//! exported to the same vocabulary.
//!
//! Supported formats: `raw`, `acpi-table`, `efi-file`, `efi-section`,
//! `efi-filesystem`, `efi-volume`, `ifwi-fpt`, `ifwi-fpt-partition`,
//! `efi-vss2-variable-store` and `efi-vss-auth-variable`.
//!
//! ```
//! use fwupd_firmware::{Firmware, ParseFlags};
//!
//! let fw = Firmware::build_from_xml(
//!     r#"<firmware format="acpi-table">
//!          <id>SSDT</id>
//!          <oem_id>FWUPD</oem_id>
//!          <data>payload</data>
//!        </firmware>"#,
//! )?;
//! let blob = fw.write()?;
//! assert_eq!(blob.len(), 36 + 7);
//!
//! let mut parsed = Firmware::from_name("acpi-table")?;
//! parsed.parse_bytes(&blob, 0, ParseFlags::NONE)?;
//! assert_eq!(parsed.id(), Some("SSDT"));
//! assert_eq!(parsed.write()?, blob);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod firmware;
pub mod flags;
pub mod formats;
mod structs;
pub mod xml;

pub use config::{ENV_FUZZER_RUNNING, ENV_VERBOSE, ParseConfig};
pub use firmware::{
    ContainerFormat, FORMAT_NAMES, Firmware, FirmwareBase, FirmwareFormat, ParseContext,
    decode_data, decode_hex, encode_hex,
};
pub use flags::ParseFlags;
pub use xml::XmlNode;

pub use fwupd_errors::{FwupdError, Result};
