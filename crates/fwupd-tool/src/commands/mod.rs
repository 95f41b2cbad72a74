//! Command implementations for fwupd-tool

use std::path::PathBuf;

use clap::Args;
use fwupd_common::xml::parse_uint;
use fwupd_firmware::ParseFlags;

pub mod chunks;
pub mod firmware;

/// Options shared by every command that parses an image.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ParseArgs {
    /// Firmware image to parse
    pub file: PathBuf,

    /// Container format, detected from its signature when omitted
    #[arg(short, long)]
    pub format: Option<String>,

    /// Offset of the image within the file (decimal or 0x-prefixed hex)
    #[arg(long, default_value = "0", value_parser = parse_number)]
    pub offset: u64,

    /// Accept images whose checksums do not match
    #[arg(long)]
    pub ignore_checksum: bool,

    /// Require the signature at the offset instead of searching for it
    #[arg(long)]
    pub no_search: bool,
}

impl ParseArgs {
    pub fn flags(&self) -> ParseFlags {
        let mut flags = ParseFlags::NONE;
        if self.ignore_checksum {
            flags |= ParseFlags::IGNORE_CHECKSUM;
        }
        if self.no_search {
            flags |= ParseFlags::NO_SEARCH;
        }
        flags
    }
}

/// Clap value parser for decimal or `0x`-prefixed numbers.
pub fn parse_number(text: &str) -> Result<u64, String> {
    parse_uint(text).map_err(|e| e.to_string())
}

/// Like [`parse_number`], for sizes.
pub fn parse_size(text: &str) -> Result<usize, String> {
    let value = parse_number(text)?;
    usize::try_from(value).map_err(|e| format!("{text} is too large: {e}"))
}
